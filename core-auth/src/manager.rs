//! # Session Manager
//!
//! Owns the single client session: PKCE login redirect, code exchange,
//! profile caching with a staleness window, logout and resource checks.
//!
//! ## Overview
//!
//! A `SessionManager` is constructed from a validated [`SessionConfig`] and
//! injected wherever session state is needed. There is no ambient global;
//! each manager owns its token, cached profile and in-flight flags.
//!
//! ## Caching
//!
//! [`SessionManager::refresh_profile`] serves the cached profile without a
//! network call while it is younger than `cache_ttl` (5 minutes by default).
//! [`SessionManager::logout`] backdates the persisted cache timestamp so the
//! next refresh always reaches the server.
//!
//! ## Duplicate suppression
//!
//! `verify` and `refresh_profile` allow one outstanding call each. A caller
//! arriving while one is in flight gets [`VerifyOutcome::AlreadyInFlight`] or
//! [`RefreshOutcome::AlreadyInFlight`] immediately and no request is sent.
//! The flag is released when the in-flight future completes or is dropped.
//!
//! ## Logout during in-flight calls
//!
//! [`SessionManager::logout`] starts a new session generation. A `verify`,
//! `refresh_profile` or `login` that began under an earlier generation drops
//! its result instead of writing it back, and reports
//! [`VerifyOutcome::Discarded`] or [`RefreshOutcome::Discarded`]. Store writes
//! are serialized and wait for the background writes issued by `logout`, so
//! the cleared session is never overwritten by an older call.
//!
//! ## Expired sessions
//!
//! A 401 from the profile endpoint or from [`SessionManager::authenticated_fetch`]
//! is not an error. The manager emits [`SessionEvent::SessionExpired`] and
//! navigates to the login page unless the host is already showing it.
//!
//! ## Usage
//!
//! ```ignore
//! use core_auth::SessionManager;
//! use core_runtime::{EventBus, SessionConfig};
//!
//! let config = SessionConfig::builder()
//!     .base_url("https://api.example.com")
//!     .client_id("abc")
//!     .callback_url("https://app.example.com/callback")
//!     .build()?;
//! let manager = SessionManager::restore(config, EventBus::default()).await?;
//!
//! // On the callback page:
//! manager.complete_login(&code).await?;
//!
//! // On every page load:
//! manager.refresh_profile(false).await?;
//! if manager.has_required_resources(&["billing"]) { /* ... */ }
//! ```

use crate::error::{AuthError, Result};
use crate::pkce::PkceChallenge;
use crate::service::{IamService, IdentityService, ProfileFetch};
use crate::session_store::SessionStore;
use crate::transport::ApiTransport;
use crate::types::{ClientSetup, SessionState, UserProfile};
use bridge_traits::http::{HttpRequest, HttpResponse};
use chrono::{DateTime, Utc};
use core_runtime::config::SessionConfig;
use core_runtime::events::{CoreEvent, EventBus, SessionEvent};
use parking_lot::RwLock;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::runtime::{Builder, Handle};
use tokio::sync::broadcast::Receiver;
use tokio::sync::{Mutex as AsyncMutex, MutexGuard, Notify};
use tracing::{debug, info, instrument, warn};
use url::Url;

const LOGIN_PATH: &str = "/auth/v1/login";

/// Result of [`SessionManager::verify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    /// The code was exchanged and the token stored.
    Verified,
    /// Another verify was pending; no request was sent.
    AlreadyInFlight,
    /// The session was logged out while the exchange was in flight; the
    /// token was dropped.
    Discarded,
}

/// Result of [`SessionManager::refresh_profile`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The cached profile is within the TTL; no request was sent.
    Cached,
    /// A new profile was fetched and cached.
    Refreshed,
    /// Another refresh was pending; no request was sent.
    AlreadyInFlight,
    /// The server answered 401 and the login redirect was handled.
    SessionExpired,
    /// The session was logged out while the fetch was in flight; the
    /// profile was dropped.
    Discarded,
}

#[derive(Debug, Default)]
struct Session {
    token: Option<String>,
    user: Option<UserProfile>,
    cache_timestamp: Option<DateTime<Utc>>,
    verifier: Option<String>,
    verified: bool,
    setup: Option<ClientSetup>,
}

/// Resets an in-flight flag when the owning call finishes or is dropped.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Background store writes not yet finished.
#[derive(Default)]
struct PendingWrites {
    count: AtomicUsize,
    idle: Notify,
}

impl PendingWrites {
    fn start(self: &Arc<Self>) -> PendingWrite {
        self.count.fetch_add(1, Ordering::AcqRel);
        PendingWrite(Arc::clone(self))
    }

    async fn wait_idle(&self) {
        loop {
            let mut notified = std::pin::pin!(self.idle.notified());
            notified.as_mut().enable();
            if self.count.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }
}

struct PendingWrite(Arc<PendingWrites>);

impl Drop for PendingWrite {
    fn drop(&mut self) {
        if self.0.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

/// The client session.
pub struct SessionManager {
    config: SessionConfig,
    service: Arc<dyn IdentityService>,
    transport: ApiTransport,
    store: SessionStore,
    events: EventBus,
    session: RwLock<Session>,
    verify_in_flight: AtomicBool,
    refresh_in_flight: AtomicBool,
    /// Bumped by every logout.
    generation: AtomicU64,
    store_lock: Arc<AsyncMutex<()>>,
    pending_writes: Arc<PendingWrites>,
}

impl SessionManager {
    /// Creates a manager with an empty session, talking to the identity
    /// server through the configured HTTP client.
    pub fn new(config: SessionConfig, events: EventBus) -> Self {
        let service = Arc::new(IamService::from_config(&config));
        Self::with_service(config, service, events)
    }

    /// Creates a manager with an empty session and a custom service.
    pub fn with_service(
        config: SessionConfig,
        service: Arc<dyn IdentityService>,
        events: EventBus,
    ) -> Self {
        Self {
            transport: ApiTransport::from_config(&config),
            store: SessionStore::new(Arc::clone(&config.store)),
            config,
            service,
            events,
            session: RwLock::new(Session::default()),
            verify_in_flight: AtomicBool::new(false),
            refresh_in_flight: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            store_lock: Arc::new(AsyncMutex::new(())),
            pending_writes: Arc::new(PendingWrites::default()),
        }
    }

    /// Creates a manager and hydrates it from the persisted session.
    ///
    /// A session persisted for a different client id is discarded.
    ///
    /// # Errors
    ///
    /// [`AuthError::Storage`] when the store cannot be read.
    pub async fn restore(config: SessionConfig, events: EventBus) -> Result<Self> {
        let manager = Self::new(config, events);
        manager.hydrate().await?;
        Ok(manager)
    }

    async fn hydrate(&self) -> Result<()> {
        let persisted = self.store.load().await?;
        let client_id = self.config.client_id.as_str();

        match persisted.client_id.as_deref() {
            Some(stored) if stored != client_id => {
                info!("Persisted session belongs to another client, discarding it");
                self.store.clear_session(DateTime::<Utc>::UNIX_EPOCH).await?;
                self.store.save_client_id(client_id).await?;
                return Ok(());
            }
            Some(_) => {}
            None => self.store.save_client_id(client_id).await?,
        }

        let mut session = self.session.write();
        session.verified = persisted.token.is_some();
        session.token = persisted.token;
        session.cache_timestamp = persisted
            .user
            .as_ref()
            .map(|_| persisted.updated_at.unwrap_or(DateTime::<Utc>::UNIX_EPOCH));
        session.user = persisted.user;
        session.verifier = persisted.verifier;

        info!(
            has_token = session.token.is_some(),
            user_id = session.user.as_ref().map(|u| u.id.as_str()).unwrap_or(""),
            pending_login = session.verifier.is_some(),
            "Session restored"
        );

        Ok(())
    }

    /// Starts the authorization-code flow and navigates to the identity
    /// server's login page.
    ///
    /// A pending verifier that has not been consumed by `verify` is reused,
    /// so at most one verifier is ever persisted. Returns the authorization
    /// URL that was navigated to.
    ///
    /// # Errors
    ///
    /// [`AuthError::EntropyUnavailable`] when no verifier can be generated.
    #[instrument(skip(self))]
    pub async fn login(&self) -> Result<String> {
        let generation = self.current_generation();
        let (pkce, fresh) = {
            let mut session = self.session.write();
            match session
                .verifier
                .as_deref()
                .and_then(PkceChallenge::from_verifier)
            {
                Some(pending) => (pending, false),
                None => {
                    let generated = PkceChallenge::generate()?;
                    session.verifier = Some(generated.verifier().to_string());
                    (generated, true)
                }
            }
        };

        if fresh {
            match self.store_access(generation).await {
                Some(_store) => {
                    if let Err(e) = self.store.save_verifier(pkce.verifier()).await {
                        warn!(error = %e, "Failed to persist code verifier");
                    }
                }
                None => self.log_discarded("login"),
            }
        } else {
            debug!("Reusing pending code verifier");
        }

        let url = self.authorization_url(&pkce)?;
        self.emit(SessionEvent::LoginStarted);
        info!("Redirecting to identity server login");
        self.config.navigator.navigate_to(&url);

        Ok(url)
    }

    fn authorization_url(&self, pkce: &PkceChallenge) -> Result<String> {
        let mut url = Url::parse(&self.config.endpoint(LOGIN_PATH))
            .map_err(|e| AuthError::Config(format!("Invalid login endpoint: {}", e)))?;

        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_url", &self.config.callback_url)
            .append_pair("code_challenge", pkce.challenge())
            .append_pair("code_challenge_method", pkce.method());

        Ok(url.to_string())
    }

    /// Exchanges an authorization code for an access token.
    ///
    /// The pending verifier is discarded after the attempt whatever its
    /// result. A failed exchange leaves the current token untouched, and a
    /// logout while the exchange is pending drops the token it returns.
    ///
    /// # Errors
    ///
    /// - [`AuthError::InvalidGrant`] when the server rejects the code
    /// - [`AuthError::Transport`] when the request fails
    #[instrument(skip(self, code_verifier, code))]
    pub async fn verify(&self, code_verifier: &str, code: &str) -> Result<VerifyOutcome> {
        let Some(_in_flight) = InFlight::acquire(&self.verify_in_flight) else {
            debug!("Verify already in flight, skipping");
            return Ok(VerifyOutcome::AlreadyInFlight);
        };

        let generation = self.current_generation();
        let result = self.service.verify(code, code_verifier).await;

        match result {
            Ok(token) => {
                let Some(_store) = self.store_access(generation).await else {
                    self.log_discarded("verify");
                    return Ok(VerifyOutcome::Discarded);
                };

                let committed = self.commit(generation, |session| {
                    session.token = Some(token.clone());
                    session.verified = true;
                    session.verifier = None;
                });
                if !committed {
                    self.log_discarded("verify");
                    return Ok(VerifyOutcome::Discarded);
                }

                if let Err(e) = self.store.clear_verifier().await {
                    warn!(error = %e, "Failed to clear code verifier");
                }
                if let Err(e) = self.store.save_token(&token).await {
                    warn!(error = %e, "Failed to persist access token");
                }

                info!("Session verified");
                self.emit(SessionEvent::Verified);
                Ok(VerifyOutcome::Verified)
            }
            Err(err) => {
                if self.commit(generation, |session| session.verifier = None) {
                    if let Some(_store) = self.store_access(generation).await {
                        if let Err(e) = self.store.clear_verifier().await {
                            warn!(error = %e, "Failed to clear code verifier");
                        }
                    }
                }

                warn!(error = %err, "Code verification failed");
                self.emit(SessionEvent::VerifyFailed {
                    message: err.to_string(),
                });
                Err(err)
            }
        }
    }

    /// Runs [`verify`](Self::verify) with the verifier persisted by the
    /// last [`login`](Self::login).
    ///
    /// # Errors
    ///
    /// [`AuthError::NotAuthenticated`] when no login is pending.
    pub async fn complete_login(&self, code: &str) -> Result<VerifyOutcome> {
        let verifier = self.session.read().verifier.clone();
        match verifier {
            Some(verifier) => self.verify(&verifier, code).await,
            None => {
                warn!("No pending login to complete");
                Err(AuthError::NotAuthenticated)
            }
        }
    }

    /// Refreshes the cached profile.
    ///
    /// Without `force`, a profile cached less than `cache_ttl` ago is served
    /// as-is. A 401 is handled as an expired session and reported as
    /// [`RefreshOutcome::SessionExpired`].
    ///
    /// # Errors
    ///
    /// Any other failure of the profile request.
    #[instrument(skip(self))]
    pub async fn refresh_profile(&self, force: bool) -> Result<RefreshOutcome> {
        let now = self.config.clock.now();

        if !force {
            if let Some(user_id) = self.fresh_cached_user(now) {
                debug!(user_id = %user_id, "Serving cached profile");
                self.emit(SessionEvent::ProfileRefreshed {
                    user_id,
                    from_cache: true,
                });
                return Ok(RefreshOutcome::Cached);
            }
        }

        let Some(_in_flight) = InFlight::acquire(&self.refresh_in_flight) else {
            debug!("Profile refresh already in flight, skipping");
            return Ok(RefreshOutcome::AlreadyInFlight);
        };

        let generation = self.current_generation();
        let token = self.token();
        let fetch = self
            .service
            .fetch_profile(token.as_deref(), self.config.profile_endpoint)
            .await?;

        let (user, setup) = match fetch {
            ProfileFetch::Unauthorized => {
                self.expire_session();
                return Ok(RefreshOutcome::SessionExpired);
            }
            ProfileFetch::Profile { user, setup } => (user, setup),
        };

        let Some(_store) = self.store_access(generation).await else {
            self.log_discarded("refresh_profile");
            return Ok(RefreshOutcome::Discarded);
        };

        let cached_at = self.config.clock.now();
        let committed = self.commit(generation, |session| {
            session.user = Some(user.clone());
            session.cache_timestamp = Some(cached_at);
            if setup.is_some() {
                session.setup = setup;
            }
        });
        if !committed {
            self.log_discarded("refresh_profile");
            return Ok(RefreshOutcome::Discarded);
        }

        if let Err(e) = self.store.save_profile(&user, cached_at).await {
            warn!(error = %e, "Failed to persist user profile");
        }

        info!(user_id = %user.id, "Profile refreshed");
        self.emit(SessionEvent::ProfileRefreshed {
            user_id: user.id,
            from_cache: false,
        });

        Ok(RefreshOutcome::Refreshed)
    }

    /// Id of the cached user when the cache is younger than the TTL.
    fn fresh_cached_user(&self, now: DateTime<Utc>) -> Option<String> {
        let session = self.session.read();
        let user = session.user.as_ref()?;
        let age = (now - session.cache_timestamp?).to_std().ok()?;

        (age < self.config.cache_ttl).then(|| user.id.clone())
    }

    /// Clears the session and navigates to the login page.
    ///
    /// Memory is cleared immediately. Store writes run in the background;
    /// await [`flush`](Self::flush) to observe them.
    pub fn logout(&self) {
        {
            let mut session = self.session.write();
            self.generation.fetch_add(1, Ordering::AcqRel);
            *session = Session::default();
        }

        let store = self.store.clone();
        self.spawn_store_write("logout", async move {
            store
                .clear_session(DateTime::<Utc>::UNIX_EPOCH)
                .await
        });

        info!("Logged out");
        self.emit(SessionEvent::LoggedOut);
        self.config.navigator.navigate_to(&self.config.login_url);
    }

    /// Whether a user is present and holds every key. An empty list grants
    /// access to any signed-in user.
    pub fn has_required_resources<S: AsRef<str>>(&self, keys: &[S]) -> bool {
        self.session
            .read()
            .user
            .as_ref()
            .map(|user| user.has_all_resources(keys))
            .unwrap_or(false)
    }

    /// Sends a request with the session's bearer token attached.
    ///
    /// Paths starting with `/` are resolved against the base URL. A 401
    /// response triggers the expired-session redirect and is returned to
    /// the caller.
    ///
    /// # Errors
    ///
    /// [`AuthError::Transport`] when no response is received.
    #[instrument(skip(self, request), fields(method = request.method.as_str()))]
    pub async fn authenticated_fetch(&self, mut request: HttpRequest) -> Result<HttpResponse> {
        if request.url.starts_with('/') {
            request.url = self.transport.url(&request.url);
        }

        if let Some(token) = self.token() {
            request = request.bearer_token(token);
        }

        let response = self.transport.send(request).await?;
        if response.is_unauthorized() {
            self.expire_session();
        }

        Ok(response)
    }

    fn expire_session(&self) {
        warn!("Session expired");
        self.emit(SessionEvent::SessionExpired);

        let login_url = &self.config.login_url;
        if self.config.navigator.is_at(login_url) {
            debug!("Already on the login page, not redirecting");
        } else {
            self.config.navigator.navigate_to(login_url);
        }
    }

    pub fn state(&self) -> SessionState {
        if self.refresh_in_flight.load(Ordering::Acquire) {
            return SessionState::Refreshing;
        }

        let session = self.session.read();
        if session.token.is_some() {
            SessionState::Authenticated
        } else if session.verifier.is_some() || self.verify_in_flight.load(Ordering::Acquire) {
            SessionState::Authenticating
        } else {
            SessionState::Unauthenticated
        }
    }

    pub fn user(&self) -> Option<UserProfile> {
        self.session.read().user.clone()
    }

    pub fn token(&self) -> Option<String> {
        self.session.read().token.clone()
    }

    pub fn is_verified(&self) -> bool {
        self.session.read().verified
    }

    /// Client setup from the dashboard profile endpoint.
    pub fn client_setup(&self) -> Option<ClientSetup> {
        self.session.read().setup.clone()
    }

    pub fn cache_timestamp(&self) -> Option<DateTime<Utc>> {
        self.session.read().cache_timestamp
    }

    pub fn is_refreshing(&self) -> bool {
        self.refresh_in_flight.load(Ordering::Acquire)
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.events.subscribe()
    }

    /// Waits for background store writes issued by [`logout`](Self::logout).
    pub async fn flush(&self) {
        self.pending_writes.wait_idle().await;
    }

    fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Applies `update` unless a logout happened since `generation`.
    fn commit(&self, generation: u64, update: impl FnOnce(&mut Session)) -> bool {
        let mut session = self.session.write();
        if self.generation.load(Ordering::Acquire) != generation {
            return false;
        }
        update(&mut session);
        true
    }

    /// Exclusive store access on behalf of `generation`, after every
    /// background write has landed. `None` once a logout has happened since.
    async fn store_access(&self, generation: u64) -> Option<MutexGuard<'_, ()>> {
        self.pending_writes.wait_idle().await;
        let guard = self.store_lock.lock().await;
        (self.current_generation() == generation).then_some(guard)
    }

    fn log_discarded(&self, operation: &'static str) {
        info!(operation, "Session ended while the call was in flight, dropping its result");
    }

    fn spawn_store_write<F>(&self, operation: &'static str, write: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let lock = Arc::clone(&self.store_lock);
        let pending = self.pending_writes.start();
        let task = async move {
            let _pending = pending;
            let _store = lock.lock().await;
            if let Err(e) = write.await {
                warn!(operation, error = %e, "Session store write failed");
            }
        };

        match Handle::try_current() {
            Ok(handle) => {
                handle.spawn(task);
            }
            Err(_) => match Builder::new_current_thread().enable_all().build() {
                Ok(runtime) => runtime.block_on(task),
                Err(e) => warn!(operation, error = %e, "No runtime for session store write"),
            },
        }
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.emit(CoreEvent::Session(event));
    }
}
