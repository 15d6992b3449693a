//! # Session Configuration
//!
//! Provides configuration management for the session client.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a
//! [`SessionConfig`] holding the identity server coordinates and every host
//! bridge the session manager needs. It enforces fail-fast validation so a
//! misconfigured client never reaches the network.
//!
//! ## Required Bridges
//!
//! - `HttpClient` - API calls (desktop default: reqwest)
//! - `KeyValueStore` - Durable session storage (desktop default: SQLite when a
//!   store path is set, otherwise an in-memory map)
//! - `Navigator` - Location and full-page navigation (desktop default: in-memory)
//!
//! `Clock` is optional and defaults to [`SystemClock`].
//!
//! When the `desktop-shims` feature is enabled, the desktop defaults are
//! injected automatically for any bridge not provided.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::SessionConfig;
//! use std::sync::Arc;
//!
//! let config = SessionConfig::builder()
//!     .base_url("https://api.example.com")
//!     .client_id("abc")
//!     .callback_url("https://app.example.com/callback")
//!     .login_url("/login")
//!     .navigator(Arc::new(MyWebviewNavigator::new()))
//!     .build()?;
//! ```
//!
//! ## Environment
//!
//! [`SessionConfigBuilder::from_env`] seeds a builder from `GOIAM_BASE_URL`,
//! `GOIAM_CLIENT_ID`, `GOIAM_CLIENT_SECRET`, `GOIAM_CALLBACK_URL`,
//! `GOIAM_LOGIN_URL` and `GOIAM_CACHE_TTL_SECS`.

use crate::error::{Error, Result};
use bridge_traits::{Clock, HttpClient, KeyValueStore, Navigator, SystemClock};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// How long a cached profile is served without a network refresh.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// Default upper bound for a single API call.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Login page used when none is configured.
pub const DEFAULT_LOGIN_URL: &str = "/login";

pub const ENV_BASE_URL: &str = "GOIAM_BASE_URL";
pub const ENV_CLIENT_ID: &str = "GOIAM_CLIENT_ID";
pub const ENV_CLIENT_SECRET: &str = "GOIAM_CLIENT_SECRET";
pub const ENV_CALLBACK_URL: &str = "GOIAM_CALLBACK_URL";
pub const ENV_LOGIN_URL: &str = "GOIAM_LOGIN_URL";
pub const ENV_CACHE_TTL_SECS: &str = "GOIAM_CACHE_TTL_SECS";

/// Which profile endpoint the session manager reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProfileEndpoint {
    /// `GET /me/v1/`; the envelope `data` is the user profile.
    #[default]
    Me,
    /// `GET /me/v1/dashboard`; `data` is `{ setup, user }`.
    Dashboard,
}

impl ProfileEndpoint {
    /// Path relative to the base URL.
    pub fn path(&self) -> &'static str {
        match self {
            ProfileEndpoint::Me => "/me/v1/",
            ProfileEndpoint::Dashboard => "/me/v1/dashboard",
        }
    }
}

/// Session client configuration.
///
/// Use [`SessionConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct SessionConfig {
    /// Identity server base URL, without a trailing slash
    pub base_url: String,

    /// OAuth client identifier
    pub client_id: String,

    /// Client secret; when set, the code exchange uses HTTP Basic auth
    pub client_secret: Option<String>,

    /// Where the identity server sends the user back with the code
    pub callback_url: String,

    /// The application's login page
    pub login_url: String,

    /// Staleness window for the cached profile
    pub cache_ttl: Duration,

    /// Per-call timeout; `None` leaves it to the HTTP client
    pub request_timeout: Option<Duration>,

    /// Profile endpoint variant
    pub profile_endpoint: ProfileEndpoint,

    pub http_client: Arc<dyn HttpClient>,

    pub store: Arc<dyn KeyValueStore>,

    pub navigator: Arc<dyn Navigator>,

    pub clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionConfig")
            .field("base_url", &self.base_url)
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("callback_url", &self.callback_url)
            .field("login_url", &self.login_url)
            .field("cache_ttl", &self.cache_ttl)
            .field("request_timeout", &self.request_timeout)
            .field("profile_endpoint", &self.profile_endpoint)
            .field("http_client", &"HttpClient { ... }")
            .field("store", &"KeyValueStore { ... }")
            .field("navigator", &"Navigator { ... }")
            .field("clock", &"Clock { ... }")
            .finish()
    }
}

impl SessionConfig {
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::default()
    }

    /// Join an API path onto the base URL.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Validates the configuration.
    ///
    /// This checks:
    /// - Client id and login URL are not empty
    /// - Base and callback URLs are absolute http(s) URLs
    /// - Cache TTL and request timeout are non-zero
    pub fn validate(&self) -> Result<()> {
        if self.client_id.trim().is_empty() {
            return Err(Error::Config("Client id cannot be empty".to_string()));
        }

        validate_http_url("Base URL", &self.base_url)?;
        validate_http_url("Callback URL", &self.callback_url)?;

        if self.login_url.trim().is_empty() {
            return Err(Error::Config("Login URL cannot be empty".to_string()));
        }

        if self.cache_ttl.is_zero() {
            return Err(Error::Config(
                "Cache TTL must be greater than zero".to_string(),
            ));
        }

        if matches!(self.request_timeout, Some(timeout) if timeout.is_zero()) {
            return Err(Error::Config(
                "Request timeout must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

fn validate_http_url(label: &str, value: &str) -> Result<()> {
    let url = Url::parse(value)
        .map_err(|e| Error::Config(format!("{} '{}' is not a valid URL: {}", label, value, e)))?;

    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(Error::Config(format!(
            "{} must use http or https, got '{}'",
            label, other
        ))),
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn http_client_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "HttpClient".to_string(),
        message: "HttpClient implementation is required for identity server calls. \
                 Desktop: enable the 'desktop-shims' feature to use the default ReqwestHttpClient. \
                 Other hosts: inject a fetch-backed client."
            .to_string(),
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn store_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "KeyValueStore".to_string(),
        message: "KeyValueStore implementation is required for session persistence. \
                 Desktop: enable the 'desktop-shims' feature to use SqliteKeyValueStore. \
                 Web: inject a localStorage-backed store."
            .to_string(),
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn navigator_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "Navigator".to_string(),
        message: "Navigator implementation is required for login and session-expiry redirects. \
                 Desktop: enable the 'desktop-shims' feature to use InMemoryNavigator. \
                 Web: inject a window.location-backed navigator."
            .to_string(),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    use bridge_desktop::ReqwestHttpClient;

    let client = ReqwestHttpClient::new()
        .map_err(|e| Error::Internal(format!("Failed to create default HttpClient: {}", e)))?;
    Ok(Arc::new(client))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    Err(http_client_missing_error())
}

#[cfg(feature = "desktop-shims")]
fn provide_default_store(store_path: Option<PathBuf>) -> Result<Arc<dyn KeyValueStore>> {
    use bridge_desktop::{MemoryKeyValueStore, SqliteKeyValueStore};
    use std::thread;
    use tokio::runtime::{Builder, Handle};

    let Some(path) = store_path else {
        return Ok(Arc::new(MemoryKeyValueStore::new()));
    };

    let init_store = |path: PathBuf| -> Result<SqliteKeyValueStore> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| {
                Error::Internal(format!(
                    "Failed to create Tokio runtime for default KeyValueStore: {}",
                    e
                ))
            })?;

        runtime
            .block_on(SqliteKeyValueStore::new(path))
            .map_err(|e| {
                Error::Internal(format!("Failed to initialize default KeyValueStore: {}", e))
            })
    };

    // block_on panics inside a runtime, so hop to a plain thread there
    let store = match Handle::try_current() {
        Ok(_) => thread::spawn(move || init_store(path))
            .join()
            .map_err(|_| {
                Error::Internal(
                    "Worker thread panicked while creating default KeyValueStore".to_string(),
                )
            })??,
        Err(_) => init_store(path)?,
    };

    Ok(Arc::new(store))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_store(_store_path: Option<PathBuf>) -> Result<Arc<dyn KeyValueStore>> {
    Err(store_missing_error())
}

#[cfg(feature = "desktop-shims")]
fn provide_default_navigator() -> Result<Arc<dyn Navigator>> {
    use bridge_desktop::InMemoryNavigator;

    Ok(Arc::new(InMemoryNavigator::default()))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_navigator() -> Result<Arc<dyn Navigator>> {
    Err(navigator_missing_error())
}

/// Builder for [`SessionConfig`].
///
/// Set fields incrementally, then call [`build()`](SessionConfigBuilder::build).
#[derive(Default)]
pub struct SessionConfigBuilder {
    base_url: Option<String>,
    client_id: Option<String>,
    client_secret: Option<String>,
    callback_url: Option<String>,
    login_url: Option<String>,
    cache_ttl: Option<Duration>,
    request_timeout: Option<Option<Duration>>,
    profile_endpoint: ProfileEndpoint,
    http_client: Option<Arc<dyn HttpClient>>,
    store: Option<Arc<dyn KeyValueStore>>,
    store_path: Option<PathBuf>,
    navigator: Option<Arc<dyn Navigator>>,
    clock: Option<Arc<dyn Clock>>,
}

impl SessionConfigBuilder {
    /// Seed a builder from the `GOIAM_*` environment variables.
    ///
    /// Unset variables leave the corresponding field unset.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Seed a builder from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut builder = Self::default();

        if let Some(value) = read(ENV_BASE_URL) {
            builder = builder.base_url(value);
        }
        if let Some(value) = read(ENV_CLIENT_ID) {
            builder = builder.client_id(value);
        }
        if let Some(value) = read(ENV_CLIENT_SECRET) {
            builder = builder.client_secret(value);
        }
        if let Some(value) = read(ENV_CALLBACK_URL) {
            builder = builder.callback_url(value);
        }
        if let Some(value) = read(ENV_LOGIN_URL) {
            builder = builder.login_url(value);
        }
        if let Some(value) = read(ENV_CACHE_TTL_SECS) {
            let secs: u64 = value.trim().parse().map_err(|_| {
                Error::Config(format!(
                    "{} must be a whole number of seconds, got '{}'",
                    ENV_CACHE_TTL_SECS, value
                ))
            })?;
            builder = builder.cache_ttl(Duration::from_secs(secs));
        }

        Ok(builder)
    }

    /// Identity server base URL. Trailing slashes are dropped.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into().trim_end_matches('/').to_string());
        self
    }

    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Client secret for HTTP Basic auth on the code exchange.
    pub fn client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    pub fn callback_url(mut self, url: impl Into<String>) -> Self {
        self.callback_url = Some(url.into());
        self
    }

    /// Login page. Default: `/login`
    pub fn login_url(mut self, url: impl Into<String>) -> Self {
        self.login_url = Some(url.into());
        self
    }

    /// Profile cache staleness window. Default: 5 minutes
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    /// Per-call timeout. Default: 30 seconds
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(Some(timeout));
        self
    }

    /// Leave call timeouts to the HTTP client.
    pub fn no_request_timeout(mut self) -> Self {
        self.request_timeout = Some(None);
        self
    }

    pub fn profile_endpoint(mut self, endpoint: ProfileEndpoint) -> Self {
        self.profile_endpoint = endpoint;
        self
    }

    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Database file for the default SQLite store.
    ///
    /// Ignored when a store is injected with [`store`](Self::store).
    pub fn store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.store_path = Some(path.into());
        self
    }

    pub fn navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = Some(navigator);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Builds and validates the final [`SessionConfig`].
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] when a required field is missing or invalid
    /// - [`Error::CapabilityMissing`] when a required bridge is absent and
    ///   no desktop default is available
    pub fn build(self) -> Result<SessionConfig> {
        let base_url = self.base_url.ok_or_else(|| {
            Error::Config("Base URL is required. Use .base_url() to set it.".to_string())
        })?;

        let client_id = self.client_id.ok_or_else(|| {
            Error::Config("Client id is required. Use .client_id() to set it.".to_string())
        })?;

        let callback_url = self.callback_url.ok_or_else(|| {
            Error::Config("Callback URL is required. Use .callback_url() to set it.".to_string())
        })?;

        let http_client = match self.http_client {
            Some(client) => client,
            None => provide_default_http_client()?,
        };

        let store = match self.store {
            Some(store) => store,
            None => provide_default_store(self.store_path)?,
        };

        let navigator = match self.navigator {
            Some(navigator) => navigator,
            None => provide_default_navigator()?,
        };

        let config = SessionConfig {
            base_url,
            client_id,
            client_secret: self.client_secret,
            callback_url,
            login_url: self
                .login_url
                .unwrap_or_else(|| DEFAULT_LOGIN_URL.to_string()),
            cache_ttl: self.cache_ttl.unwrap_or(DEFAULT_CACHE_TTL),
            request_timeout: self
                .request_timeout
                .unwrap_or(Some(DEFAULT_REQUEST_TIMEOUT)),
            profile_endpoint: self.profile_endpoint,
            http_client,
            store,
            navigator,
            clock: self
                .clock
                .unwrap_or_else(|| Arc::new(SystemClock) as Arc<dyn Clock>),
        };

        config.validate()?;

        Ok(config)
    }
}
