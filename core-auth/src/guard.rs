//! Authorization guard
//!
//! Maps session state onto what a protected view should render. The guard
//! holds no session state of its own; the only thing it remembers is whether
//! it has already started a login redirect.

use crate::error::Result;
use crate::manager::SessionManager;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// What a protected view should render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GuardOutcome {
    /// A profile refresh is in flight.
    Loading,
    /// No user is signed in.
    Unauthenticated,
    /// A user is signed in but lacks a required resource.
    Unauthorized,
    Authorized,
}

/// Resource requirements for a protected view.
#[derive(Debug, Default)]
pub struct AuthorizationGuard {
    required: Vec<String>,
    redirect_to_login: bool,
    login_started: AtomicBool,
}

impl AuthorizationGuard {
    pub fn new<I, S>(required: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            required: required.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Start a login when [`enforce`](Self::enforce) finds no user.
    pub fn redirect_to_login(mut self, enabled: bool) -> Self {
        self.redirect_to_login = enabled;
        self
    }

    pub fn required_resources(&self) -> &[String] {
        &self.required
    }

    pub fn evaluate(&self, manager: &SessionManager) -> GuardOutcome {
        if manager.is_refreshing() {
            GuardOutcome::Loading
        } else if manager.user().is_none() {
            GuardOutcome::Unauthenticated
        } else if manager.has_required_resources(&self.required) {
            GuardOutcome::Authorized
        } else {
            GuardOutcome::Unauthorized
        }
    }

    /// [`evaluate`](Self::evaluate), then start a login once if the outcome
    /// is [`GuardOutcome::Unauthenticated`] and redirects are enabled.
    ///
    /// # Errors
    ///
    /// Errors from [`SessionManager::login`]. A failed login may be retried by
    /// the next call.
    pub async fn enforce(&self, manager: &SessionManager) -> Result<GuardOutcome> {
        let outcome = self.evaluate(manager);

        if outcome == GuardOutcome::Unauthenticated
            && self.redirect_to_login
            && !self.login_started.swap(true, Ordering::AcqRel)
        {
            debug!("Guard starting login");
            if let Err(err) = manager.login().await {
                self.login_started.store(false, Ordering::Release);
                return Err(err);
            }
        }

        Ok(outcome)
    }
}
