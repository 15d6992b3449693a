//! GoIAM client facade.
//!
//! Re-exports the workspace crates so host applications can depend on a
//! single package. The default `desktop-shims` feature pulls in the native
//! bridge implementations (`reqwest`, SQLite store, in-memory navigator) and
//! lets [`SessionConfig::builder`] fill in any bridge the host did not inject.
//!
//! ```ignore
//! use goiam_client::{EventBus, SessionConfig, SessionManager};
//!
//! let config = SessionConfig::builder()
//!     .base_url("https://api.example.com")
//!     .client_id("abc")
//!     .callback_url("https://app.example.com/callback")
//!     .store_path("session.db")
//!     .build()?;
//! let manager = SessionManager::restore(config, EventBus::default()).await?;
//! ```

pub use bridge_traits;
pub use core_auth;
pub use core_runtime;

#[cfg(feature = "desktop-shims")]
pub use bridge_desktop;

pub use core_auth::{
    AuthError, AuthorizationGuard, GuardOutcome, RefreshOutcome, SessionManager, SessionState,
    UserProfile, VerifyOutcome,
};
pub use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};
pub use core_runtime::{CoreEvent, EventBus, ProfileEndpoint, SessionConfig, SessionEvent};
