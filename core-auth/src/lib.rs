//! # Session Authentication Module
//!
//! Client half of the identity server's OAuth 2.0 authorization-code flow
//! with PKCE, plus a cached user profile for resource-based access checks.
//!
//! ## Overview
//!
//! - [`pkce`]: verifier/challenge generation
//! - [`transport`]: request execution and `{success, message, data}` decoding
//! - [`service`]: one-shot identity server calls (verify, profile, resources)
//! - [`session_store`]: durable persistence of the session keys
//! - [`manager`]: the [`SessionManager`] owning token, profile and cache policy
//! - [`guard`]: render decisions for protected views
//!
//! All host capabilities (HTTP, storage, navigation, time) arrive through
//! [`core_runtime::SessionConfig`].

pub mod error;
pub mod guard;
pub mod manager;
pub mod pkce;
pub mod service;
pub mod session_store;
pub mod transport;
pub mod types;

pub use error::{AuthError, Result};
pub use guard::{AuthorizationGuard, GuardOutcome};
pub use manager::{RefreshOutcome, SessionManager, VerifyOutcome};
pub use pkce::PkceChallenge;
pub use service::{IamService, IdentityService, ProfileFetch};
pub use session_store::{PersistedSession, SessionStore};
pub use transport::{ApiTransport, Envelope};
pub use types::{
    ClientSetup, PolicyArgument, PolicyMapping, PolicyRef, ProfileEndpoint, Resource,
    ResourceGrant, RoleRef, SessionState, UserProfile,
};
