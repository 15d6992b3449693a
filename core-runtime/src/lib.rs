//! # Core Runtime Module
//!
//! Foundational runtime infrastructure shared by the session client:
//! - Logging and tracing infrastructure
//! - Session configuration and bridge injection
//! - Event bus system
//!
//! ## Overview
//!
//! This crate holds the utilities every other core crate depends on. It
//! establishes the logging conventions, the fail-fast configuration builder,
//! and the event broadcasting used to publish session lifecycle changes.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use config::{ProfileEndpoint, SessionConfig, SessionConfigBuilder};
pub use error::{Error, Result};
pub use events::{CoreEvent, EventBus, SessionEvent};
