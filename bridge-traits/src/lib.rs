//! # Host Bridge Traits
//!
//! Platform abstraction traits that must be implemented by each host platform.
//!
//! ## Overview
//!
//! This crate defines the contract between the session core and the host that
//! embeds it. Each trait represents a capability that the core requires but
//! that is provided differently per host (desktop shell, embedded webview,
//! headless service, tests).
//!
//! ## Traits
//!
//! ### Networking
//! - [`HttpClient`](http::HttpClient) - Async HTTP operations with retry and TLS
//!
//! ### Storage
//! - [`KeyValueStore`](storage::KeyValueStore) - Durable string key/value storage
//!   that survives reloads (client id, token, cached profile, cache timestamp)
//!
//! ### Host Integration
//! - [`Navigator`](navigation::Navigator) - Current location and full-page
//!   navigation (login redirects, session-expired redirects)
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Error Handling
//!
//! All bridge traits use the [`BridgeError`](error::BridgeError) type for consistent
//! error handling. Host implementations should:
//!
//! - Convert platform-specific errors to `BridgeError`
//! - Provide actionable error messages
//! - Include error context (e.g., URL, storage key)
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` bounds to support safe concurrent usage
//! across async tasks. Implementations must ensure thread safety.
//!
//! ## Examples
//!
//! ### Implementing Navigator
//!
//! ```ignore
//! use bridge_traits::navigation::Navigator;
//!
//! struct WebviewNavigator {
//!     webview: MyWebview,
//! }
//!
//! impl Navigator for WebviewNavigator {
//!     fn current_location(&self) -> String {
//!         self.webview.url()
//!     }
//!
//!     fn navigate_to(&self, url: &str) {
//!         self.webview.load(url);
//!     }
//! }
//! ```

pub mod error;
pub mod http;
pub mod navigation;
pub mod storage;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
pub use navigation::Navigator;
pub use storage::KeyValueStore;
pub use time::{Clock, LogEntry, LogLevel, LoggerSink, SystemClock};
