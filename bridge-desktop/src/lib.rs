//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for native hosts
//! (macOS, Windows, Linux, headless services).
//!
//! ## Overview
//!
//! This crate provides production-ready implementations of the bridge traits
//! using desktop-appropriate libraries:
//! - `HttpClient` using `reqwest`
//! - `KeyValueStore` using an SQLite-backed table (`sqlx`), or a process-local map
//! - `Navigator` as an in-memory location tracker for hosts without a browser
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{ReqwestHttpClient, SqliteKeyValueStore, InMemoryNavigator};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let http_client = ReqwestHttpClient::new()?;
//!     let store = SqliteKeyValueStore::new("~/.goiam/session.db".into()).await?;
//!     let navigator = InMemoryNavigator::new("/");
//!
//!     // Use in session configuration
//!     Ok(())
//! }
//! ```

mod http;
mod kv_store;
mod memory_store;
mod navigator;

pub use http::ReqwestHttpClient;
pub use kv_store::SqliteKeyValueStore;
pub use memory_store::MemoryKeyValueStore;
pub use navigator::InMemoryNavigator;
