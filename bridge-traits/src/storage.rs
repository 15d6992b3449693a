//! Durable Storage Abstraction
//!
//! Provides a platform-agnostic key/value store for state that must survive
//! reloads and restarts.

use async_trait::async_trait;

use crate::error::Result;

/// Durable string key/value storage trait
///
/// Abstracts host-specific persistent storage:
/// - Browser/webview hosts: localStorage
/// - Desktop: SQLite-backed store or config files
/// - Mobile: UserDefaults / SharedPreferences
/// - Tests: in-memory maps
///
/// Values are opaque strings; callers are responsible for encoding structured
/// values (e.g. JSON) before storing them.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::KeyValueStore;
///
/// async fn remember_client(store: &dyn KeyValueStore) -> Result<()> {
///     store.set_string("client_id", "abc").await?;
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Store a string value, replacing any previous value
    async fn set_string(&self, key: &str, value: &str) -> Result<()>;

    /// Retrieve a string value
    ///
    /// Returns `Ok(None)` if the key doesn't exist.
    async fn get_string(&self, key: &str) -> Result<Option<String>>;

    /// Delete a value. Deleting a missing key succeeds.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Check if a key exists without retrieving it
    async fn has_key(&self, key: &str) -> Result<bool> {
        Ok(self.get_string(key).await?.is_some())
    }

    /// List all stored keys
    async fn list_keys(&self) -> Result<Vec<String>>;

    /// Clear all values
    async fn clear_all(&self) -> Result<()>;
}
