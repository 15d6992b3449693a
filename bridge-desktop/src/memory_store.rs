//! Process-local key-value store

use async_trait::async_trait;
use bridge_traits::{error::Result, storage::KeyValueStore};
use parking_lot::Mutex;
use std::collections::HashMap;

/// Key-value store backed by a `HashMap`.
///
/// Contents live as long as the value does. Useful for CLIs that should not
/// leave a session behind, and for tests.
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with existing entries.
    pub fn with_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let map = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            entries: Mutex::new(map),
        }
    }

    /// Copy of the current contents.
    pub fn snapshot(&self) -> HashMap<String, String> {
        self.entries.lock().clone()
    }
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn set_string(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .lock()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get_string(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.lock().remove(key);
        Ok(())
    }

    async fn list_keys(&self) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self.entries.lock().keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }

    async fn clear_all(&self) -> Result<()> {
        self.entries.lock().clear();
        Ok(())
    }
}
