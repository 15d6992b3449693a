//! Durable session persistence
//!
//! Maps the in-memory session onto the host [`KeyValueStore`] so a reload
//! (or a process restart on native hosts) picks up where it left off.
//!
//! ## Keys
//!
//! | Key                   | Value                                        |
//! |-----------------------|----------------------------------------------|
//! | `client_id`           | client the stored session belongs to         |
//! | `access_token`        | opaque bearer token                          |
//! | `user`                | JSON [`UserProfile`] or `null`               |
//! | `localStoreUpdatedAt` | RFC 3339 time of the last profile cache write |
//! | `code_verifier`       | pending PKCE verifier between login and verify |
//!
//! Token and verifier values are never logged.

use crate::error::{AuthError, Result};
use crate::types::UserProfile;
use bridge_traits::storage::KeyValueStore;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, warn};

pub const CLIENT_ID_KEY: &str = "client_id";
pub const ACCESS_TOKEN_KEY: &str = "access_token";
pub const USER_KEY: &str = "user";
pub const UPDATED_AT_KEY: &str = "localStoreUpdatedAt";
pub const CODE_VERIFIER_KEY: &str = "code_verifier";

/// Everything [`SessionStore::load`] found in the store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PersistedSession {
    pub client_id: Option<String>,
    pub token: Option<String>,
    pub user: Option<UserProfile>,
    pub updated_at: Option<DateTime<Utc>>,
    pub verifier: Option<String>,
}

/// Typed access to the persisted session keys.
#[derive(Clone)]
pub struct SessionStore {
    store: Arc<dyn KeyValueStore>,
}

impl SessionStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Read the persisted session.
    ///
    /// A `user` value that no longer decodes is deleted and reported as
    /// absent. An unparseable timestamp is reported as absent.
    pub async fn load(&self) -> Result<PersistedSession> {
        let client_id = self.get(CLIENT_ID_KEY).await?;
        let token = self.get(ACCESS_TOKEN_KEY).await?;
        let verifier = self.get(CODE_VERIFIER_KEY).await?;

        let user = match self.get(USER_KEY).await? {
            None => None,
            Some(raw) => match serde_json::from_str::<Option<UserProfile>>(&raw) {
                Ok(user) => user,
                Err(e) => {
                    warn!(error = %e, "Cached user profile is corrupted, discarding it");
                    if let Err(delete_err) = self.store.delete(USER_KEY).await {
                        warn!(error = %delete_err, "Failed to delete corrupted user profile");
                    }
                    None
                }
            },
        };

        let updated_at = self.get(UPDATED_AT_KEY).await?.and_then(|raw| {
            DateTime::parse_from_rfc3339(&raw)
                .map(|at| at.with_timezone(&Utc))
                .map_err(|e| warn!(error = %e, "Ignoring unparseable cache timestamp"))
                .ok()
        });

        debug!(
            has_client_id = client_id.is_some(),
            has_token = token.is_some(),
            has_user = user.is_some(),
            has_verifier = verifier.is_some(),
            "Loaded persisted session"
        );

        Ok(PersistedSession {
            client_id,
            token,
            user,
            updated_at,
            verifier,
        })
    }

    pub async fn save_client_id(&self, client_id: &str) -> Result<()> {
        self.set(CLIENT_ID_KEY, client_id).await
    }

    pub async fn save_token(&self, token: &str) -> Result<()> {
        self.set(ACCESS_TOKEN_KEY, token).await
    }

    /// Write the profile snapshot together with its cache timestamp.
    pub async fn save_profile(&self, user: &UserProfile, at: DateTime<Utc>) -> Result<()> {
        let json = serde_json::to_string(user).map_err(|e| AuthError::Serialization {
            context: "user profile".to_string(),
            source: e,
        })?;

        self.set(USER_KEY, &json).await?;
        self.set(UPDATED_AT_KEY, &at.to_rfc3339()).await
    }

    pub async fn save_verifier(&self, verifier: &str) -> Result<()> {
        self.set(CODE_VERIFIER_KEY, verifier).await
    }

    pub async fn clear_verifier(&self) -> Result<()> {
        self.delete(CODE_VERIFIER_KEY).await
    }

    /// Remove the token, verifier and profile, and write `backdated` as the
    /// cache timestamp so the next refresh goes to the network.
    pub async fn clear_session(&self, backdated: DateTime<Utc>) -> Result<()> {
        self.delete(ACCESS_TOKEN_KEY).await?;
        self.delete(CODE_VERIFIER_KEY).await?;
        self.set(USER_KEY, "null").await?;
        self.set(UPDATED_AT_KEY, &backdated.to_rfc3339()).await
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let value = self.store.get_string(key).await.map_err(|e| {
            warn!(key, error = %e, "Failed to read from session store");
            AuthError::Storage(e.to_string())
        })?;

        Ok(value.filter(|v| !v.is_empty()))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.store.set_string(key, value).await.map_err(|e| {
            warn!(key, error = %e, "Failed to write to session store");
            AuthError::Storage(e.to_string())
        })
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.store.delete(key).await.map_err(|e| {
            warn!(key, error = %e, "Failed to delete from session store");
            AuthError::Storage(e.to_string())
        })
    }
}
