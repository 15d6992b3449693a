//! Identity server data model
//!
//! Wire types for the user profile returned by `/me/v1/` and the admin
//! [`Resource`] entity. Field names follow the server's snake_case JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeSet, HashMap};

pub use core_runtime::config::ProfileEndpoint;

/// Snapshot of the authenticated user.
///
/// Replaced wholesale on every successful refresh, never patched.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub profile_pic: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_client_id: Option<String>,
    #[serde(default, with = "timestamp")]
    pub expiry: Option<DateTime<Utc>>,
    /// Keyed by role id.
    #[serde(default, deserialize_with = "null_as_default")]
    pub roles: HashMap<String, RoleRef>,
    /// Keyed by resource key.
    #[serde(default, deserialize_with = "null_as_default")]
    pub resources: HashMap<String, ResourceGrant>,
    /// Keyed by policy id.
    #[serde(default, deserialize_with = "null_as_default")]
    pub policies: HashMap<String, PolicyRef>,
    #[serde(default, with = "timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_by: String,
    #[serde(default, with = "timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_by: String,
}

impl UserProfile {
    /// Whether the user holds a grant for `key`.
    pub fn has_resource(&self, key: &str) -> bool {
        self.resources.contains_key(key)
    }

    /// Whether the user holds a grant for every key. Vacuously true for an
    /// empty list.
    pub fn has_all_resources<S: AsRef<str>>(&self, keys: &[S]) -> bool {
        keys.iter().all(|key| self.has_resource(key.as_ref()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RoleRef {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// Role and policy ids attached to one resource key.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResourceGrant {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, with = "id_set")]
    pub role_ids: BTreeSet<String>,
    #[serde(default, with = "id_set")]
    pub policy_ids: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PolicyRef {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapping: Option<PolicyMapping>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PolicyMapping {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<HashMap<String, PolicyArgument>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PolicyArgument {
    #[serde(rename = "static", default, skip_serializing_if = "Option::is_none")]
    pub static_value: Option<String>,
}

/// Admin-managed resource, created and deleted through the service client.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Resource {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub project_id: String,
    #[serde(default, with = "timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_by: String,
    #[serde(default, with = "timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_by: String,
    #[serde(default, with = "timestamp")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Resource {
    /// A new enabled resource; the server assigns ids and audit fields.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            key: key.into(),
            enabled: true,
            ..Self::default()
        }
    }
}

/// Client bootstrap information returned by the dashboard profile endpoint.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ClientSetup {
    #[serde(default)]
    pub client_id: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Payload of `GET /auth/v1/verify`.
#[derive(Debug, Deserialize)]
pub(crate) struct VerifyData {
    #[serde(default)]
    pub access_token: Option<String>,
}

/// Payload of `GET /me/v1/dashboard`.
#[derive(Debug, Deserialize)]
pub(crate) struct DashboardData {
    #[serde(default)]
    pub setup: Option<ClientSetup>,
    pub user: Option<UserProfile>,
}

/// Derived view of where the session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    /// No token and no pending login.
    Unauthenticated,
    /// A login redirect was issued and the code exchange is pending.
    Authenticating,
    /// A token is held.
    Authenticated,
    /// A profile fetch is in flight.
    Refreshing,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Unauthenticated => "unauthenticated",
            SessionState::Authenticating => "authenticating",
            SessionState::Authenticated => "authenticated",
            SessionState::Refreshing => "refreshing",
        }
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// `{ "id": true, "other": false }` on the wire, the set of enabled ids in memory.
mod id_set {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::collections::{BTreeSet, HashMap};

    pub fn serialize<S>(ids: &BTreeSet<String>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_map(ids.iter().map(|id| (id, true)))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<BTreeSet<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let map = Option::<HashMap<String, bool>>::deserialize(deserializer)?;
        Ok(map
            .unwrap_or_default()
            .into_iter()
            .filter_map(|(id, enabled)| enabled.then_some(id))
            .collect())
    }
}

/// RFC 3339 timestamps; `null` and `""` both mean absent.
mod timestamp {
    use chrono::{DateTime, Utc};
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(at) => serializer.serialize_some(&at.to_rfc3339()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<String>::deserialize(deserializer)? {
            None => Ok(None),
            Some(raw) if raw.trim().is_empty() => Ok(None),
            Some(raw) => DateTime::parse_from_rfc3339(raw.trim())
                .map(|at| Some(at.with_timezone(&Utc)))
                .map_err(D::Error::custom),
        }
    }
}
