use bridge_traits::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    /// The request never produced an HTTP response.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Non-2xx status without a decodable envelope.
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// The envelope reported `success: false`.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid grant: {0}")]
    InvalidGrant(String),

    #[error("Secure random source unavailable: {0}")]
    EntropyUnavailable(String),

    /// The envelope reported success but `data` was missing or malformed.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Serialization failed ({context}): {source}")]
    Serialization {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not authenticated")]
    NotAuthenticated,
}

impl AuthError {
    /// HTTP status attached to the failure, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            AuthError::Http { status, .. } | AuthError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<BridgeError> for AuthError {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::Timeout(target) => {
                AuthError::Transport(format!("request timed out: {}", target))
            }
            other => AuthError::Transport(other.to_string()),
        }
    }
}

impl From<core_runtime::Error> for AuthError {
    fn from(err: core_runtime::Error) -> Self {
        AuthError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;
