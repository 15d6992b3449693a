//! API transport and envelope decoding
//!
//! Every identity server endpoint answers with the same wrapper:
//!
//! ```json
//! { "success": true, "message": "optional text", "data": { ... } }
//! ```
//!
//! [`ApiTransport`] sends requests through the host [`HttpClient`] with an
//! optional per-call timeout and [`ApiTransport::decode`] turns a response into
//! either the `data` payload or a typed [`AuthError`].
//!
//! Identity server calls are sent exactly once. Authorization codes are
//! single-use and resource creation is not idempotent, so the host client is
//! asked not to retry.

use crate::error::{AuthError, Result};
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
use core_runtime::config::SessionConfig;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};
use url::Url;

/// The `{success, message, data}` response wrapper.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    #[serde(default)]
    pub success: bool,
    pub message: Option<String>,
    pub data: Option<T>,
}

/// Sends requests to the identity server.
#[derive(Clone)]
pub struct ApiTransport {
    http_client: Arc<dyn HttpClient>,
    base_url: String,
    request_timeout: Option<Duration>,
}

impl ApiTransport {
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        base_url: impl Into<String>,
        request_timeout: Option<Duration>,
    ) -> Self {
        Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            request_timeout,
        }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(
            Arc::clone(&config.http_client),
            config.base_url.clone(),
            config.request_timeout,
        )
    }

    /// Absolute URL for an API path.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Absolute URL for an API collection path plus one percent-encoded
    /// path segment.
    pub fn segment_url(&self, path: &str, segment: &str) -> Result<String> {
        let mut url = Url::parse(&self.url(path))
            .map_err(|e| AuthError::Config(format!("Invalid API url: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| AuthError::Config(format!("API url cannot take a path: {}", path)))?
            .pop_if_empty()
            .push(segment);
        Ok(url.into())
    }

    /// Start a request against an API path.
    pub fn request(&self, method: HttpMethod, path: &str) -> HttpRequest {
        HttpRequest::new(method, self.url(path))
    }

    /// Execute a request.
    ///
    /// Any HTTP status is returned as a response. Connection failures and
    /// timeouts become [`AuthError::Transport`].
    pub async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let method = request.method.as_str();
        let call = self
            .http_client
            .execute_with_retry(request, RetryPolicy::no_retry());

        let response = match self.request_timeout {
            Some(limit) => timeout(limit, call).await.map_err(|_| {
                warn!(method, timeout_ms = limit.as_millis() as u64, "Request timed out");
                AuthError::Transport(format!("request timed out after {:?}", limit))
            })??,
            None => call.await?,
        };

        debug!(method, status = response.status, "Received response");
        Ok(response)
    }

    /// Decode an envelope response into its `data` payload.
    ///
    /// - non-2xx with a `success: false` envelope: [`AuthError::Api`]
    /// - non-2xx otherwise: [`AuthError::Http`]
    /// - 2xx with `success: false`: [`AuthError::Api`]
    /// - 2xx that is not an envelope: [`AuthError::InvalidResponse`]
    ///
    /// `fallback` is used as the message when the server supplies none.
    pub fn decode<T: DeserializeOwned>(response: &HttpResponse, fallback: &str) -> Result<Option<T>> {
        let status = response.status;

        if !response.is_success() {
            let message = match serde_json::from_slice::<Envelope<serde_json::Value>>(&response.body)
            {
                Ok(envelope) if !envelope.success => {
                    return Err(AuthError::Api {
                        status,
                        message: envelope.message.unwrap_or_else(|| fallback.to_string()),
                    });
                }
                _ => String::from_utf8_lossy(&response.body).trim().to_string(),
            };

            return Err(AuthError::Http {
                status,
                message: if message.is_empty() {
                    fallback.to_string()
                } else {
                    message
                },
            });
        }

        let envelope: Envelope<T> = serde_json::from_slice(&response.body)
            .map_err(|e| AuthError::InvalidResponse(format!("{}: {}", fallback, e)))?;

        if !envelope.success {
            return Err(AuthError::Api {
                status,
                message: envelope.message.unwrap_or_else(|| fallback.to_string()),
            });
        }

        Ok(envelope.data)
    }
}
