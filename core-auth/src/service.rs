//! Identity Server Client
//!
//! One-shot calls against the identity server: code exchange, profile fetch
//! and resource administration. Each call is a single request with no
//! caching and no retries of its own; session state lives in
//! [`SessionManager`](crate::SessionManager).

use crate::error::{AuthError, Result};
use crate::transport::ApiTransport;
use crate::types::{ClientSetup, DashboardData, ProfileEndpoint, Resource, UserProfile, VerifyData};
use async_trait::async_trait;
use bridge_traits::http::{HttpMethod, HttpRequest};
use core_runtime::config::SessionConfig;
use tracing::{debug, info, instrument, warn};

const VERIFY_PATH: &str = "/auth/v1/verify";
const RESOURCE_PATH: &str = "/resource/v1/";

/// Result of a profile fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum ProfileFetch {
    /// The server answered 401; the token is missing, expired or revoked.
    Unauthorized,
    Profile {
        user: UserProfile,
        /// Present for [`ProfileEndpoint::Dashboard`] only.
        setup: Option<ClientSetup>,
    },
}

/// Identity server operations.
#[async_trait]
pub trait IdentityService: Send + Sync {
    /// Exchange an authorization code and its PKCE verifier for an access token.
    ///
    /// # Errors
    ///
    /// - [`AuthError::InvalidGrant`] when the server rejects the exchange
    /// - [`AuthError::InvalidResponse`] when no token is returned
    /// - [`AuthError::Transport`] when the request never completes
    async fn verify(&self, code: &str, code_verifier: &str) -> Result<String>;

    /// Fetch the current user from `/me/v1/`.
    async fn me(&self, token: &str) -> Result<UserProfile>;

    /// Fetch the profile from the configured endpoint, reporting 401 as
    /// [`ProfileFetch::Unauthorized`] instead of an error.
    async fn fetch_profile(
        &self,
        token: Option<&str>,
        endpoint: ProfileEndpoint,
    ) -> Result<ProfileFetch>;

    /// Create a resource, returning the stored entity when the server sends it back.
    async fn create_resource(&self, resource: &Resource, token: &str) -> Result<Option<Resource>>;

    async fn delete_resource(&self, id: &str, token: &str) -> Result<()>;
}

/// [`IdentityService`] over the host HTTP client.
#[derive(Clone)]
pub struct IamService {
    transport: ApiTransport,
    client_id: String,
    client_secret: Option<String>,
}

impl IamService {
    pub fn new(
        transport: ApiTransport,
        client_id: impl Into<String>,
        client_secret: Option<String>,
    ) -> Self {
        Self {
            transport,
            client_id: client_id.into(),
            client_secret,
        }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(
            ApiTransport::from_config(config),
            config.client_id.clone(),
            config.client_secret.clone(),
        )
    }
}

#[async_trait]
impl IdentityService for IamService {
    #[instrument(skip(self, code, code_verifier))]
    async fn verify(&self, code: &str, code_verifier: &str) -> Result<String> {
        let mut request = self
            .transport
            .request(HttpMethod::Get, VERIFY_PATH)
            .query("code", code)
            .query("code_challenge", code_verifier)
            .query("client_id", &self.client_id);

        if let Some(secret) = &self.client_secret {
            request = request.basic_auth(&self.client_id, secret);
        }

        let response = self.transport.send(request).await?;

        let data = ApiTransport::decode::<VerifyData>(&response, "Authentication failed")
            .map_err(|err| match err {
                AuthError::Api { message, .. } => AuthError::InvalidGrant(message),
                other => other,
            })?;

        match data.and_then(|d| d.access_token).filter(|t| !t.is_empty()) {
            Some(token) => {
                info!("Authorization code exchanged");
                Ok(token)
            }
            None => {
                warn!("Verify response carried no access token");
                Err(AuthError::InvalidResponse(
                    "No access token received".to_string(),
                ))
            }
        }
    }

    #[instrument(skip(self, token))]
    async fn me(&self, token: &str) -> Result<UserProfile> {
        let request = self
            .transport
            .request(HttpMethod::Get, ProfileEndpoint::Me.path())
            .bearer_token(token);
        let response = self.transport.send(request).await?;

        ApiTransport::decode::<UserProfile>(&response, "User fetch failed")?
            .ok_or_else(|| AuthError::InvalidResponse("No user data received".to_string()))
    }

    #[instrument(skip(self, token), fields(has_token = token.is_some()))]
    async fn fetch_profile(
        &self,
        token: Option<&str>,
        endpoint: ProfileEndpoint,
    ) -> Result<ProfileFetch> {
        let mut request = self.transport.request(HttpMethod::Get, endpoint.path());
        if let Some(token) = token {
            request = request.bearer_token(token);
        }

        let response = self.transport.send(request).await?;

        if response.is_unauthorized() {
            debug!("Profile fetch rejected with 401");
            return Ok(ProfileFetch::Unauthorized);
        }

        let (user, setup) = match endpoint {
            ProfileEndpoint::Me => (
                ApiTransport::decode::<UserProfile>(&response, "User fetch failed")?,
                None,
            ),
            ProfileEndpoint::Dashboard => {
                match ApiTransport::decode::<DashboardData>(&response, "Dashboard fetch failed")? {
                    Some(data) => (data.user, data.setup),
                    None => (None, None),
                }
            }
        };

        let user =
            user.ok_or_else(|| AuthError::InvalidResponse("No user data received".to_string()))?;

        Ok(ProfileFetch::Profile { user, setup })
    }

    #[instrument(skip(self, resource, token), fields(key = %resource.key))]
    async fn create_resource(&self, resource: &Resource, token: &str) -> Result<Option<Resource>> {
        let body = serde_json::to_vec(resource).map_err(|e| AuthError::Serialization {
            context: "resource".to_string(),
            source: e,
        })?;
        let request = self
            .transport
            .request(HttpMethod::Post, RESOURCE_PATH)
            .bearer_token(token)
            .header("Content-Type", "application/json")
            .body(body.into());

        let response = self.transport.send(request).await?;
        let created = ApiTransport::decode::<Resource>(&response, "Resource creation failed")?;

        info!(returned = created.is_some(), "Resource created");
        Ok(created)
    }

    #[instrument(skip(self, token))]
    async fn delete_resource(&self, id: &str, token: &str) -> Result<()> {
        let url = self.transport.segment_url(RESOURCE_PATH, id)?;
        let request = HttpRequest::new(HttpMethod::Delete, url).bearer_token(token);

        let response = self.transport.send(request).await?;
        ApiTransport::decode::<serde_json::Value>(&response, "Resource deletion failed")?;

        info!("Resource deleted");
        Ok(())
    }
}
