//! Shared fakes for the session integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bridge_desktop::{InMemoryNavigator, MemoryKeyValueStore};
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse};
use bridge_traits::time::Clock;
use chrono::{DateTime, TimeZone, Utc};
use core_auth::SessionManager;
use core_runtime::config::{ProfileEndpoint, SessionConfig, SessionConfigBuilder};
use core_runtime::events::EventBus;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

pub const BASE_URL: &str = "https://api.example.com";
pub const CLIENT_ID: &str = "abc";
pub const CALLBACK_URL: &str = "https://app.example.com/callback";

pub const PROFILE_BODY: &str = r#"{
    "success": true,
    "data": {
        "id": "user-1",
        "project_id": "proj-1",
        "name": "Test User",
        "email": "test@example.com",
        "enabled": true,
        "roles": { "role-1": { "id": "role-1", "name": "Editor" } },
        "resources": {
            "docs": { "key": "docs", "name": "Docs", "role_ids": { "role-1": true }, "policy_ids": {} },
            "reports": { "key": "reports", "name": "Reports", "role_ids": { "role-1": true }, "policy_ids": {} }
        },
        "policies": {}
    }
}"#;

pub const DASHBOARD_BODY: &str = r#"{
    "success": true,
    "data": {
        "setup": { "client_id": "abc", "project_name": "Demo" },
        "user": { "id": "user-1", "resources": { "docs": { "key": "docs" } } }
    }
}"#;

type Responder = dyn Fn(&HttpRequest) -> HttpResponse + Send + Sync;

/// HTTP client answering from a closure, recording every request.
///
/// When gated, each request waits for [`ScriptedHttpClient::release`]
/// before answering.
pub struct ScriptedHttpClient {
    responder: Box<Responder>,
    requests: Mutex<Vec<HttpRequest>>,
    gate: Option<Notify>,
}

impl ScriptedHttpClient {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&HttpRequest) -> HttpResponse + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            requests: Mutex::new(Vec::new()),
            gate: None,
        }
    }

    /// The usual identity server: verify yields `tok-1`, profile endpoints
    /// return [`PROFILE_BODY`] / [`DASHBOARD_BODY`].
    pub fn identity_server() -> Self {
        Self::new(|request| {
            let path = request.url.trim_start_matches(BASE_URL);
            if path.starts_with("/auth/v1/verify") {
                HttpResponse::new(200, r#"{"success":true,"data":{"access_token":"tok-1"}}"#)
            } else if path.starts_with("/me/v1/dashboard") {
                HttpResponse::new(200, DASHBOARD_BODY)
            } else if path.starts_with("/me/v1/") {
                HttpResponse::new(200, PROFILE_BODY)
            } else {
                HttpResponse::new(200, r#"{"success":true}"#)
            }
        })
    }

    pub fn gated(mut self) -> Self {
        self.gate = Some(Notify::new());
        self
    }

    /// Let one gated request answer.
    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.notify_one();
        }
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }

    /// Number of requests whose URL contains `fragment`.
    pub fn calls_to(&self, fragment: &str) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.url.contains(fragment))
            .count()
    }

    /// Yield until `count` requests containing `fragment` have been sent.
    pub async fn wait_for_calls(&self, fragment: &str, count: usize) {
        while self.calls_to(fragment) < count {
            tokio::task::yield_now().await;
        }
    }
}

#[async_trait]
impl HttpClient for ScriptedHttpClient {
    async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse> {
        self.requests.lock().push(request.clone());
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        Ok((self.responder)(&request))
    }
}

/// Clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap()),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += chrono::Duration::from_std(by).unwrap();
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// A manager wired to fakes, with handles to each of them.
pub struct TestSession {
    pub manager: Arc<SessionManager>,
    pub http: Arc<ScriptedHttpClient>,
    pub store: Arc<MemoryKeyValueStore>,
    pub navigator: Arc<InMemoryNavigator>,
    pub clock: Arc<ManualClock>,
    pub events: EventBus,
}

pub struct TestSessionBuilder {
    http: ScriptedHttpClient,
    store: Arc<MemoryKeyValueStore>,
    location: String,
    endpoint: ProfileEndpoint,
    secret: Option<String>,
    request_timeout: Option<Duration>,
}

impl TestSessionBuilder {
    pub fn new(http: ScriptedHttpClient) -> Self {
        Self {
            http,
            store: Arc::new(MemoryKeyValueStore::new()),
            location: "/".to_string(),
            endpoint: ProfileEndpoint::Me,
            secret: None,
            request_timeout: None,
        }
    }

    pub fn store(mut self, store: Arc<MemoryKeyValueStore>) -> Self {
        self.store = store;
        self
    }

    pub fn location(mut self, location: &str) -> Self {
        self.location = location.to_string();
        self
    }

    pub fn endpoint(mut self, endpoint: ProfileEndpoint) -> Self {
        self.endpoint = endpoint;
        self
    }

    pub fn secret(mut self, secret: &str) -> Self {
        self.secret = Some(secret.to_string());
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn build(self) -> TestSession {
        let parts = self.into_parts();
        let manager = SessionManager::new(parts.config.clone(), parts.events.clone());
        parts.finish(manager)
    }

    pub async fn restore(self) -> TestSession {
        let parts = self.into_parts();
        let manager = SessionManager::restore(parts.config.clone(), parts.events.clone())
            .await
            .unwrap();
        parts.finish(manager)
    }

    fn into_parts(self) -> Parts {
        let http = Arc::new(self.http);
        let clock = Arc::new(ManualClock::new());
        let navigator = Arc::new(InMemoryNavigator::new(self.location));

        let mut builder: SessionConfigBuilder = SessionConfig::builder()
            .base_url(BASE_URL)
            .client_id(CLIENT_ID)
            .callback_url(CALLBACK_URL)
            .profile_endpoint(self.endpoint)
            .http_client(http.clone())
            .store(self.store.clone())
            .navigator(navigator.clone())
            .clock(clock.clone());

        builder = match self.request_timeout {
            Some(timeout) => builder.request_timeout(timeout),
            None => builder.no_request_timeout(),
        };

        if let Some(secret) = self.secret {
            builder = builder.client_secret(secret);
        }

        Parts {
            config: builder.build().unwrap(),
            http,
            store: self.store,
            navigator,
            clock,
            events: EventBus::default(),
        }
    }
}

struct Parts {
    config: SessionConfig,
    http: Arc<ScriptedHttpClient>,
    store: Arc<MemoryKeyValueStore>,
    navigator: Arc<InMemoryNavigator>,
    clock: Arc<ManualClock>,
    events: EventBus,
}

impl Parts {
    fn finish(self, manager: SessionManager) -> TestSession {
        TestSession {
            manager: Arc::new(manager),
            http: self.http,
            store: self.store,
            navigator: self.navigator,
            clock: self.clock,
            events: self.events,
        }
    }
}
