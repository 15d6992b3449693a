//! End-to-end session behavior against scripted bridges.

mod common;

use bridge_desktop::MemoryKeyValueStore;
use bridge_traits::http::{HttpMethod, HttpRequest, HttpResponse};
use bridge_traits::navigation::Navigator;
use bridge_traits::storage::KeyValueStore;
use common::{ScriptedHttpClient, TestSessionBuilder, BASE_URL, CLIENT_ID};
use core_auth::{
    AuthError, AuthorizationGuard, GuardOutcome, ProfileEndpoint, RefreshOutcome, SessionState,
    VerifyOutcome,
};
use core_runtime::events::{CoreEvent, SessionEvent};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

const PROFILE_PATH: &str = "/me/v1/";
const VERIFY_PATH: &str = "/auth/v1/verify";

#[tokio::test]
async fn test_login_navigates_to_authorization_url() {
    let session = TestSessionBuilder::new(ScriptedHttpClient::identity_server()).build();

    let url = session.manager.login().await.unwrap();

    assert_eq!(session.navigator.last_navigation().as_deref(), Some(url.as_str()));
    let prefix = "https://api.example.com/auth/v1/login?client_id=abc&redirect_url=https%3A%2F%2Fapp.example.com%2Fcallback&code_challenge=";
    assert!(url.starts_with(prefix), "unexpected url {}", url);
    assert!(url.ends_with("&code_challenge_method=S256"));

    let parsed = Url::parse(&url).unwrap();
    let challenge = parsed
        .query_pairs()
        .find(|(k, _)| k == "code_challenge")
        .map(|(_, v)| v.into_owned())
        .unwrap();
    assert_eq!(challenge.len(), 43);
    assert!(challenge
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));

    assert!(session.store.get_string("code_verifier").await.unwrap().is_some());
    assert_eq!(session.manager.state(), SessionState::Authenticating);
    assert!(session.http.requests().is_empty());
}

#[tokio::test]
async fn test_verify_stores_token_and_fetch_carries_bearer() {
    let session = TestSessionBuilder::new(ScriptedHttpClient::identity_server())
        .secret("shh")
        .build();

    let outcome = session.manager.verify("verifier-1", "code-1").await.unwrap();

    assert_eq!(outcome, VerifyOutcome::Verified);
    assert_eq!(session.manager.token().as_deref(), Some("tok-1"));
    assert!(session.manager.is_verified());
    assert_eq!(
        session.store.get_string("access_token").await.unwrap().as_deref(),
        Some("tok-1")
    );

    let verify_request = &session.http.requests()[0];
    assert_eq!(
        verify_request.url,
        format!(
            "{}{}?code=code-1&code_challenge=verifier-1&client_id={}",
            BASE_URL, VERIFY_PATH, CLIENT_ID
        )
    );
    assert!(verify_request
        .header_value("Authorization")
        .unwrap()
        .starts_with("Basic "));

    let response = session
        .manager
        .authenticated_fetch(HttpRequest::new(HttpMethod::Get, "/reports/v1/"))
        .await
        .unwrap();
    assert!(response.is_success());

    let fetch_request = session.http.requests().pop().unwrap();
    assert_eq!(fetch_request.url, "https://api.example.com/reports/v1/");
    assert_eq!(fetch_request.header_value("Authorization"), Some("Bearer tok-1"));
}

#[tokio::test]
async fn test_concurrent_verify_sends_one_request() {
    let session =
        TestSessionBuilder::new(ScriptedHttpClient::identity_server().gated()).build();

    let first = session.manager.verify("verifier-1", "code-1");
    let second = async {
        session.http.wait_for_calls(VERIFY_PATH, 1).await;
        assert_eq!(session.manager.state(), SessionState::Authenticating);
        let outcome = session.manager.verify("verifier-1", "code-1").await;
        session.http.release();
        outcome
    };

    let (first, second) = tokio::join!(first, second);

    assert_eq!(first.unwrap(), VerifyOutcome::Verified);
    assert_eq!(second.unwrap(), VerifyOutcome::AlreadyInFlight);
    assert_eq!(session.http.calls_to(VERIFY_PATH), 1);

    // The flag is released once the first call settles.
    session.http.release();
    assert_eq!(
        session.manager.verify("verifier-2", "code-2").await.unwrap(),
        VerifyOutcome::Verified
    );
    assert_eq!(session.http.calls_to(VERIFY_PATH), 2);
}

#[tokio::test]
async fn test_concurrent_refresh_sends_one_request() {
    let session =
        TestSessionBuilder::new(ScriptedHttpClient::identity_server().gated()).build();

    let first = session.manager.refresh_profile(true);
    let second = async {
        session.http.wait_for_calls(PROFILE_PATH, 1).await;
        assert!(session.manager.is_refreshing());
        assert_eq!(session.manager.state(), SessionState::Refreshing);
        let outcome = session.manager.refresh_profile(true).await;
        session.http.release();
        outcome
    };

    let (first, second) = tokio::join!(first, second);

    assert_eq!(first.unwrap(), RefreshOutcome::Refreshed);
    assert_eq!(second.unwrap(), RefreshOutcome::AlreadyInFlight);
    assert_eq!(session.http.calls_to(PROFILE_PATH), 1);
    assert!(!session.manager.is_refreshing());
}

#[tokio::test]
async fn test_verify_rejection_surfaces_server_message() {
    let http = ScriptedHttpClient::new(|_| {
        HttpResponse::new(400, r#"{"success":false,"message":"Code expired"}"#)
    });
    let session = TestSessionBuilder::new(http).build();
    let mut events = session.manager.subscribe();

    let err = session.manager.verify("verifier-1", "old").await.unwrap_err();

    assert!(matches!(err, AuthError::InvalidGrant(ref msg) if msg == "Code expired"));
    assert!(session.manager.token().is_none());
    assert_eq!(session.manager.state(), SessionState::Unauthenticated);
    assert_eq!(
        events.recv().await.unwrap(),
        CoreEvent::Session(SessionEvent::VerifyFailed {
            message: err.to_string()
        })
    );
}

#[tokio::test]
async fn test_cache_within_ttl_skips_network() {
    let session = TestSessionBuilder::new(ScriptedHttpClient::identity_server()).build();
    session.manager.verify("verifier-1", "code-1").await.unwrap();

    assert_eq!(
        session.manager.refresh_profile(false).await.unwrap(),
        RefreshOutcome::Refreshed
    );
    let user = session.manager.user();
    let cached_at = session.manager.cache_timestamp();

    for step in [0, 1, 120, 178] {
        session.clock.advance(Duration::from_secs(step));
        assert_eq!(
            session.manager.refresh_profile(false).await.unwrap(),
            RefreshOutcome::Cached
        );
    }

    // 299 seconds after the cache write.
    assert_eq!(session.http.calls_to(PROFILE_PATH), 1);
    assert_eq!(session.manager.user(), user);
    assert_eq!(session.manager.cache_timestamp(), cached_at);
}

#[tokio::test]
async fn test_cache_at_or_past_ttl_refreshes_once() {
    let session = TestSessionBuilder::new(ScriptedHttpClient::identity_server()).build();
    session.manager.refresh_profile(false).await.unwrap();
    let first_write = session.manager.cache_timestamp().unwrap();

    session.clock.advance(Duration::from_secs(300));
    assert_eq!(
        session.manager.refresh_profile(false).await.unwrap(),
        RefreshOutcome::Refreshed
    );
    assert_eq!(session.http.calls_to(PROFILE_PATH), 2);

    let second_write = session.manager.cache_timestamp().unwrap();
    assert_eq!((second_write - first_write).num_seconds(), 300);
    assert_eq!(
        session.store.get_string("localStoreUpdatedAt").await.unwrap(),
        Some(second_write.to_rfc3339())
    );

    session.clock.advance(Duration::from_secs(3600));
    session.manager.refresh_profile(false).await.unwrap();
    assert_eq!(session.http.calls_to(PROFILE_PATH), 3);
}

#[tokio::test]
async fn test_forced_refresh_ignores_cache() {
    let session = TestSessionBuilder::new(ScriptedHttpClient::identity_server()).build();

    for expected in 1..=3 {
        assert_eq!(
            session.manager.refresh_profile(true).await.unwrap(),
            RefreshOutcome::Refreshed
        );
        assert_eq!(session.http.calls_to(PROFILE_PATH), expected);
    }
}

#[tokio::test]
async fn test_required_resources() {
    let session = TestSessionBuilder::new(ScriptedHttpClient::identity_server()).build();

    assert!(!session.manager.has_required_resources::<&str>(&[]));
    assert!(!session.manager.has_required_resources(&["docs"]));

    session.manager.refresh_profile(true).await.unwrap();

    assert!(session.manager.has_required_resources::<&str>(&[]));
    assert!(session.manager.has_required_resources(&["docs"]));
    assert!(session.manager.has_required_resources(&["docs", "reports"]));
    assert!(!session.manager.has_required_resources(&["docs", "billing"]));
    assert!(!session.manager.has_required_resources(&["Docs"]));
}

#[tokio::test]
async fn test_logout_forces_next_refresh_to_network() {
    let session = TestSessionBuilder::new(ScriptedHttpClient::identity_server())
        .location("/dashboard")
        .build();
    session.manager.verify("verifier-1", "code-1").await.unwrap();
    session.manager.refresh_profile(false).await.unwrap();

    session.manager.logout();

    assert!(session.manager.token().is_none());
    assert!(session.manager.user().is_none());
    assert_eq!(session.manager.state(), SessionState::Unauthenticated);
    assert_eq!(session.navigator.current_location(), "/login");

    // No clock movement: the cache would still be fresh had it survived.
    session.manager.refresh_profile(false).await.unwrap();
    assert_eq!(session.http.calls_to(PROFILE_PATH), 2);

    let last = session.http.requests().pop().unwrap();
    assert!(last.header_value("Authorization").is_none());
}

#[tokio::test]
async fn test_logout_persists_cleared_session() {
    let store = Arc::new(MemoryKeyValueStore::new());
    let session = TestSessionBuilder::new(ScriptedHttpClient::identity_server())
        .store(store.clone())
        .build();
    session.manager.verify("verifier-1", "code-1").await.unwrap();
    session.manager.refresh_profile(false).await.unwrap();

    session.manager.logout();
    session.manager.flush().await;

    let restored = TestSessionBuilder::new(ScriptedHttpClient::identity_server())
        .store(store)
        .restore()
        .await;
    assert!(restored.manager.token().is_none());
    assert!(restored.manager.user().is_none());
    assert_eq!(
        restored.manager.refresh_profile(false).await.unwrap(),
        RefreshOutcome::Refreshed
    );
}

#[tokio::test]
async fn test_unauthorized_profile_redirects_to_login() {
    let http = ScriptedHttpClient::new(|_| HttpResponse::new(401, "Unauthorized"));
    let session = TestSessionBuilder::new(http).location("/dashboard").build();
    let mut events = session.manager.subscribe();

    let outcome = session.manager.refresh_profile(true).await.unwrap();

    assert_eq!(outcome, RefreshOutcome::SessionExpired);
    assert_eq!(session.navigator.current_location(), "/login");
    assert_eq!(
        events.recv().await.unwrap(),
        CoreEvent::Session(SessionEvent::SessionExpired)
    );
}

#[tokio::test]
async fn test_unauthorized_on_login_page_does_not_navigate() {
    let http = ScriptedHttpClient::new(|_| HttpResponse::new(401, ""));
    let session = TestSessionBuilder::new(http)
        .location("https://app.example.com/login?next=%2Fdashboard")
        .build();

    session.manager.refresh_profile(true).await.unwrap();

    assert!(session.navigator.history().is_empty());
}

#[tokio::test]
async fn test_authenticated_fetch_401_redirects_and_returns_response() {
    let http = ScriptedHttpClient::new(|request| {
        if request.url.contains(VERIFY_PATH) {
            HttpResponse::new(200, r#"{"success":true,"data":{"access_token":"tok-1"}}"#)
        } else {
            HttpResponse::new(401, "")
        }
    });
    let session = TestSessionBuilder::new(http).location("/reports").build();
    session.manager.verify("verifier-1", "code-1").await.unwrap();

    let response = session
        .manager
        .authenticated_fetch(HttpRequest::new(
            HttpMethod::Get,
            "https://api.example.com/reports/v1/",
        ))
        .await
        .unwrap();

    assert!(response.is_unauthorized());
    assert_eq!(session.navigator.current_location(), "/login");
}

#[tokio::test]
async fn test_profile_server_error_is_surfaced() {
    let http = ScriptedHttpClient::new(|_| {
        HttpResponse::new(503, r#"{"success":false,"message":"Maintenance"}"#)
    });
    let session = TestSessionBuilder::new(http).location("/dashboard").build();

    let err = session.manager.refresh_profile(true).await.unwrap_err();

    assert!(matches!(err, AuthError::Api { status: 503, ref message } if message == "Maintenance"));
    assert!(session.manager.user().is_none());
    assert!(session.navigator.history().is_empty());
}

#[tokio::test]
async fn test_dashboard_endpoint_keeps_client_setup() {
    let session = TestSessionBuilder::new(ScriptedHttpClient::identity_server())
        .endpoint(ProfileEndpoint::Dashboard)
        .build();

    session.manager.refresh_profile(true).await.unwrap();

    assert_eq!(session.http.calls_to("/me/v1/dashboard"), 1);
    assert_eq!(session.manager.user().unwrap().id, "user-1");
    let setup = session.manager.client_setup().unwrap();
    assert_eq!(setup.client_id, "abc");
    assert_eq!(setup.extra["project_name"], "Demo");
}

#[tokio::test]
async fn test_restore_serves_fresh_cache() {
    let store = Arc::new(MemoryKeyValueStore::new());
    let first = TestSessionBuilder::new(ScriptedHttpClient::identity_server())
        .store(store.clone())
        .build();
    first.manager.verify("verifier-1", "code-1").await.unwrap();
    first.manager.refresh_profile(false).await.unwrap();

    // Same fixed start time on the new clock, so the cache is zero seconds old.
    let second = TestSessionBuilder::new(ScriptedHttpClient::identity_server())
        .store(store)
        .restore()
        .await;

    assert_eq!(second.manager.token().as_deref(), Some("tok-1"));
    assert_eq!(second.manager.user(), first.manager.user());
    assert_eq!(
        second.manager.refresh_profile(false).await.unwrap(),
        RefreshOutcome::Cached
    );
    assert!(second.http.requests().is_empty());
}

#[tokio::test]
async fn test_restore_completes_pending_login() {
    let store = Arc::new(MemoryKeyValueStore::new());
    let before_redirect = TestSessionBuilder::new(ScriptedHttpClient::identity_server())
        .store(store.clone())
        .build();
    before_redirect.manager.login().await.unwrap();
    let verifier = store.get_string("code_verifier").await.unwrap().unwrap();

    let on_callback = TestSessionBuilder::new(ScriptedHttpClient::identity_server())
        .store(store.clone())
        .location("/callback?code=code-1")
        .restore()
        .await;
    assert_eq!(on_callback.manager.state(), SessionState::Authenticating);

    on_callback.manager.complete_login("code-1").await.unwrap();

    let request = &on_callback.http.requests()[0];
    assert!(request
        .url
        .contains(&format!("code_challenge={}", verifier)));
    assert!(store.get_string("code_verifier").await.unwrap().is_none());
    assert_eq!(on_callback.manager.state(), SessionState::Authenticated);
}

#[tokio::test]
async fn test_restore_discards_other_clients_session() {
    let store = Arc::new(MemoryKeyValueStore::with_entries([
        ("client_id", "someone-else"),
        ("access_token", "foreign-token"),
        ("user", r#"{"id":"user-9"}"#),
        ("localStoreUpdatedAt", "2024-06-01T09:00:00+00:00"),
    ]));

    let session = TestSessionBuilder::new(ScriptedHttpClient::identity_server())
        .store(store.clone())
        .restore()
        .await;

    assert!(session.manager.token().is_none());
    assert!(session.manager.user().is_none());
    assert_eq!(
        store.get_string("client_id").await.unwrap().as_deref(),
        Some(CLIENT_ID)
    );
    assert!(store.get_string("access_token").await.unwrap().is_none());
}

#[tokio::test]
async fn test_restore_without_timestamp_treats_cache_as_stale() {
    let store = Arc::new(MemoryKeyValueStore::with_entries([
        ("client_id", CLIENT_ID),
        ("access_token", "tok-1"),
        ("user", r#"{"id":"user-1"}"#),
    ]));

    let session = TestSessionBuilder::new(ScriptedHttpClient::identity_server())
        .store(store)
        .restore()
        .await;

    assert!(session.manager.user().is_some());
    assert_eq!(
        session.manager.refresh_profile(false).await.unwrap(),
        RefreshOutcome::Refreshed
    );
}

#[tokio::test(start_paused = true)]
async fn test_request_timeout_is_transport_error() {
    let session = TestSessionBuilder::new(ScriptedHttpClient::identity_server().gated())
        .request_timeout(Duration::from_secs(5))
        .build();

    let err = session.manager.refresh_profile(true).await.unwrap_err();

    assert!(matches!(err, AuthError::Transport(ref msg) if msg.contains("timed out")));
    assert!(!session.manager.is_refreshing());
}

#[tokio::test]
async fn test_events_follow_lifecycle() {
    let session = TestSessionBuilder::new(ScriptedHttpClient::identity_server())
        .location("/dashboard")
        .build();
    let mut events = session.manager.subscribe();

    session.manager.login().await.unwrap();
    session.manager.complete_login("code-1").await.unwrap();
    session.manager.refresh_profile(false).await.unwrap();
    session.manager.refresh_profile(false).await.unwrap();
    session.manager.logout();

    let mut received = Vec::new();
    while let Ok(CoreEvent::Session(event)) = events.try_recv() {
        received.push(event);
    }

    assert_eq!(
        received,
        vec![
            SessionEvent::LoginStarted,
            SessionEvent::Verified,
            SessionEvent::ProfileRefreshed {
                user_id: "user-1".to_string(),
                from_cache: false
            },
            SessionEvent::ProfileRefreshed {
                user_id: "user-1".to_string(),
                from_cache: true
            },
            SessionEvent::LoggedOut,
        ]
    );
}

#[tokio::test]
async fn test_logout_during_refresh_drops_profile() {
    let session = TestSessionBuilder::new(ScriptedHttpClient::identity_server().gated())
        .location("/dashboard")
        .build();
    let guard = AuthorizationGuard::new(["docs"]);

    let refresh = session.manager.refresh_profile(true);
    let logout = async {
        session.http.wait_for_calls(PROFILE_PATH, 1).await;
        session.manager.logout();
        session.http.release();
    };
    let (outcome, ()) = tokio::join!(refresh, logout);
    session.manager.flush().await;

    assert_eq!(outcome.unwrap(), RefreshOutcome::Discarded);
    assert!(session.manager.user().is_none());
    assert!(session.manager.cache_timestamp().is_none());
    assert_eq!(guard.evaluate(&session.manager), GuardOutcome::Unauthenticated);
    assert_eq!(
        session.store.get_string("user").await.unwrap().as_deref(),
        Some("null")
    );
}

#[tokio::test]
async fn test_logout_during_verify_drops_token() {
    let session = TestSessionBuilder::new(ScriptedHttpClient::identity_server().gated())
        .location("/callback")
        .build();

    let verify = session.manager.verify("verifier-1", "code-1");
    let logout = async {
        session.http.wait_for_calls(VERIFY_PATH, 1).await;
        session.manager.logout();
        session.http.release();
    };
    let (outcome, ()) = tokio::join!(verify, logout);
    session.manager.flush().await;

    assert_eq!(outcome.unwrap(), VerifyOutcome::Discarded);
    assert!(session.manager.token().is_none());
    assert!(!session.manager.is_verified());
    assert_eq!(session.manager.state(), SessionState::Unauthenticated);
    assert!(session.store.get_string("access_token").await.unwrap().is_none());
}

#[tokio::test]
async fn test_login_right_after_logout_keeps_new_verifier() {
    let session = TestSessionBuilder::new(ScriptedHttpClient::identity_server()).build();
    session.manager.verify("verifier-1", "code-1").await.unwrap();

    session.manager.logout();
    session.manager.login().await.unwrap();
    session.manager.flush().await;

    assert!(session.store.get_string("access_token").await.unwrap().is_none());
    assert!(session.store.get_string("code_verifier").await.unwrap().is_some());
    assert_eq!(session.manager.state(), SessionState::Authenticating);
}
