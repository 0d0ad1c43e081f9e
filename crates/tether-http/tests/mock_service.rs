//! Mock-service tests for login, refresh coordination, and the request
//! middleware.
//!
//! These use wiremock to simulate the user-management service and verify
//! behavior without real credentials or network access.

mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::*;
use tether_core::error::{AuthError, Error};
use tether_core::events::SessionEvent;
use tether_core::store::{SessionKey, SessionStore};
use tether_core::tokens::TokenPair;
use tether_core::{AuthPhase, Credentials, SessionBus};
use tether_http::{AuthApi, HttpClient, RefreshCoordinator};

fn coordinator_for(
    server: &MockServer,
    store: Arc<dyn SessionStore>,
    bus: SessionBus,
) -> RefreshCoordinator {
    let http = HttpClient::new(service_url(server), &test_config());
    RefreshCoordinator::new(AuthApi::new(http), store, bus)
}

// ============================================================================
// Login / initialize
// ============================================================================

#[tokio::test]
async fn login_success_persists_session() {
    let server = MockServer::start().await;
    let pair = long_lived_pair();

    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .and(body_json(json!({
            "email": "alice@example.com",
            "password": "secret123"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "user": { "id": "user-1", "email": "alice@example.com", "role": "admin" },
            "accessToken": pair.access.as_str(),
            "refreshToken": pair.refresh.as_str(),
        })))
        .mount(&server)
        .await;

    let (manager, store, _bus) = manager_for(&server);
    manager.initialize().await.unwrap();
    assert_eq!(manager.phase(), AuthPhase::Anonymous);

    let user = manager
        .login(&Credentials::new("alice@example.com", "secret123"))
        .await
        .unwrap();

    assert_eq!(user.id, "user-1");
    assert_eq!(manager.phase(), AuthPhase::Authenticated);
    assert_eq!(
        store.get(SessionKey::Token).await.unwrap().as_deref(),
        Some(pair.access.as_str())
    );

    let snapshot = manager.snapshot().await;
    assert!(snapshot.has_user);
    assert!(snapshot.time_remaining > Duration::from_secs(60 * 60));
}

#[tokio::test]
async fn login_failure_mutates_nothing() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": "Unauthorized",
            "message": "Invalid email or password"
        })))
        .mount(&server)
        .await;

    let (manager, store, _bus) = manager_for(&server);
    manager.initialize().await.unwrap();

    let result = manager
        .login(&Credentials::new("alice@example.com", "wrong"))
        .await;

    assert!(matches!(
        result,
        Err(Error::Auth(AuthError::InvalidCredentials))
    ));
    assert_eq!(manager.phase(), AuthPhase::Anonymous);
    for key in SessionKey::ALL {
        assert_eq!(store.get(key).await.unwrap(), None);
    }
}

#[tokio::test]
async fn initialize_restores_persisted_session() {
    let server = MockServer::start().await;
    let (manager, store, _bus) = manager_for(&server);
    seed_session(store.as_ref(), &long_lived_pair()).await;

    let phase = manager.initialize().await.unwrap();

    assert_eq!(phase, AuthPhase::Authenticated);
    assert_eq!(manager.current_user().unwrap().id, "user-1");
}

#[tokio::test]
async fn initialize_clears_expired_session() {
    let server = MockServer::start().await;
    let (manager, store, _bus) = manager_for(&server);

    // Access token inside the 5-minute safety margin counts as expired.
    let pair = TokenPair::new(mint_token("user-1", 60), mint_token("user-1", 3600));
    seed_session(store.as_ref(), &pair).await;

    let phase = manager.initialize().await.unwrap();

    assert_eq!(phase, AuthPhase::Anonymous);
    for key in SessionKey::ALL {
        assert_eq!(store.get(key).await.unwrap(), None);
    }
    assert!(server.received_requests().await.unwrap().is_empty());
}

// ============================================================================
// Refresh coordination
// ============================================================================

#[tokio::test]
async fn concurrent_refreshes_share_one_network_call() {
    let server = MockServer::start().await;
    let fresh = long_lived_pair();

    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_millis(150))
                .set_body_json(json!({
                    "accessToken": fresh.access.as_str(),
                    "refreshToken": fresh.refresh.as_str(),
                })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let bus = SessionBus::new();
    let store = Arc::new(tether_core::MemorySessionStore::new());
    seed_session(store.as_ref(), &long_lived_pair()).await;
    let coordinator = Arc::new(coordinator_for(&server, store.clone(), bus));

    let mut handles = Vec::new();
    for _ in 0..5 {
        let coordinator = coordinator.clone();
        handles.push(tokio::spawn(async move { coordinator.refresh().await }));
        // Let each caller reach the coordinator before the next starts.
        tokio::task::yield_now().await;
    }

    for handle in handles {
        let token = handle.await.unwrap().unwrap();
        assert_eq!(token.as_str(), fresh.access.as_str());
    }

    // The refreshed pair was persisted.
    assert_eq!(
        store.get(SessionKey::Token).await.unwrap().as_deref(),
        Some(fresh.access.as_str())
    );
}

#[tokio::test]
async fn queued_refresh_callers_settle_in_fifo_order() {
    let server = MockServer::start().await;
    let fresh = long_lived_pair();

    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_millis(150))
                .set_body_json(json!({
                    "accessToken": fresh.access.as_str(),
                    "refreshToken": fresh.refresh.as_str(),
                })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let bus = SessionBus::new();
    let store = Arc::new(tether_core::MemorySessionStore::new());
    seed_session(store.as_ref(), &long_lived_pair()).await;
    let coordinator = Arc::new(coordinator_for(&server, store.clone(), bus));

    let order = Arc::new(std::sync::Mutex::new(Vec::new()));
    let mut handles = Vec::new();
    for i in 0..6usize {
        let coordinator = coordinator.clone();
        let order = order.clone();
        handles.push(tokio::spawn(async move {
            coordinator.refresh().await.unwrap();
            order.lock().unwrap().push(i);
        }));
        tokio::task::yield_now().await;
    }
    for handle in handles {
        handle.await.unwrap();
    }

    // Caller 0 owns the network call; 1..=5 park and are released FIFO.
    let order = order.lock().unwrap().clone();
    assert_eq!(order[0], 0);
    assert_eq!(&order[1..], &[1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn expired_refresh_token_fails_without_network() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let bus = SessionBus::new();
    let store = Arc::new(tether_core::MemorySessionStore::new());
    // Refresh token already inside its own safety margin.
    let pair = TokenPair::new(mint_token("user-1", 3600), mint_token("user-1", 60));
    seed_session(store.as_ref(), &pair).await;
    let coordinator = coordinator_for(&server, store.clone(), bus);

    let result = coordinator.refresh().await;
    assert_eq!(result.unwrap_err(), AuthError::RefreshTokenInvalid);
}

// ============================================================================
// Request middleware
// ============================================================================

#[tokio::test]
async fn middleware_attaches_bearer_and_version_header() {
    let server = MockServer::start().await;
    let pair = long_lived_pair();

    Mock::given(method("GET"))
        .and(path("/users"))
        .and(header("authorization", format!("Bearer {}", pair.access.as_str()).as_str()))
        .and(header("x-api-version", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let (manager, store, _bus) = manager_for(&server);
    seed_session(store.as_ref(), &pair).await;
    manager.initialize().await.unwrap();

    let users: Vec<serde_json::Value> = manager.client().get("/users").await.unwrap();
    assert!(users.is_empty());
}

#[tokio::test]
async fn middleware_refreshes_once_on_401_and_replays() {
    let server = MockServer::start().await;
    let stale = long_lived_pair();
    let fresh = TokenPair::new(
        mint_token("user-1", 3 * 60 * 60),
        mint_token("user-1", 30 * 24 * 60 * 60),
    );

    // First attempt is rejected.
    Mock::given(method("GET"))
        .and(path("/users"))
        .and(header(
            "authorization",
            format!("Bearer {}", stale.access.as_str()).as_str(),
        ))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    // The replay carries the refreshed token.
    Mock::given(method("GET"))
        .and(path("/users"))
        .and(header(
            "authorization",
            format!("Bearer {}", fresh.access.as_str()).as_str(),
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": "user-2" }])))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .and(body_json(json!({ "refreshToken": stale.refresh.as_str() })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "accessToken": fresh.access.as_str(),
            "refreshToken": fresh.refresh.as_str(),
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (manager, store, _bus) = manager_for(&server);
    seed_session(store.as_ref(), &stale).await;
    manager.initialize().await.unwrap();

    let users: Vec<serde_json::Value> = manager.client().get("/users").await.unwrap();
    assert_eq!(users.len(), 1);
}

#[tokio::test]
async fn middleware_surfaces_second_401_without_another_refresh() {
    let server = MockServer::start().await;
    let pair = long_lived_pair();

    Mock::given(method("GET"))
        .and(path("/users"))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "accessToken": pair.access.as_str(),
            "refreshToken": pair.refresh.as_str(),
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (manager, store, _bus) = manager_for(&server);
    seed_session(store.as_ref(), &pair).await;
    manager.initialize().await.unwrap();

    let result: Result<Vec<serde_json::Value>, _> = manager.client().get("/users").await;
    match result {
        Err(Error::Protocol(protocol)) => assert_eq!(protocol.status, 401),
        other => panic!("expected surfaced 401, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn middleware_short_circuits_expired_token() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/users"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let (manager, store, bus) = manager_for(&server);
    let pair = TokenPair::new(mint_token("user-1", 60), mint_token("user-1", 3600));
    seed_session(store.as_ref(), &pair).await;
    let mut rx = bus.subscribe();

    let result: Result<Vec<serde_json::Value>, _> = manager.client().get("/users").await;
    assert!(matches!(result, Err(Error::Auth(AuthError::TokenExpired))));

    // The short-circuit emits a logout signal.
    loop {
        match rx.recv().await.unwrap() {
            SessionEvent::ForcedLogout { .. } => break,
            _ => continue,
        }
    }
}

#[tokio::test]
async fn logout_path_proceeds_with_stale_token() {
    let server = MockServer::start().await;
    let stale_access = mint_token("user-1", 60);

    Mock::given(method("POST"))
        .and(path("/auth/logout"))
        .and(header(
            "authorization",
            format!("Bearer {}", stale_access).as_str(),
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let (manager, store, _bus) = manager_for(&server);
    let pair = TokenPair::new(stale_access, mint_token("user-1", 60));
    seed_session(store.as_ref(), &pair).await;

    let _: serde_json::Value = manager
        .client()
        .post("/auth/logout", &json!({}))
        .await
        .unwrap();
}

#[tokio::test]
async fn network_errors_retry_then_surface() {
    let server = MockServer::start().await;
    let pair = long_lived_pair();

    // Every attempt outlives the client timeout: a network-level failure
    // with no response. 1 initial send + 3 retries.
    Mock::given(method("GET"))
        .and(path("/users"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_secs(30))
                .set_body_json(json!([])),
        )
        .expect(4)
        .mount(&server)
        .await;

    let (manager, store, _bus) = manager_for(&server);
    seed_session(store.as_ref(), &pair).await;
    manager.initialize().await.unwrap();

    let result: Result<Vec<serde_json::Value>, _> = manager.client().get("/users").await;
    assert!(matches!(result, Err(Error::Transport(_))));
}

#[tokio::test]
async fn response_errors_are_not_backoff_retried() {
    let server = MockServer::start().await;
    let pair = long_lived_pair();

    Mock::given(method("GET"))
        .and(path("/users"))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({
            "error": "Unavailable",
            "message": "maintenance"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (manager, store, _bus) = manager_for(&server);
    seed_session(store.as_ref(), &pair).await;
    manager.initialize().await.unwrap();

    let result: Result<Vec<serde_json::Value>, _> = manager.client().get("/users").await;
    match result {
        Err(Error::Protocol(protocol)) => {
            assert_eq!(protocol.status, 503);
            assert!(protocol.user_message().contains("unavailable"));
        }
        other => panic!("expected protocol error, got {:?}", other.map(|_| ())),
    }
}

// ============================================================================
// Logout
// ============================================================================

#[tokio::test]
async fn logout_is_idempotent_and_clears_the_store() {
    let server = MockServer::start().await;
    let pair = long_lived_pair();

    Mock::given(method("POST"))
        .and(path("/auth/logout"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let (manager, store, _bus) = manager_for(&server);
    seed_session(store.as_ref(), &pair).await;
    manager.initialize().await.unwrap();

    manager.logout().await.unwrap();
    manager.logout().await.unwrap();

    assert_eq!(manager.phase(), AuthPhase::Anonymous);
    for key in SessionKey::ALL {
        assert_eq!(store.get(key).await.unwrap(), None);
    }
}

#[tokio::test]
async fn logout_endpoint_failure_still_cleans_up() {
    let server = MockServer::start().await;
    let pair = long_lived_pair();

    Mock::given(method("POST"))
        .and(path("/auth/logout"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let (manager, store, _bus) = manager_for(&server);
    seed_session(store.as_ref(), &pair).await;
    manager.initialize().await.unwrap();

    manager.logout().await.unwrap();

    assert_eq!(manager.phase(), AuthPhase::Anonymous);
    for key in SessionKey::ALL {
        assert_eq!(store.get(key).await.unwrap(), None);
    }
}
