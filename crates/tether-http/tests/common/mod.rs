//! Shared helpers for the mock-service tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde_json::json;
use wiremock::MockServer;

use tether_core::store::{self, SessionStore};
use tether_core::tokens::TokenPair;
use tether_core::user::UserRecord;
use tether_core::{MemorySessionStore, RetryPolicy, ServiceUrl, SessionBus, SessionConfig};
use tether_http::SessionManager;

/// Mint an unsigned JWT whose `exp` lies `ttl_secs` from now.
pub fn mint_token(sub: &str, ttl_secs: i64) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let exp = chrono::Utc::now().timestamp() + ttl_secs;
    let payload = URL_SAFE_NO_PAD.encode(json!({ "exp": exp, "sub": sub }).to_string().as_bytes());
    format!("{}.{}.sig", header, payload)
}

/// A token pair comfortably outside every threshold (2 h / 30 d).
pub fn long_lived_pair() -> TokenPair {
    TokenPair::new(
        mint_token("user-1", 2 * 60 * 60),
        mint_token("user-1", 30 * 24 * 60 * 60),
    )
}

pub fn test_user() -> UserRecord {
    UserRecord {
        id: "user-1".to_string(),
        email: "alice@example.com".to_string(),
        role: "admin".to_string(),
    }
}

pub fn service_url(server: &MockServer) -> ServiceUrl {
    ServiceUrl::new(format!("http://127.0.0.1:{}", server.address().port())).unwrap()
}

/// Fast retries and a short request timeout so tests stay quick.
pub fn test_config() -> SessionConfig {
    SessionConfig {
        retry: RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(20),
        },
        request_timeout: Duration::from_millis(250),
        ..SessionConfig::default()
    }
}

/// A manager over a bus-wired in-memory store.
pub fn manager_for(server: &MockServer) -> (SessionManager, Arc<MemorySessionStore>, SessionBus) {
    manager_with_config(server, test_config())
}

pub fn manager_with_config(
    server: &MockServer,
    config: SessionConfig,
) -> (SessionManager, Arc<MemorySessionStore>, SessionBus) {
    let bus = SessionBus::new();
    let store = Arc::new(MemorySessionStore::with_bus(bus.clone()));
    let manager = SessionManager::with_config(
        service_url(server),
        store.clone() as Arc<dyn SessionStore>,
        config,
        bus.clone(),
    );
    (manager, store, bus)
}

/// Seed the store with an authenticated session.
pub async fn seed_session(store: &dyn SessionStore, pair: &TokenPair) {
    store::store_login(store, pair, &test_user()).await.unwrap();
}

/// Poll until the manager reaches the wanted phase or give up.
pub async fn wait_for_phase(manager: &SessionManager, phase: tether_core::AuthPhase) {
    for _ in 0..200 {
        if manager.phase() == phase {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("manager never reached {:?}", phase);
}
