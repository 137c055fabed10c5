#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::extract::ws::Message as WsMessage;
use axum::http::{Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use pulse_api::auth::jwt::generate_access_token;
use pulse_api::auth::{JwtConfig, JwtVerifier, Principal};
use pulse_api::config::{HubConfig, ServerConfig};
use pulse_api::router::build_app_router;
use pulse_api::snapshot::{SnapshotSource, StateRecords};
use pulse_api::state::AppState;
use pulse_api::ws::Hub;
use pulse_cache::{Cache, CacheConfig, CacheKeys, MemoryStore};
use pulse_core::types::DbId;
use pulse_core::ServerFrame;
use tokio::sync::mpsc;
use tower::ServiceExt;

pub const TEST_SECRET: &str = "test-secret-that-is-long-enough-for-hmac";

pub fn jwt_config() -> JwtConfig {
    JwtConfig {
        secret: TEST_SECRET.to_string(),
        access_token_expiry_mins: 15,
    }
}

/// A valid access token for `user_id`.
pub fn token(user_id: DbId, tenant_id: Option<DbId>) -> String {
    generate_access_token(user_id, tenant_id, "agent", &jwt_config()).unwrap()
}

pub fn principal(user_id: DbId, tenant_id: Option<DbId>) -> Principal {
    Principal {
        user_id,
        tenant_id,
        role: "agent".to_string(),
    }
}

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 5,
        snapshot_ttl_secs: 10,
        jwt: jwt_config(),
        hub: HubConfig::default(),
        cache: CacheConfig::default(),
    }
}

pub fn test_hub(config: HubConfig) -> Arc<Hub> {
    Arc::new(Hub::new(Arc::new(JwtVerifier::new(jwt_config())), config))
}

pub fn test_cache() -> Cache {
    Cache::new(Arc::new(MemoryStore::new()), CacheKeys::default())
}

/// Application state over an in-memory cache, using recorded push state
/// as the snapshot source unless `source` is given.
pub fn build_test_state(source: Option<Arc<dyn SnapshotSource>>) -> AppState {
    let config = test_config();
    let cache = test_cache();
    let source = source.unwrap_or_else(|| Arc::new(StateRecords::new(cache.clone())));
    AppState::new(config.clone(), test_hub(config.hub), cache, source)
}

/// Build the full application router, mirroring `main.rs`.
pub fn build_test_app(state: AppState) -> Router {
    let config = test_config();
    build_app_router(state, &config)
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    app.oneshot(Request::get(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

pub async fn get_auth(app: Router, uri: &str, token: &str) -> Response<Body> {
    app.oneshot(
        Request::get(uri)
            .header("authorization", format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await
    .unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Next protocol frame queued for a connection, skipping control frames.
pub async fn next_frame(rx: &mut mpsc::UnboundedReceiver<WsMessage>) -> ServerFrame {
    loop {
        match rx.recv().await.expect("channel should be open") {
            WsMessage::Text(text) => return serde_json::from_str(text.as_str()).unwrap(),
            _ => continue,
        }
    }
}

/// Frames already queued for a connection, without waiting.
pub fn drain_frames(rx: &mut mpsc::UnboundedReceiver<WsMessage>) -> Vec<ServerFrame> {
    let mut frames = Vec::new();
    while let Ok(msg) = rx.try_recv() {
        if let WsMessage::Text(text) = msg {
            frames.push(serde_json::from_str(text.as_str()).unwrap());
        }
    }
    frames
}
