pub mod dashboard;
pub mod health;

use axum::routing::get;
use axum::Router;

use crate::state::AppState;
use crate::ws;

/// The push channel endpoint.
///
/// ```text
/// /api/v1/ws                   WebSocket push channel
/// /api/v1/dashboard/snapshot   polling fallback (GET, see [`dashboard`])
/// /health                      liveness and counts (see [`health`])
/// ```
pub fn push_routes() -> Router<AppState> {
    Router::new().route("/api/v1/ws", get(ws::ws_handler))
}
