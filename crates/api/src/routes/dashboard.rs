use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use pulse_core::Snapshot;

use crate::error::AppResult;
use crate::middleware::auth::AuthPrincipal;
use crate::snapshot::View;
use crate::state::AppState;

/// `GET /dashboard/snapshot` -- full dashboard state for polling clients:
/// shared state plus the caller's own tenant's state.
async fn get_snapshot(
    State(state): State<AppState>,
    AuthPrincipal(principal): AuthPrincipal,
) -> AppResult<Json<Snapshot>> {
    let view = View::for_tenant(principal.tenant_id);
    let snapshot = state.snapshots.current(view, state.hub.clock()).await?;
    tracing::debug!(
        user_id = principal.user_id,
        view = %view.name(),
        entries = snapshot.entries.len(),
        "Served dashboard snapshot"
    );
    Ok(Json(snapshot))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/snapshot", get(get_snapshot))
}
