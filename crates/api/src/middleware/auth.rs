//! Bearer-token authentication extractor for HTTP handlers.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use pulse_core::CoreError;

use crate::auth::{bearer_token, Principal};
use crate::error::AppError;
use crate::state::AppState;

/// Authenticated caller, checked through the same verifier the push hub
/// uses for socket connections, so a token that may open a push channel
/// may also poll.
#[derive(Debug, Clone)]
pub struct AuthPrincipal(pub Principal);

impl FromRequestParts<AppState> for AuthPrincipal {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers).ok_or_else(|| {
            CoreError::Unauthorized("Expected Authorization: Bearer <token>".into())
        })?;
        let principal = state.hub.authenticate(token).await?;
        Ok(AuthPrincipal(principal))
    }
}
