//! Authentication and authorization primitives.
//!
//! - [`jwt`] -- HS256 access-token verification.
//! - [`principal`] -- the authenticated identity and the verifier seam the
//!   hub checks credentials through.

pub mod jwt;
pub mod principal;

use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;

pub use jwt::{JwtConfig, JwtVerifier};
pub use principal::{CredentialVerifier, Principal};

/// The token of an `Authorization: Bearer <token>` header, if present and
/// well-formed.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .filter(|token| !token.is_empty())
}
