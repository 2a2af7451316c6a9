//! HTTP middleware for the API server

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use subtle::ConstantTimeEq;

/// Bearer token authentication.
///
/// Compares the presented token against the configured one in constant time.
/// Anything else gets `401 Unauthorized`.
pub async fn bearer_auth(
    State(expected): State<Arc<str>>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let token = request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| {
            tracing::warn!("Authentication failed: missing bearer token");
            StatusCode::UNAUTHORIZED
        })?;

    if !bool::from(token.trim().as_bytes().ct_eq(expected.as_bytes())) {
        tracing::warn!("Authentication failed: invalid token provided");
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(next.run(request).await)
}
