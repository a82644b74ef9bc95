//! Shared-secret authentication for the send endpoints.

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use subtle::ConstantTimeEq;

use super::error::ApiError;
use crate::AppState;

const API_KEY_HEADER: &str = "x-api-key";

/// Key presented by the caller: `Authorization: Bearer <key>` or `X-Api-Key: <key>`
fn presented_key(headers: &HeaderMap) -> Option<&str> {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim);

    bearer.or_else(|| {
        headers
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
    })
}

fn keys_match(presented: &str, expected: &str) -> bool {
    presented.as_bytes().ct_eq(expected.as_bytes()).into()
}

/// Reject requests without the configured key. A relay without a key
/// configured lets every request through.
pub async fn require_api_key(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(expected) = state.config.auth.api_key.as_deref() {
        match presented_key(request.headers()) {
            Some(key) if keys_match(key, expected) => {}
            Some(_) => {
                tracing::warn!(path = %request.uri().path(), "Rejected request with invalid API key");
                return Err(ApiError::unauthorized("Invalid API key"));
            }
            None => return Err(ApiError::unauthorized("Missing API key")),
        }
    }

    Ok(next.run(request).await)
}
