//! Shared-secret bearer authentication (§6.1): the minimal form of the
//! out-of-scope "request authentication" collaborator.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use secrecy::ExposeSecret;

use crate::error::ApiError;
use crate::AppState;

const BEARER_PREFIX_LEN: usize = 7; // "Bearer "

/// Runs ahead of every route except `GET /health`. A `None` `api_key` disables
/// authentication entirely — useful for local development.
pub async fn require_bearer_token(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(expected) = state.config.server.api_key.as_ref() else {
        return Ok(next.run(request).await);
    };

    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or(ApiError::Unauthorized)?;

    if header.len() <= BEARER_PREFIX_LEN || !header[..BEARER_PREFIX_LEN].eq_ignore_ascii_case("bearer ") {
        return Err(ApiError::Unauthorized);
    }

    let token = &header[BEARER_PREFIX_LEN..];
    if token.is_empty() || token != expected.expose_secret() {
        return Err(ApiError::Unauthorized);
    }

    Ok(next.run(request).await)
}
