//! Shared-secret authentication for the API surface
//!
//! Compares the X-API-Key header against the configured secret in constant
//! time. When no secret is configured, authentication is disabled.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use secrecy::{ExposeSecret, SecretString};
use subtle::ConstantTimeEq;

use crate::api::handlers::AppState;
use crate::api::models::{error_kinds, ApiError};

/// Constant-time comparison of the provided key against the expected secret.
pub fn keys_match(expected: &SecretString, provided: &str) -> bool {
    provided
        .as_bytes()
        .ct_eq(expected.expose_secret().as_bytes())
        .into()
}

/// Middleware guarding the authenticated routes.
pub async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = state.config.server.api_key.as_ref() else {
        return next.run(request).await;
    };

    let provided = request
        .headers()
        .get("X-API-Key")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if provided.is_empty() {
        return unauthorized("Valid API key required");
    }

    if !keys_match(expected, provided) {
        return unauthorized("Invalid API key");
    }

    next.run(request).await
}

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(ApiError::new(error_kinds::UNAUTHORIZED, message)),
    )
        .into_response()
}
