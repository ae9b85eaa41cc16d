use axum::extract::{Request, State};
use axum::http::{header, HeaderMap};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use secrecy::ExposeSecret;

use crate::error::ApiError;
use crate::server::AppState;

/// Bearer-token check against the configured secret. Without a secret every
/// request passes.
pub async fn require_bearer(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let Some(secret) = state.auth_secret.as_ref() else {
        return next.run(request).await;
    };

    match bearer_token(request.headers()) {
        Some(token) if token == secret.expose_secret() => next.run(request).await,
        _ => ApiError::Unauthorized.into_response(),
    }
}

/// Credentials of an `Authorization: Bearer <token>` header. The scheme is
/// matched case-insensitively.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    scheme.eq_ignore_ascii_case("bearer").then_some(token)
}
