//! Request authentication: user passwords and the internal service token.

use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::state::AppState;

/// Verifies a `(user_id, password)` pair against the users file; `Err` is a
/// ready-to-return 401.
pub fn check_password(state: &AppState, user_id: &str, password: &str) -> Result<(), Response> {
    if config::verify_password(&state.users_file(), user_id, password) {
        Ok(())
    } else {
        Err((StatusCode::UNAUTHORIZED, "invalid user id or password").into_response())
    }
}

/// Verifies the `X-Internal-Token` header; `Err` is a ready-to-return 403.
pub fn check_internal(state: &AppState, headers: &HeaderMap) -> Result<(), Response> {
    let supplied = headers
        .get("X-Internal-Token")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !supplied.is_empty() && supplied == state.internal_token {
        Ok(())
    } else {
        Err((StatusCode::FORBIDDEN, "invalid internal service token").into_response())
    }
}
