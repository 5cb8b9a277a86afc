//! Bearer-token authentication, enforced only when the bootstrap
//! `auth_enabled` flag is set. The WebSocket upgrade path cannot set a
//! header from a browser, so it is checked via a `?token=` query parameter
//! instead, using the same comparison.

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use sha2::{Digest, Sha256};

use crate::error::ApiError;
use crate::state::ApiState;

/// SHA-256 hex digest of `token`. Exposed so `sorter_main` can turn a
/// plaintext `--admin-token` CLI argument into the hash stored in
/// [`crate::state::ApiState::bootstrap`] without duplicating the algorithm.
pub fn hash_token(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Constant-time comparison of two equal-length byte strings; unequal
/// lengths short-circuit (length is not the secret here).
fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes().zip(b.bytes()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

fn check_token(token: &str, expected_hash: &str) -> bool {
    constant_time_eq(&hash_token(token), expected_hash)
}

pub fn validate_bearer(headers: &HeaderMap, state: &ApiState) -> Result<(), ApiError> {
    if !state.bootstrap.auth_enabled {
        return Ok(());
    }
    let header = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::Unauthorized)?;
    let token = header.strip_prefix("Bearer ").ok_or(ApiError::Unauthorized)?;
    if check_token(token, &state.bootstrap.admin_password_hash) {
        Ok(())
    } else {
        Err(ApiError::Unauthorized)
    }
}

pub fn validate_query_token(token: Option<&str>, state: &ApiState) -> Result<(), ApiError> {
    if !state.bootstrap.auth_enabled {
        return Ok(());
    }
    let token = token.ok_or(ApiError::Unauthorized)?;
    if check_token(token, &state.bootstrap.admin_password_hash) {
        Ok(())
    } else {
        Err(ApiError::Unauthorized)
    }
}

/// Axum middleware applied to every HTTP route except `/api/events` (the
/// WebSocket upgrade authenticates itself via query parameter instead).
pub async fn auth_layer(State(state): State<ApiState>, req: Request, next: Next) -> Response {
    match validate_bearer(req.headers(), &state) {
        Ok(()) => next.run(req).await,
        Err(e) => e.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_token_hashes_match() {
        assert!(check_token("secret", &hash_token("secret")));
    }

    #[test]
    fn different_token_rejected() {
        assert!(!check_token("wrong", &hash_token("secret")));
    }

    #[test]
    fn constant_time_eq_rejects_differing_lengths() {
        assert!(!constant_time_eq("abc", "abcd"));
    }
}
