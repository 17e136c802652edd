//! Shared-secret bearer authentication for the run trigger and admin routes.
//!
//! With no secret configured every protected request is refused; the
//! trigger is never left open.

use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::rest::{AppState, ErrorResponse};

/// Compare fixed-size digests so the comparison time does not depend on
/// how much of the token matched.
fn secret_matches(presented: &str, expected: &str) -> bool {
    let a = Sha256::digest(presented.as_bytes());
    let b = Sha256::digest(expected.as_bytes());
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

fn reject(status: StatusCode, error: &str, message: &str) -> Response {
    metrics::counter!("api.auth.rejected", "reason" => error.to_string()).increment(1);
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            message: message.to_string(),
        }),
    )
        .into_response()
}

pub async fn require_secret(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let Some(expected) = state.trigger_secret.as_deref() else {
        warn!(path = %req.uri().path(), "Protected route called but no trigger secret is configured");
        return reject(
            StatusCode::FORBIDDEN,
            "trigger_disabled",
            "No trigger secret is configured on this node",
        );
    };

    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match token {
        Some(token) if secret_matches(token, expected) => next.run(req).await,
        Some(_) => {
            warn!(path = %req.uri().path(), "Rejected request with invalid bearer token");
            reject(StatusCode::UNAUTHORIZED, "invalid_token", "Invalid bearer token")
        }
        None => reject(
            StatusCode::UNAUTHORIZED,
            "missing_auth",
            "Authorization header with Bearer token required",
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_comparison() {
        assert!(secret_matches("s3cret", "s3cret"));
        assert!(!secret_matches("s3cret ", "s3cret"));
        assert!(!secret_matches("", "s3cret"));
    }
}
