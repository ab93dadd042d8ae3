//! # Authentication Module
//!
//! Bearer API key authentication, enabled by `FRAUDGRAPH_API_KEY`.
//!
//! When a key is configured every endpoint except `/health` requires
//! `Authorization: Bearer <key>` (a bare `<key>` is accepted too).

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode, header},
    middleware::Next,
    response::Response,
};
use subtle::ConstantTimeEq;

pub const API_KEY_ENV: &str = "FRAUDGRAPH_API_KEY";

/// The configured API key, read once when the router is built.
#[derive(Clone)]
pub struct ApiKey(String);

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKey(..)")
    }
}

impl ApiKey {
    /// `None` when the variable is unset or empty (authentication disabled).
    #[must_use]
    pub fn from_env() -> Option<Self> {
        std::env::var(API_KEY_ENV)
            .ok()
            .filter(|k| !k.is_empty())
            .map(Self)
    }

    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Constant-time comparison over equal-length padded buffers, so the
    /// comparison time depends on neither content nor length of `provided`.
    #[must_use]
    pub fn matches(&self, provided: &str) -> bool {
        let provided = provided.as_bytes();
        let expected = self.0.as_bytes();
        let len = provided.len().max(expected.len());

        let mut a = vec![0u8; len];
        let mut b = vec![0u8; len];
        a[..provided.len()].copy_from_slice(provided);
        b[..expected.len()].copy_from_slice(expected);

        let same_bytes: bool = a.ct_eq(&b).into();
        same_bytes && provided.len() == expected.len()
    }
}

/// Reject requests without the configured key.
pub async fn api_key_auth_middleware(
    State(key): State<ApiKey>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, (StatusCode, &'static str)> {
    if request.uri().path() == "/health" {
        return Ok(next.run(request).await);
    }

    let provided = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.strip_prefix("Bearer ").unwrap_or(v));

    match provided {
        Some(provided) if key.matches(provided) => Ok(next.run(request).await),
        Some(_) => {
            tracing::warn!(
                event = "auth_failure",
                reason = "invalid_api_key",
                "Authentication failed: invalid API key"
            );
            Err((StatusCode::UNAUTHORIZED, "Unauthorized"))
        }
        None => {
            tracing::warn!(
                event = "auth_failure",
                reason = "missing_authorization_header",
                "Missing Authorization header"
            );
            Err((StatusCode::UNAUTHORIZED, "Unauthorized"))
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
