//! # Middleware Module
//!
//! Global rate limiting, configured by `FRAUDGRAPH_RATE_LIMIT`
//! (requests per second, default 100, `0` disables).

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};
use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
};
use std::num::NonZeroU32;
use std::sync::Arc;

pub const RATE_LIMIT_ENV: &str = "FRAUDGRAPH_RATE_LIMIT";

const DEFAULT_RPS: NonZeroU32 = match NonZeroU32::new(100) {
    Some(rps) => rps,
    None => NonZeroU32::MIN,
};

// =============================================================================
// RATE LIMITER
// =============================================================================

pub type GlobalRateLimiter = Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>;

#[must_use]
pub fn create_rate_limiter(requests_per_second: NonZeroU32) -> GlobalRateLimiter {
    Arc::new(RateLimiter::direct(Quota::per_second(requests_per_second)))
}

/// Interpret a rate limit setting. `None` means unlimited.
///
/// Unset or unparsable values fall back to the default.
#[must_use]
pub fn parse_rate_limit(value: Option<&str>) -> Option<NonZeroU32> {
    let Some(raw) = value else {
        return Some(DEFAULT_RPS);
    };
    match raw.trim().parse::<u32>() {
        Ok(rps) => NonZeroU32::new(rps),
        Err(_) => {
            tracing::warn!(value = raw, "invalid {}, using default", RATE_LIMIT_ENV);
            Some(DEFAULT_RPS)
        }
    }
}

#[must_use]
pub fn get_rate_limit_from_env() -> Option<NonZeroU32> {
    parse_rate_limit(std::env::var(RATE_LIMIT_ENV).ok().as_deref())
}

/// 429 once the global quota for the current second is spent.
pub async fn rate_limit_middleware(
    State(limiter): State<GlobalRateLimiter>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, (StatusCode, &'static str)> {
    if limiter.check().is_err() {
        tracing::warn!("Rate limit exceeded");
        return Err((StatusCode::TOO_MANY_REQUESTS, "Too Many Requests"));
    }
    Ok(next.run(request).await)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_uses_default() {
        assert_eq!(parse_rate_limit(None), Some(DEFAULT_RPS));
    }

    #[test]
    fn zero_disables() {
        assert_eq!(parse_rate_limit(Some("0")), None);
    }

    #[test]
    fn garbage_uses_default() {
        assert_eq!(parse_rate_limit(Some("fast")), Some(DEFAULT_RPS));
    }

    #[test]
    fn explicit_value() {
        assert_eq!(parse_rate_limit(Some(" 25 ")), NonZeroU32::new(25));
    }

    #[test]
    fn limiter_exhausts_quota() {
        let limiter = create_rate_limiter(NonZeroU32::MIN);
        assert!(limiter.check().is_ok());
        assert!(limiter.check().is_err());
    }
}
