//! Rate limiting for credential endpoints.
//!
//! Token bucket keyed by client IP, applied to register and login.

use axum::{
    Json,
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{Quota, RateLimiter, clock::DefaultClock, state::keyed::DefaultKeyedStateStore};
use std::{num::NonZeroU32, sync::Arc};
use tracing::warn;

use crate::auth::extract_client_ip;
use crate::wire::Envelope;

/// Default credential attempts per minute per IP.
pub const DEFAULT_AUTH_PER_MINUTE: u32 = 20;

/// Per-IP rate limiter.
pub type IpLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// Rate limiting configuration for credential endpoints.
#[derive(Clone)]
pub struct RateLimitConfig {
    pub credentials: Arc<IpLimiter>,
}

impl RateLimitConfig {
    /// Allow `per_minute` attempts per IP, with the whole minute's allowance as burst.
    pub fn new(per_minute: u32) -> Self {
        let per_minute = NonZeroU32::new(per_minute).unwrap_or(NonZeroU32::MIN);
        Self {
            credentials: Arc::new(RateLimiter::keyed(Quota::per_minute(per_minute))),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::new(DEFAULT_AUTH_PER_MINUTE)
    }
}

/// Middleware for rate limiting register and login.
pub async fn rate_limit_credentials(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Response {
    let ip = extract_client_ip(request.headers(), request.extensions());

    match config.credentials.check_key(&ip) {
        Ok(_) => next.run(request).await,
        Err(_) => {
            warn!(ip = %ip, "Credential rate limit exceeded");
            (
                StatusCode::TOO_MANY_REQUESTS,
                Json(Envelope::failure(
                    "Too many attempts. Please try again later.",
                    Vec::new(),
                )),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_is_per_key() {
        let config = RateLimitConfig::new(2);

        assert!(config.credentials.check_key(&"a".to_string()).is_ok());
        assert!(config.credentials.check_key(&"a".to_string()).is_ok());
        assert!(config.credentials.check_key(&"a".to_string()).is_err());
        assert!(config.credentials.check_key(&"b".to_string()).is_ok());
    }

    #[test]
    fn test_zero_is_clamped() {
        let config = RateLimitConfig::new(0);
        assert!(config.credentials.check_key(&"a".to_string()).is_ok());
    }
}
