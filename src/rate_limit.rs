//! Rate limiting for the login endpoint.
//!
//! Uses a token bucket algorithm with per-IP tracking to prevent brute force attacks.

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

/// Per-IP rate limiter.
pub type IpLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// Default sustained login rate per IP.
pub const DEFAULT_LOGIN_PER_MINUTE: u32 = 12;

/// Default login burst per IP.
pub const DEFAULT_LOGIN_BURST: u32 = 5;

/// Rate limiting configuration for authentication endpoints.
#[derive(Clone)]
pub struct RateLimitConfig {
    /// Per-IP limiter for login attempts
    pub login: Arc<IpLimiter>,
    /// Key requests by the first `X-Forwarded-For` entry
    pub trust_forwarded_for: bool,
}

impl RateLimitConfig {
    /// Create rate limiters with default configuration.
    pub fn new(trust_forwarded_for: bool) -> Self {
        Self::with_quota(
            trust_forwarded_for,
            DEFAULT_LOGIN_PER_MINUTE,
            DEFAULT_LOGIN_BURST,
        )
    }

    /// Allow `per_minute` sustained login attempts per IP with bursts of
    /// `burst`. Zero values are raised to one.
    pub fn with_quota(trust_forwarded_for: bool, per_minute: u32, burst: u32) -> Self {
        let per_minute = NonZeroU32::new(per_minute).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(burst).unwrap_or(NonZeroU32::MIN);
        Self {
            login: Arc::new(RateLimiter::keyed(
                Quota::per_minute(per_minute).allow_burst(burst),
            )),
            trust_forwarded_for,
        }
    }
}

/// Middleware for rate limiting the login endpoint.
pub async fn rate_limit_login(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Response {
    let Some(ip) = extract_client_ip(&request, config.trust_forwarded_for) else {
        return (StatusCode::FORBIDDEN, "Unable to determine client IP.").into_response();
    };

    match config.login.check_key(&ip) {
        Ok(_) => next.run(request).await,
        Err(_) => {
            warn!(ip = %ip, "Login rate limit exceeded");
            (
                StatusCode::TOO_MANY_REQUESTS,
                Json(serde_json::json!({
                    "success": false,
                    "message": "Too many login attempts. Please wait before trying again."
                })),
            )
                .into_response()
        }
    }
}
