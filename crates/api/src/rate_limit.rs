//! API rate limiting middleware.
//!
//! Staff endpoints are limited per user, public call intake per client IP.

#![allow(missing_docs)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use mozo_db::entities::user;
use tokio::sync::RwLock;

use crate::extractors::forwarded_ip;

/// Rate limit configuration for different endpoint types.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum requests per window.
    pub max_requests: u32,
    /// Time window duration in seconds.
    pub window_secs: u64,
}

impl RateLimitConfig {
    pub const fn new(max_requests: u32, window_secs: u64) -> Self {
        Self {
            max_requests,
            window_secs,
        }
    }
}

/// Default rate limits for different endpoint categories.
pub mod limits {
    use super::RateLimitConfig;

    /// Staff endpoints.
    pub const STANDARD: RateLimitConfig = RateLimitConfig::new(300, 60);

    /// Public call intake, per client IP.
    pub const CALL_INTAKE: RateLimitConfig = RateLimitConfig::new(10, 60);
}

#[derive(Debug, Clone)]
struct RateLimitState {
    count: u32,
    window_start: Instant,
}

impl RateLimitState {
    fn new() -> Self {
        Self {
            count: 0,
            window_start: Instant::now(),
        }
    }
}

/// Fixed-window rate limiter keyed by user ID or IP address.
#[derive(Clone)]
pub struct ApiRateLimiter {
    states: Arc<RwLock<HashMap<String, RateLimitState>>>,
}

impl Default for ApiRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl ApiRateLimiter {
    #[must_use]
    pub fn new() -> Self {
        Self {
            states: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Check if a request is allowed and record it.
    pub async fn check(&self, key: &str, config: &RateLimitConfig) -> RateLimitResult {
        let mut states = self.states.write().await;
        let now = Instant::now();
        let window = Duration::from_secs(config.window_secs);

        let state = states
            .entry(key.to_string())
            .or_insert_with(RateLimitState::new);

        if now.duration_since(state.window_start) >= window {
            state.count = 0;
            state.window_start = now;
        }

        let reset = window
            .saturating_sub(now.duration_since(state.window_start))
            .as_secs();

        if state.count >= config.max_requests {
            return RateLimitResult::Limited {
                retry_after: reset.max(1),
                limit: config.max_requests,
            };
        }

        state.count += 1;

        RateLimitResult::Allowed {
            remaining: config.max_requests.saturating_sub(state.count),
            limit: config.max_requests,
            reset,
        }
    }

    /// Drop keys whose window ended long ago.
    pub async fn cleanup(&self, max_window_secs: u64) {
        let mut states = self.states.write().await;
        let now = Instant::now();
        let max_window = Duration::from_secs(max_window_secs * 2);

        states.retain(|_, state| now.duration_since(state.window_start) < max_window);
    }

    pub async fn key_count(&self) -> usize {
        self.states.read().await.len()
    }
}

/// Rate limit check result.
#[derive(Debug, Clone)]
pub enum RateLimitResult {
    Allowed {
        remaining: u32,
        limit: u32,
        /// Seconds until window reset.
        reset: u64,
    },
    Limited {
        retry_after: u64,
        limit: u32,
    },
}

/// Rate limiter state for middleware.
#[derive(Clone, Default)]
pub struct RateLimiterState {
    /// Per-user limiter for staff requests.
    pub user_limiter: ApiRateLimiter,
    /// Per-IP limiter for anonymous requests and call intake.
    pub ip_limiter: ApiRateLimiter,
}

impl RateLimiterState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Periodic cleanup of both limiters.
    pub async fn cleanup(&self) {
        self.user_limiter.cleanup(limits::STANDARD.window_secs).await;
        self.ip_limiter.cleanup(limits::CALL_INTAKE.window_secs).await;
    }
}

/// Rate limit error response.
#[derive(Debug)]
pub struct RateLimitError {
    pub retry_after: u64,
}

impl IntoResponse for RateLimitError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": {
                "code": "RATE_LIMITED",
                "message": "Too many requests",
                "retry_after": self.retry_after
            }
        });

        (
            StatusCode::TOO_MANY_REQUESTS,
            [
                ("Retry-After", self.retry_after.to_string()),
                ("Content-Type", "application/json".to_string()),
            ],
            body.to_string(),
        )
            .into_response()
    }
}

fn client_ip_key(req: &Request<Body>) -> String {
    let ip = forwarded_ip(req.headers()).or_else(|| {
        req.extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip())
    });

    ip.map_or_else(|| "ip:unknown".to_string(), |ip| format!("ip:{ip}"))
}

/// Rate limiting middleware for staff endpoints.
pub async fn rate_limit_middleware(
    State(limiter): State<RateLimiterState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, RateLimitError> {
    // Set by auth middleware
    let result = if let Some(user) = req.extensions().get::<user::Model>() {
        let key = format!("user:{}", user.id);
        limiter.user_limiter.check(&key, &limits::STANDARD).await
    } else {
        let key = client_ip_key(&req);
        limiter.ip_limiter.check(&key, &limits::STANDARD).await
    };

    finish(result, req, next).await
}

/// Rate limiting middleware for public call intake.
pub async fn call_intake_rate_limit(
    State(limiter): State<RateLimiterState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, RateLimitError> {
    let key = format!("intake:{}", client_ip_key(&req));
    let result = limiter.ip_limiter.check(&key, &limits::CALL_INTAKE).await;

    finish(result, req, next).await
}

async fn finish(
    result: RateLimitResult,
    req: Request<Body>,
    next: Next,
) -> Result<Response, RateLimitError> {
    match result {
        RateLimitResult::Allowed {
            remaining,
            limit,
            reset,
        } => {
            let mut response = next.run(req).await;

            let headers = response.headers_mut();
            headers.insert("X-RateLimit-Limit", limit.into());
            headers.insert("X-RateLimit-Remaining", remaining.into());
            headers.insert("X-RateLimit-Reset", reset.into());

            Ok(response)
        }
        RateLimitResult::Limited { retry_after, limit } => {
            tracing::debug!(limit, retry_after, "Rate limit exceeded");
            Err(RateLimitError { retry_after })
        }
    }
}
