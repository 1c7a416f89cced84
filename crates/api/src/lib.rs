//! HTTP API layer for mozo.
//!
//! This crate provides the REST API and real-time streaming:
//!
//! - **Endpoints**: call intake, the waiter workflow, tables, silences and IP blocks
//! - **Extractors**: bearer authentication and staff profile resolution
//! - **Middleware**: authentication and rate limiting
//! - **Streaming**: WebSocket and Server-Sent Events
//!
//! Built on Axum 0.8 with Tower middleware stack.

pub mod endpoints;
pub mod extractors;
pub mod middleware;
pub mod rate_limit;
pub mod response;
pub mod sse;
pub mod streaming;

pub use endpoints::{health, router};
pub use middleware::{AppState, auth_middleware};
pub use rate_limit::{
    ApiRateLimiter, RateLimitConfig, RateLimiterState, call_intake_rate_limit,
    rate_limit_middleware,
};
pub use streaming::streaming_handler;
