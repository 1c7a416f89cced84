//! API middleware.

#![allow(missing_docs)]

use axum::{body::Body, extract::State, http::Request, middleware::Next, response::Response};
use mozo_core::{
    CallService, HistoryService, IpBlockService, LocalEventBus, ProfileService,
    PushNotificationService, SilenceService, TableService,
};
use mozo_db::repositories::UserRepository;

use crate::rate_limit::RateLimiterState;

/// Application state.
#[derive(Clone)]
pub struct AppState {
    pub user_repository: UserRepository,
    pub profile_service: ProfileService,
    pub call_service: CallService,
    pub silence_service: SilenceService,
    pub table_service: TableService,
    pub history_service: HistoryService,
    pub ip_block_service: IpBlockService,
    pub push_notification_service: PushNotificationService,
    /// Realtime events for streaming connections.
    pub events: LocalEventBus,
    pub rate_limiter: RateLimiterState,
}

/// Authentication middleware.
///
/// Resolves `Authorization: Bearer <api_token>` to a user and stores it in
/// the request extensions. Requests without a valid token pass through
/// anonymously; extractors decide whether that is acceptable.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    if let Some(token) = bearer_token(&req) {
        match state.user_repository.find_by_token(token).await {
            Ok(Some(user)) => {
                req.extensions_mut().insert(user);
            }
            Ok(None) => tracing::debug!("Unknown API token"),
            Err(e) => tracing::warn!(error = %e, "Token lookup failed"),
        }
    }

    next.run(req).await
}

fn bearer_token(req: &Request<Body>) -> Option<&str> {
    req.headers()
        .get("Authorization")?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer_token() {
        let req = Request::builder()
            .header("Authorization", "Bearer abc123")
            .body(Body::empty())
            .unwrap();
        assert_eq!(bearer_token(&req), Some("abc123"));

        let req = Request::builder()
            .header("Authorization", "Basic abc123")
            .body(Body::empty())
            .unwrap();
        assert_eq!(bearer_token(&req), None);

        let req = Request::builder()
            .header("Authorization", "Bearer ")
            .body(Body::empty())
            .unwrap();
        assert_eq!(bearer_token(&req), None);
    }
}
