//! API integration tests.
//!
//! These tests verify the API endpoints work correctly together.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::redundant_clone)]

use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
    middleware,
    routing::get,
};
use mozo_api::{AppState, RateLimiterState, auth_middleware, health, router as api_router};
use mozo_common::config::CallPolicyConfig;
use mozo_core::{
    CallService, DispatchService, HistoryService, IpBlockService, LocalEventBus, NoOpPushDelivery,
    NoOpPushSender, ProfileService, PushNotificationService, SilenceService, TableService,
};
use mozo_db::entities::dining_table;
use mozo_db::repositories::{
    DeviceTokenRepository, DiningTableRepository, IpBlockRepository, StaffProfileRepository,
    TableSilenceRepository, UserRepository, WaiterCallRepository,
};
use sea_orm::{DatabaseBackend, DatabaseConnection, MockDatabase};
use serde_json::Value;
use tower::ServiceExt;

/// Create test app state on top of a mock database.
fn create_test_state(db: DatabaseConnection) -> AppState {
    let db = Arc::new(db);
    let events = LocalEventBus::new(16);

    let profile_service = ProfileService::new(StaffProfileRepository::new(Arc::clone(&db)));
    let push_notification_service = PushNotificationService::new(
        DeviceTokenRepository::new(Arc::clone(&db)),
        Arc::new(NoOpPushSender),
    );
    let dispatch = DispatchService::new(
        Arc::new(events.clone()),
        Arc::new(NoOpPushDelivery),
        profile_service.clone(),
    );

    let tables = DiningTableRepository::new(Arc::clone(&db));
    let calls = WaiterCallRepository::new(Arc::clone(&db));
    let silences = TableSilenceRepository::new(Arc::clone(&db));
    let ip_blocks = IpBlockRepository::new(Arc::clone(&db));

    let silence_service = SilenceService::new(silences.clone(), tables.clone(), dispatch.clone());
    let call_service = CallService::new(
        calls.clone(),
        tables.clone(),
        ip_blocks.clone(),
        silence_service.clone(),
        dispatch,
        CallPolicyConfig::default(),
    );
    let table_service = TableService::new(
        tables.clone(),
        silences,
        calls.clone(),
        call_service.clone(),
    );
    let history_service = HistoryService::new(calls.clone(), tables.clone());
    let ip_block_service = IpBlockService::new(ip_blocks, calls, tables, silence_service.clone());

    AppState {
        user_repository: UserRepository::new(Arc::clone(&db)),
        profile_service,
        call_service,
        silence_service,
        table_service,
        history_service,
        ip_block_service,
        push_notification_service,
        events,
        rate_limiter: RateLimiterState::new(),
    }
}

fn create_app(db: DatabaseConnection) -> Router {
    let state = create_test_state(db);

    Router::new()
        .route("/health", get(health))
        .nest("/api", api_router(state.rate_limiter.clone()))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state)
}

fn empty_db() -> DatabaseConnection {
    MockDatabase::new(DatabaseBackend::Postgres).into_connection()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health() {
    let app = create_app(empty_db());

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_staff_endpoint_requires_auth() {
    let app = create_app(empty_db());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/calls/pending")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_unknown_route() {
    let app = create_app(empty_db());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/nonexistent")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_create_call_rejects_malformed_json() {
    let app = create_app(empty_db());

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/calls")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn test_create_call_unknown_table() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([Vec::<dining_table::Model>::new()])
        .into_connection();
    let app = create_app(db);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/calls")
                .header(header::CONTENT_TYPE, "application/json")
                .header("x-forwarded-for", "203.0.113.7")
                .body(Body::from(r#"{"table_id":"missing"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], "TABLE_NOT_FOUND");
}

#[tokio::test]
async fn test_create_call_validates_input() {
    let app = create_app(empty_db());

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/calls")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"table_id":""}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_table_event_stream() {
    let app = create_app(empty_db());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/sse/table/t5")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap();
    assert!(content_type.starts_with("text/event-stream"));
}

#[tokio::test]
async fn test_business_stream_requires_auth() {
    let app = create_app(empty_db());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/sse/business")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
