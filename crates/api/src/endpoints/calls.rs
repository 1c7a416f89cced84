//! Call endpoints.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    middleware,
    routing::{get, post},
};
use chrono::{DateTime, FixedOffset, Utc};
use mozo_common::AppResult;
use mozo_core::{
    CallIntake, CallStats, CreateCallInput, HistoryFilter, HistoryPage, HistoryParams, QueuedCall,
    SilenceView,
};
use mozo_db::entities::waiter_call::{self, CallStatus, CallUrgency};
use serde::{Deserialize, Serialize};

use crate::{
    extractors::{ClientInfo, StaffProfile},
    middleware::AppState,
    rate_limit::{RateLimiterState, call_intake_rate_limit},
    response::ApiResponse,
};

// ==================== Request/Response Types ====================

/// Body of the acknowledge, complete and cancel endpoints.
#[derive(Debug, Deserialize)]
pub struct CallRef {
    pub call_id: String,
}

/// Query string of the stats endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct StatsParams {
    #[serde(default)]
    pub filter: HistoryFilter,
}

/// Answer to a table placing a call.
#[derive(Debug, Serialize)]
pub struct CallReceipt {
    pub call_id: Option<String>,
    pub status: &'static str,
}

/// Public view of a call.
#[derive(Debug, Serialize)]
pub struct CallResponse {
    pub call_id: String,
    pub table_id: String,
    pub status: CallStatus,
    pub urgency: CallUrgency,
    pub message: String,
    pub waiter_id: Option<String>,
    pub called_at: DateTime<Utc>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub response_seconds: Option<i64>,
    pub total_seconds: Option<i64>,
}

impl From<waiter_call::Model> for CallResponse {
    fn from(c: waiter_call::Model) -> Self {
        let utc = |at: Option<DateTime<FixedOffset>>| at.map(|t| t.with_timezone(&Utc));
        Self {
            response_seconds: c.response_seconds(),
            total_seconds: c.total_seconds(),
            call_id: c.id,
            table_id: c.table_id,
            status: c.status,
            urgency: c.urgency,
            message: c.message,
            waiter_id: c.waiter_id,
            called_at: c.called_at.with_timezone(&Utc),
            acknowledged_at: utc(c.acknowledged_at),
            completed_at: utc(c.completed_at),
            cancelled_at: utc(c.cancelled_at),
        }
    }
}

/// A completed call and the silence that followed it.
#[derive(Debug, Serialize)]
pub struct CompletionResponse {
    #[serde(flatten)]
    pub call: CallResponse,
    pub silence: Option<SilenceView>,
}

// ==================== Handlers ====================

/// Place a call from a table. Public.
async fn create(
    State(state): State<AppState>,
    client: ClientInfo,
    Json(input): Json<CreateCallInput>,
) -> AppResult<ApiResponse<CallReceipt>> {
    let receipt = match state
        .call_service
        .create_call(input, client.into_origin())
        .await?
    {
        CallIntake::Created(call) => CallReceipt {
            call_id: Some(call.id),
            status: call.status.as_str(),
        },
        CallIntake::Blocked => CallReceipt {
            call_id: None,
            status: "received",
        },
    };

    Ok(ApiResponse::created(receipt))
}

/// Current state of a call. Public, for table clients that lost realtime.
async fn show(
    State(state): State<AppState>,
    Path(call_id): Path<String>,
) -> AppResult<ApiResponse<CallResponse>> {
    let call = state.call_service.get(&call_id).await?;
    Ok(ApiResponse::ok(call.into()))
}

async fn acknowledge(
    StaffProfile(staff): StaffProfile,
    State(state): State<AppState>,
    Json(req): Json<CallRef>,
) -> AppResult<ApiResponse<CallResponse>> {
    let call = state.call_service.acknowledge(&staff, &req.call_id).await?;
    Ok(ApiResponse::ok(call.into()))
}

async fn complete(
    StaffProfile(staff): StaffProfile,
    State(state): State<AppState>,
    Json(req): Json<CallRef>,
) -> AppResult<ApiResponse<CompletionResponse>> {
    let completion = state.call_service.complete(&staff, &req.call_id).await?;
    let now = Utc::now().fixed_offset();

    Ok(ApiResponse::ok(CompletionResponse {
        silence: completion
            .silence
            .as_ref()
            .map(|s| SilenceView::new(s, None, now)),
        call: completion.call.into(),
    }))
}

async fn cancel(
    StaffProfile(staff): StaffProfile,
    State(state): State<AppState>,
    Json(req): Json<CallRef>,
) -> AppResult<ApiResponse<CallResponse>> {
    let call = state.call_service.cancel(&staff, &req.call_id).await?;
    Ok(ApiResponse::ok(call.into()))
}

async fn pending(
    StaffProfile(staff): StaffProfile,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<Vec<QueuedCall>>> {
    let queue = state.call_service.pending_queue(&staff).await?;
    Ok(ApiResponse::ok(queue))
}

async fn history(
    StaffProfile(staff): StaffProfile,
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> AppResult<ApiResponse<HistoryPage>> {
    let page = state.history_service.history(&staff, params).await?;
    Ok(ApiResponse::ok(page))
}

async fn stats(
    StaffProfile(staff): StaffProfile,
    State(state): State<AppState>,
    Query(params): Query<StatsParams>,
) -> AppResult<ApiResponse<CallStats>> {
    let stats = state.history_service.stats(&staff, params.filter).await?;
    Ok(ApiResponse::ok(stats))
}

// ==================== Router ====================

pub fn router(limiter: RateLimiterState) -> Router<AppState> {
    Router::new()
        .route(
            "/",
            post(create).route_layer(middleware::from_fn_with_state(
                limiter,
                call_intake_rate_limit,
            )),
        )
        .route("/acknowledge", post(acknowledge))
        .route("/complete", post(complete))
        .route("/cancel", post(cancel))
        .route("/pending", get(pending))
        .route("/history", get(history))
        .route("/stats", get(stats))
        .route("/{id}", get(show))
}
