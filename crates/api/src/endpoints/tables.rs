//! Table endpoints: assignment, settings and silences.

use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};
use chrono::Utc;
use mozo_common::AppResult;
use mozo_core::{
    BulkSilenceReport, Deactivation, NotificationsInput, SilenceInput, SilenceView,
    TableOverview, TableRef,
};
use mozo_db::entities::dining_table;
use serde::Deserialize;

use crate::{extractors::StaffProfile, middleware::AppState, response::ApiResponse};

// ==================== Request Types ====================

#[derive(Debug, Deserialize)]
pub struct SilenceRequest {
    pub table_id: String,
    #[serde(flatten)]
    pub input: SilenceInput,
}

#[derive(Debug, Deserialize)]
pub struct BulkSilenceRequest {
    pub table_ids: Vec<String>,
    #[serde(flatten)]
    pub input: SilenceInput,
}

#[derive(Debug, Deserialize)]
pub struct BulkUnsilenceRequest {
    pub table_ids: Vec<String>,
}

// ==================== Handlers ====================

async fn overview(
    StaffProfile(staff): StaffProfile,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<Vec<TableOverview>>> {
    let tables = state.table_service.overview(&staff).await?;
    Ok(ApiResponse::ok(tables))
}

async fn activate(
    StaffProfile(staff): StaffProfile,
    State(state): State<AppState>,
    Json(req): Json<TableRef>,
) -> AppResult<ApiResponse<dining_table::Model>> {
    let table = state.table_service.activate(&staff, &req.table_id).await?;
    Ok(ApiResponse::ok(table))
}

async fn deactivate(
    StaffProfile(staff): StaffProfile,
    State(state): State<AppState>,
    Json(req): Json<TableRef>,
) -> AppResult<ApiResponse<Deactivation>> {
    let result = state.table_service.deactivate(&staff, &req.table_id).await?;
    Ok(ApiResponse::ok(result))
}

async fn set_notifications(
    StaffProfile(staff): StaffProfile,
    State(state): State<AppState>,
    Json(input): Json<NotificationsInput>,
) -> AppResult<ApiResponse<dining_table::Model>> {
    let table = state.table_service.set_notifications(&staff, input).await?;
    Ok(ApiResponse::ok(table))
}

async fn silence(
    StaffProfile(staff): StaffProfile,
    State(state): State<AppState>,
    Json(req): Json<SilenceRequest>,
) -> AppResult<ApiResponse<SilenceView>> {
    let silence = state
        .silence_service
        .silence_by_staff(&staff, &req.table_id, req.input)
        .await?;
    Ok(ApiResponse::created(SilenceView::new(
        &silence,
        None,
        Utc::now().fixed_offset(),
    )))
}

async fn unsilence(
    StaffProfile(staff): StaffProfile,
    State(state): State<AppState>,
    Json(req): Json<TableRef>,
) -> AppResult<ApiResponse<SilenceView>> {
    let lifted = state
        .silence_service
        .unsilence_by_staff(&staff, &req.table_id)
        .await?;
    Ok(ApiResponse::ok(SilenceView::new(
        &lifted,
        None,
        Utc::now().fixed_offset(),
    )))
}

async fn silence_bulk(
    StaffProfile(staff): StaffProfile,
    State(state): State<AppState>,
    Json(req): Json<BulkSilenceRequest>,
) -> AppResult<ApiResponse<BulkSilenceReport>> {
    let report = state
        .silence_service
        .silence_many(&staff, &req.table_ids, req.input)
        .await?;
    Ok(ApiResponse::ok(report))
}

async fn unsilence_bulk(
    StaffProfile(staff): StaffProfile,
    State(state): State<AppState>,
    Json(req): Json<BulkUnsilenceRequest>,
) -> AppResult<ApiResponse<BulkSilenceReport>> {
    let report = state
        .silence_service
        .unsilence_many(&staff, &req.table_ids)
        .await?;
    Ok(ApiResponse::ok(report))
}

async fn silences(
    StaffProfile(staff): StaffProfile,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<Vec<SilenceView>>> {
    let active = state.silence_service.list_active(&staff).await?;
    Ok(ApiResponse::ok(active))
}

// ==================== Router ====================

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(overview))
        .route("/activate", post(activate))
        .route("/deactivate", post(deactivate))
        .route("/notifications", post(set_notifications))
        .route("/silence", post(silence).delete(unsilence))
        .route("/silence/bulk", post(silence_bulk).delete(unsilence_bulk))
        .route("/silences", get(silences))
}
