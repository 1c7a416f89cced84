//! IP block endpoints (admin only).

use axum::{Json, Router, extract::State, response::IntoResponse, routing::get};
use mozo_common::AppResult;
use mozo_core::{BlockCallerInput, BlockOutcome};
use mozo_db::entities::ip_block;
use serde::Deserialize;

use crate::{
    extractors::StaffProfile,
    middleware::AppState,
    response::{ApiResponse, no_content},
};

#[derive(Debug, Deserialize)]
pub struct UnblockRequest {
    pub block_id: String,
}

async fn block(
    StaffProfile(staff): StaffProfile,
    State(state): State<AppState>,
    Json(input): Json<BlockCallerInput>,
) -> AppResult<ApiResponse<BlockOutcome>> {
    let outcome = state.ip_block_service.block_caller(&staff, input).await?;
    Ok(ApiResponse::created(outcome))
}

async fn unblock(
    StaffProfile(staff): StaffProfile,
    State(state): State<AppState>,
    Json(req): Json<UnblockRequest>,
) -> AppResult<impl IntoResponse> {
    state.ip_block_service.unblock(&staff, &req.block_id).await?;
    Ok(no_content())
}

async fn list(
    StaffProfile(staff): StaffProfile,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<Vec<ip_block::Model>>> {
    let blocks = state.ip_block_service.list(&staff).await?;
    Ok(ApiResponse::ok(blocks))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(list).post(block).delete(unblock))
}
