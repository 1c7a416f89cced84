//! Device token endpoints.

use axum::{Json, Router, extract::State, response::IntoResponse, routing::get};
use mozo_common::AppResult;
use mozo_core::RegisterDeviceInput;
use mozo_db::entities::device_token;
use serde::Deserialize;

use crate::{
    extractors::StaffProfile,
    middleware::AppState,
    response::{ApiResponse, no_content},
};

#[derive(Debug, Deserialize)]
pub struct UnregisterRequest {
    pub token: String,
}

async fn register(
    StaffProfile(staff): StaffProfile,
    State(state): State<AppState>,
    Json(input): Json<RegisterDeviceInput>,
) -> AppResult<ApiResponse<device_token::Model>> {
    let token = state
        .push_notification_service
        .register(staff.id(), input)
        .await?;
    Ok(ApiResponse::created(token))
}

async fn unregister(
    StaffProfile(staff): StaffProfile,
    State(state): State<AppState>,
    Json(req): Json<UnregisterRequest>,
) -> AppResult<impl IntoResponse> {
    state
        .push_notification_service
        .unregister(staff.id(), &req.token)
        .await?;
    Ok(no_content())
}

async fn list(
    StaffProfile(staff): StaffProfile,
    State(state): State<AppState>,
) -> AppResult<ApiResponse<Vec<device_token::Model>>> {
    let tokens = state.push_notification_service.list(staff.id()).await?;
    Ok(ApiResponse::ok(tokens))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(list).post(register).delete(unregister))
}
