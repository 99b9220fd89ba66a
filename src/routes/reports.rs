use axum::{extract::State, http::StatusCode, Json};

use crate::auth::Actor;
use crate::error::AppResult;
use crate::services::reports::{
    self, ChatReportRequest, ListingReportRequest, MessageReportRequest, ReportReceipt,
    ReviewReportRequest,
};
use crate::state::AppState;

pub async fn report_message(
    State(state): State<AppState>,
    actor: Actor,
    Json(payload): Json<MessageReportRequest>,
) -> AppResult<(StatusCode, Json<ReportReceipt>)> {
    let receipt = reports::report_message(&state, &actor, payload).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

pub async fn report_chat(
    State(state): State<AppState>,
    actor: Actor,
    Json(payload): Json<ChatReportRequest>,
) -> AppResult<(StatusCode, Json<ReportReceipt>)> {
    let receipt = reports::report_chat(&state, &actor, payload).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

pub async fn report_listing(
    State(state): State<AppState>,
    actor: Actor,
    Json(payload): Json<ListingReportRequest>,
) -> AppResult<(StatusCode, Json<ReportReceipt>)> {
    let receipt = reports::report_listing(&state, &actor, payload).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

pub async fn report_review(
    State(state): State<AppState>,
    actor: Actor,
    Json(payload): Json<ReviewReportRequest>,
) -> AppResult<(StatusCode, Json<ReportReceipt>)> {
    let receipt = reports::report_review(&state, &actor, payload).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}
