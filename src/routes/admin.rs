use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};

use crate::auth::Actor;
use crate::error::AppResult;
use crate::notify::dedup::{ReportItem, ReportQuery};
use crate::services::notifications::{
    self, AnnouncementReceipt, AnnouncementRequest, BulkReadOutcome,
};
use crate::state::AppState;

pub async fn list_reports(
    State(state): State<AppState>,
    actor: Actor,
    Query(query): Query<ReportQuery>,
) -> AppResult<Json<Vec<ReportItem>>> {
    let items = notifications::list_reports(&state, &actor, &query).await?;
    Ok(Json(items))
}

pub async fn announce(
    State(state): State<AppState>,
    actor: Actor,
    Json(payload): Json<AnnouncementRequest>,
) -> AppResult<(StatusCode, Json<AnnouncementReceipt>)> {
    let receipt = notifications::announce(&state, &actor, payload).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

pub async fn mark_all_admin_notifications_read(
    State(state): State<AppState>,
    actor: Actor,
) -> AppResult<Json<BulkReadOutcome>> {
    let outcome = notifications::mark_all_read_for_admins(&state, &actor).await?;
    Ok(Json(outcome))
}
