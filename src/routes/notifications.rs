use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::auth::Actor;
use crate::error::AppResult;
use crate::models::Notification;
use crate::services::notifications::{self, BulkReadOutcome, ReadOutcome};
use crate::state::AppState;

pub async fn list_notifications(
    State(state): State<AppState>,
    actor: Actor,
) -> AppResult<Json<Vec<Notification>>> {
    Ok(Json(notifications::list_for(&state, &actor).await?))
}

pub async fn mark_read(
    State(state): State<AppState>,
    actor: Actor,
    Path(notification_id): Path<Uuid>,
) -> AppResult<Json<ReadOutcome>> {
    Ok(Json(
        notifications::mark_read(&state, &actor, notification_id).await?,
    ))
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    actor: Actor,
) -> AppResult<Json<BulkReadOutcome>> {
    Ok(Json(notifications::mark_all_read(&state, &actor).await?))
}

pub async fn delete_notification(
    State(state): State<AppState>,
    actor: Actor,
    Path(notification_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    notifications::delete(&state, &actor, notification_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
