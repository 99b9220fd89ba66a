use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::auth::Actor;
use crate::error::{AppError, AppResult};
use crate::models::ListingChanges;
use crate::services::deletion::{self, DeletionOutcome};
use crate::services::listings::{self as listing_service, ListingUpdateOutcome};
use crate::state::AppState;
use crate::utils::json::{classify_nullable, NullableValue};

#[derive(Debug, Default, Deserialize)]
pub struct DeleteListingRequest {
    pub reason: Option<String>,
}

#[derive(Serialize)]
pub struct SubscriptionResponse {
    pub listing_id: Uuid,
    pub subscribed: bool,
    pub changed: bool,
}

pub async fn delete_listing(
    State(state): State<AppState>,
    actor: Actor,
    Path(listing_id): Path<Uuid>,
    payload: Option<Json<DeleteListingRequest>>,
) -> AppResult<Json<DeletionOutcome>> {
    let Json(payload) = payload.unwrap_or_default();
    let outcome = deletion::delete_listing(&state, &actor, listing_id, payload.reason).await?;
    Ok(Json(outcome))
}

pub async fn update_listing(
    State(state): State<AppState>,
    actor: Actor,
    Path(listing_id): Path<Uuid>,
    Json(body): Json<Value>,
) -> AppResult<Json<ListingUpdateOutcome>> {
    let changes = parse_changes(&body)?;
    let outcome = listing_service::update_listing(&state, &actor, listing_id, changes).await?;
    Ok(Json(outcome))
}

fn parse_changes(body: &Value) -> AppResult<ListingChanges> {
    let regular_price = classify_nullable::<i64>(body.get("regular_price"))
        .map_err(AppError::bad_request)?
        .into_change();
    let discount_price = classify_nullable::<i64>(body.get("discount_price"))
        .map_err(AppError::bad_request)?
        .into_change();
    let offer = match classify_nullable::<bool>(body.get("offer")).map_err(AppError::bad_request)? {
        NullableValue::Omitted => None,
        NullableValue::Null => return Err(AppError::bad_request("offer cannot be null")),
        NullableValue::Value(value) => Some(value),
    };
    let status =
        match classify_nullable::<String>(body.get("status")).map_err(AppError::bad_request)? {
            NullableValue::Omitted => None,
            NullableValue::Null => return Err(AppError::bad_request("status cannot be null")),
            NullableValue::Value(value) => Some(value),
        };

    Ok(ListingChanges {
        regular_price,
        discount_price,
        offer,
        status,
        updated_at: None,
    })
}

pub async fn subscribe(
    State(state): State<AppState>,
    actor: Actor,
    Path(listing_id): Path<Uuid>,
) -> AppResult<(StatusCode, Json<SubscriptionResponse>)> {
    let created = listing_service::subscribe(&state, &actor, listing_id).await?;
    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((
        status,
        Json(SubscriptionResponse {
            listing_id,
            subscribed: true,
            changed: created,
        }),
    ))
}

pub async fn unsubscribe(
    State(state): State<AppState>,
    actor: Actor,
    Path(listing_id): Path<Uuid>,
) -> AppResult<Json<SubscriptionResponse>> {
    let removed = listing_service::unsubscribe(&state, &actor, listing_id).await?;
    Ok(Json(SubscriptionResponse {
        listing_id,
        subscribed: false,
        changed: removed,
    }))
}
