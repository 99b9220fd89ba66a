use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;

use crate::auth::Actor;
use crate::error::AppResult;
use crate::services::restoration::{self, RestorationPreview, RestoredListing};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RestoreRequest {
    #[serde(default)]
    pub confirm: bool,
}

pub async fn verify_token(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> AppResult<Json<RestorationPreview>> {
    let preview = restoration::verify(&state, &token).await?;
    Ok(Json(preview))
}

/// The caller may be anonymous; a signed-in caller is recorded as the
/// restorer, otherwise the owner is.
pub async fn restore_listing(
    State(state): State<AppState>,
    caller: Option<Actor>,
    Path(token): Path<String>,
    Json(payload): Json<RestoreRequest>,
) -> AppResult<Json<RestoredListing>> {
    let restored = restoration::restore(
        &state,
        &token,
        payload.confirm,
        caller.map(|actor| actor.id()),
    )
    .await?;
    Ok(Json(restored))
}
