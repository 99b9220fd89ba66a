use axum::{extract::State, http::StatusCode, response::Json};
use serde_json::json;

use crate::state::AppState;

pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({ "status": "ok", "store": state.config.store_backend.as_str() })),
    )
}
