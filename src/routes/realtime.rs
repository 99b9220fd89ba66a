use axum::{
    extract::{ws::WebSocketUpgrade, Query, State},
    http::{header::AUTHORIZATION, HeaderMap},
    response::Response,
};
use serde::Deserialize;

use crate::auth::actor_from_token;
use crate::error::{AppError, AppResult};
use crate::realtime::serve_connection;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ConnectParams {
    pub access_token: Option<String>,
}

pub async fn connect(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ConnectParams>,
    upgrade: WebSocketUpgrade,
) -> AppResult<Response> {
    let token = bearer_token(&headers)
        .or(params.access_token)
        .ok_or_else(AppError::unauthorized)?;
    let actor = actor_from_token(&state, &token).await?;

    let hub = state.hub.clone();
    let user_id = actor.id();
    Ok(upgrade.on_upgrade(move |socket| serve_connection(socket, hub, user_id)))
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(|token| token.trim().to_string())
}
