pub mod jwt;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use axum_extra::headers::{authorization::Bearer, Authorization};
use axum_extra::TypedHeader;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{error::AppError, models::Account, state::AppState, store::Directory};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub username: String,
    pub role: String,
}

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| AppError::unauthorized())?;

        let claims = state
            .jwt
            .verify_token(bearer.token())
            .map_err(|_| AppError::unauthorized())?;

        Ok(AuthenticatedUser {
            user_id: claims.sub,
            username: claims.username,
            role: claims.role,
        })
    }
}

/// The caller as the directory currently knows them. Roles, approval and
/// suspension come from the account record, not from token claims.
#[derive(Debug, Clone)]
pub struct Actor {
    pub account: Account,
}

impl Actor {
    pub fn new(account: Account) -> Self {
        Self { account }
    }

    pub fn id(&self) -> Uuid {
        self.account.id
    }

    pub fn is_privileged(&self) -> bool {
        self.account.is_privileged()
    }
}

#[async_trait]
impl FromRequestParts<AppState> for Actor {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = AuthenticatedUser::from_request_parts(parts, state).await?;
        load_actor(state, user.user_id).await
    }
}

/// Resolves a raw bearer token to an actor, for callers outside the
/// extractor path such as the WebSocket handshake.
pub async fn actor_from_token(state: &AppState, token: &str) -> Result<Actor, AppError> {
    let claims = state
        .jwt
        .verify_token(token)
        .map_err(|_| AppError::unauthorized())?;
    load_actor(state, claims.sub).await
}

async fn load_actor(state: &AppState, user_id: Uuid) -> Result<Actor, AppError> {
    let account = state
        .store
        .find_account(user_id)
        .await?
        .ok_or_else(AppError::unauthorized)?;

    if account.suspended {
        return Err(AppError::forbidden("account is suspended"));
    }

    Ok(Actor::new(account))
}
