use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::fmt::Display;
use thiserror::Error;

use crate::store::StoreError;

pub type AppResult<T> = Result<T, AppError>;

pub type ServiceResult<T> = Result<T, ServiceError>;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("unauthorized")]
    Unauthorized,
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    InvalidArgument(String),
    #[error("restoration token has expired or was already used")]
    TokenExpiredOrUsed,
    #[error("listing has already been restored")]
    AlreadyRestored,
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    RateLimited(String),
    #[error("{0}")]
    Internal(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ServiceError {
    pub fn forbidden(message: impl Into<String>) -> Self {
        ServiceError::Forbidden(message.into())
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        ServiceError::InvalidArgument(message.into())
    }
}

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl AppError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_argument", message)
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized", "unauthorized")
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "forbidden", message)
    }

    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", "resource not found")
    }

    pub fn internal<E: Display>(error: E) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal",
            error.to_string(),
        )
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &'static str {
        self.code
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status;
        let body = Json(ErrorResponse {
            error: self.message,
            code: self.code,
        });
        (status, body).into_response()
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: &'static str,
}

impl From<ServiceError> for AppError {
    fn from(value: ServiceError) -> Self {
        let message = value.to_string();
        match value {
            ServiceError::NotFound(_) => Self::new(StatusCode::NOT_FOUND, "not_found", message),
            ServiceError::Unauthorized => AppError::unauthorized(),
            ServiceError::Forbidden(_) => AppError::forbidden(message),
            ServiceError::InvalidArgument(_) => AppError::bad_request(message),
            ServiceError::TokenExpiredOrUsed => {
                Self::new(StatusCode::GONE, "token_expired_or_used", message)
            }
            ServiceError::AlreadyRestored => {
                Self::new(StatusCode::CONFLICT, "already_restored", message)
            }
            ServiceError::Conflict(_) => Self::new(StatusCode::CONFLICT, "conflict", message),
            ServiceError::RateLimited(_) => {
                Self::new(StatusCode::TOO_MANY_REQUESTS, "rate_limited", message)
            }
            ServiceError::Internal(_) => AppError::internal(message),
            ServiceError::Store(err) => AppError::internal(err),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(value: StoreError) -> Self {
        AppError::internal(value)
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(value: jsonwebtoken::errors::Error) -> Self {
        AppError::internal(value)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(value: anyhow::Error) -> Self {
        AppError::internal(value)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(value: serde_json::Error) -> Self {
        AppError::internal(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restoration_failures_map_to_distinct_codes() {
        let expired = AppError::from(ServiceError::TokenExpiredOrUsed);
        assert_eq!(expired.status(), StatusCode::GONE);
        assert_eq!(expired.code(), "token_expired_or_used");

        let restored = AppError::from(ServiceError::AlreadyRestored);
        assert_eq!(restored.status(), StatusCode::CONFLICT);
        assert_eq!(restored.code(), "already_restored");

        let conflict = AppError::from(ServiceError::Conflict("taken".into()));
        assert_eq!(conflict.status(), StatusCode::CONFLICT);
        assert_eq!(conflict.code(), "conflict");
    }

    #[test]
    fn rate_limit_keeps_its_message() {
        let err = AppError::from(ServiceError::RateLimited("at most 5 per hour".into()));
        assert_eq!(err.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(err.message, "at most 5 per hour");
    }
}
