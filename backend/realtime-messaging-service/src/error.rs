use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

use crate::store::StoreError;
use crate::websocket::RegistryError;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error, Clone)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("server start failure: {0}")]
    StartServer(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden")]
    Forbidden,

    #[error("not found")]
    NotFound,

    #[error("document store error: {0}")]
    Store(String),

    #[error("too many connections for user (limit {limit})")]
    ConnectionLimit { limit: usize },

    #[error("too many pending events on this connection")]
    InboundOverflow,

    #[error("internal server error")]
    Internal,
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { .. } => AppError::NotFound,
            other => AppError::Store(other.to_string()),
        }
    }
}

impl From<RegistryError> for AppError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::ConnectionLimit { limit, .. } => AppError::ConnectionLimit { limit },
            _ => AppError::Internal,
        }
    }
}

impl AppError {
    /// Stable machine-readable code, shared by HTTP bodies and WebSocket `error` frames
    pub fn code(&self) -> &'static str {
        match self {
            AppError::BadRequest(_) => "bad_request",
            AppError::Unauthorized => "unauthorized",
            AppError::Forbidden => "forbidden",
            AppError::NotFound => "not_found",
            AppError::Store(_) => "store_unavailable",
            AppError::ConnectionLimit { .. } => "connection_limit",
            AppError::InboundOverflow => "inbound_overflow",
            AppError::Config(_) | AppError::StartServer(_) | AppError::Internal => "internal",
        }
    }

    /// Returns HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            AppError::BadRequest(_) => 400,
            AppError::Unauthorized => 401,
            AppError::Forbidden => 403,
            AppError::NotFound => 404,
            AppError::ConnectionLimit { .. } | AppError::InboundOverflow => 429,
            AppError::Store(_) => 503,
            _ => 500,
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(AppError::status_code(self))
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    fn error_response(&self) -> HttpResponse {
        // Store details stay in the logs
        let message = match self {
            AppError::Store(_) => "document store unavailable".to_string(),
            other => other.to_string(),
        };
        HttpResponse::build(ResponseError::status_code(self)).json(json!({
            "error": message,
            "code": self.code(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_not_found_maps_to_not_found() {
        let err: AppError = StoreError::NotFound {
            collection: "messages".into(),
            id: "m1".into(),
        }
        .into();
        assert!(matches!(err, AppError::NotFound));
        assert_eq!(err.status_code(), 404);
    }

    #[test]
    fn test_store_failure_is_unavailable() {
        let err: AppError = StoreError::Backend("connection reset".into()).into();
        assert_eq!(err.code(), "store_unavailable");
        assert_eq!(err.status_code(), 503);
    }

    #[test]
    fn test_error_response_body() {
        let resp = AppError::Forbidden.error_response();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }
}
