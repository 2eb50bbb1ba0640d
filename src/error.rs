use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::coordinator::CoordinatorError;
use crate::host::HostError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Tab not found: {0}")]
    TabNotFound(u32),

    #[error("Page not found: {0}")]
    PageNotFound(String),

    #[error("Invalid request: {0}")]
    ValidationError(String),

    #[error("Could not open page: {0}")]
    Host(#[from] HostError),

    #[error(transparent)]
    Coordinator(#[from] CoordinatorError),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    detail: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            AppError::TabNotFound(_) | AppError::PageNotFound(_) => {
                (StatusCode::NOT_FOUND, "Not Found")
            }
            AppError::ValidationError(_) | AppError::Host(_) => {
                (StatusCode::BAD_REQUEST, "Bad Request")
            }
            AppError::Coordinator(CoordinatorError::AggregationTimeout { .. }) => {
                (StatusCode::GATEWAY_TIMEOUT, "Timeout")
            }
            AppError::Coordinator(CoordinatorError::NoTopFrame(_)) => {
                (StatusCode::NOT_FOUND, "Not Found")
            }
            AppError::Coordinator(CoordinatorError::Rejected { .. }) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "Rejected")
            }
            AppError::Coordinator(_) => (StatusCode::BAD_GATEWAY, "Frame Error"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Internal Error"),
        };

        let body = Json(ErrorResponse {
            error: error_message.to_string(),
            detail: self.to_string(),
        });

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
