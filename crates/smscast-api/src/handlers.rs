//! API request handlers

pub mod campaigns;
pub mod contacts;
pub mod health;
pub mod links;
pub mod metrics;
pub mod opt_in;
pub mod webhooks;

use axum::{http::StatusCode, Json};
use serde::{Deserialize, Serialize};

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// Handler error: status plus JSON body
pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub(crate) fn api_error(status: StatusCode, error: &str, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            message: message.into(),
        }),
    )
}

/// Map a shared error to its HTTP status and code
pub(crate) fn storage_error(e: smscast_common::Error) -> ApiError {
    let status = StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    api_error(status, e.code(), e.to_string())
}
