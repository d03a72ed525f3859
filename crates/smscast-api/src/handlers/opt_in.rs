//! Double opt-in handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smscast_core::OptInError;
use std::sync::Arc;
use uuid::Uuid;

use super::{api_error, storage_error, ApiError};
use crate::auth::AppState;

/// Request body for an opt-in request
#[derive(Debug, Deserialize)]
pub struct OptInRequestBody {
    pub owner_id: Uuid,
    pub phone_number: String,
}

/// Opt-in response. The token itself only travels by SMS.
#[derive(Debug, Serialize, Deserialize)]
pub struct OptInResponse {
    pub id: Uuid,
    pub contact_id: Uuid,
    pub is_confirmed: bool,
    pub expires_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
}

fn opt_in_error(e: OptInError) -> ApiError {
    match e {
        OptInError::ContactNotFound | OptInError::InvalidToken => {
            api_error(StatusCode::NOT_FOUND, "NOT_FOUND", e.to_string())
        }
        OptInError::AlreadyOptedIn | OptInError::AlreadyConfirmed => {
            api_error(StatusCode::CONFLICT, "CONFLICT", e.to_string())
        }
        OptInError::InvalidPhoneNumber(_) => {
            api_error(StatusCode::UNPROCESSABLE_ENTITY, "INVALID_PHONE_NUMBER", e.to_string())
        }
        OptInError::Expired => api_error(StatusCode::GONE, "EXPIRED", e.to_string()),
        OptInError::Storage(e) => storage_error(e),
    }
}

/// Send a confirmation link to a contact
///
/// POST /api/opt-in
pub async fn request_opt_in(
    State(state): State<Arc<AppState>>,
    Json(req): Json<OptInRequestBody>,
) -> Result<(StatusCode, Json<OptInResponse>), ApiError> {
    let request = state
        .opt_in
        .request_opt_in(req.owner_id, &req.phone_number)
        .await
        .map_err(opt_in_error)?;

    Ok((
        StatusCode::CREATED,
        Json(OptInResponse {
            id: request.id,
            contact_id: request.contact_id,
            is_confirmed: request.is_confirmed,
            expires_at: request.expires_at,
            confirmed_at: request.confirmed_at,
        }),
    ))
}

/// Confirmation link target
///
/// GET /api/opt-in/:token
pub async fn confirm_opt_in(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<Json<OptInResponse>, ApiError> {
    let request = state.opt_in.confirm(&token).await.map_err(opt_in_error)?;

    Ok(Json(OptInResponse {
        id: request.id,
        contact_id: request.contact_id,
        is_confirmed: request.is_confirmed,
        expires_at: request.expires_at,
        confirmed_at: request.confirmed_at,
    }))
}
