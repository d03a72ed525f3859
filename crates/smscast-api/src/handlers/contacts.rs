//! Contact handlers

use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use smscast_core::gateway::format_phone_number;
use std::sync::Arc;
use tracing::info;

use super::{api_error, storage_error, ApiError};
use crate::auth::AppState;

/// Request body for unsubscribing a number
#[derive(Debug, Deserialize)]
pub struct UnsubscribeRequest {
    pub phone_number: String,
}

/// Unsubscribe response
#[derive(Debug, Serialize, Deserialize)]
pub struct UnsubscribeResponse {
    pub phone_number: String,
    /// Contacts with this number, all now unsubscribed
    pub contacts: u64,
}

/// Unsubscribe every contact with a phone number
///
/// POST /api/unsubscribe
pub async fn unsubscribe(
    State(state): State<Arc<AppState>>,
    Json(req): Json<UnsubscribeRequest>,
) -> Result<Json<UnsubscribeResponse>, ApiError> {
    let phone_number = format_phone_number(&req.phone_number);
    let change = state
        .stores
        .contacts
        .set_unsubscribed(&phone_number, true, Utc::now())
        .await
        .map_err(storage_error)?;

    if change.matched == 0 {
        return Err(api_error(
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            "No contact with this phone number",
        ));
    }

    info!(
        phone = %phone_number,
        contacts = change.matched,
        changed = change.changed,
        "Unsubscribed by request"
    );
    Ok(Json(UnsubscribeResponse {
        phone_number,
        contacts: change.matched,
    }))
}
