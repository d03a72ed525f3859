//! Campaign handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smscast_core::CampaignError;
use smscast_storage::models::Campaign;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use super::{api_error, storage_error, ApiError};
use crate::auth::AppState;

/// Campaign response
#[derive(Debug, Serialize, Deserialize)]
pub struct CampaignResponse {
    pub id: Uuid,
    pub name: String,
    pub status: String,
    pub tags: Vec<String>,
    pub contacts_count: i32,
    pub sent_count: i32,
    pub delivered_count: i32,
    pub failed_count: i32,
    pub click_count: i32,
    pub unsubscribe_count: i32,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
}

impl From<Campaign> for CampaignResponse {
    fn from(c: Campaign) -> Self {
        Self {
            id: c.id,
            name: c.name,
            status: c.status,
            tags: c.tags,
            contacts_count: c.contacts_count,
            sent_count: c.sent_count,
            delivered_count: c.delivered_count,
            failed_count: c.failed_count,
            click_count: c.click_count,
            unsubscribe_count: c.unsubscribe_count,
            scheduled_at: c.scheduled_at,
            sent_at: c.sent_at,
        }
    }
}

/// Request body for a test send
#[derive(Debug, Deserialize)]
pub struct TestSendRequest {
    pub phone_number: String,
}

/// Test send response
#[derive(Debug, Serialize, Deserialize)]
pub struct TestSendResponse {
    pub provider_message_id: Option<String>,
    pub status: String,
}

fn campaign_error(e: CampaignError) -> ApiError {
    match e {
        CampaignError::NotFound => {
            api_error(StatusCode::NOT_FOUND, "NOT_FOUND", "Campaign not found")
        }
        e @ CampaignError::NotExecutable { .. } => {
            api_error(StatusCode::CONFLICT, "NOT_EXECUTABLE", e.to_string())
        }
        e @ CampaignError::InvalidPhoneNumber(_) => {
            api_error(StatusCode::UNPROCESSABLE_ENTITY, "INVALID_PHONE_NUMBER", e.to_string())
        }
        e @ CampaignError::TestSendFailed(_) => {
            api_error(StatusCode::BAD_GATEWAY, "SEND_FAILED", e.to_string())
        }
        CampaignError::Storage(e) => {
            error!("Campaign storage error: {}", e);
            storage_error(e)
        }
    }
}

/// Send a campaign now
///
/// POST /api/campaigns/:campaign_id/send
///
/// The campaign is claimed before answering; sending continues in the background.
pub async fn send_campaign(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<Uuid>,
) -> Result<(StatusCode, Json<CampaignResponse>), ApiError> {
    let campaign = state.engine.claim(campaign_id).await.map_err(campaign_error)?;

    let engine = state.engine.clone();
    let claimed = campaign.clone();
    tokio::spawn(async move {
        // Failures are logged and persisted by the engine
        let _ = engine.run(claimed).await;
    });

    info!(campaign_id = %campaign_id, "Campaign send started");
    Ok((StatusCode::ACCEPTED, Json(CampaignResponse::from(campaign))))
}

/// Send a campaign's content to a single number with sample merge values
///
/// POST /api/campaigns/:campaign_id/test
pub async fn test_campaign(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<Uuid>,
    Json(req): Json<TestSendRequest>,
) -> Result<Json<TestSendResponse>, ApiError> {
    let result = state
        .engine
        .send_test(campaign_id, &req.phone_number)
        .await
        .map_err(campaign_error)?;

    Ok(Json(TestSendResponse {
        provider_message_id: result.provider_message_id,
        status: result.status,
    }))
}
