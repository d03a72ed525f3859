//! SMS gateway webhooks

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Form,
};
use serde::Deserialize;
use smscast_core::StatusCallback;
use std::sync::Arc;
use tracing::{debug, error};

use crate::auth::AppState;

/// Empty TwiML: acknowledge without replying through the webhook
const EMPTY_TWIML: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?><Response></Response>";

/// Inbound SMS as posted by the gateway
#[derive(Debug, Deserialize)]
pub struct InboundSms {
    #[serde(rename = "From")]
    pub from: String,
    #[serde(rename = "Body", default)]
    pub body: String,
}

/// Delivery status callback
///
/// POST /api/webhooks/sms/status
pub async fn status_callback(
    State(state): State<Arc<AppState>>,
    Form(callback): Form<StatusCallback>,
) -> StatusCode {
    match state.reconciler.handle_status_callback(&callback).await {
        Ok(change) => {
            debug!(sid = %callback.message_sid, applied = change.is_some(), "Status callback handled");
            StatusCode::OK
        }
        Err(e) => {
            error!(sid = %callback.message_sid, "Failed to apply status callback: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Inbound message: STOP/START keyword handling
///
/// POST /api/webhooks/sms/inbound
pub async fn inbound_message(
    State(state): State<Arc<AppState>>,
    Form(sms): Form<InboundSms>,
) -> impl IntoResponse {
    let status = match state.reconciler.handle_inbound(&sms.from, &sms.body).await {
        Ok(action) => {
            debug!(?action, "Inbound message handled");
            StatusCode::OK
        }
        Err(e) => {
            error!("Failed to handle inbound message: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };

    (status, [(header::CONTENT_TYPE, "text/xml")], EMPTY_TWIML)
}
