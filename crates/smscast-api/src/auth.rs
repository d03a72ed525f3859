//! Application state and webhook request authentication

use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use smscast_core::{CampaignEngine, ClickTracker, DeliveryReconciler, EngineMetrics, OptInManager};
use smscast_storage::{DatabasePool, Stores};
use std::sync::Arc;
use tracing::warn;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the hex HMAC-SHA256 of a webhook body
pub const SIGNATURE_HEADER: &str = "x-smscast-signature";

/// Provider callbacks are small form posts
const MAX_WEBHOOK_BODY: usize = 64 * 1024;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub stores: Stores,
    /// Absent when running on in-memory stores
    pub db_pool: Option<DatabasePool>,
    pub engine: Arc<CampaignEngine>,
    pub reconciler: Arc<DeliveryReconciler>,
    pub opt_in: Arc<OptInManager>,
    pub clicks: Arc<ClickTracker>,
    pub metrics: Arc<EngineMetrics>,
    pub webhook_secret: Option<String>,
}

/// Check `signature` (hex) against the HMAC-SHA256 of `body` under `secret`
pub fn verify_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// Reject webhook requests whose signature does not match, when a signing
/// secret is configured
pub async fn webhook_signature_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let Some(secret) = state.webhook_secret.as_deref().filter(|s| !s.is_empty()) else {
        return Ok(next.run(request).await);
    };

    let (parts, body) = request.into_parts();
    let signature = parts
        .headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .ok_or_else(|| {
            warn!(path = %parts.uri.path(), "Webhook without signature");
            StatusCode::UNAUTHORIZED
        })?;

    let bytes = to_bytes(body, MAX_WEBHOOK_BODY)
        .await
        .map_err(|_| StatusCode::PAYLOAD_TOO_LARGE)?;

    if !verify_signature(secret, &bytes, &signature) {
        warn!(path = %parts.uri.path(), "Webhook signature mismatch");
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(next.run(Request::from_parts(parts, Body::from(bytes))).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(secret: &str, body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn test_verify_signature() {
        let body = b"MessageSid=SM1&MessageStatus=delivered";
        let signature = sign("whsec", body);

        assert!(verify_signature("whsec", body, &signature));
        assert!(!verify_signature("other", body, &signature));
        assert!(!verify_signature("whsec", b"tampered", &signature));
        assert!(!verify_signature("whsec", body, "not-hex"));
    }
}
