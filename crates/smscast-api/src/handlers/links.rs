//! Short-link redirect

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::Redirect,
};
use smscast_storage::models::ClickInfo;
use std::sync::Arc;
use tracing::error;

use crate::auth::AppState;

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Client address as reported by the proxy in front of us
fn client_ip(headers: &HeaderMap) -> Option<String> {
    header_value(headers, "x-forwarded-for")
        .and_then(|v| v.split(',').next().map(|ip| ip.trim().to_string()))
        .filter(|ip| !ip.is_empty())
        .or_else(|| header_value(headers, "x-real-ip"))
}

/// Record a click and redirect to the original URL
///
/// GET /s/:code
pub async fn follow_link(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
    headers: HeaderMap,
) -> Result<Redirect, StatusCode> {
    let info = ClickInfo {
        ip_address: client_ip(&headers),
        user_agent: header_value(&headers, header::USER_AGENT.as_str()),
    };

    match state.clicks.follow(&code, info).await {
        Ok(Some(url)) => Ok(Redirect::temporary(&url)),
        Ok(None) => Err(StatusCode::NOT_FOUND),
        Err(e) => {
            error!(short_code = %code, "Failed to record click: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
