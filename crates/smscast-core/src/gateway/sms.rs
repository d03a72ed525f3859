//! SMS gateway client
//!
//! Speaks the Twilio Messages REST API. Sending never returns an error:
//! missing credentials, transport failures and provider rejections all come
//! back as a `failed` [`SendResult`] so callers can record a per-recipient
//! failure and move on.

use super::phone::format_phone_number;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use smscast_common::config::SmsConfig;
use smscast_common::{Error, Result};
use smscast_storage::models::MessageStatus;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Outcome of a single send attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendResult {
    pub provider_message_id: Option<String>,
    pub status: String,
    pub error_message: Option<String>,
}

impl SendResult {
    pub fn accepted(provider_message_id: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            provider_message_id: Some(provider_message_id.into()),
            status: status.into(),
            error_message: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            provider_message_id: None,
            status: MessageStatus::Failed.to_string(),
            error_message: Some(error.into()),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.status == MessageStatus::Failed.as_str()
    }

    pub fn is_delivered(&self) -> bool {
        self.status == MessageStatus::Delivered.as_str()
    }
}

/// Anything that can submit one SMS
#[async_trait]
pub trait SmsGateway: Send + Sync {
    /// Submit `body` to `to`, asking the provider to post delivery updates
    /// to `status_callback` when given
    async fn send(&self, to: &str, body: &str, status_callback: Option<&str>) -> SendResult;
}

#[derive(Debug, Deserialize)]
struct MessageResource {
    sid: Option<String>,
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResource {
    code: Option<i64>,
    message: Option<String>,
}

#[derive(Debug, Clone)]
struct Credentials {
    account_sid: String,
    auth_token: String,
    from_number: String,
}

/// Twilio-compatible SMS gateway
pub struct TwilioGateway {
    client: Client,
    base_url: String,
    credentials: Option<Credentials>,
}

impl TwilioGateway {
    /// Create a gateway from configuration. Missing credentials are not an
    /// error here; every send will fail closed instead.
    pub fn new(config: &SmsConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        let credentials = if config.is_configured() {
            Some(Credentials {
                account_sid: config.account_sid.clone().unwrap_or_default(),
                auth_token: config.auth_token.clone().unwrap_or_default(),
                from_number: config.from_number.clone().unwrap_or_default(),
            })
        } else {
            warn!("SMS gateway credentials missing; outbound SMS will fail");
            None
        };

        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            credentials,
        })
    }

    pub fn is_configured(&self) -> bool {
        self.credentials.is_some()
    }

    fn messages_url(&self, account_sid: &str) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.base_url, account_sid
        )
    }
}

#[async_trait]
impl SmsGateway for TwilioGateway {
    async fn send(&self, to: &str, body: &str, status_callback: Option<&str>) -> SendResult {
        let Some(creds) = &self.credentials else {
            error!("SMS gateway not configured; message not sent");
            return SendResult::failed("SMS gateway credentials not configured");
        };

        let to = format_phone_number(to);
        let mut form = vec![
            ("To", to.as_str()),
            ("From", creds.from_number.as_str()),
            ("Body", body),
        ];
        if let Some(url) = status_callback {
            form.push(("StatusCallback", url));
        }

        let response = match self
            .client
            .post(self.messages_url(&creds.account_sid))
            .basic_auth(&creds.account_sid, Some(&creds.auth_token))
            .form(&form)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                error!(to = %to, "SMS request failed: {}", e);
                return SendResult::failed(format!("SMS request failed: {}", e));
            }
        };

        let status = response.status();
        if !status.is_success() {
            let detail = match response.json::<ErrorResource>().await {
                Ok(ErrorResource {
                    code: Some(code),
                    message: Some(message),
                }) => format!("{} (code {})", message, code),
                Ok(ErrorResource {
                    message: Some(message),
                    ..
                }) => message,
                _ => format!("HTTP {}", status),
            };
            warn!(to = %to, status = %status, "SMS gateway rejected message: {}", detail);
            return SendResult::failed(detail);
        }

        match response.json::<MessageResource>().await {
            Ok(MessageResource {
                sid: Some(sid),
                status,
            }) if !sid.is_empty() => {
                let status = status.unwrap_or_else(|| MessageStatus::Queued.to_string());
                debug!(to = %to, sid = %sid, status = %status, "SMS accepted");
                SendResult::accepted(sid, status)
            }
            Ok(_) => SendResult::failed("Failed to send message. No SID returned."),
            Err(e) => SendResult::failed(format!("Invalid gateway response: {}", e)),
        }
    }
}
