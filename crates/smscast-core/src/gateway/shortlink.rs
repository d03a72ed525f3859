//! Short-link provider client
//!
//! Mints short URLs through a Short.io-compatible API. Minting cannot fail:
//! when no API key is configured or the provider errors, a random local
//! code under the fallback domain is returned instead.

use async_trait::async_trait;
use rand::{distr::Alphanumeric, Rng};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use smscast_common::config::ShortLinkConfig;
use smscast_common::{Error, Result};
use std::time::Duration;
use tracing::{debug, warn};

/// Length of locally generated short codes
pub const FALLBACK_CODE_LEN: usize = 6;

/// Where a short link came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkSource {
    Provider,
    Fallback,
}

/// Result of minting a short link
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShortLinkResult {
    pub short_url: String,
    pub short_code: String,
    pub original_url: String,
    pub success: bool,
    /// Provider error that forced the fallback, if any
    pub error: Option<String>,
    pub source: LinkSource,
}

/// Anything that can shorten a URL
#[async_trait]
pub trait LinkShortener: Send + Sync {
    async fn shorten(&self, original_url: &str, title: Option<&str>) -> ShortLinkResult;
}

#[derive(Debug, Serialize)]
struct CreateLinkRequest<'a> {
    #[serde(rename = "originalURL")]
    original_url: &'a str,
    domain: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct CreateLinkResponse {
    #[serde(rename = "shortURL")]
    short_url: String,
}

/// Short.io-compatible client with a local fallback
pub struct ShortLinkClient {
    config: ShortLinkConfig,
    client: Client,
}

impl ShortLinkClient {
    /// Create a new short-link client
    pub fn new(config: ShortLinkConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        if config.api_key.is_none() {
            warn!("Short-link API key not configured; using local short codes");
        }

        Ok(Self { config, client })
    }

    /// Call the provider. Any failure is returned as a message for the fallback.
    async fn mint(
        &self,
        api_key: &str,
        original_url: &str,
        title: Option<&str>,
    ) -> std::result::Result<String, String> {
        let request = CreateLinkRequest {
            original_url,
            domain: &self.config.domain,
            title,
        };

        let response = self
            .client
            .post(&self.config.api_url)
            .header("Authorization", api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| format!("Short-link request failed: {}", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("Short-link provider returned {}: {}", status, body));
        }

        let created: CreateLinkResponse = response
            .json()
            .await
            .map_err(|e| format!("Invalid short-link response: {}", e))?;

        Ok(created.short_url)
    }

    fn fallback(&self, original_url: &str, error: Option<String>) -> ShortLinkResult {
        let short_code = generate_short_code();
        ShortLinkResult {
            short_url: format!(
                "{}/{}",
                self.config.fallback_base_url.trim_end_matches('/'),
                short_code
            ),
            short_code,
            original_url: original_url.to_string(),
            success: true,
            error,
            source: LinkSource::Fallback,
        }
    }
}

#[async_trait]
impl LinkShortener for ShortLinkClient {
    async fn shorten(&self, original_url: &str, title: Option<&str>) -> ShortLinkResult {
        let Some(api_key) = self.config.api_key.as_deref().filter(|k| !k.is_empty()) else {
            return self.fallback(original_url, None);
        };

        match self.mint(api_key, original_url, title).await {
            Ok(short_url) => {
                let short_code = short_code_of(&short_url);
                debug!(original_url, short_url = %short_url, "Short link minted");
                ShortLinkResult {
                    short_url,
                    short_code,
                    original_url: original_url.to_string(),
                    success: true,
                    error: None,
                    source: LinkSource::Provider,
                }
            }
            Err(e) => {
                warn!(original_url, "Falling back to local short code: {}", e);
                self.fallback(original_url, Some(e))
            }
        }
    }
}

/// Random alphanumeric code for locally minted links
pub fn generate_short_code() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(FALLBACK_CODE_LEN)
        .map(char::from)
        .collect()
}

/// Last path segment of a short URL
fn short_code_of(short_url: &str) -> String {
    short_url
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_string()
}
