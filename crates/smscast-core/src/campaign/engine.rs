//! Campaign execution engine
//!
//! Turns a campaign into one SMS per eligible contact:
//!
//! 1. claim the campaign (`draft`/`scheduled` -> `sending`) in one conditional update
//! 2. resolve the audience and keep opted-in, subscribed contacts
//! 3. shorten every distinct URL once and rewrite the content
//! 4. render merge tags and send to each contact in turn, gated by the throttle
//! 5. record a message per contact and write the final tallies
//!
//! Per-recipient problems are counted as failures. Anything else marks the
//! campaign `failed`.

use super::audience::AudienceResolver;
use super::links::{distinct_links, rewrite};
use super::template::{contact_values, render, sample_values};
use super::throttle::SendThrottle;
use crate::gateway::{format_phone_number, is_valid_phone_number, LinkShortener, SendResult, SmsGateway};
use crate::metrics::EngineMetrics;
use chrono::Utc;
use smscast_common::types::CampaignId;
use smscast_storage::models::{
    Campaign, CampaignOutcome, Contact, CreateMessage, CreateShortLink, MessageStatus,
};
use smscast_storage::repository::Stores;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Error message stored on messages whose number fails validation
pub const INVALID_PHONE_NUMBER: &str = "Invalid phone number";

/// Campaign errors
#[derive(Debug, Error)]
pub enum CampaignError {
    #[error("Campaign not found")]
    NotFound,

    #[error("Campaign cannot be sent from status '{status}'")]
    NotExecutable { status: String },

    #[error("Invalid phone number: {0}")]
    InvalidPhoneNumber(String),

    #[error("Test message failed: {0}")]
    TestSendFailed(String),

    #[error(transparent)]
    Storage(#[from] smscast_common::Error),
}

enum RecipientOutcome {
    Sent { delivered: bool },
    Failed,
}

/// Campaign execution engine
pub struct CampaignEngine {
    stores: Stores,
    audience: AudienceResolver,
    sms: Arc<dyn SmsGateway>,
    shortener: Arc<dyn LinkShortener>,
    throttle: Arc<SendThrottle>,
    metrics: Arc<EngineMetrics>,
    status_callback_url: Option<String>,
}

impl CampaignEngine {
    /// Create a new engine. Sends are unthrottled until [`Self::with_throttle`].
    pub fn new(
        stores: Stores,
        sms: Arc<dyn SmsGateway>,
        shortener: Arc<dyn LinkShortener>,
        metrics: Arc<EngineMetrics>,
    ) -> Self {
        Self {
            audience: AudienceResolver::new(stores.contacts.clone()),
            stores,
            sms,
            shortener,
            throttle: Arc::new(SendThrottle::unlimited()),
            metrics,
            status_callback_url: None,
        }
    }

    /// Set the send throttle
    pub fn with_throttle(mut self, throttle: Arc<SendThrottle>) -> Self {
        self.throttle = throttle;
        self
    }

    /// Set the URL the gateway posts delivery updates to
    pub fn with_status_callback_url(mut self, url: impl Into<String>) -> Self {
        self.status_callback_url = Some(url.into());
        self
    }

    /// Move a campaign into `sending`, or explain why it cannot be
    pub async fn claim(&self, campaign_id: CampaignId) -> Result<Campaign, CampaignError> {
        if let Some(campaign) = self
            .stores
            .campaigns
            .claim_for_sending(campaign_id, Utc::now())
            .await?
        {
            return Ok(campaign);
        }

        match self.stores.campaigns.get(campaign_id).await? {
            None => Err(CampaignError::NotFound),
            Some(campaign) => Err(CampaignError::NotExecutable {
                status: campaign.status,
            }),
        }
    }

    /// Execute a campaign: claim it, then send to its audience
    pub async fn execute(&self, campaign: &Campaign) -> Result<CampaignOutcome, CampaignError> {
        let claimed = self.claim(campaign.id).await?;
        self.run(claimed).await
    }

    /// Manual "send now" by id
    pub async fn execute_now(
        &self,
        campaign_id: CampaignId,
    ) -> Result<CampaignOutcome, CampaignError> {
        let campaign = self
            .stores
            .campaigns
            .get(campaign_id)
            .await?
            .ok_or(CampaignError::NotFound)?;
        self.execute(&campaign).await
    }

    /// Send a claimed campaign to completion. A campaign-level error marks it `failed`.
    pub async fn run(&self, campaign: Campaign) -> Result<CampaignOutcome, CampaignError> {
        info!(campaign_id = %campaign.id, name = %campaign.name, "Campaign sending started");

        match self.deliver(&campaign).await {
            Ok(outcome) => {
                self.metrics.record_campaign_completed();
                info!(
                    campaign_id = %campaign.id,
                    contacts = outcome.contacts_count,
                    sent = outcome.sent_count,
                    failed = outcome.failed_count,
                    "Campaign sent"
                );
                Ok(outcome)
            }
            Err(e) => {
                self.metrics.record_campaign_failed();
                error!(campaign_id = %campaign.id, "Campaign failed: {}", e);
                if let Err(mark_err) = self.stores.campaigns.mark_failed(campaign.id).await {
                    error!(
                        campaign_id = %campaign.id,
                        "Failed to mark campaign as failed: {}", mark_err
                    );
                }
                Err(e)
            }
        }
    }

    async fn deliver(&self, campaign: &Campaign) -> Result<CampaignOutcome, CampaignError> {
        let recipients = self
            .audience
            .resolve_eligible(campaign.owner_id, &campaign.tags)
            .await?;
        debug!(campaign_id = %campaign.id, recipients = recipients.len(), "Audience resolved");

        let template = self.shorten_links(campaign).await;

        let mut outcome = CampaignOutcome {
            contacts_count: recipients.len() as i32,
            ..CampaignOutcome::default()
        };

        for contact in &recipients {
            match self.send_to(campaign, &template, contact).await {
                RecipientOutcome::Sent { delivered } => {
                    outcome.sent_count += 1;
                    if delivered {
                        outcome.delivered_count += 1;
                    }
                }
                RecipientOutcome::Failed => outcome.failed_count += 1,
            }
        }

        self.stores.campaigns.complete(campaign.id, &outcome).await?;
        Ok(outcome)
    }

    /// Shorten each distinct URL once and rewrite the content with the results.
    /// URLs whose short link cannot be stored are left as they are.
    async fn shorten_links(&self, campaign: &Campaign) -> String {
        let links = distinct_links(&campaign.content);
        if links.is_empty() {
            return campaign.content.clone();
        }

        let mut short_urls = HashMap::new();
        for url in links {
            let minted = self.shortener.shorten(&url, Some(&campaign.name)).await;
            if !minted.success {
                continue;
            }

            let stored = self
                .stores
                .short_links
                .create(CreateShortLink {
                    owner_id: campaign.owner_id,
                    campaign_id: Some(campaign.id),
                    original_url: url.clone(),
                    short_code: minted.short_code,
                    short_url: minted.short_url.clone(),
                    title: Some(campaign.name.clone()),
                })
                .await;

            match stored {
                Ok(_) => {
                    short_urls.insert(url, minted.short_url);
                }
                Err(e) => warn!(
                    campaign_id = %campaign.id,
                    url = %url,
                    "Keeping original link, short link not stored: {}", e
                ),
            }
        }

        rewrite(&campaign.content, &short_urls)
    }

    async fn send_to(
        &self,
        campaign: &Campaign,
        template: &str,
        contact: &Contact,
    ) -> RecipientOutcome {
        let body = render(template, &contact_values(contact));
        let to = format_phone_number(&contact.phone_number);

        let result = if is_valid_phone_number(&to) {
            self.throttle.acquire().await;
            self.sms
                .send(&to, &body, self.status_callback_url.as_deref())
                .await
        } else {
            warn!(
                campaign_id = %campaign.id,
                contact_id = %contact.id,
                phone = %contact.phone_number,
                "Skipping invalid phone number"
            );
            SendResult::failed(INVALID_PHONE_NUMBER)
        };

        let failed = result.is_failed();
        let delivered = result.is_delivered();
        let message = CreateMessage {
            campaign_id: Some(campaign.id),
            contact_id: Some(contact.id),
            phone_number: to,
            content: body,
            status: result.status,
            provider_message_id: result.provider_message_id,
            error_message: result.error_message,
            sent_at: (!failed).then(Utc::now),
        };

        if let Err(e) = self.stores.messages.create(message).await {
            error!(
                campaign_id = %campaign.id,
                contact_id = %contact.id,
                "Failed to record message: {}", e
            );
            self.metrics.record_sms_failed();
            return RecipientOutcome::Failed;
        }

        if failed {
            self.metrics.record_sms_failed();
            RecipientOutcome::Failed
        } else {
            self.metrics.record_sms_sent();
            RecipientOutcome::Sent { delivered }
        }
    }

    /// Send a campaign's content to one number with sample values in place of
    /// merge tags. Nothing is recorded.
    pub async fn send_test(
        &self,
        campaign_id: CampaignId,
        phone_number: &str,
    ) -> Result<SendResult, CampaignError> {
        let campaign = self
            .stores
            .campaigns
            .get(campaign_id)
            .await?
            .ok_or(CampaignError::NotFound)?;

        let to = format_phone_number(phone_number);
        if !is_valid_phone_number(&to) {
            return Err(CampaignError::InvalidPhoneNumber(phone_number.to_string()));
        }

        let body = render(&campaign.content, &sample_values(&campaign.content));
        let result = self.sms.send(&to, &body, None).await;
        if result.is_failed() {
            return Err(CampaignError::TestSendFailed(
                result
                    .error_message
                    .unwrap_or_else(|| MessageStatus::Failed.to_string()),
            ));
        }

        info!(campaign_id = %campaign.id, to = %to, "Test message sent");
        Ok(result)
    }
}
