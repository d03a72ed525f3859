//! In-memory repositories
//!
//! Implements every repository trait over plain vectors guarded by one lock,
//! with the same conditional-update semantics as the PostgreSQL queries.
//! Used for local runs without a database and throughout the test suites.

use crate::models::*;
use crate::repository::campaigns::initial_status;
use crate::repository::{
    CampaignRepository, ContactRepository, MessageRepository, OptInRepository,
    ShortLinkRepository,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use smscast_common::types::{CampaignId, ContactId, OwnerId};
use smscast_common::{Error, Result};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    contacts: Vec<Contact>,
    campaigns: Vec<Campaign>,
    messages: Vec<Message>,
    short_links: Vec<ShortLink>,
    link_clicks: Vec<LinkClick>,
    opt_ins: Vec<OptInRequest>,
}

/// In-memory store backing all repositories
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded clicks for a short link
    pub async fn link_clicks(&self, short_link_id: Uuid) -> Vec<LinkClick> {
        self.tables
            .read()
            .await
            .link_clicks
            .iter()
            .filter(|c| c.short_link_id == short_link_id)
            .cloned()
            .collect()
    }

    /// Force a campaign into a status, bypassing the lifecycle
    pub async fn set_campaign_status(&self, id: CampaignId, status: CampaignStatus) {
        let mut tables = self.tables.write().await;
        if let Some(campaign) = tables.campaigns.iter_mut().find(|c| c.id == id) {
            campaign.status = status.to_string();
        }
    }

    /// Move an opt-in request's expiry, e.g. into the past
    pub async fn set_opt_in_expiry(&self, token: &str, expires_at: DateTime<Utc>) {
        let mut tables = self.tables.write().await;
        if let Some(request) = tables.opt_ins.iter_mut().find(|r| r.token == token) {
            request.expires_at = expires_at;
        }
    }

    async fn update_campaign<F>(&self, id: CampaignId, f: F) -> Result<()>
    where
        F: FnOnce(&mut Campaign) + Send,
    {
        let mut tables = self.tables.write().await;
        if let Some(campaign) = tables.campaigns.iter_mut().find(|c| c.id == id) {
            f(campaign);
            campaign.updated_at = Utc::now();
        }
        Ok(())
    }
}

#[async_trait]
impl ContactRepository for MemoryStore {
    async fn create(&self, input: CreateContact) -> Result<Contact> {
        let now = Utc::now();
        let contact = Contact {
            id: Uuid::now_v7(),
            owner_id: input.owner_id,
            first_name: input.first_name,
            last_name: input.last_name,
            phone_number: input.phone_number,
            email: input.email,
            tags: input.tags,
            is_opted_in: input.is_opted_in,
            opt_in_date: input.is_opted_in.then_some(now),
            opt_in_source: input.opt_in_source,
            is_unsubscribed: false,
            unsubscribed_at: None,
            created_at: now,
            updated_at: now,
        };
        self.tables.write().await.contacts.push(contact.clone());
        Ok(contact)
    }

    async fn get(&self, id: ContactId) -> Result<Option<Contact>> {
        let tables = self.tables.read().await;
        Ok(tables.contacts.iter().find(|c| c.id == id).cloned())
    }

    async fn list_by_owner(&self, owner_id: OwnerId) -> Result<Vec<Contact>> {
        let tables = self.tables.read().await;
        Ok(tables
            .contacts
            .iter()
            .filter(|c| c.owner_id == owner_id)
            .cloned()
            .collect())
    }

    async fn list_by_tags(&self, owner_id: OwnerId, tags: &[String]) -> Result<Vec<Contact>> {
        let tables = self.tables.read().await;
        Ok(tables
            .contacts
            .iter()
            .filter(|c| c.owner_id == owner_id && c.has_any_tag(tags))
            .cloned()
            .collect())
    }

    async fn get_by_phone(
        &self,
        owner_id: OwnerId,
        phone_number: &str,
    ) -> Result<Option<Contact>> {
        let tables = self.tables.read().await;
        Ok(tables
            .contacts
            .iter()
            .find(|c| c.owner_id == owner_id && c.phone_number == phone_number)
            .cloned())
    }

    async fn mark_opted_in(&self, id: ContactId, source: &str, at: DateTime<Utc>) -> Result<()> {
        let mut tables = self.tables.write().await;
        if let Some(contact) = tables.contacts.iter_mut().find(|c| c.id == id) {
            contact.is_opted_in = true;
            contact.opt_in_date = Some(at);
            contact.opt_in_source = Some(source.to_string());
            contact.updated_at = at;
        }
        Ok(())
    }

    async fn set_unsubscribed(
        &self,
        phone_number: &str,
        unsubscribed: bool,
        at: DateTime<Utc>,
    ) -> Result<SubscriptionChange> {
        let mut tables = self.tables.write().await;
        let mut change = SubscriptionChange::default();
        for contact in tables
            .contacts
            .iter_mut()
            .filter(|c| c.phone_number == phone_number)
        {
            change.matched += 1;
            if contact.is_unsubscribed == unsubscribed {
                continue;
            }
            contact.is_unsubscribed = unsubscribed;
            contact.unsubscribed_at = unsubscribed.then_some(at);
            contact.updated_at = at;
            change.changed += 1;
        }
        Ok(change)
    }
}

#[async_trait]
impl CampaignRepository for MemoryStore {
    async fn create(&self, input: CreateCampaign) -> Result<Campaign> {
        let now = Utc::now();
        let campaign = Campaign {
            id: Uuid::now_v7(),
            owner_id: input.owner_id,
            name: input.name,
            content: input.content,
            tags: input.tags,
            status: initial_status(input.scheduled_at).to_string(),
            scheduled_at: input.scheduled_at,
            sent_at: None,
            contacts_count: 0,
            sent_count: 0,
            delivered_count: 0,
            failed_count: 0,
            click_count: 0,
            unsubscribe_count: 0,
            created_at: now,
            updated_at: now,
        };
        self.tables.write().await.campaigns.push(campaign.clone());
        Ok(campaign)
    }

    async fn get(&self, id: CampaignId) -> Result<Option<Campaign>> {
        let tables = self.tables.read().await;
        Ok(tables.campaigns.iter().find(|c| c.id == id).cloned())
    }

    async fn list_due(&self, now: DateTime<Utc>) -> Result<Vec<Campaign>> {
        let tables = self.tables.read().await;
        let mut due: Vec<Campaign> = tables
            .campaigns
            .iter()
            .filter(|c| {
                c.status_enum() == Some(CampaignStatus::Scheduled)
                    && c.scheduled_at.is_some_and(|at| at <= now)
            })
            .cloned()
            .collect();
        due.sort_by_key(|c| c.scheduled_at);
        Ok(due)
    }

    async fn claim_for_sending(
        &self,
        id: CampaignId,
        now: DateTime<Utc>,
    ) -> Result<Option<Campaign>> {
        let mut tables = self.tables.write().await;
        let Some(campaign) = tables.campaigns.iter_mut().find(|c| c.id == id) else {
            return Ok(None);
        };
        if !campaign.status_enum().is_some_and(|s| s.is_executable()) {
            return Ok(None);
        }
        campaign.status = CampaignStatus::Sending.to_string();
        campaign.sent_at = Some(now);
        campaign.updated_at = now;
        Ok(Some(campaign.clone()))
    }

    async fn complete(&self, id: CampaignId, outcome: &CampaignOutcome) -> Result<()> {
        let outcome = *outcome;
        self.update_campaign(id, move |c| {
            c.status = CampaignStatus::Sent.to_string();
            c.contacts_count = outcome.contacts_count;
            c.sent_count = outcome.sent_count;
            c.failed_count = outcome.failed_count;
            c.delivered_count += outcome.delivered_count;
        })
        .await
    }

    async fn mark_failed(&self, id: CampaignId) -> Result<()> {
        self.update_campaign(id, |c| c.status = CampaignStatus::Failed.to_string())
            .await
    }

    async fn increment_delivered(&self, id: CampaignId) -> Result<()> {
        self.update_campaign(id, |c| c.delivered_count += 1).await
    }

    async fn increment_clicks(&self, id: CampaignId) -> Result<()> {
        self.update_campaign(id, |c| c.click_count += 1).await
    }

    async fn increment_unsubscribes(&self, id: CampaignId) -> Result<()> {
        self.update_campaign(id, |c| c.unsubscribe_count += 1).await
    }
}

#[async_trait]
impl MessageRepository for MemoryStore {
    async fn create(&self, input: CreateMessage) -> Result<Message> {
        let message = Message {
            id: Uuid::now_v7(),
            campaign_id: input.campaign_id,
            contact_id: input.contact_id,
            phone_number: input.phone_number,
            content: input.content,
            status: input.status,
            provider_message_id: input.provider_message_id,
            error_message: input.error_message,
            sent_at: input.sent_at,
            delivered_at: None,
            created_at: Utc::now(),
        };
        self.tables.write().await.messages.push(message.clone());
        Ok(message)
    }

    async fn list_by_campaign(&self, campaign_id: CampaignId) -> Result<Vec<Message>> {
        let tables = self.tables.read().await;
        Ok(tables
            .messages
            .iter()
            .filter(|m| m.campaign_id == Some(campaign_id))
            .cloned()
            .collect())
    }

    async fn find_by_provider_id(&self, provider_message_id: &str) -> Result<Option<Message>> {
        let tables = self.tables.read().await;
        Ok(tables
            .messages
            .iter()
            .find(|m| m.provider_message_id.as_deref() == Some(provider_message_id))
            .cloned())
    }

    async fn apply_status(
        &self,
        provider_message_id: &str,
        status: &str,
        delivered_at: Option<DateTime<Utc>>,
    ) -> Result<Option<MessageStatusChange>> {
        let mut tables = self.tables.write().await;
        let Some(message) = tables
            .messages
            .iter_mut()
            .find(|m| m.provider_message_id.as_deref() == Some(provider_message_id))
        else {
            return Ok(None);
        };

        let previous_status = std::mem::replace(&mut message.status, status.to_string());
        if delivered_at.is_some() {
            message.delivered_at = delivered_at;
        }

        Ok(Some(MessageStatusChange {
            message_id: message.id,
            campaign_id: message.campaign_id,
            previous_status,
            status: message.status.clone(),
        }))
    }

    async fn latest_to_phone(&self, phone_number: &str) -> Result<Option<Message>> {
        let tables = self.tables.read().await;
        Ok(tables
            .messages
            .iter()
            .rev()
            .find(|m| m.phone_number == phone_number)
            .cloned())
    }
}

#[async_trait]
impl ShortLinkRepository for MemoryStore {
    async fn create(&self, input: CreateShortLink) -> Result<ShortLink> {
        let mut tables = self.tables.write().await;
        if tables
            .short_links
            .iter()
            .any(|l| l.short_code == input.short_code)
        {
            return Err(Error::Conflict(format!(
                "Short code already exists: {}",
                input.short_code
            )));
        }

        let link = ShortLink {
            id: Uuid::now_v7(),
            owner_id: input.owner_id,
            campaign_id: input.campaign_id,
            original_url: input.original_url,
            short_code: input.short_code,
            short_url: input.short_url,
            title: input.title,
            click_count: 0,
            created_at: Utc::now(),
        };
        tables.short_links.push(link.clone());
        Ok(link)
    }

    async fn get_by_code(&self, short_code: &str) -> Result<Option<ShortLink>> {
        let tables = self.tables.read().await;
        Ok(tables
            .short_links
            .iter()
            .find(|l| l.short_code == short_code)
            .cloned())
    }

    async fn record_click(&self, short_code: &str, info: ClickInfo) -> Result<Option<ShortLink>> {
        let mut tables = self.tables.write().await;
        let Some(link) = tables
            .short_links
            .iter_mut()
            .find(|l| l.short_code == short_code)
        else {
            return Ok(None);
        };
        link.click_count += 1;
        let link = link.clone();

        tables.link_clicks.push(LinkClick {
            id: Uuid::now_v7(),
            short_link_id: link.id,
            campaign_id: link.campaign_id,
            ip_address: info.ip_address,
            user_agent: info.user_agent,
            clicked_at: Utc::now(),
        });
        Ok(Some(link))
    }
}

#[async_trait]
impl OptInRepository for MemoryStore {
    async fn create(&self, input: CreateOptInRequest) -> Result<OptInRequest> {
        let request = OptInRequest {
            id: Uuid::now_v7(),
            contact_id: input.contact_id,
            phone_number: input.phone_number,
            token: input.token,
            is_confirmed: false,
            expires_at: input.expires_at,
            confirmed_at: None,
            created_at: Utc::now(),
        };
        self.tables.write().await.opt_ins.push(request.clone());
        Ok(request)
    }

    async fn get_by_token(&self, token: &str) -> Result<Option<OptInRequest>> {
        let tables = self.tables.read().await;
        Ok(tables.opt_ins.iter().find(|r| r.token == token).cloned())
    }

    async fn confirm(&self, token: &str, now: DateTime<Utc>) -> Result<Option<OptInRequest>> {
        let mut tables = self.tables.write().await;
        let Some(request) = tables
            .opt_ins
            .iter_mut()
            .find(|r| r.token == token && !r.is_confirmed && !r.is_expired(now))
        else {
            return Ok(None);
        };
        request.is_confirmed = true;
        request.confirmed_at = Some(now);
        Ok(Some(request.clone()))
    }
}
