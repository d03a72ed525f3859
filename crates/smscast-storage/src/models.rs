//! Database models

use chrono::{DateTime, Utc};
use smscast_common::types::{
    CampaignId, ContactId, MessageId, OptInRequestId, OwnerId, ShortLinkId,
};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Contact model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Contact {
    pub id: ContactId,
    pub owner_id: OwnerId,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone_number: String,
    pub email: Option<String>,
    pub tags: Vec<String>,
    pub is_opted_in: bool,
    pub opt_in_date: Option<DateTime<Utc>>,
    pub opt_in_source: Option<String>,
    pub is_unsubscribed: bool,
    pub unsubscribed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Contact {
    /// Whether a campaign may send to this contact
    pub fn is_eligible(&self) -> bool {
        self.is_opted_in && !self.is_unsubscribed
    }

    /// Whether any of the given tags is on this contact
    pub fn has_any_tag(&self, tags: &[String]) -> bool {
        tags.iter().any(|t| self.tags.contains(t))
    }
}

/// Create contact input
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateContact {
    pub owner_id: OwnerId,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone_number: String,
    pub email: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub is_opted_in: bool,
    pub opt_in_source: Option<String>,
}

/// Campaign status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Draft,
    Scheduled,
    Sending,
    Sent,
    Failed,
}

impl CampaignStatus {
    /// Statuses a send may start from
    pub const EXECUTABLE: [CampaignStatus; 2] = [CampaignStatus::Draft, CampaignStatus::Scheduled];

    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignStatus::Draft => "draft",
            CampaignStatus::Scheduled => "scheduled",
            CampaignStatus::Sending => "sending",
            CampaignStatus::Sent => "sent",
            CampaignStatus::Failed => "failed",
        }
    }

    pub fn is_executable(&self) -> bool {
        Self::EXECUTABLE.contains(self)
    }
}

impl std::fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CampaignStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(CampaignStatus::Draft),
            "scheduled" => Ok(CampaignStatus::Scheduled),
            "sending" => Ok(CampaignStatus::Sending),
            "sent" => Ok(CampaignStatus::Sent),
            "failed" => Ok(CampaignStatus::Failed),
            _ => Err(format!("Invalid campaign status: {}", s)),
        }
    }
}

/// Campaign model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Campaign {
    pub id: CampaignId,
    pub owner_id: OwnerId,
    pub name: String,
    pub content: String,
    pub tags: Vec<String>,
    pub status: String,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub contacts_count: i32,
    pub sent_count: i32,
    pub delivered_count: i32,
    pub failed_count: i32,
    pub click_count: i32,
    pub unsubscribe_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Campaign {
    /// Get status enum
    pub fn status_enum(&self) -> Option<CampaignStatus> {
        self.status.parse().ok()
    }
}

/// Create campaign input
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateCampaign {
    pub owner_id: OwnerId,
    pub name: String,
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// A send time creates the campaign as `scheduled`
    pub scheduled_at: Option<DateTime<Utc>>,
}

/// Final tallies written when a send completes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignOutcome {
    pub contacts_count: i32,
    pub sent_count: i32,
    pub failed_count: i32,
    /// Recipients the gateway already reported delivered at send time.
    /// Added to the stored count, which webhooks may have advanced meanwhile.
    pub delivered_count: i32,
}

/// Outbound message status as reported by the SMS gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Queued,
    Accepted,
    Sending,
    Sent,
    Delivered,
    Undelivered,
    Failed,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Queued => "queued",
            MessageStatus::Accepted => "accepted",
            MessageStatus::Sending => "sending",
            MessageStatus::Sent => "sent",
            MessageStatus::Delivered => "delivered",
            MessageStatus::Undelivered => "undelivered",
            MessageStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MessageStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(MessageStatus::Queued),
            "accepted" => Ok(MessageStatus::Accepted),
            "sending" => Ok(MessageStatus::Sending),
            "sent" => Ok(MessageStatus::Sent),
            "delivered" => Ok(MessageStatus::Delivered),
            "undelivered" => Ok(MessageStatus::Undelivered),
            "failed" => Ok(MessageStatus::Failed),
            _ => Err(format!("Invalid message status: {}", s)),
        }
    }
}

/// Outbound message model, one per recipient per campaign send
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub campaign_id: Option<CampaignId>,
    pub contact_id: Option<ContactId>,
    pub phone_number: String,
    pub content: String,
    /// Gateway status; provider-specific values beyond [`MessageStatus`] are kept verbatim
    pub status: String,
    pub provider_message_id: Option<String>,
    pub error_message: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn status_enum(&self) -> Option<MessageStatus> {
        self.status.parse().ok()
    }
}

/// Create message input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMessage {
    pub campaign_id: Option<CampaignId>,
    pub contact_id: Option<ContactId>,
    pub phone_number: String,
    pub content: String,
    pub status: String,
    pub provider_message_id: Option<String>,
    pub error_message: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
}

/// Result of applying a delivery callback to a stored message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageStatusChange {
    pub message_id: MessageId,
    pub campaign_id: Option<CampaignId>,
    pub previous_status: String,
    pub status: String,
}

impl MessageStatusChange {
    /// Whether this change moved the message into `delivered`
    pub fn newly_delivered(&self) -> bool {
        let delivered = MessageStatus::Delivered.as_str();
        self.status == delivered && self.previous_status != delivered
    }
}

/// Result of setting the unsubscribed flag by phone number
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubscriptionChange {
    /// Contacts carrying the number
    pub matched: u64,
    /// Contacts whose flag actually flipped
    pub changed: u64,
}

/// Short link model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ShortLink {
    pub id: ShortLinkId,
    pub owner_id: OwnerId,
    pub campaign_id: Option<CampaignId>,
    pub original_url: String,
    pub short_code: String,
    pub short_url: String,
    pub title: Option<String>,
    pub click_count: i32,
    pub created_at: DateTime<Utc>,
}

/// Create short link input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateShortLink {
    pub owner_id: OwnerId,
    pub campaign_id: Option<CampaignId>,
    pub original_url: String,
    pub short_code: String,
    pub short_url: String,
    pub title: Option<String>,
}

/// Single recorded click on a short link
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct LinkClick {
    pub id: uuid::Uuid,
    pub short_link_id: ShortLinkId,
    pub campaign_id: Option<CampaignId>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub clicked_at: DateTime<Utc>,
}

/// Request metadata captured with a click
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClickInfo {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Double opt-in confirmation request
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct OptInRequest {
    pub id: OptInRequestId,
    pub contact_id: ContactId,
    pub phone_number: String,
    pub token: String,
    pub is_confirmed: bool,
    pub expires_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl OptInRequest {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }
}

/// Create opt-in request input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOptInRequest {
    pub contact_id: ContactId,
    pub phone_number: String,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_campaign_status_round_trip() {
        for status in [
            CampaignStatus::Draft,
            CampaignStatus::Scheduled,
            CampaignStatus::Sending,
            CampaignStatus::Sent,
            CampaignStatus::Failed,
        ] {
            assert_eq!(status.to_string().parse::<CampaignStatus>(), Ok(status));
        }
        assert!("completed".parse::<CampaignStatus>().is_err());
    }

    #[test]
    fn test_only_draft_and_scheduled_are_executable() {
        assert!(CampaignStatus::Draft.is_executable());
        assert!(CampaignStatus::Scheduled.is_executable());
        assert!(!CampaignStatus::Sending.is_executable());
        assert!(!CampaignStatus::Sent.is_executable());
        assert!(!CampaignStatus::Failed.is_executable());
    }

    #[test]
    fn test_newly_delivered() {
        let mut change = MessageStatusChange {
            message_id: uuid::Uuid::new_v4(),
            campaign_id: None,
            previous_status: "sent".into(),
            status: "delivered".into(),
        };
        assert!(change.newly_delivered());

        change.previous_status = "delivered".into();
        assert!(!change.newly_delivered());
    }
}
