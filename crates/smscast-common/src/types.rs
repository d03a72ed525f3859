//! Common types for smscast

use uuid::Uuid;

/// Unique identifier for the account owning contacts and campaigns
pub type OwnerId = Uuid;

/// Unique identifier for contacts
pub type ContactId = Uuid;

/// Unique identifier for campaigns
pub type CampaignId = Uuid;

/// Unique identifier for outbound messages
pub type MessageId = Uuid;

/// Unique identifier for short links
pub type ShortLinkId = Uuid;

/// Unique identifier for opt-in requests
pub type OptInRequestId = Uuid;
