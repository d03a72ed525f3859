//! smscast Core - campaign execution and delivery tracking
//!
//! This crate turns campaigns into personalized, link-shortened SMS sends,
//! runs the scheduler for timed campaigns, and reconciles delivery callbacks,
//! keyword replies, opt-in confirmations and link clicks.

pub mod campaign;
pub mod clicks;
pub mod delivery;
pub mod gateway;
pub mod metrics;
pub mod optin;

#[cfg(test)]
pub(crate) mod testing;

pub use campaign::{AudienceResolver, CampaignEngine, CampaignError, CampaignScheduler, SendThrottle};
pub use clicks::ClickTracker;
pub use delivery::{DeliveryReconciler, InboundAction, StatusCallback};
pub use gateway::{LinkShortener, SendResult, ShortLinkClient, SmsGateway, TwilioGateway};
pub use metrics::EngineMetrics;
pub use optin::{OptInError, OptInManager};
