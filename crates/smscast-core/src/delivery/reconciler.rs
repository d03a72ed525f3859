//! Delivery-status reconciler
//!
//! Applies the gateway's asynchronous delivery callbacks to stored messages
//! and handles STOP/START keyword replies from recipients.

use crate::gateway::{format_phone_number, SmsGateway};
use crate::metrics::EngineMetrics;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use smscast_common::Result;
use smscast_storage::models::{MessageStatus, MessageStatusChange};
use smscast_storage::repository::Stores;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Confirmation sent after a STOP reply
pub const UNSUBSCRIBED_REPLY: &str =
    "You have been unsubscribed from SMS messages. Reply START to opt back in.";

/// Confirmation sent after a START reply
pub const RESUBSCRIBED_REPLY: &str =
    "You have been re-subscribed to SMS messages. Reply STOP to unsubscribe.";

const STATUS_EVENT: &str = "message-status";

/// Status callback as posted by the gateway
#[derive(Debug, Clone, Deserialize)]
pub struct StatusCallback {
    #[serde(rename = "MessageSid")]
    pub message_sid: String,
    #[serde(rename = "MessageStatus")]
    pub message_status: String,
    #[serde(rename = "EventType")]
    pub event_type: Option<String>,
}

/// What an inbound message did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundAction {
    /// STOP: this many contacts were newly unsubscribed
    Unsubscribed { contacts: u64 },
    /// START: this many contacts were newly re-subscribed
    Resubscribed { contacts: u64 },
    /// No keyword in the message
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Keyword {
    Stop,
    Start,
}

impl Keyword {
    /// Case-insensitive substring match; STOP wins when both appear
    fn detect(body: &str) -> Option<Self> {
        let body = body.to_ascii_uppercase();
        if body.contains("STOP") {
            Some(Keyword::Stop)
        } else if body.contains("START") {
            Some(Keyword::Start)
        } else {
            None
        }
    }
}

/// Delivery-status reconciler
pub struct DeliveryReconciler {
    stores: Stores,
    sms: Arc<dyn SmsGateway>,
    metrics: Arc<EngineMetrics>,
}

impl DeliveryReconciler {
    pub fn new(stores: Stores, sms: Arc<dyn SmsGateway>, metrics: Arc<EngineMetrics>) -> Self {
        Self {
            stores,
            sms,
            metrics,
        }
    }

    /// Overwrite the status of the message with this provider id.
    ///
    /// Unknown ids are a no-op returning `None`. A transition into
    /// `delivered` also advances the campaign's delivered count, once.
    pub async fn reconcile(
        &self,
        provider_message_id: &str,
        status: &str,
        delivered_at: Option<DateTime<Utc>>,
    ) -> Result<Option<MessageStatusChange>> {
        let status = status.trim().to_ascii_lowercase();
        let Some(change) = self
            .stores
            .messages
            .apply_status(provider_message_id, &status, delivered_at)
            .await?
        else {
            debug!(provider_message_id, "Status update for unknown message ignored");
            return Ok(None);
        };

        self.metrics.record_delivery_update();
        debug!(
            provider_message_id,
            from = %change.previous_status,
            to = %change.status,
            "Message status updated"
        );

        if change.newly_delivered() {
            if let Some(campaign_id) = change.campaign_id {
                self.stores.campaigns.increment_delivered(campaign_id).await?;
            }
        }

        Ok(Some(change))
    }

    /// Apply a gateway status callback. Events other than message status
    /// updates are ignored.
    pub async fn handle_status_callback(
        &self,
        callback: &StatusCallback,
    ) -> Result<Option<MessageStatusChange>> {
        if let Some(event) = callback.event_type.as_deref() {
            if !event.is_empty() && event != STATUS_EVENT {
                debug!(event, "Ignoring non-status callback");
                return Ok(None);
            }
        }

        let delivered_at = callback
            .message_status
            .eq_ignore_ascii_case(MessageStatus::Delivered.as_str())
            .then(Utc::now);

        self.reconcile(&callback.message_sid, &callback.message_status, delivered_at)
            .await
    }

    /// Handle a recipient's reply, acting on STOP and START keywords.
    ///
    /// Every keyword is acknowledged by SMS, even from an unknown number.
    /// A STOP is counted against a campaign only when it unsubscribed a
    /// contact, so redelivered replies are not counted twice.
    pub async fn handle_inbound(&self, from: &str, body: &str) -> Result<InboundAction> {
        let Some(keyword) = Keyword::detect(body) else {
            return Ok(InboundAction::Ignored);
        };

        let phone = format_phone_number(from);
        let unsubscribe = keyword == Keyword::Stop;

        let change = self
            .stores
            .contacts
            .set_unsubscribed(&phone, unsubscribe, Utc::now())
            .await?;
        if change.matched == 0 {
            warn!(phone = %phone, ?keyword, "Keyword reply from unknown number");
        }

        let contacts = change.changed;
        let (action, reply) = if unsubscribe {
            if contacts > 0 {
                self.attribute_unsubscribe(&phone).await;
            }
            info!(phone = %phone, contacts, "Unsubscribed via STOP");
            (InboundAction::Unsubscribed { contacts }, UNSUBSCRIBED_REPLY)
        } else {
            info!(phone = %phone, contacts, "Re-subscribed via START");
            (InboundAction::Resubscribed { contacts }, RESUBSCRIBED_REPLY)
        };

        let result = self.sms.send(&phone, reply, None).await;
        if result.is_failed() {
            error!(
                phone = %phone,
                "Failed to send keyword confirmation: {}",
                result.error_message.unwrap_or_default()
            );
        }

        Ok(action)
    }

    /// Count the STOP against the campaign that last messaged this number
    async fn attribute_unsubscribe(&self, phone: &str) {
        let latest = match self.stores.messages.latest_to_phone(phone).await {
            Ok(latest) => latest,
            Err(e) => {
                warn!(phone, "Could not look up last message: {}", e);
                return;
            }
        };

        if let Some(campaign_id) = latest.and_then(|m| m.campaign_id) {
            if let Err(e) = self
                .stores
                .campaigns
                .increment_unsubscribes(campaign_id)
                .await
            {
                warn!(%campaign_id, "Failed to count unsubscribe: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{add_contact, FakeGateway};
    use pretty_assertions::assert_eq;
    use smscast_storage::memory::MemoryStore;
    use smscast_storage::models::{Campaign, CreateCampaign, CreateMessage};
    use smscast_storage::repository::{CampaignRepository, ContactRepository, MessageRepository};
    use uuid::Uuid;

    struct Harness {
        store: Arc<MemoryStore>,
        gateway: Arc<FakeGateway>,
        reconciler: DeliveryReconciler,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(FakeGateway::new());
        let reconciler = DeliveryReconciler::new(
            Stores::in_memory(store.clone()),
            gateway.clone(),
            Arc::new(EngineMetrics::new().unwrap()),
        );
        Harness {
            store,
            gateway,
            reconciler,
        }
    }

    async fn campaign(store: &MemoryStore) -> Campaign {
        CampaignRepository::create(
            store,
            CreateCampaign {
                owner_id: Uuid::new_v4(),
                name: "c".into(),
                content: "x".into(),
                ..CreateCampaign::default()
            },
        )
        .await
        .unwrap()
    }

    async fn message(store: &MemoryStore, campaign: &Campaign, phone: &str, sid: &str) {
        MessageRepository::create(
            store,
            CreateMessage {
                campaign_id: Some(campaign.id),
                contact_id: None,
                phone_number: phone.into(),
                content: "x".into(),
                status: "sent".into(),
                provider_message_id: Some(sid.into()),
                error_message: None,
                sent_at: Some(Utc::now()),
            },
        )
        .await
        .unwrap();
    }

    async fn delivered_count(store: &MemoryStore, campaign: &Campaign) -> i32 {
        CampaignRepository::get(store, campaign.id)
            .await
            .unwrap()
            .unwrap()
            .delivered_count
    }

    #[tokio::test]
    async fn test_reconcile_updates_status_and_counts_once() {
        let h = harness();
        let c = campaign(&h.store).await;
        message(&h.store, &c, "+15550000001", "SM1").await;

        let at = Utc::now();
        let change = h
            .reconciler
            .reconcile("SM1", "Delivered", Some(at))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(change.status, "delivered");

        let stored = h.store.find_by_provider_id("SM1").await.unwrap().unwrap();
        assert_eq!(stored.status, "delivered");
        assert_eq!(stored.delivered_at, Some(at));
        assert_eq!(delivered_count(&h.store, &c).await, 1);

        // Duplicate webhook
        h.reconciler
            .reconcile("SM1", "delivered", Some(at))
            .await
            .unwrap();
        assert_eq!(delivered_count(&h.store, &c).await, 1);
    }

    #[tokio::test]
    async fn test_reconcile_without_delivered_at_keeps_timestamp() {
        let h = harness();
        let c = campaign(&h.store).await;
        message(&h.store, &c, "+15550000001", "SM1").await;

        h.reconciler
            .reconcile("SM1", "undelivered", None)
            .await
            .unwrap();
        let stored = h.store.find_by_provider_id("SM1").await.unwrap().unwrap();
        assert_eq!(stored.status, "undelivered");
        assert_eq!(stored.delivered_at, None);
        assert_eq!(delivered_count(&h.store, &c).await, 0);
    }

    #[tokio::test]
    async fn test_unknown_provider_id_is_noop() {
        let h = harness();
        let c = campaign(&h.store).await;
        message(&h.store, &c, "+15550000001", "SM1").await;

        let change = h
            .reconciler
            .reconcile("SM-unknown", "delivered", Some(Utc::now()))
            .await
            .unwrap();
        assert_eq!(change, None);

        let stored = h.store.find_by_provider_id("SM1").await.unwrap().unwrap();
        assert_eq!(stored.status, "sent");
        assert_eq!(delivered_count(&h.store, &c).await, 0);
    }

    #[tokio::test]
    async fn test_status_callback_stamps_delivery_and_skips_other_events() {
        let h = harness();
        let c = campaign(&h.store).await;
        message(&h.store, &c, "+15550000001", "SM1").await;

        let other = StatusCallback {
            message_sid: "SM1".into(),
            message_status: "delivered".into(),
            event_type: Some("onMessageAdded".into()),
        };
        assert_eq!(h.reconciler.handle_status_callback(&other).await.unwrap(), None);

        let callback = StatusCallback {
            event_type: Some("message-status".into()),
            ..other
        };
        h.reconciler.handle_status_callback(&callback).await.unwrap();
        let stored = h.store.find_by_provider_id("SM1").await.unwrap().unwrap();
        assert_eq!(stored.status, "delivered");
        assert!(stored.delivered_at.is_some());
    }

    #[tokio::test]
    async fn test_stop_unsubscribes_and_confirms() {
        let h = harness();
        let owner = Uuid::new_v4();
        add_contact(&h.store, owner, "Ann", "+15550000001", &[], true).await;
        let c = campaign(&h.store).await;
        message(&h.store, &c, "+15550000001", "SM1").await;

        let action = h
            .reconciler
            .handle_inbound("(555) 000-0001", "please stop texting me")
            .await
            .unwrap();
        assert_eq!(action, InboundAction::Unsubscribed { contacts: 1 });

        let contact = h
            .store
            .get_by_phone(owner, "+15550000001")
            .await
            .unwrap()
            .unwrap();
        assert!(contact.is_unsubscribed);
        assert!(!contact.is_eligible());

        let sent = h.gateway.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "+15550000001");
        assert_eq!(sent[0].body, UNSUBSCRIBED_REPLY);

        let c = CampaignRepository::get(h.store.as_ref(), c.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(c.unsubscribe_count, 1);
    }

    #[tokio::test]
    async fn test_start_resubscribes() {
        let h = harness();
        let owner = Uuid::new_v4();
        add_contact(&h.store, owner, "Ann", "+15550000001", &[], true).await;
        h.store
            .set_unsubscribed("+15550000001", true, Utc::now())
            .await
            .unwrap();

        let action = h
            .reconciler
            .handle_inbound("+15550000001", "Start")
            .await
            .unwrap();
        assert_eq!(action, InboundAction::Resubscribed { contacts: 1 });

        let contact = h
            .store
            .get_by_phone(owner, "+15550000001")
            .await
            .unwrap()
            .unwrap();
        assert!(contact.is_eligible());
        assert_eq!(h.gateway.sent()[0].body, RESUBSCRIBED_REPLY);
    }

    #[tokio::test]
    async fn test_repeated_stop_counts_once() {
        let h = harness();
        let owner = Uuid::new_v4();
        add_contact(&h.store, owner, "Ann", "+15550000001", &[], true).await;
        let c = campaign(&h.store).await;
        message(&h.store, &c, "+15550000001", "SM1").await;

        let first = h
            .reconciler
            .handle_inbound("+15550000001", "STOP")
            .await
            .unwrap();
        assert_eq!(first, InboundAction::Unsubscribed { contacts: 1 });
        let unsubscribed_at = h
            .store
            .get_by_phone(owner, "+15550000001")
            .await
            .unwrap()
            .unwrap()
            .unsubscribed_at;

        // Redelivered webhook
        let second = h
            .reconciler
            .handle_inbound("+15550000001", "STOP")
            .await
            .unwrap();
        assert_eq!(second, InboundAction::Unsubscribed { contacts: 0 });

        let c = CampaignRepository::get(h.store.as_ref(), c.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(c.unsubscribe_count, 1);

        let contact = h
            .store
            .get_by_phone(owner, "+15550000001")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(contact.unsubscribed_at, unsubscribed_at);

        // Both replies are still acknowledged
        let sent = h.gateway.sent();
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|s| s.body == UNSUBSCRIBED_REPLY));
    }

    #[tokio::test]
    async fn test_stop_from_unknown_number_is_confirmed() {
        let h = harness();
        let c = campaign(&h.store).await;
        message(&h.store, &c, "+15559999999", "SM1").await;

        let action = h
            .reconciler
            .handle_inbound("+15559999999", "STOP")
            .await
            .unwrap();
        assert_eq!(action, InboundAction::Unsubscribed { contacts: 0 });

        let sent = h.gateway.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "+15559999999");
        assert_eq!(sent[0].body, UNSUBSCRIBED_REPLY);

        let c = CampaignRepository::get(h.store.as_ref(), c.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(c.unsubscribe_count, 0);
    }

    #[tokio::test]
    async fn test_inbound_without_keyword_is_ignored() {
        let h = harness();
        add_contact(&h.store, Uuid::new_v4(), "Ann", "+15550000001", &[], true).await;

        assert_eq!(
            h.reconciler
                .handle_inbound("+15550000001", "Thanks!")
                .await
                .unwrap(),
            InboundAction::Ignored
        );
        assert!(h.gateway.sent().is_empty());
    }

    #[test]
    fn test_keyword_detection() {
        assert_eq!(Keyword::detect("STOP"), Some(Keyword::Stop));
        assert_eq!(Keyword::detect("unStoppable"), Some(Keyword::Stop));
        assert_eq!(Keyword::detect("start"), Some(Keyword::Start));
        assert_eq!(Keyword::detect("stop then start"), Some(Keyword::Stop));
        assert_eq!(Keyword::detect("hello"), None);
    }
}
