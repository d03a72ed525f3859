//! Prometheus counters for sending, delivery and clicks

use prometheus::{Encoder, IntCounter, Registry, TextEncoder};
use smscast_common::{Error, Result};

/// Engine metrics, registered in their own registry
pub struct EngineMetrics {
    registry: Registry,
    sms_sent: IntCounter,
    sms_failed: IntCounter,
    campaigns_completed: IntCounter,
    campaigns_failed: IntCounter,
    delivery_updates: IntCounter,
    link_clicks: IntCounter,
}

impl EngineMetrics {
    /// Create and register all counters
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let sms_sent = counter(
            &registry,
            "smscast_sms_sent_total",
            "SMS accepted by the gateway",
        )?;
        let sms_failed = counter(
            &registry,
            "smscast_sms_failed_total",
            "SMS that failed validation or were rejected",
        )?;
        let campaigns_completed = counter(
            &registry,
            "smscast_campaigns_completed_total",
            "Campaigns that finished sending",
        )?;
        let campaigns_failed = counter(
            &registry,
            "smscast_campaigns_failed_total",
            "Campaigns aborted by a campaign-level error",
        )?;
        let delivery_updates = counter(
            &registry,
            "smscast_delivery_updates_total",
            "Delivery status callbacks applied to a message",
        )?;
        let link_clicks = counter(
            &registry,
            "smscast_link_clicks_total",
            "Short link redirects served",
        )?;

        Ok(Self {
            registry,
            sms_sent,
            sms_failed,
            campaigns_completed,
            campaigns_failed,
            delivery_updates,
            link_clicks,
        })
    }

    pub fn record_sms_sent(&self) {
        self.sms_sent.inc();
    }

    pub fn record_sms_failed(&self) {
        self.sms_failed.inc();
    }

    pub fn record_campaign_completed(&self) {
        self.campaigns_completed.inc();
    }

    pub fn record_campaign_failed(&self) {
        self.campaigns_failed.inc();
    }

    pub fn record_delivery_update(&self) {
        self.delivery_updates.inc();
    }

    pub fn record_link_click(&self) {
        self.link_clicks.inc();
    }

    pub fn sms_sent(&self) -> u64 {
        self.sms_sent.get()
    }

    pub fn sms_failed(&self) -> u64 {
        self.sms_failed.get()
    }

    /// Render all metrics in the Prometheus text format
    pub fn render(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| Error::Internal(format!("Failed to encode metrics: {}", e)))?;
        String::from_utf8(buffer)
            .map_err(|e| Error::Internal(format!("Metrics are not UTF-8: {}", e)))
    }
}

fn counter(registry: &Registry, name: &str, help: &str) -> Result<IntCounter> {
    let counter = IntCounter::new(name, help)
        .map_err(|e| Error::Internal(format!("Failed to create metric {}: {}", name, e)))?;
    registry
        .register(Box::new(counter.clone()))
        .map_err(|e| Error::Internal(format!("Failed to register metric {}: {}", name, e)))?;
    Ok(counter)
}
