//! Short-link click tracking

use crate::metrics::EngineMetrics;
use smscast_common::Result;
use smscast_storage::models::ClickInfo;
use smscast_storage::repository::Stores;
use std::sync::Arc;
use tracing::{debug, warn};

/// Records clicks on short links and resolves them to their targets
pub struct ClickTracker {
    stores: Stores,
    metrics: Arc<EngineMetrics>,
}

impl ClickTracker {
    pub fn new(stores: Stores, metrics: Arc<EngineMetrics>) -> Self {
        Self { stores, metrics }
    }

    /// Record a click and return the URL to redirect to, or `None` for an
    /// unknown code
    pub async fn follow(&self, short_code: &str, info: ClickInfo) -> Result<Option<String>> {
        let Some(link) = self.stores.short_links.record_click(short_code, info).await? else {
            debug!(short_code, "Unknown short code");
            return Ok(None);
        };

        self.metrics.record_link_click();
        if let Some(campaign_id) = link.campaign_id {
            // The click row is already stored; only the campaign tally is lost
            if let Err(e) = self.stores.campaigns.increment_clicks(campaign_id).await {
                warn!(%campaign_id, "Failed to count click: {}", e);
            }
        }

        Ok(Some(link.original_url))
    }
}
