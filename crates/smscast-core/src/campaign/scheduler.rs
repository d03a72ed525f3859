//! Campaign scheduler - starts scheduled campaigns once their time has come

use super::engine::{CampaignEngine, CampaignError};
use chrono::Utc;
use smscast_common::config::SchedulerConfig;
use smscast_common::Result;
use smscast_storage::models::Campaign;
use smscast_storage::repository::CampaignRepository;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

struct Running {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Periodically executes due campaigns
pub struct CampaignScheduler {
    engine: Arc<CampaignEngine>,
    campaigns: Arc<dyn CampaignRepository>,
    poll_interval: Duration,
    running: Mutex<Option<Running>>,
}

impl CampaignScheduler {
    /// Create a new scheduler polling every 60 seconds
    pub fn new(engine: Arc<CampaignEngine>, campaigns: Arc<dyn CampaignRepository>) -> Self {
        Self {
            engine,
            campaigns,
            poll_interval: Duration::from_secs(60),
            running: Mutex::new(None),
        }
    }

    pub fn from_config(
        engine: Arc<CampaignEngine>,
        campaigns: Arc<dyn CampaignRepository>,
        config: &SchedulerConfig,
    ) -> Self {
        Self::new(engine, campaigns).with_poll_interval(config.poll_interval_secs)
    }

    /// Set poll interval
    pub fn with_poll_interval(mut self, secs: u64) -> Self {
        self.poll_interval = Duration::from_secs(secs.max(1));
        self
    }

    /// Start polling. Does nothing if already running.
    pub async fn start(self: &Arc<Self>) {
        let mut running = self.running.lock().await;
        if running.is_some() {
            debug!("Campaign scheduler already running");
            return;
        }

        let cancel = CancellationToken::new();
        let scheduler = Arc::clone(self);
        let token = cancel.clone();
        let handle = tokio::spawn(async move { scheduler.run(token).await });

        info!(
            "Campaign scheduler started (interval: {}s)",
            self.poll_interval.as_secs()
        );
        *running = Some(Running { cancel, handle });
    }

    /// Stop polling and wait for the loop to exit. Does nothing if not running.
    ///
    /// A campaign already being sent runs to completion; due campaigns not
    /// yet claimed stay scheduled for the next start.
    pub async fn stop(&self) {
        let Some(Running { cancel, handle }) = self.running.lock().await.take() else {
            return;
        };

        cancel.cancel();
        if let Err(e) = handle.await {
            error!("Campaign scheduler task ended abnormally: {}", e);
        }
        info!("Campaign scheduler stopped");
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    async fn run(&self, cancel: CancellationToken) {
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.run_due_until(&cancel).await {
                        error!("Error checking scheduled campaigns: {}", e);
                    }
                }
            }
        }
    }

    /// Execute every campaign whose scheduled time has passed.
    /// Returns how many were sent by this pass.
    pub async fn run_due(&self) -> Result<usize> {
        self.run_due_until(&CancellationToken::new()).await
    }

    async fn run_due_until(&self, cancel: &CancellationToken) -> Result<usize> {
        let due = self.campaigns.list_due(Utc::now()).await?;
        if due.is_empty() {
            return Ok(0);
        }

        debug!("Found {} due campaign(s)", due.len());
        Ok(self.execute_each(&due, cancel).await)
    }

    /// Execute campaigns one after another; a failure only affects its own campaign.
    /// Stops claiming new campaigns once `cancel` fires.
    async fn execute_each(&self, campaigns: &[Campaign], cancel: &CancellationToken) -> usize {
        let mut executed = 0;
        for campaign in campaigns {
            if cancel.is_cancelled() {
                debug!(campaign_id = %campaign.id, "Scheduler stopping; campaign left for later");
                break;
            }
            match self.engine.execute(campaign).await {
                Ok(_) => executed += 1,
                // Claimed by a manual send or another instance in the meantime
                Err(CampaignError::NotExecutable { status }) => {
                    debug!(campaign_id = %campaign.id, status = %status, "Skipping campaign")
                }
                Err(e) => warn!(campaign_id = %campaign.id, "Scheduled campaign failed: {}", e),
            }
        }
        executed
    }
}
