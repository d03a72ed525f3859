//! Campaign repository

use crate::db::DatabasePool;
use crate::models::{Campaign, CampaignOutcome, CampaignStatus, CreateCampaign};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use smscast_common::types::CampaignId;
use smscast_common::{Error, Result};
use uuid::Uuid;

/// Campaign repository trait
#[async_trait]
pub trait CampaignRepository: Send + Sync {
    async fn create(&self, input: CreateCampaign) -> Result<Campaign>;
    async fn get(&self, id: CampaignId) -> Result<Option<Campaign>>;
    /// Scheduled campaigns whose send time is at or before `now`
    async fn list_due(&self, now: DateTime<Utc>) -> Result<Vec<Campaign>>;
    /// Atomically move a draft or scheduled campaign to `sending` and stamp
    /// `sent_at`. Returns `None` when the campaign is missing or in any other state.
    async fn claim_for_sending(
        &self,
        id: CampaignId,
        now: DateTime<Utc>,
    ) -> Result<Option<Campaign>>;
    /// Mark a sending campaign `sent` and record its tallies
    async fn complete(&self, id: CampaignId, outcome: &CampaignOutcome) -> Result<()>;
    async fn mark_failed(&self, id: CampaignId) -> Result<()>;
    async fn increment_delivered(&self, id: CampaignId) -> Result<()>;
    async fn increment_clicks(&self, id: CampaignId) -> Result<()>;
    async fn increment_unsubscribes(&self, id: CampaignId) -> Result<()>;
}

/// Status a new campaign starts in: any send time makes it `scheduled`
/// and a past one is picked up on the next scheduler tick.
pub(crate) fn initial_status(scheduled_at: Option<DateTime<Utc>>) -> CampaignStatus {
    if scheduled_at.is_some() {
        CampaignStatus::Scheduled
    } else {
        CampaignStatus::Draft
    }
}

/// Database campaign repository
pub struct DbCampaignRepository {
    pool: DatabasePool,
}

impl DbCampaignRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    async fn increment(&self, id: CampaignId, column: &'static str) -> Result<()> {
        let sql = format!(
            "UPDATE campaigns SET {column} = {column} + 1, updated_at = NOW() WHERE id = $1"
        );
        sqlx::query(&sql)
            .bind(id)
            .execute(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl CampaignRepository for DbCampaignRepository {
    async fn create(&self, input: CreateCampaign) -> Result<Campaign> {
        let now = Utc::now();
        let status = initial_status(input.scheduled_at);

        sqlx::query_as::<_, Campaign>(
            r#"
            INSERT INTO campaigns (
                id, owner_id, name, content, tags, status, scheduled_at, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
            RETURNING *
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(input.owner_id)
        .bind(&input.name)
        .bind(&input.content)
        .bind(&input.tags)
        .bind(status.as_str())
        .bind(input.scheduled_at)
        .bind(now)
        .fetch_one(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn get(&self, id: CampaignId) -> Result<Option<Campaign>> {
        sqlx::query_as::<_, Campaign>("SELECT * FROM campaigns WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    async fn list_due(&self, now: DateTime<Utc>) -> Result<Vec<Campaign>> {
        sqlx::query_as::<_, Campaign>(
            r#"
            SELECT * FROM campaigns
            WHERE status = 'scheduled' AND scheduled_at IS NOT NULL AND scheduled_at <= $1
            ORDER BY scheduled_at ASC
            "#,
        )
        .bind(now)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn claim_for_sending(
        &self,
        id: CampaignId,
        now: DateTime<Utc>,
    ) -> Result<Option<Campaign>> {
        sqlx::query_as::<_, Campaign>(
            r#"
            UPDATE campaigns
            SET status = 'sending', sent_at = $2, updated_at = $2
            WHERE id = $1 AND status IN ('draft', 'scheduled')
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(now)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn complete(&self, id: CampaignId, outcome: &CampaignOutcome) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE campaigns
            SET status = 'sent',
                contacts_count = $2,
                sent_count = $3,
                failed_count = $4,
                delivered_count = delivered_count + $5,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(outcome.contacts_count)
        .bind(outcome.sent_count)
        .bind(outcome.failed_count)
        .bind(outcome.delivered_count)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }

    async fn mark_failed(&self, id: CampaignId) -> Result<()> {
        sqlx::query("UPDATE campaigns SET status = 'failed', updated_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }

    async fn increment_delivered(&self, id: CampaignId) -> Result<()> {
        self.increment(id, "delivered_count").await
    }

    async fn increment_clicks(&self, id: CampaignId) -> Result<()> {
        self.increment(id, "click_count").await
    }

    async fn increment_unsubscribes(&self, id: CampaignId) -> Result<()> {
        self.increment(id, "unsubscribe_count").await
    }
}
