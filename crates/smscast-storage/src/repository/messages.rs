//! Outbound message repository

use crate::db::DatabasePool;
use crate::models::{CreateMessage, Message, MessageStatusChange};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use smscast_common::types::{CampaignId, MessageId};
use smscast_common::{Error, Result};
use uuid::Uuid;

/// Message repository trait
#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn create(&self, input: CreateMessage) -> Result<Message>;
    async fn list_by_campaign(&self, campaign_id: CampaignId) -> Result<Vec<Message>>;
    async fn find_by_provider_id(&self, provider_message_id: &str) -> Result<Option<Message>>;
    /// Overwrite the status of the message with this provider id, setting
    /// `delivered_at` when given. Returns `None` if no message matches.
    async fn apply_status(
        &self,
        provider_message_id: &str,
        status: &str,
        delivered_at: Option<DateTime<Utc>>,
    ) -> Result<Option<MessageStatusChange>>;
    /// Most recent message sent to a phone number
    async fn latest_to_phone(&self, phone_number: &str) -> Result<Option<Message>>;
}

/// Database message repository
pub struct DbMessageRepository {
    pool: DatabasePool,
}

impl DbMessageRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageRepository for DbMessageRepository {
    async fn create(&self, input: CreateMessage) -> Result<Message> {
        sqlx::query_as::<_, Message>(
            r#"
            INSERT INTO messages (
                id, campaign_id, contact_id, phone_number, content, status,
                provider_message_id, error_message, sent_at, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(input.campaign_id)
        .bind(input.contact_id)
        .bind(&input.phone_number)
        .bind(&input.content)
        .bind(&input.status)
        .bind(&input.provider_message_id)
        .bind(&input.error_message)
        .bind(input.sent_at)
        .bind(Utc::now())
        .fetch_one(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn list_by_campaign(&self, campaign_id: CampaignId) -> Result<Vec<Message>> {
        sqlx::query_as::<_, Message>(
            "SELECT * FROM messages WHERE campaign_id = $1 ORDER BY created_at ASC, id ASC",
        )
        .bind(campaign_id)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn find_by_provider_id(&self, provider_message_id: &str) -> Result<Option<Message>> {
        sqlx::query_as::<_, Message>("SELECT * FROM messages WHERE provider_message_id = $1")
            .bind(provider_message_id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    async fn apply_status(
        &self,
        provider_message_id: &str,
        status: &str,
        delivered_at: Option<DateTime<Utc>>,
    ) -> Result<Option<MessageStatusChange>> {
        // Lock the row so the previous status reported back is the one replaced.
        let row: Option<(MessageId, Option<CampaignId>, String, String)> = sqlx::query_as(
            r#"
            UPDATE messages m
            SET status = $2, delivered_at = COALESCE($3, m.delivered_at)
            FROM (
                SELECT id, status FROM messages
                WHERE provider_message_id = $1
                LIMIT 1
                FOR UPDATE
            ) prev
            WHERE m.id = prev.id
            RETURNING m.id, m.campaign_id, prev.status, m.status
            "#,
        )
        .bind(provider_message_id)
        .bind(status)
        .bind(delivered_at)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(row.map(
            |(message_id, campaign_id, previous_status, status)| MessageStatusChange {
                message_id,
                campaign_id,
                previous_status,
                status,
            },
        ))
    }

    async fn latest_to_phone(&self, phone_number: &str) -> Result<Option<Message>> {
        sqlx::query_as::<_, Message>(
            r#"
            SELECT * FROM messages
            WHERE phone_number = $1
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(phone_number)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }
}
