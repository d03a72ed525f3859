//! Short link repository

use crate::db::DatabasePool;
use crate::models::{ClickInfo, CreateShortLink, ShortLink};
use async_trait::async_trait;
use chrono::Utc;
use smscast_common::{Error, Result};
use uuid::Uuid;

/// Short link repository trait
#[async_trait]
pub trait ShortLinkRepository: Send + Sync {
    async fn create(&self, input: CreateShortLink) -> Result<ShortLink>;
    async fn get_by_code(&self, short_code: &str) -> Result<Option<ShortLink>>;
    /// Count a click and log it. Returns the updated link, or `None` for an unknown code.
    async fn record_click(&self, short_code: &str, info: ClickInfo) -> Result<Option<ShortLink>>;
}

/// Database short link repository
pub struct DbShortLinkRepository {
    pool: DatabasePool,
}

impl DbShortLinkRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ShortLinkRepository for DbShortLinkRepository {
    async fn create(&self, input: CreateShortLink) -> Result<ShortLink> {
        sqlx::query_as::<_, ShortLink>(
            r#"
            INSERT INTO short_links (
                id, owner_id, campaign_id, original_url, short_code, short_url, title, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(input.owner_id)
        .bind(input.campaign_id)
        .bind(&input.original_url)
        .bind(&input.short_code)
        .bind(&input.short_url)
        .bind(&input.title)
        .bind(Utc::now())
        .fetch_one(self.pool.pool())
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                Error::Conflict(format!("Short code already exists: {}", input.short_code))
            }
            e => Error::Database(e.to_string()),
        })
    }

    async fn get_by_code(&self, short_code: &str) -> Result<Option<ShortLink>> {
        sqlx::query_as::<_, ShortLink>("SELECT * FROM short_links WHERE short_code = $1")
            .bind(short_code)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    async fn record_click(&self, short_code: &str, info: ClickInfo) -> Result<Option<ShortLink>> {
        let mut tx = self
            .pool
            .pool()
            .begin()
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        let link = sqlx::query_as::<_, ShortLink>(
            r#"
            UPDATE short_links SET click_count = click_count + 1
            WHERE short_code = $1
            RETURNING *
            "#,
        )
        .bind(short_code)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        let Some(link) = link else {
            return Ok(None);
        };

        sqlx::query(
            r#"
            INSERT INTO link_clicks (id, short_link_id, campaign_id, ip_address, user_agent, clicked_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(link.id)
        .bind(link.campaign_id)
        .bind(&info.ip_address)
        .bind(&info.user_agent)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        Ok(Some(link))
    }
}
