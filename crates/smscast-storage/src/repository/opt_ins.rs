//! Double opt-in request repository

use crate::db::DatabasePool;
use crate::models::{CreateOptInRequest, OptInRequest};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use smscast_common::{Error, Result};
use uuid::Uuid;

/// Opt-in request repository trait
#[async_trait]
pub trait OptInRepository: Send + Sync {
    async fn create(&self, input: CreateOptInRequest) -> Result<OptInRequest>;
    async fn get_by_token(&self, token: &str) -> Result<Option<OptInRequest>>;
    /// Confirm an unconfirmed, unexpired request. Returns `None` when the
    /// token is unknown, already confirmed or expired at `now`.
    async fn confirm(&self, token: &str, now: DateTime<Utc>) -> Result<Option<OptInRequest>>;
}

/// Database opt-in request repository
pub struct DbOptInRepository {
    pool: DatabasePool,
}

impl DbOptInRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OptInRepository for DbOptInRepository {
    async fn create(&self, input: CreateOptInRequest) -> Result<OptInRequest> {
        sqlx::query_as::<_, OptInRequest>(
            r#"
            INSERT INTO opt_in_requests (id, contact_id, phone_number, token, expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(input.contact_id)
        .bind(&input.phone_number)
        .bind(&input.token)
        .bind(input.expires_at)
        .bind(Utc::now())
        .fetch_one(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn get_by_token(&self, token: &str) -> Result<Option<OptInRequest>> {
        sqlx::query_as::<_, OptInRequest>("SELECT * FROM opt_in_requests WHERE token = $1")
            .bind(token)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    async fn confirm(&self, token: &str, now: DateTime<Utc>) -> Result<Option<OptInRequest>> {
        sqlx::query_as::<_, OptInRequest>(
            r#"
            UPDATE opt_in_requests
            SET is_confirmed = TRUE, confirmed_at = $2
            WHERE token = $1 AND NOT is_confirmed AND expires_at >= $2
            RETURNING *
            "#,
        )
        .bind(token)
        .bind(now)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }
}
