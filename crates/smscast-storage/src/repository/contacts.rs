//! Contact repository

use crate::db::DatabasePool;
use crate::models::{Contact, CreateContact, SubscriptionChange};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use smscast_common::types::{ContactId, OwnerId};
use smscast_common::{Error, Result};
use uuid::Uuid;

/// Contact repository trait
#[async_trait]
pub trait ContactRepository: Send + Sync {
    async fn create(&self, input: CreateContact) -> Result<Contact>;
    async fn get(&self, id: ContactId) -> Result<Option<Contact>>;
    /// All contacts of an owner, regardless of opt-in state
    async fn list_by_owner(&self, owner_id: OwnerId) -> Result<Vec<Contact>>;
    /// Contacts of an owner carrying at least one of `tags`
    async fn list_by_tags(&self, owner_id: OwnerId, tags: &[String]) -> Result<Vec<Contact>>;
    async fn get_by_phone(&self, owner_id: OwnerId, phone_number: &str)
        -> Result<Option<Contact>>;
    async fn mark_opted_in(&self, id: ContactId, source: &str, at: DateTime<Utc>) -> Result<()>;
    /// Set or clear the unsubscribed flag on every contact with this number.
    /// Contacts already in the requested state are left untouched.
    async fn set_unsubscribed(
        &self,
        phone_number: &str,
        unsubscribed: bool,
        at: DateTime<Utc>,
    ) -> Result<SubscriptionChange>;
}

/// Database contact repository
pub struct DbContactRepository {
    pool: DatabasePool,
}

impl DbContactRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ContactRepository for DbContactRepository {
    async fn create(&self, input: CreateContact) -> Result<Contact> {
        let now = Utc::now();
        let opt_in_date = input.is_opted_in.then_some(now);

        sqlx::query_as::<_, Contact>(
            r#"
            INSERT INTO contacts (
                id, owner_id, first_name, last_name, phone_number, email, tags,
                is_opted_in, opt_in_date, opt_in_source, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11)
            RETURNING *
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(input.owner_id)
        .bind(&input.first_name)
        .bind(&input.last_name)
        .bind(&input.phone_number)
        .bind(&input.email)
        .bind(&input.tags)
        .bind(input.is_opted_in)
        .bind(opt_in_date)
        .bind(&input.opt_in_source)
        .bind(now)
        .fetch_one(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn get(&self, id: ContactId) -> Result<Option<Contact>> {
        sqlx::query_as::<_, Contact>("SELECT * FROM contacts WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    async fn list_by_owner(&self, owner_id: OwnerId) -> Result<Vec<Contact>> {
        sqlx::query_as::<_, Contact>(
            "SELECT * FROM contacts WHERE owner_id = $1 ORDER BY created_at ASC, id ASC",
        )
        .bind(owner_id)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn list_by_tags(&self, owner_id: OwnerId, tags: &[String]) -> Result<Vec<Contact>> {
        sqlx::query_as::<_, Contact>(
            r#"
            SELECT * FROM contacts
            WHERE owner_id = $1 AND tags && $2
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(owner_id)
        .bind(tags)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn get_by_phone(
        &self,
        owner_id: OwnerId,
        phone_number: &str,
    ) -> Result<Option<Contact>> {
        sqlx::query_as::<_, Contact>(
            "SELECT * FROM contacts WHERE owner_id = $1 AND phone_number = $2 LIMIT 1",
        )
        .bind(owner_id)
        .bind(phone_number)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn mark_opted_in(&self, id: ContactId, source: &str, at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE contacts
            SET is_opted_in = TRUE, opt_in_date = $2, opt_in_source = $3, updated_at = $2
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(at)
        .bind(source)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }

    async fn set_unsubscribed(
        &self,
        phone_number: &str,
        unsubscribed: bool,
        at: DateTime<Utc>,
    ) -> Result<SubscriptionChange> {
        let unsubscribed_at = unsubscribed.then_some(at);
        let (matched, changed): (i64, i64) = sqlx::query_as(
            r#"
            WITH updated AS (
                UPDATE contacts
                SET is_unsubscribed = $2, unsubscribed_at = $3, updated_at = $4
                WHERE phone_number = $1 AND is_unsubscribed <> $2
                RETURNING id
            )
            SELECT
                (SELECT COUNT(*) FROM contacts WHERE phone_number = $1),
                (SELECT COUNT(*) FROM updated)
            "#,
        )
        .bind(phone_number)
        .bind(unsubscribed)
        .bind(unsubscribed_at)
        .bind(at)
        .fetch_one(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(SubscriptionChange {
            matched: matched as u64,
            changed: changed as u64,
        })
    }
}
