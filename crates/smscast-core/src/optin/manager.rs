//! Opt-In Manager - token-based double opt-in

use crate::gateway::{format_phone_number, is_valid_phone_number, SmsGateway};
use chrono::{Duration, Utc};
use smscast_common::config::OptInConfig;
use smscast_common::types::OwnerId;
use smscast_storage::models::{Contact, CreateOptInRequest, OptInRequest};
use smscast_storage::repository::Stores;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};

/// Provenance recorded on contacts confirmed through this flow
pub const OPT_IN_SOURCE: &str = "double_opt_in";

/// Opt-in errors
#[derive(Debug, Error)]
pub enum OptInError {
    #[error("Contact not found")]
    ContactNotFound,

    #[error("Contact is already opted in")]
    AlreadyOptedIn,

    #[error("Invalid phone number: {0}")]
    InvalidPhoneNumber(String),

    #[error("Invalid opt-in token")]
    InvalidToken,

    #[error("Opt-in request has expired")]
    Expired,

    #[error("Opt-in request already confirmed")]
    AlreadyConfirmed,

    #[error(transparent)]
    Storage(#[from] smscast_common::Error),
}

/// Opt-In Manager
pub struct OptInManager {
    stores: Stores,
    sms: Arc<dyn SmsGateway>,
    base_url: String,
    token_ttl: Duration,
}

impl OptInManager {
    /// Create a new manager. Confirmation links point at `base_url`.
    pub fn new(
        stores: Stores,
        sms: Arc<dyn SmsGateway>,
        base_url: &str,
        config: &OptInConfig,
    ) -> Self {
        Self {
            stores,
            sms,
            base_url: base_url.trim_end_matches('/').to_string(),
            token_ttl: Duration::hours(config.token_ttl_hours),
        }
    }

    /// Ask a contact to confirm their subscription by SMS
    pub async fn request_opt_in(
        &self,
        owner_id: OwnerId,
        phone_number: &str,
    ) -> Result<OptInRequest, OptInError> {
        let phone = format_phone_number(phone_number);
        if !is_valid_phone_number(&phone) {
            return Err(OptInError::InvalidPhoneNumber(phone_number.to_string()));
        }

        let contact = self
            .stores
            .contacts
            .get_by_phone(owner_id, &phone)
            .await?
            .ok_or(OptInError::ContactNotFound)?;
        if contact.is_opted_in {
            return Err(OptInError::AlreadyOptedIn);
        }

        let request = self
            .stores
            .opt_ins
            .create(CreateOptInRequest {
                contact_id: contact.id,
                phone_number: phone.clone(),
                token: generate_token(),
                expires_at: Utc::now() + self.token_ttl,
            })
            .await?;

        let body = self.confirmation_message(&contact, &request.token);
        let result = self.sms.send(&phone, &body, None).await;
        if result.is_failed() {
            error!(
                contact_id = %contact.id,
                "Failed to send opt-in request: {}",
                result.error_message.unwrap_or_default()
            );
        } else {
            info!(contact_id = %contact.id, "Opt-in request sent");
        }

        Ok(request)
    }

    /// Confirm an opt-in request and mark its contact opted in
    pub async fn confirm(&self, token: &str) -> Result<OptInRequest, OptInError> {
        let now = Utc::now();
        let request = self
            .stores
            .opt_ins
            .get_by_token(token)
            .await?
            .ok_or(OptInError::InvalidToken)?;
        if request.is_confirmed {
            return Err(OptInError::AlreadyConfirmed);
        }
        if request.is_expired(now) {
            return Err(OptInError::Expired);
        }

        // Lost a race with another confirmation, or expired in between
        let request = self
            .stores
            .opt_ins
            .confirm(token, now)
            .await?
            .ok_or(OptInError::AlreadyConfirmed)?;

        self.stores
            .contacts
            .mark_opted_in(request.contact_id, OPT_IN_SOURCE, now)
            .await?;

        info!(contact_id = %request.contact_id, "Opt-in confirmed");
        Ok(request)
    }

    fn confirmation_message(&self, contact: &Contact, token: &str) -> String {
        let name = contact
            .first_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or("there");
        format!(
            "Hi {}! Please confirm your SMS subscription by clicking: {}/api/opt-in/{}",
            name, self.base_url, token
        )
    }
}

/// 32 random bytes, hex encoded
fn generate_token() -> String {
    hex::encode(rand::random::<[u8; 32]>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{add_contact, FakeGateway};
    use pretty_assertions::assert_eq;
    use smscast_storage::memory::MemoryStore;
    use smscast_storage::repository::{ContactRepository, OptInRepository};
    use uuid::Uuid;

    struct Harness {
        store: Arc<MemoryStore>,
        gateway: Arc<FakeGateway>,
        manager: OptInManager,
        owner: Uuid,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(FakeGateway::new());
        let manager = OptInManager::new(
            Stores::in_memory(store.clone()),
            gateway.clone(),
            "https://sms.example.com/",
            &OptInConfig::default(),
        );
        Harness {
            store,
            gateway,
            manager,
            owner: Uuid::new_v4(),
        }
    }

    #[tokio::test]
    async fn test_request_and_confirm() {
        let h = harness();
        add_contact(&h.store, h.owner, "Ann", "+15550000001", &[], false).await;

        let request = h
            .manager
            .request_opt_in(h.owner, "555-000-0001")
            .await
            .unwrap();
        assert_eq!(request.token.len(), 64);
        assert!(request.expires_at > Utc::now() + Duration::hours(23));

        let sent = h.gateway.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(
            sent[0].body,
            format!(
                "Hi Ann! Please confirm your SMS subscription by clicking: https://sms.example.com/api/opt-in/{}",
                request.token
            )
        );

        let confirmed = h.manager.confirm(&request.token).await.unwrap();
        assert!(confirmed.is_confirmed);

        let contact = h
            .store
            .get_by_phone(h.owner, "+15550000001")
            .await
            .unwrap()
            .unwrap();
        assert!(contact.is_opted_in);
        assert!(contact.opt_in_date.is_some());
        assert_eq!(contact.opt_in_source.as_deref(), Some(OPT_IN_SOURCE));

        assert!(matches!(
            h.manager.confirm(&request.token).await,
            Err(OptInError::AlreadyConfirmed)
        ));
    }

    #[tokio::test]
    async fn test_expired_token_changes_nothing() {
        let h = harness();
        add_contact(&h.store, h.owner, "Ann", "+15550000001", &[], false).await;
        let request = h
            .manager
            .request_opt_in(h.owner, "+15550000001")
            .await
            .unwrap();
        h.store
            .set_opt_in_expiry(&request.token, Utc::now() - Duration::minutes(1))
            .await;

        assert!(matches!(
            h.manager.confirm(&request.token).await,
            Err(OptInError::Expired)
        ));

        let stored = h.store.get_by_token(&request.token).await.unwrap().unwrap();
        assert!(!stored.is_confirmed);
        let contact = h
            .store
            .get_by_phone(h.owner, "+15550000001")
            .await
            .unwrap()
            .unwrap();
        assert!(!contact.is_opted_in);
    }

    #[tokio::test]
    async fn test_request_errors() {
        let h = harness();
        add_contact(&h.store, h.owner, "Bob", "+15550000002", &[], true).await;

        assert!(matches!(
            h.manager.request_opt_in(h.owner, "12").await,
            Err(OptInError::InvalidPhoneNumber(_))
        ));
        assert!(matches!(
            h.manager.request_opt_in(h.owner, "+15550000001").await,
            Err(OptInError::ContactNotFound)
        ));
        assert!(matches!(
            h.manager.request_opt_in(h.owner, "+15550000002").await,
            Err(OptInError::AlreadyOptedIn)
        ));
        assert!(matches!(
            h.manager.confirm("not-a-token").await,
            Err(OptInError::InvalidToken)
        ));
        assert!(h.gateway.sent().is_empty());
    }

    #[tokio::test]
    async fn test_greeting_without_first_name() {
        let h = harness();
        ContactRepository::create(
            h.store.as_ref(),
            smscast_storage::models::CreateContact {
                owner_id: h.owner,
                phone_number: "+15550000003".into(),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        h.manager
            .request_opt_in(h.owner, "+15550000003")
            .await
            .unwrap();
        assert!(h.gateway.sent()[0].body.starts_with("Hi there! "));
    }

    #[test]
    fn test_tokens_are_unique_hex() {
        let a = generate_token();
        let b = generate_token();
        assert_ne!(a, b);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
