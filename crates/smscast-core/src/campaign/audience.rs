//! Audience resolution - which contacts a campaign targets

use smscast_common::types::OwnerId;
use smscast_common::Result;
use smscast_storage::models::Contact;
use smscast_storage::repository::ContactRepository;
use std::sync::Arc;

/// Resolves a campaign's targeting tags to contacts
#[derive(Clone)]
pub struct AudienceResolver {
    contacts: Arc<dyn ContactRepository>,
}

impl AudienceResolver {
    pub fn new(contacts: Arc<dyn ContactRepository>) -> Self {
        Self { contacts }
    }

    /// All contacts of `owner_id` when `tags` is empty, otherwise those
    /// carrying any of `tags`. Opt-in state is not filtered here.
    pub async fn resolve(&self, owner_id: OwnerId, tags: &[String]) -> Result<Vec<Contact>> {
        if tags.is_empty() {
            self.contacts.list_by_owner(owner_id).await
        } else {
            self.contacts.list_by_tags(owner_id, tags).await
        }
    }

    /// Resolve and keep only contacts a campaign may send to
    pub async fn resolve_eligible(
        &self,
        owner_id: OwnerId,
        tags: &[String],
    ) -> Result<Vec<Contact>> {
        let mut contacts = self.resolve(owner_id, tags).await?;
        contacts.retain(Contact::is_eligible);
        Ok(contacts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smscast_storage::memory::MemoryStore;
    use smscast_storage::models::CreateContact;
    use uuid::Uuid;

    async fn add(
        store: &MemoryStore,
        owner: OwnerId,
        phone: &str,
        tags: &[&str],
        opted_in: bool,
    ) {
        ContactRepository::create(
            store,
            CreateContact {
                owner_id: owner,
                phone_number: phone.to_string(),
                tags: tags.iter().map(|t| t.to_string()).collect(),
                is_opted_in: opted_in,
                ..CreateContact::default()
            },
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_empty_tags_resolve_all_owner_contacts() {
        let store = Arc::new(MemoryStore::new());
        let owner = Uuid::new_v4();
        add(&store, owner, "+15550000001", &["vip"], true).await;
        add(&store, owner, "+15550000002", &[], false).await;
        add(&store, Uuid::new_v4(), "+15550000003", &[], true).await;

        let resolver = AudienceResolver::new(store.clone());
        assert_eq!(resolver.resolve(owner, &[]).await.unwrap().len(), 2);
        assert_eq!(resolver.resolve_eligible(owner, &[]).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_tags_match_with_or() {
        let store = Arc::new(MemoryStore::new());
        let owner = Uuid::new_v4();
        add(&store, owner, "+15550000001", &["vip"], true).await;
        add(&store, owner, "+15550000002", &["local"], true).await;
        add(&store, owner, "+15550000003", &["vip", "local"], true).await;
        add(&store, owner, "+15550000004", &["other"], true).await;

        let resolver = AudienceResolver::new(store.clone());
        let tags = vec!["vip".to_string(), "local".to_string()];
        let contacts = resolver.resolve(owner, &tags).await.unwrap();
        assert_eq!(contacts.len(), 3);
        assert!(contacts.iter().all(|c| c.phone_number != "+15550000004"));
    }

    #[tokio::test]
    async fn test_unsubscribed_contacts_are_not_eligible() {
        let store = Arc::new(MemoryStore::new());
        let owner = Uuid::new_v4();
        add(&store, owner, "+15550000001", &[], true).await;
        add(&store, owner, "+15550000002", &[], true).await;
        store
            .set_unsubscribed("+15550000002", true, chrono::Utc::now())
            .await
            .unwrap();

        let resolver = AudienceResolver::new(store.clone());
        let eligible = resolver.resolve_eligible(owner, &[]).await.unwrap();
        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible[0].phone_number, "+15550000001");
    }
}
