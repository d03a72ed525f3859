//! Scripted collaborators shared by the unit tests

use crate::gateway::{LinkShortener, LinkSource, SendResult, ShortLinkResult, SmsGateway};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use smscast_common::types::{ContactId, OwnerId};
use smscast_common::{Error, Result};
use smscast_storage::memory::MemoryStore;
use smscast_storage::models::{Contact, CreateContact, SubscriptionChange};
use smscast_storage::repository::ContactRepository;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

#[derive(Debug, Clone)]
pub(crate) struct SentSms {
    pub to: String,
    pub body: String,
    pub status_callback: Option<String>,
}

/// Records every send; rejects numbers in `failing`
pub(crate) struct FakeGateway {
    sent: Mutex<Vec<SentSms>>,
    failing: HashSet<String>,
    status: String,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            failing: HashSet::new(),
            status: "queued".to_string(),
        }
    }

    pub fn failing_for(mut self, numbers: &[&str]) -> Self {
        self.failing = numbers.iter().map(|n| n.to_string()).collect();
        self
    }

    pub fn with_status(mut self, status: &str) -> Self {
        self.status = status.to_string();
        self
    }

    pub fn sent(&self) -> Vec<SentSms> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl SmsGateway for FakeGateway {
    async fn send(&self, to: &str, body: &str, status_callback: Option<&str>) -> SendResult {
        let mut sent = self.sent.lock().unwrap();
        sent.push(SentSms {
            to: to.to_string(),
            body: body.to_string(),
            status_callback: status_callback.map(str::to_string),
        });

        if self.failing.contains(to) {
            SendResult::failed("The 'To' number is not reachable.")
        } else {
            SendResult::accepted(format!("SM{:04}", sent.len()), self.status.clone())
        }
    }
}

/// Mints `https://sms.ly/link1`, `link2`, ... in call order
#[derive(Default)]
pub(crate) struct FakeShortener {
    minted: AtomicUsize,
}

#[async_trait]
impl LinkShortener for FakeShortener {
    async fn shorten(&self, original_url: &str, _title: Option<&str>) -> ShortLinkResult {
        let n = self.minted.fetch_add(1, Ordering::SeqCst) + 1;
        let short_code = format!("link{}", n);
        ShortLinkResult {
            short_url: format!("https://sms.ly/{}", short_code),
            short_code,
            original_url: original_url.to_string(),
            success: true,
            error: None,
            source: LinkSource::Fallback,
        }
    }
}

/// Contact store whose every call fails
pub(crate) struct FailingContacts;

#[async_trait]
impl ContactRepository for FailingContacts {
    async fn create(&self, _input: CreateContact) -> Result<Contact> {
        Err(unavailable())
    }

    async fn get(&self, _id: ContactId) -> Result<Option<Contact>> {
        Err(unavailable())
    }

    async fn list_by_owner(&self, _owner_id: OwnerId) -> Result<Vec<Contact>> {
        Err(unavailable())
    }

    async fn list_by_tags(&self, _owner_id: OwnerId, _tags: &[String]) -> Result<Vec<Contact>> {
        Err(unavailable())
    }

    async fn get_by_phone(&self, _owner_id: OwnerId, _phone: &str) -> Result<Option<Contact>> {
        Err(unavailable())
    }

    async fn mark_opted_in(&self, _id: ContactId, _source: &str, _at: DateTime<Utc>) -> Result<()> {
        Err(unavailable())
    }

    async fn set_unsubscribed(
        &self,
        _phone: &str,
        _flag: bool,
        _at: DateTime<Utc>,
    ) -> Result<SubscriptionChange> {
        Err(unavailable())
    }
}

fn unavailable() -> Error {
    Error::Database("connection refused".to_string())
}

pub(crate) async fn add_contact(
    store: &MemoryStore,
    owner_id: OwnerId,
    first_name: &str,
    phone: &str,
    tags: &[&str],
    opted_in: bool,
) -> Contact {
    ContactRepository::create(
        store,
        CreateContact {
            owner_id,
            first_name: Some(first_name.to_string()),
            phone_number: phone.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            is_opted_in: opted_in,
            ..CreateContact::default()
        },
    )
    .await
    .unwrap()
}
