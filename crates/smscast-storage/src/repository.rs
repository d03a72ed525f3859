//! Repository layer for data access

pub mod campaigns;
pub mod contacts;
pub mod messages;
pub mod opt_ins;
pub mod short_links;

use std::sync::Arc;

use crate::db::DatabasePool;
use crate::memory::MemoryStore;

pub use campaigns::{CampaignRepository, DbCampaignRepository};
pub use contacts::{ContactRepository, DbContactRepository};
pub use messages::{DbMessageRepository, MessageRepository};
pub use opt_ins::{DbOptInRepository, OptInRepository};
pub use short_links::{DbShortLinkRepository, ShortLinkRepository};

/// The full set of repositories the engine and API work against
#[derive(Clone)]
pub struct Stores {
    pub campaigns: Arc<dyn CampaignRepository>,
    pub contacts: Arc<dyn ContactRepository>,
    pub messages: Arc<dyn MessageRepository>,
    pub short_links: Arc<dyn ShortLinkRepository>,
    pub opt_ins: Arc<dyn OptInRepository>,
}

impl Stores {
    /// PostgreSQL-backed repositories sharing one pool
    pub fn postgres(pool: DatabasePool) -> Self {
        Self {
            campaigns: Arc::new(DbCampaignRepository::new(pool.clone())),
            contacts: Arc::new(DbContactRepository::new(pool.clone())),
            messages: Arc::new(DbMessageRepository::new(pool.clone())),
            short_links: Arc::new(DbShortLinkRepository::new(pool.clone())),
            opt_ins: Arc::new(DbOptInRepository::new(pool)),
        }
    }

    /// Every repository backed by the same in-memory store
    pub fn in_memory(store: Arc<MemoryStore>) -> Self {
        Self {
            campaigns: store.clone(),
            contacts: store.clone(),
            messages: store.clone(),
            short_links: store.clone(),
            opt_ins: store,
        }
    }
}
