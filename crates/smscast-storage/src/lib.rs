//! smscast Storage - Persistence for campaigns, contacts and messages
//!
//! Each record type has an async repository trait with a PostgreSQL
//! implementation and a shared in-memory implementation.

pub mod db;
pub mod memory;
pub mod models;
pub mod repository;

pub use db::DatabasePool;
pub use memory::MemoryStore;
pub use models::*;
pub use repository::*;
