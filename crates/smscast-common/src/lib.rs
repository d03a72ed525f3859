//! smscast Common - Shared types and utilities
//!
//! This crate provides configuration, the shared error type and id
//! aliases used across all smscast components.

pub mod config;
pub mod error;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
