//! smscast API - HTTP surface
//!
//! Health and metrics endpoints, provider webhooks, campaign send triggers,
//! opt-in confirmation, unsubscribe and the short-link redirect.

pub mod auth;
pub mod handlers;
pub mod routes;

pub use auth::AppState;
pub use routes::create_router;
