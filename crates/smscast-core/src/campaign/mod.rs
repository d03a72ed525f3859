//! Campaign module - audience, content preparation, execution and scheduling

mod audience;
mod engine;
pub mod links;
mod scheduler;
pub mod template;
mod throttle;

pub use audience::AudienceResolver;
pub use engine::{CampaignEngine, CampaignError, INVALID_PHONE_NUMBER};
pub use scheduler::CampaignScheduler;
pub use throttle::SendThrottle;
