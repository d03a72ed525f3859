//! Clients for the external SMS and short-link providers

pub mod phone;
pub mod shortlink;
pub mod sms;

pub use phone::{format_phone_number, is_valid_phone_number};
pub use shortlink::{LinkShortener, LinkSource, ShortLinkClient, ShortLinkResult};
pub use sms::{SendResult, SmsGateway, TwilioGateway};
