//! Double opt-in - consent requests and their confirmation

mod manager;

pub use manager::{OptInError, OptInManager, OPT_IN_SOURCE};
