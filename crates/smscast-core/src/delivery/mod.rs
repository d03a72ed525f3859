//! Delivery module - folds provider callbacks back into stored state

mod reconciler;

pub use reconciler::{
    DeliveryReconciler, InboundAction, StatusCallback, RESUBSCRIBED_REPLY, UNSUBSCRIBED_REPLY,
};
