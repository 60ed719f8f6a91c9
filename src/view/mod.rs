//! Live filtered views over an entity collection.
//!
//! - sorted: the (sort key, id) ordered member index
//! - options: sort selection and list-changes-only mode
//! - fanout: listener and channel-subscriber delivery
//! - subscription: remote topic and log retention bookkeeping
//! - engine: `FilterView`, the reconciliation state of one activation
//! - registry: memoized activations leased through `ViewHandle`s

pub mod engine;
pub mod fanout;
pub mod options;
pub mod registry;
pub mod sorted;
mod subscription;

use thiserror::Error;

use crate::error::{Effect, Transience};

pub use engine::FilterView;
pub use fanout::{
    DropReason, FanoutError, SubscriberLimits, ViewEvent, ViewListener, ViewSubscription,
    ViewUpdate,
};
pub use options::{SortBy, SortKeyFn, ViewOptions};
pub use registry::{ViewHandle, ViewRegistry, activate, global};
pub use sorted::{Reposition, SortedIndex};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ViewError {
    #[error("remote subscription to {topic} rejected: {reason}")]
    SubscriptionRejected { topic: String, reason: String },
    #[error("view misconfigured: {reason}")]
    Misconfigured { reason: String },
    #[error("view {view} was destroyed")]
    Destroyed { view: String },
    #[error(transparent)]
    Fanout(#[from] FanoutError),
}

impl ViewError {
    pub fn transience(&self) -> Transience {
        match self {
            // Retrying belongs to the sync layer, not to the view.
            ViewError::SubscriptionRejected { .. } => Transience::Unknown,
            ViewError::Misconfigured { .. } | ViewError::Destroyed { .. } => {
                Transience::Permanent
            }
            ViewError::Fanout(FanoutError::SubscriberLimitReached { .. }) => {
                Transience::Retryable
            }
            ViewError::Fanout(FanoutError::InvalidSubscriberLimits { .. }) => {
                Transience::Permanent
            }
        }
    }

    pub fn effect(&self) -> Effect {
        match self {
            ViewError::SubscriptionRejected { .. } => Effect::Unknown,
            _ => Effect::None,
        }
    }
}
