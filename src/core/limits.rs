//! Fan-out safety limits.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Channel subscribers a single view accepts.
    pub max_view_subscribers: usize,
    /// Events queued per channel subscriber before it counts as lagged.
    pub subscriber_queue_events: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_view_subscribers: 64,
            subscriber_queue_events: 1_024,
        }
    }
}
