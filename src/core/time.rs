//! Layer 0: Time primitives
//!
//! CausalStamp orders operations across origins.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use super::identity::ReplicaId;

/// Hybrid logical timestamp of a single log operation.
///
/// (wall_ms, counter) is monotonic per origin; the origin breaks ties so two
/// stamps from different replicas are always comparable.
/// !Copy intentional - forces explicit .clone() to think about causality.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CausalStamp {
    pub wall_ms: u64,
    pub counter: u32,
    pub origin: ReplicaId,
}

impl CausalStamp {
    pub fn new(wall_ms: u64, counter: u32, origin: ReplicaId) -> Self {
        Self {
            wall_ms,
            counter,
            origin,
        }
    }

    /// True when `self` happened strictly before `other` in the log's total order.
    pub fn is_before(&self, other: &CausalStamp) -> bool {
        self < other
    }
}

impl PartialOrd for CausalStamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CausalStamp {
    fn cmp(&self, other: &Self) -> Ordering {
        self.wall_ms
            .cmp(&other.wall_ms)
            .then_with(|| self.counter.cmp(&other.counter))
            .then_with(|| self.origin.cmp(&other.origin)) // deterministic tiebreak
    }
}
