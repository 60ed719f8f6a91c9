//! Confirmation tracker driven by hand.

use std::cell::RefCell;
use std::collections::HashMap;

use crate::collab::{ConfirmationTracker, Outcome};
use crate::core::{Deferred, OperationId};

/// Hands out one shared pending outcome per operation until the caller
/// confirms or rejects it.
#[derive(Default)]
pub struct ManualTracker {
    outcomes: RefCell<HashMap<OperationId, Deferred<Outcome>>>,
}

impl ManualTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn confirm(&self, op: &OperationId) -> bool {
        self.settle(op, Outcome::Confirmed)
    }

    pub fn reject(&self, op: &OperationId, reason: impl Into<String>) -> bool {
        self.settle(
            op,
            Outcome::Rejected {
                reason: reason.into(),
            },
        )
    }

    fn settle(&self, op: &OperationId, outcome: Outcome) -> bool {
        let deferred = self.outcome(op);
        deferred.settle(outcome)
    }
}

impl ConfirmationTracker for ManualTracker {
    fn outcome(&self, op: &OperationId) -> Deferred<Outcome> {
        self.outcomes
            .borrow_mut()
            .entry(op.clone())
            .or_insert_with(Deferred::pending)
            .clone()
    }
}
