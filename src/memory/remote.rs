//! Remote sync stand-in that records topic traffic.

use std::cell::RefCell;
use std::collections::HashMap;

use crate::collab::{RemoteSync, SyncRejection, Topic};
use crate::core::Deferred;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RemoteCall {
    Subscribe(Topic),
    Unsubscribe(Topic),
}

/// Subscriptions stay pending until `ack` / `reject`, unless auto-ack is on.
#[derive(Default)]
pub struct ManualRemote {
    auto_ack: bool,
    calls: RefCell<Vec<RemoteCall>>,
    pending: RefCell<HashMap<Topic, Deferred<Result<(), SyncRejection>>>>,
}

impl ManualRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn auto_ack() -> Self {
        Self {
            auto_ack: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.calls.borrow().clone()
    }

    pub fn ack(&self, topic: &Topic) -> bool {
        self.settle(topic, Ok(()))
    }

    pub fn reject(&self, topic: &Topic, reason: impl Into<String>) -> bool {
        self.settle(
            topic,
            Err(SyncRejection {
                reason: reason.into(),
            }),
        )
    }

    fn settle(&self, topic: &Topic, result: Result<(), SyncRejection>) -> bool {
        let deferred = self.pending.borrow_mut().remove(topic);
        deferred.is_some_and(|deferred| deferred.settle(result))
    }
}

impl RemoteSync for ManualRemote {
    fn subscribe_topic(&self, topic: &Topic) -> Deferred<Result<(), SyncRejection>> {
        self.calls
            .borrow_mut()
            .push(RemoteCall::Subscribe(topic.clone()));
        if self.auto_ack {
            return Deferred::settled(Ok(()));
        }
        self.pending
            .borrow_mut()
            .entry(topic.clone())
            .or_insert_with(Deferred::pending)
            .clone()
    }

    fn unsubscribe_topic(&self, topic: &Topic) {
        self.calls
            .borrow_mut()
            .push(RemoteCall::Unsubscribe(topic.clone()));
    }
}
