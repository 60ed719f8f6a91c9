//! Remote topic subscription and log retention for one view.

use std::cell::Cell;
use std::rc::Rc;

use crate::collab::{EventLog, PreHandler, RemoteSync, SyncRejection, Topic};
use crate::core::{Action, CollectionType, Deferred, EventMeta, Filter, OperationId, ViewId};

pub(crate) struct SubscriptionManager {
    view: ViewId,
    topic: Topic,
    log: Rc<dyn EventLog>,
    remote: Option<Rc<dyn RemoteSync>>,
    failed: Cell<bool>,
    closed: Cell<bool>,
}

impl SubscriptionManager {
    /// `remote` is only kept for remotely sourced collections.
    pub(crate) fn new(
        view: ViewId,
        collection: CollectionType,
        filter: Filter,
        log: Rc<dyn EventLog>,
        remote: Option<Rc<dyn RemoteSync>>,
    ) -> Self {
        Self {
            view,
            topic: Topic {
                channel: collection,
                filter,
            },
            log,
            remote,
            failed: Cell::new(false),
            closed: Cell::new(false),
        }
    }

    #[cfg(test)]
    pub(crate) fn topic(&self) -> &Topic {
        &self.topic
    }

    /// Human-readable topic, used in errors and logs.
    pub(crate) fn topic_label(&self) -> String {
        format!("{}{}", self.topic.channel, self.topic.filter.canonical_key())
    }

    pub(crate) fn is_remote(&self) -> bool {
        self.remote.is_some()
    }

    /// Send the subscribe request, if the collection is remote.
    pub(crate) fn open(&self) -> Option<Deferred<Result<(), SyncRejection>>> {
        let remote = self.remote.as_ref()?;
        tracing::debug!(topic = %self.topic_label(), "subscribing to remote topic");
        Some(remote.subscribe_topic(&self.topic))
    }

    /// The subscription was refused; skip the unsubscribe on close.
    pub(crate) fn mark_failed(&self) {
        self.failed.set(true);
    }

    /// `Pre` handler tagging create entries whose fields match `filter`.
    pub(crate) fn retention_handler(&self) -> PreHandler {
        let view = self.view.clone();
        let filter = self.topic.filter.clone();
        Rc::new(move |action: &Action, meta: &mut EventMeta| {
            if filter.matches_all(&action.fields) {
                meta.add_reason(&view);
            }
        })
    }

    /// Keep an already stored entry alive for this view.
    pub(crate) fn retain(&self, op: &OperationId) {
        self.log.add_retention(op, &self.view);
    }

    /// Unsubscribe (unless the subscription failed) and release retention.
    pub(crate) fn close(&self) {
        if self.closed.replace(true) {
            return;
        }
        if let Some(remote) = &self.remote
            && !self.failed.get()
        {
            remote.unsubscribe_topic(&self.topic);
        }
        self.log.remove_retention(&self.view);
    }
}
