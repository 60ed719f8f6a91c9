//! Notification fan-out for one view.
//!
//! Two kinds of consumers: callback listeners, which receive `ViewEvent`s
//! with live handles, and channel subscribers, which receive owned
//! `ViewUpdate`s through a bounded queue and are dropped when it fills up.

use std::cell::Cell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use crossbeam::channel::{Receiver, Sender, TryRecvError, TrySendError};
use thiserror::Error;

use crate::collab::{EntityRef, Unsubscribe};
use crate::core::{EntityId, Fields, Limits};

/// Event delivered to callback listeners.
pub enum ViewEvent {
    /// Membership changed; carries the full current membership.
    Members(BTreeMap<EntityId, EntityRef>),
    /// Sort order changed; carries the full ordered sequence.
    Sorted(Vec<EntityRef>),
    /// A member's fields changed. `diff` holds the new values.
    EntityChanged { id: EntityId, diff: Fields },
}

impl ViewEvent {
    /// Owned, handle-free form sent to channel subscribers.
    pub fn to_update(&self) -> ViewUpdate {
        match self {
            ViewEvent::Members(members) => ViewUpdate::Members(members.keys().cloned().collect()),
            ViewEvent::Sorted(sorted) => {
                ViewUpdate::Sorted(sorted.iter().map(|handle| handle.id().clone()).collect())
            }
            ViewEvent::EntityChanged { id, diff } => ViewUpdate::EntityChanged {
                id: id.clone(),
                diff: diff.clone(),
            },
        }
    }
}

impl fmt::Debug for ViewEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.to_update(), f)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ViewUpdate {
    Members(Vec<EntityId>),
    Sorted(Vec<EntityId>),
    EntityChanged { id: EntityId, diff: Fields },
}

pub type ViewListener = Rc<dyn Fn(&ViewEvent)>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SubscriberLimits {
    pub max_events: usize,
}

impl SubscriberLimits {
    pub fn new(max_events: usize) -> Result<Self, FanoutError> {
        if max_events == 0 {
            return Err(FanoutError::InvalidSubscriberLimits {
                reason: "max_events must be > 0".to_string(),
            });
        }
        Ok(Self { max_events })
    }

    pub fn from_limits(limits: &Limits) -> Result<Self, FanoutError> {
        Self::new(limits.subscriber_queue_events)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DropReason {
    SubscriberLagged,
    ViewDestroyed,
}

/// Channel subscription to a view.
///
/// Counts as one listener of the view until `close` is called or the
/// subscription is dropped by the view.
pub struct ViewSubscription {
    receiver: Receiver<ViewUpdate>,
    drop_reason: Rc<Cell<Option<DropReason>>>,
    release: Unsubscribe,
}

impl ViewSubscription {
    pub(crate) fn new(
        receiver: Receiver<ViewUpdate>,
        drop_reason: Rc<Cell<Option<DropReason>>>,
        release: Unsubscribe,
    ) -> Self {
        Self {
            receiver,
            drop_reason,
            release,
        }
    }

    /// Route the release through `wrap`, so an owner can also release it.
    pub(crate) fn map_release(self, wrap: impl FnOnce(Unsubscribe) -> Unsubscribe) -> Self {
        Self {
            receiver: self.receiver,
            drop_reason: self.drop_reason,
            release: wrap(self.release),
        }
    }

    pub fn try_recv(&self) -> Result<ViewUpdate, TryRecvError> {
        self.receiver.try_recv()
    }

    /// Everything queued so far.
    pub fn drain(&self) -> Vec<ViewUpdate> {
        self.receiver.try_iter().collect()
    }

    pub fn drop_reason(&self) -> Option<DropReason> {
        self.drop_reason.get()
    }

    pub fn close(self) {
        self.release.call();
    }
}

impl fmt::Debug for ViewSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewSubscription")
            .field("queued", &self.receiver.len())
            .field("drop_reason", &self.drop_reason.get())
            .finish()
    }
}

struct SubscriberState {
    sender: Sender<ViewUpdate>,
    drop_reason: Rc<Cell<Option<DropReason>>>,
}

impl SubscriberState {
    fn set_drop_reason(&self, reason: DropReason) {
        if self.drop_reason.get().is_none() {
            self.drop_reason.set(Some(reason));
        }
    }
}

/// Listener and subscriber tables of one view.
pub(crate) struct Fanout {
    max_subscribers: usize,
    next_id: u64,
    listeners: BTreeMap<u64, ViewListener>,
    subscribers: BTreeMap<u64, SubscriberState>,
}

impl Fanout {
    pub(crate) fn new(limits: &Limits) -> Self {
        Self {
            max_subscribers: limits.max_view_subscribers,
            next_id: 1,
            listeners: BTreeMap::new(),
            subscribers: BTreeMap::new(),
        }
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id = self.next_id.saturating_add(1);
        id
    }

    pub(crate) fn add_listener(&mut self, listener: ViewListener) -> u64 {
        let id = self.next_id();
        self.listeners.insert(id, listener);
        id
    }

    pub(crate) fn remove_listener(&mut self, id: u64) -> bool {
        self.listeners.remove(&id).is_some()
    }

    pub(crate) fn add_subscriber(
        &mut self,
        limits: SubscriberLimits,
    ) -> Result<(u64, Receiver<ViewUpdate>, Rc<Cell<Option<DropReason>>>), FanoutError> {
        if self.subscribers.len() >= self.max_subscribers {
            return Err(FanoutError::SubscriberLimitReached {
                max_subscribers: self.max_subscribers,
            });
        }
        let (sender, receiver) = crossbeam::channel::bounded(limits.max_events);
        let drop_reason = Rc::new(Cell::new(None));
        let id = self.next_id();
        self.subscribers.insert(
            id,
            SubscriberState {
                sender,
                drop_reason: Rc::clone(&drop_reason),
            },
        );
        Ok((id, receiver, drop_reason))
    }

    pub(crate) fn remove_subscriber(&mut self, id: u64) -> bool {
        self.subscribers.remove(&id).is_some()
    }

    /// Snapshot of callback listeners, so none is invoked under a borrow.
    pub(crate) fn listeners(&self) -> Vec<ViewListener> {
        self.listeners.values().cloned().collect()
    }

    pub(crate) fn listener_count(&self) -> usize {
        self.listeners.len() + self.subscribers.len()
    }

    /// Queue `update` for every channel subscriber. Returns how many
    /// subscribers were dropped (lagged or disconnected).
    pub(crate) fn publish(&mut self, update: &ViewUpdate) -> usize {
        let mut dropped = Vec::new();
        for (id, subscriber) in &self.subscribers {
            match subscriber.sender.try_send(update.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    subscriber.set_drop_reason(DropReason::SubscriberLagged);
                    dropped.push(*id);
                }
                Err(TrySendError::Disconnected(_)) => dropped.push(*id),
            }
        }
        for id in &dropped {
            self.subscribers.remove(id);
        }
        dropped.len()
    }

    /// Drop every consumer, marking channel subscribers with `reason`.
    pub(crate) fn close_all(&mut self, reason: DropReason) {
        for subscriber in self.subscribers.values() {
            subscriber.set_drop_reason(reason);
        }
        self.subscribers.clear();
        self.listeners.clear();
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FanoutError {
    #[error("view subscriber limit reached ({max_subscribers})")]
    SubscriberLimitReached { max_subscribers: usize },
    #[error("subscriber limits invalid: {reason}")]
    InvalidSubscriberLimits { reason: String },
}
