//! In-process event log with phased dispatch and retention reasons.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

use crate::collab::{EventLog, ExistingVisitor, LogHandler, LogPhase, Unsubscribe};
use crate::core::{
    Action, ActionType, CausalStamp, Deferred, EventMeta, OperationId, ReplicaId, ViewId,
};

/// Stored entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogEntry {
    pub action: Action,
    pub meta: EventMeta,
}

/// Log kept in memory for one replica.
///
/// Like a real log it only stores entries that carry at least one retention
/// reason once the `Pre` handlers ran; everything else is dispatched and
/// forgotten.
#[derive(Clone)]
pub struct MemoryLog {
    replica: ReplicaId,
    inner: Rc<RefCell<LogState>>,
}

struct LogState {
    entries: Vec<LogEntry>,
    handlers: BTreeMap<u64, (ActionType, LogHandler)>,
    next_handler_id: u64,
    tick: u64,
}

impl MemoryLog {
    pub fn new(replica: ReplicaId) -> Self {
        Self {
            replica,
            inner: Rc::new(RefCell::new(LogState {
                entries: Vec::new(),
                handlers: BTreeMap::new(),
                next_handler_id: 1,
                tick: 0,
            })),
        }
    }

    pub fn replica(&self) -> ReplicaId {
        self.replica
    }

    /// Fresh metadata stamped by this replica's logical clock.
    pub fn next_meta(&self) -> EventMeta {
        let tick = {
            let mut state = self.inner.borrow_mut();
            state.tick = state.tick.saturating_add(1);
            state.tick
        };
        let op = OperationId::generated(tick, &self.replica, 0);
        EventMeta::new(op, CausalStamp::new(tick, 0, self.replica))
    }

    /// Append with fresh metadata. Stored only if a `Pre` handler tags it.
    pub fn add(&self, action: Action) -> EventMeta {
        let meta = self.next_meta();
        self.add_with_meta(action, meta)
    }

    /// Append with fresh metadata, pre-tagged with `reason` so it is stored.
    pub fn add_kept(&self, action: Action, reason: &str) -> EventMeta {
        let mut meta = self.next_meta();
        meta.reasons.insert(reason.to_string());
        self.add_with_meta(action, meta)
    }

    /// Append an entry produced elsewhere (remote delivery, replay).
    pub fn add_with_meta(&self, action: Action, mut meta: EventMeta) -> EventMeta {
        for handler in self.handlers_for(&action.action_type, LogPhase::Pre) {
            if let LogHandler::Pre(f) = handler {
                f(&action, &mut meta);
            }
        }
        if !meta.reasons.is_empty() {
            self.inner.borrow_mut().entries.push(LogEntry {
                action: action.clone(),
                meta: meta.clone(),
            });
        }
        for phase in [LogPhase::Apply, LogPhase::Post] {
            for handler in self.handlers_for(&action.action_type, phase) {
                match handler {
                    LogHandler::Apply(f) | LogHandler::Post(f) => f(&action, &meta),
                    LogHandler::Pre(_) => {}
                }
            }
        }
        meta
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.inner.borrow().entries.clone()
    }

    pub fn entry(&self, op: &OperationId) -> Option<LogEntry> {
        self.inner
            .borrow()
            .entries
            .iter()
            .find(|entry| &entry.meta.id == op)
            .cloned()
    }

    pub fn handler_count(&self) -> usize {
        self.inner.borrow().handlers.len()
    }

    fn handlers_for(&self, action_type: &ActionType, phase: LogPhase) -> Vec<LogHandler> {
        // Snapshot so handlers may register, unregister, or append.
        self.inner
            .borrow()
            .handlers
            .values()
            .filter(|(ty, handler)| ty == action_type && handler.phase() == phase)
            .map(|(_, handler)| handler.clone())
            .collect()
    }
}

impl EventLog for MemoryLog {
    fn on_type(&self, action_type: &ActionType, handler: LogHandler) -> Unsubscribe {
        let id = {
            let mut state = self.inner.borrow_mut();
            let id = state.next_handler_id;
            state.next_handler_id = state.next_handler_id.saturating_add(1);
            state.handlers.insert(id, (action_type.clone(), handler));
            id
        };
        let weak: Weak<RefCell<LogState>> = Rc::downgrade(&self.inner);
        Unsubscribe::new(move || {
            if let Some(state) = weak.upgrade() {
                state.borrow_mut().handlers.remove(&id);
            }
        })
    }

    fn for_each_existing(&self, mut visit: ExistingVisitor) -> Deferred<()> {
        let snapshot = self.entries();
        for entry in snapshot.iter().rev() {
            visit(&entry.action, &entry.meta);
        }
        Deferred::settled(())
    }

    fn add_retention(&self, op: &OperationId, reason: &ViewId) {
        let mut state = self.inner.borrow_mut();
        if let Some(entry) = state.entries.iter_mut().find(|entry| &entry.meta.id == op) {
            entry.meta.add_reason(reason);
        }
    }

    fn remove_retention(&self, reason: &ViewId) {
        let mut state = self.inner.borrow_mut();
        for entry in state.entries.iter_mut() {
            entry.meta.reasons.remove(reason.as_str());
        }
        let before = state.entries.len();
        state.entries.retain(|entry| !entry.meta.reasons.is_empty());
        let collected = before - state.entries.len();
        if collected > 0 {
            tracing::trace!(reason = %reason, collected, "log entries collected");
        }
    }
}
