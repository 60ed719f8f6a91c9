//! Collaborator contracts the view engine consumes.
//!
//! The engine never owns entities, log storage, confirmation bookkeeping, or
//! network transport. It talks to them through these traits. `crate::memory`
//! provides in-process implementations.

use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::{
    Action, ActionType, CausalStamp, CollectionType, CoreError, Deferred, EntityId, EventMeta,
    Fields, Filter, OperationId, ViewId,
};

/// Shared, non-owning reference to an entity held by a record store.
pub type EntityRef = Rc<dyn EntityHandle>;

/// Called with the entity id and the new values of the fields that changed.
pub type EntityListener = Rc<dyn Fn(&EntityId, &Fields)>;

/// Explicit release token returned by every listener registration.
///
/// Calling it more than once is impossible (it is consumed); dropping it
/// without calling leaves the registration in place.
#[must_use = "dropping an Unsubscribe leaks the registration"]
pub struct Unsubscribe(Option<Box<dyn FnOnce()>>);

impl Unsubscribe {
    pub fn new(f: impl FnOnce() + 'static) -> Self {
        Self(Some(Box::new(f)))
    }

    pub fn noop() -> Self {
        Self(None)
    }

    pub fn call(mut self) {
        if let Some(f) = self.0.take() {
            f();
        }
    }
}

impl fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Unsubscribe")
    }
}

/// One record-store instance for one entity.
pub trait EntityHandle {
    fn id(&self) -> &EntityId;

    /// Current field snapshot.
    fn fields(&self) -> Fields;

    /// True while the initial state is still being fetched.
    fn is_loading(&self) -> bool;

    /// Settles once the initial state has been loaded.
    fn ready(&self) -> Deferred<()>;

    /// Registration is idempotent with respect to other listeners: adding or
    /// removing one never disturbs the rest.
    fn add_listener(&self, listener: EntityListener) -> Unsubscribe;

    fn listener_count(&self) -> usize;

    /// Seed the entity from a create action and remember its creation stamp.
    fn apply_creation(&self, action: &Action, meta: &EventMeta);

    /// Stamp of the create operation that produced the current incarnation.
    fn created_at(&self) -> Option<CausalStamp>;
}

/// Capability-tagged description of an entity collection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionDescriptor {
    /// Plural type name; validated when a view is activated.
    pub type_name: String,
    /// Backed by a remote authority that must be subscribed to.
    pub remote: bool,
    /// Entities are cached in the local event log and can be replayed.
    pub offline: bool,
}

impl CollectionDescriptor {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            remote: false,
            offline: false,
        }
    }

    pub fn remote(mut self) -> Self {
        self.remote = true;
        self
    }

    pub fn offline(mut self) -> Self {
        self.offline = true;
        self
    }

    pub fn collection_type(&self) -> Result<CollectionType, CoreError> {
        CollectionType::parse(self.type_name.clone())
    }
}

/// The record store owning every entity handle of one collection.
pub trait RecordStore {
    fn descriptor(&self) -> &CollectionDescriptor;

    /// Existing handle, or a new one that starts loading.
    fn load(&self, id: &EntityId) -> EntityRef;

    /// Handles currently resident (the warm cache).
    fn loaded(&self) -> Vec<EntityRef>;

    fn get_loaded(&self, id: &EntityId) -> Option<EntityRef>;

    /// Evict the handle if nothing listens to it anymore.
    fn release_if_idle(&self, id: &EntityId);
}

/// When a log handler runs relative to the append.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LogPhase {
    /// Before the entry is stored; may add retention reasons.
    Pre,
    /// Record stores apply the action to their handles.
    Apply,
    /// Observers react to already-applied state.
    Post,
}

pub type PreHandler = Rc<dyn Fn(&Action, &mut EventMeta)>;
pub type ActionHandler = Rc<dyn Fn(&Action, &EventMeta)>;
pub type ExistingVisitor = Box<dyn FnMut(&Action, &EventMeta)>;

#[derive(Clone)]
pub enum LogHandler {
    Pre(PreHandler),
    Apply(ActionHandler),
    Post(ActionHandler),
}

impl LogHandler {
    pub fn phase(&self) -> LogPhase {
        match self {
            LogHandler::Pre(_) => LogPhase::Pre,
            LogHandler::Apply(_) => LogPhase::Apply,
            LogHandler::Post(_) => LogPhase::Post,
        }
    }
}

impl fmt::Debug for LogHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LogHandler::{:?}", self.phase())
    }
}

/// Append-only, partially ordered event log.
pub trait EventLog {
    fn on_type(&self, action_type: &ActionType, handler: LogHandler) -> Unsubscribe;

    /// Visit stored entries newest-first; settles when the walk is done.
    fn for_each_existing(&self, visit: ExistingVisitor) -> Deferred<()>;

    /// Keep an already stored entry alive for `reason`.
    fn add_retention(&self, op: &OperationId, reason: &ViewId);

    /// Drop `reason` from every entry; entries left without reasons may be
    /// collected.
    fn remove_retention(&self, reason: &ViewId);

    /// The log's own total order.
    fn is_causally_before(&self, a: &CausalStamp, b: &CausalStamp) -> bool {
        a.is_before(b)
    }
}

/// Final state of an optimistic operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    Confirmed,
    Rejected { reason: String },
}

impl Outcome {
    pub fn is_rejected(&self) -> bool {
        matches!(self, Outcome::Rejected { .. })
    }
}

pub trait ConfirmationTracker {
    fn outcome(&self, op: &OperationId) -> Deferred<Outcome>;
}

/// Remote channel a view subscribes to.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Topic {
    pub channel: CollectionType,
    pub filter: Filter,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{reason}")]
pub struct SyncRejection {
    pub reason: String,
}

pub trait RemoteSync {
    fn subscribe_topic(&self, topic: &Topic) -> Deferred<Result<(), SyncRejection>>;
    fn unsubscribe_topic(&self, topic: &Topic);
}

/// Everything a view needs to run, bundled for activation.
#[derive(Clone)]
pub struct ViewContext {
    pub store: Rc<dyn RecordStore>,
    pub log: Rc<dyn EventLog>,
    pub tracker: Rc<dyn ConfirmationTracker>,
    pub remote: Option<Rc<dyn RemoteSync>>,
}

impl fmt::Debug for ViewContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewContext")
            .field("collection", self.store.descriptor())
            .field("remote", &self.remote.is_some())
            .finish()
    }
}
