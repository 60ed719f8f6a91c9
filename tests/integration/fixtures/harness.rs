//! In-memory collaborators wired together for view tests.

use std::cell::RefCell;
use std::rc::Rc;

use livefilter::collab::{CollectionDescriptor, RecordStore, RemoteSync, Unsubscribe, ViewContext};
use livefilter::core::{
    Action, CollectionType, EntityId, EventKind, EventMeta, Fields, Filter, Limits, OpKind,
    Provenance, ReplicaId,
};
use livefilter::memory::{ManualRemote, ManualTracker, MemoryLog, MemoryRecordStore};
use livefilter::view::{FilterView, ViewOptions, ViewUpdate};
use uuid::Uuid;

pub fn id(raw: &str) -> EntityId {
    EntityId::new(raw).expect("entity id")
}

pub fn ids(raw: &[&str]) -> Vec<EntityId> {
    raw.iter().map(|raw| id(raw)).collect()
}

pub fn task(status: &str, due: i64) -> Fields {
    Fields::new().with("status", status).with("due", due)
}

pub fn open_filter() -> Filter {
    Filter::new().with("status", "open")
}

pub fn by_due() -> ViewOptions {
    ViewOptions::new().sort_by_field("due")
}

pub struct Harness {
    pub log: MemoryLog,
    pub store: MemoryRecordStore,
    pub tracker: Rc<ManualTracker>,
    pub remote: Rc<ManualRemote>,
    pub collection: CollectionType,
    _store_handlers: Vec<Unsubscribe>,
}

impl Harness {
    pub fn new(descriptor: CollectionDescriptor, remote: ManualRemote) -> Self {
        Self::with_store(MemoryRecordStore::new(descriptor), remote)
    }

    pub fn with_store(store: MemoryRecordStore, remote: ManualRemote) -> Self {
        let log = MemoryLog::new(ReplicaId::new(Uuid::from_bytes([9u8; 16])));
        let tracker = Rc::new(ManualTracker::new());
        let collection = store
            .descriptor()
            .collection_type()
            .expect("collection type");
        let handlers = store.attach(&log, tracker.clone()).expect("attach store");
        Self {
            log,
            store,
            tracker,
            remote: Rc::new(remote),
            collection,
            _store_handlers: handlers,
        }
    }

    /// Neither remote nor offline-capable.
    pub fn local() -> Self {
        Self::new(CollectionDescriptor::new("tasks"), ManualRemote::new())
    }

    pub fn offline() -> Self {
        Self::new(
            CollectionDescriptor::new("tasks").offline(),
            ManualRemote::new(),
        )
    }

    pub fn remote() -> Self {
        Self::new(
            CollectionDescriptor::new("tasks").remote(),
            ManualRemote::new(),
        )
    }

    pub fn ctx(&self) -> ViewContext {
        ViewContext {
            store: Rc::new(self.store.clone()),
            log: Rc::new(self.log.clone()),
            tracker: self.tracker.clone(),
            remote: Some(self.remote.clone() as Rc<dyn RemoteSync>),
        }
    }

    pub fn activate(&self, filter: Filter, options: ViewOptions) -> FilterView {
        FilterView::activate(self.ctx(), filter, options, &Limits::default()).expect("activate")
    }

    pub fn action(&self, op: OpKind, provenance: Provenance, raw: &str, fields: Fields) -> Action {
        Action::new(
            &self.collection,
            EventKind::new(op, provenance),
            id(raw),
            fields,
        )
    }

    pub fn created(&self, raw: &str, fields: Fields) -> EventMeta {
        self.log
            .add(self.action(OpKind::Create, Provenance::Confirmed, raw, fields))
    }

    pub fn create(&self, raw: &str, fields: Fields) -> EventMeta {
        self.log
            .add(self.action(OpKind::Create, Provenance::Optimistic, raw, fields))
    }

    pub fn changed(&self, raw: &str, fields: Fields) -> EventMeta {
        self.log
            .add(self.action(OpKind::Update, Provenance::Confirmed, raw, fields))
    }

    pub fn change(&self, raw: &str, fields: Fields) -> EventMeta {
        self.log
            .add(self.action(OpKind::Update, Provenance::Optimistic, raw, fields))
    }

    pub fn deleted(&self, raw: &str) -> EventMeta {
        self.log
            .add(self.action(OpKind::Delete, Provenance::Confirmed, raw, Fields::new()))
    }

    pub fn delete(&self, raw: &str) -> EventMeta {
        self.log
            .add(self.action(OpKind::Delete, Provenance::Optimistic, raw, Fields::new()))
    }
}

/// Every update a view delivers to its callback listeners, in order.
pub struct Recorder {
    updates: Rc<RefCell<Vec<ViewUpdate>>>,
    unsubscribe: Option<Unsubscribe>,
}

impl Recorder {
    pub fn attach(view: &FilterView) -> Self {
        let updates = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&updates);
        let unsubscribe = view.add_listener(move |event| sink.borrow_mut().push(event.to_update()));
        Self {
            updates,
            unsubscribe: Some(unsubscribe),
        }
    }

    pub fn take(&self) -> Vec<ViewUpdate> {
        std::mem::take(&mut *self.updates.borrow_mut())
    }

    pub fn detach(mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe.call();
        }
    }
}

pub fn last_sorted(updates: &[ViewUpdate]) -> Option<Vec<EntityId>> {
    updates.iter().rev().find_map(|update| match update {
        ViewUpdate::Sorted(ids) => Some(ids.clone()),
        _ => None,
    })
}
