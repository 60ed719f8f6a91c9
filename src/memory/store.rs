//! In-process record store.
//!
//! Holds one shared `MemoryEntity` per resident id, a backing copy of every
//! entity's durable fields (what a load fetches), and the rollback state of
//! optimistic updates.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

use crate::collab::{
    CollectionDescriptor, ConfirmationTracker, EntityHandle, EntityListener, EntityRef, EventLog,
    LogHandler, Outcome, RecordStore, Unsubscribe,
};
use crate::core::{
    Action, CausalStamp, Deferred, EntityId, EventKind, EventMeta, Fields, OpKind,
};

/// Entity handle owned by a `MemoryRecordStore`.
pub struct MemoryEntity {
    id: EntityId,
    state: RefCell<EntityState>,
    ready: Deferred<()>,
    listeners: RefCell<BTreeMap<u64, EntityListener>>,
    next_listener_id: Cell<u64>,
    me: Weak<MemoryEntity>,
}

struct EntityState {
    fields: Fields,
    loading: bool,
    created_at: Option<CausalStamp>,
}

impl MemoryEntity {
    fn new(id: EntityId, loading: bool) -> Rc<Self> {
        let ready = if loading {
            Deferred::pending()
        } else {
            Deferred::settled(())
        };
        Rc::new_cyclic(|me| Self {
            id,
            state: RefCell::new(EntityState {
                fields: Fields::new(),
                loading,
                created_at: None,
            }),
            ready,
            listeners: RefCell::new(BTreeMap::new()),
            next_listener_id: Cell::new(1),
            me: me.clone(),
        })
    }

    /// Overlay `patch` and notify listeners about the fields that changed.
    pub fn set_fields(&self, patch: &Fields) {
        let diff = {
            let mut state = self.state.borrow_mut();
            let previous = state.fields.merge(patch);
            patch
                .iter()
                .filter(|(name, value)| previous.get(name) != Some(*value))
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect::<Fields>()
        };
        if !diff.is_empty() {
            self.notify(&diff);
        }
    }

    /// Complete the initial load with `fields`.
    pub fn finish_loading(&self, fields: Fields) {
        {
            let mut state = self.state.borrow_mut();
            if !state.loading {
                return;
            }
            state.fields = fields;
            state.loading = false;
        }
        self.ready.settle(());
    }

    fn notify(&self, diff: &Fields) {
        let listeners: Vec<EntityListener> = self.listeners.borrow().values().cloned().collect();
        for listener in listeners {
            listener(&self.id, diff);
        }
    }
}

impl EntityHandle for MemoryEntity {
    fn id(&self) -> &EntityId {
        &self.id
    }

    fn fields(&self) -> Fields {
        self.state.borrow().fields.clone()
    }

    fn is_loading(&self) -> bool {
        self.state.borrow().loading
    }

    fn ready(&self) -> Deferred<()> {
        self.ready.clone()
    }

    fn add_listener(&self, listener: EntityListener) -> Unsubscribe {
        let id = self.next_listener_id.get();
        self.next_listener_id.set(id.saturating_add(1));
        self.listeners.borrow_mut().insert(id, listener);
        let me = self.me.clone();
        Unsubscribe::new(move || {
            if let Some(entity) = me.upgrade() {
                entity.listeners.borrow_mut().remove(&id);
            }
        })
    }

    fn listener_count(&self) -> usize {
        self.listeners.borrow().len()
    }

    fn apply_creation(&self, action: &Action, meta: &EventMeta) {
        let first = {
            let mut state = self.state.borrow_mut();
            if state.created_at.as_ref() == Some(&meta.stamp) {
                return;
            }
            state.created_at = Some(meta.stamp.clone());
            state.loading = false;
            self.ready.is_pending()
        };
        if first {
            self.ready.settle(());
        }
        self.set_fields(&action.fields);
    }

    fn created_at(&self) -> Option<CausalStamp> {
        self.state.borrow().created_at.clone()
    }
}

/// Record store for one collection, kept entirely in memory.
#[derive(Clone)]
pub struct MemoryRecordStore {
    descriptor: CollectionDescriptor,
    inner: Rc<RefCell<StoreState>>,
}

struct StoreState {
    resident: BTreeMap<EntityId, Rc<MemoryEntity>>,
    backing: BTreeMap<EntityId, Fields>,
    manual_loads: bool,
}

impl MemoryRecordStore {
    /// Loads complete synchronously from the backing data.
    pub fn new(descriptor: CollectionDescriptor) -> Self {
        Self {
            descriptor,
            inner: Rc::new(RefCell::new(StoreState {
                resident: BTreeMap::new(),
                backing: BTreeMap::new(),
                manual_loads: false,
            })),
        }
    }

    /// Loads stay pending until `finish_load` / `finish_all_loads`.
    pub fn with_manual_loads(self) -> Self {
        self.inner.borrow_mut().manual_loads = true;
        self
    }

    /// Durable fields a later load will observe.
    pub fn seed(&self, id: &EntityId, fields: Fields) {
        self.inner.borrow_mut().backing.insert(id.clone(), fields);
    }

    /// Make `id` resident and already loaded (the warm cache).
    pub fn insert_loaded(&self, id: &EntityId, fields: Fields) -> Rc<MemoryEntity> {
        let entity = MemoryEntity::new(id.clone(), false);
        entity.set_fields(&fields);
        let mut state = self.inner.borrow_mut();
        state.backing.insert(id.clone(), fields);
        state.resident.insert(id.clone(), Rc::clone(&entity));
        entity
    }

    pub fn entity(&self, id: &EntityId) -> Option<Rc<MemoryEntity>> {
        self.inner.borrow().resident.get(id).cloned()
    }

    pub fn is_resident(&self, id: &EntityId) -> bool {
        self.inner.borrow().resident.contains_key(id)
    }

    pub fn finish_load(&self, id: &EntityId) {
        let (entity, fields) = {
            let state = self.inner.borrow();
            let Some(entity) = state.resident.get(id).cloned() else {
                return;
            };
            (entity, state.backing.get(id).cloned().unwrap_or_default())
        };
        entity.finish_loading(fields);
    }

    pub fn finish_all_loads(&self) {
        let loading: Vec<EntityId> = self
            .inner
            .borrow()
            .resident
            .values()
            .filter(|entity| entity.is_loading())
            .map(|entity| entity.id.clone())
            .collect();
        for id in loading {
            self.finish_load(&id);
        }
    }

    /// Register the store's `Apply` handlers on `log`.
    ///
    /// Optimistic updates record the values they overwrote and restore them
    /// if the tracker reports a rejection; optimistic creates and deletes
    /// undo their effect on the backing data the same way.
    pub fn attach(
        &self,
        log: &dyn EventLog,
        tracker: Rc<dyn ConfirmationTracker>,
    ) -> Result<Vec<Unsubscribe>, crate::core::CoreError> {
        let collection = self.descriptor.collection_type()?;
        let mut unsubs = Vec::with_capacity(EventKind::ALL.len());
        for kind in EventKind::ALL {
            let store = self.clone();
            let tracker = Rc::clone(&tracker);
            let handler = LogHandler::Apply(Rc::new(move |action: &Action, meta: &EventMeta| {
                store.apply(kind, action, meta, tracker.as_ref());
            }));
            unsubs.push(log.on_type(&kind.action_type(&collection), handler));
        }
        Ok(unsubs)
    }

    fn apply(
        &self,
        kind: EventKind,
        action: &Action,
        meta: &EventMeta,
        tracker: &dyn ConfirmationTracker,
    ) {
        match kind.op {
            OpKind::Create => {
                let entity = {
                    let mut state = self.inner.borrow_mut();
                    state.backing.insert(action.id.clone(), action.fields.clone());
                    state.resident.get(&action.id).cloned()
                };
                if let Some(entity) = entity {
                    entity.apply_creation(action, meta);
                }
                if kind.is_optimistic() {
                    let store = self.clone();
                    let id = action.id.clone();
                    tracker.outcome(&meta.id).on_settle(move |outcome| {
                        if outcome.is_rejected() {
                            store.inner.borrow_mut().backing.remove(&id);
                        }
                    });
                }
            }
            OpKind::Update => {
                let (entity, previous) = {
                    let mut state = self.inner.borrow_mut();
                    let previous = state
                        .backing
                        .entry(action.id.clone())
                        .or_default()
                        .merge(&action.fields);
                    (state.resident.get(&action.id).cloned(), previous)
                };
                if let Some(entity) = entity.as_ref().filter(|e| !e.is_loading()) {
                    entity.set_fields(&action.fields);
                }
                if kind.is_optimistic() {
                    let store = self.clone();
                    let id = action.id.clone();
                    tracker.outcome(&meta.id).on_settle(move |outcome| {
                        if let Outcome::Rejected { .. } = outcome {
                            store.restore(&id, &previous);
                        }
                    });
                }
            }
            OpKind::Delete => {
                let removed = self.inner.borrow_mut().backing.remove(&action.id);
                if kind.is_optimistic()
                    && let Some(fields) = removed
                {
                    let store = self.clone();
                    let id = action.id.clone();
                    tracker.outcome(&meta.id).on_settle(move |outcome| {
                        if outcome.is_rejected() {
                            store.inner.borrow_mut().backing.insert(id, fields);
                        }
                    });
                }
            }
        }
    }

    fn restore(&self, id: &EntityId, previous: &Fields) {
        let entity = {
            let mut state = self.inner.borrow_mut();
            state.backing.entry(id.clone()).or_default().merge(previous);
            state.resident.get(id).cloned()
        };
        if let Some(entity) = entity {
            tracing::debug!(entity = %id, "rolling back rejected update");
            entity.set_fields(previous);
        }
    }
}

impl RecordStore for MemoryRecordStore {
    fn descriptor(&self) -> &CollectionDescriptor {
        &self.descriptor
    }

    fn load(&self, id: &EntityId) -> EntityRef {
        let (entity, fresh, manual) = {
            let mut state = self.inner.borrow_mut();
            if let Some(entity) = state.resident.get(id) {
                return Rc::clone(entity) as EntityRef;
            }
            let entity = MemoryEntity::new(id.clone(), true);
            state.resident.insert(id.clone(), Rc::clone(&entity));
            let fresh = state.backing.get(id).cloned().unwrap_or_default();
            (entity, fresh, state.manual_loads)
        };
        if !manual {
            entity.finish_loading(fresh);
        }
        entity
    }

    fn loaded(&self) -> Vec<EntityRef> {
        self.inner
            .borrow()
            .resident
            .values()
            .map(|entity| Rc::clone(entity) as EntityRef)
            .collect()
    }

    fn get_loaded(&self, id: &EntityId) -> Option<EntityRef> {
        self.inner
            .borrow()
            .resident
            .get(id)
            .map(|entity| Rc::clone(entity) as EntityRef)
    }

    fn release_if_idle(&self, id: &EntityId) {
        let mut state = self.inner.borrow_mut();
        let idle = state
            .resident
            .get(id)
            .is_some_and(|entity| entity.listener_count() == 0);
        if idle {
            state.resident.remove(id);
        }
    }
}
