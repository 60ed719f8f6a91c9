//! The live filtered view.
//!
//! A `FilterView` owns the per-activation reconciliation state: membership,
//! the optional sort index, the in-flight check set, and the handlers it
//! registered on the log and on member entities. All mutation happens on log
//! callbacks and deferred continuations; every continuation holds a weak
//! reference and does nothing once the view is destroyed.
//!
//! No internal borrow is held while calling into listeners, the record store,
//! the log, or the tracker. Any of them may re-enter the view.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::collab::{
    EntityListener, EntityRef, LogHandler, Outcome, Unsubscribe, ViewContext,
};
use crate::core::{
    Action, CollectionType, Deferred, EntityId, EventKind, EventMeta, Fields, Filter, Limits,
    OpKind, OperationId, ViewId,
};

use super::ViewError;
use super::fanout::{
    DropReason, Fanout, SubscriberLimits, ViewEvent, ViewListener, ViewSubscription,
};
use super::options::ViewOptions;
use super::sorted::SortedIndex;
use super::subscription::SubscriptionManager;

/// Shared handle to an activated view. Clones refer to the same view.
#[derive(Clone)]
pub struct FilterView {
    inner: Rc<ViewInner>,
}

struct ViewInner {
    id: ViewId,
    collection: CollectionType,
    filter: Filter,
    options: ViewOptions,
    ctx: ViewContext,
    subscription: SubscriptionManager,
    span: tracing::Span,
    ready: Deferred<Result<(), ViewError>>,
    state: RefCell<ViewState>,
    fanout: RefCell<Fanout>,
    me: Weak<ViewInner>,
}

struct ViewState {
    members: BTreeMap<EntityId, Member>,
    sorted: Option<SortedIndex<EntityRef>>,
    /// Ids with a pending asynchronous full-match check.
    checking: HashSet<EntityId>,
    loading: bool,
    local_done: bool,
    remote_done: bool,
    destroyed: bool,
    log_unsubs: Vec<Unsubscribe>,
    teardown: Vec<Box<dyn FnOnce()>>,
}

struct Member {
    handle: EntityRef,
    unsubscribe: Unsubscribe,
}

/// Tracks the backlog replay: the walk itself plus the checks it started.
struct Replay {
    seen: RefCell<HashSet<EntityId>>,
    outstanding: Cell<usize>,
    walked: Cell<bool>,
}

impl FilterView {
    /// Activate a view over `ctx`'s collection.
    ///
    /// Scans resident entities, registers the log handlers, replays the
    /// backlog of offline collections, and subscribes to the remote topic of
    /// remote ones. Fails fast when the collection type is invalid or a
    /// remote collection comes without a remote sync.
    pub fn activate(
        ctx: ViewContext,
        filter: Filter,
        options: ViewOptions,
        limits: &Limits,
    ) -> Result<FilterView, ViewError> {
        let descriptor = ctx.store.descriptor().clone();
        let collection = descriptor
            .collection_type()
            .map_err(|e| ViewError::Misconfigured {
                reason: e.to_string(),
            })?;
        if descriptor.remote && ctx.remote.is_none() {
            return Err(ViewError::Misconfigured {
                reason: format!("{collection} is remote but no remote sync was provided"),
            });
        }

        let id = ViewId::from_parts(&collection, &filter.canonical_key(), &options.options_key());
        let remote = if descriptor.remote {
            ctx.remote.clone()
        } else {
            None
        };
        let subscription = SubscriptionManager::new(
            id.clone(),
            collection.clone(),
            filter.clone(),
            Rc::clone(&ctx.log),
            remote,
        );
        let span = tracing::info_span!("filter_view", view = %id);
        let sorted = options.sort_by.as_ref().map(|_| SortedIndex::new());
        let fanout = Fanout::new(limits);

        let inner = Rc::new_cyclic(|me| ViewInner {
            id,
            collection,
            filter,
            options,
            ctx,
            subscription,
            span,
            ready: Deferred::pending(),
            state: RefCell::new(ViewState {
                members: BTreeMap::new(),
                sorted,
                checking: HashSet::new(),
                loading: true,
                local_done: false,
                remote_done: !descriptor.remote,
                destroyed: false,
                log_unsubs: Vec::new(),
                teardown: Vec::new(),
            }),
            fanout: RefCell::new(fanout),
            me: me.clone(),
        });
        inner.start(descriptor.offline);
        Ok(FilterView { inner })
    }

    pub fn id(&self) -> &ViewId {
        &self.inner.id
    }

    pub fn collection(&self) -> &CollectionType {
        &self.inner.collection
    }

    pub fn filter(&self) -> &Filter {
        &self.inner.filter
    }

    pub fn options(&self) -> &ViewOptions {
        &self.inner.options
    }

    pub fn len(&self) -> usize {
        self.inner.state.borrow().members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.inner.state.borrow().members.contains_key(id)
    }

    pub fn members(&self) -> BTreeMap<EntityId, EntityRef> {
        self.inner.members_snapshot()
    }

    /// Ordered members; `None` for unsorted views.
    pub fn sorted(&self) -> Option<Vec<EntityRef>> {
        let state = self.inner.state.borrow();
        state.sorted.as_ref().map(|index| index.handles().to_vec())
    }

    pub fn sorted_ids(&self) -> Option<Vec<EntityId>> {
        let state = self.inner.state.borrow();
        state
            .sorted
            .as_ref()
            .map(|index| index.ids().cloned().collect())
    }

    /// True until the initial membership is settled.
    pub fn is_loading(&self) -> bool {
        self.inner.state.borrow().loading
    }

    /// Settles once the local scan is done and, for remote collections, the
    /// subscription was acknowledged. Fails if the subscription is rejected
    /// or the view is destroyed first.
    pub fn ready(&self) -> Deferred<Result<(), ViewError>> {
        self.inner.ready.clone()
    }

    pub fn listener_count(&self) -> usize {
        self.inner.fanout.borrow().listener_count()
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.state.borrow().destroyed
    }

    pub fn ptr_eq(a: &FilterView, b: &FilterView) -> bool {
        Rc::ptr_eq(&a.inner, &b.inner)
    }

    /// Register a callback listener. Removing the last listener destroys
    /// the view.
    pub fn add_listener(&self, listener: impl Fn(&ViewEvent) + 'static) -> Unsubscribe {
        if self.is_destroyed() {
            return Unsubscribe::noop();
        }
        let listener: ViewListener = Rc::new(listener);
        let id = self.inner.fanout.borrow_mut().add_listener(listener);
        let weak = Rc::downgrade(&self.inner);
        Unsubscribe::new(move || {
            if let Some(inner) = weak.upgrade() {
                let removed = inner.fanout.borrow_mut().remove_listener(id);
                if removed {
                    inner.listener_released();
                }
            }
        })
    }

    /// Open a channel subscription; it counts as a listener until closed.
    pub fn subscribe(&self, limits: SubscriberLimits) -> Result<ViewSubscription, ViewError> {
        if self.is_destroyed() {
            return Err(ViewError::Destroyed {
                view: self.inner.id.to_string(),
            });
        }
        let (id, receiver, drop_reason) = self.inner.fanout.borrow_mut().add_subscriber(limits)?;
        let weak = Rc::downgrade(&self.inner);
        let release = Unsubscribe::new(move || {
            if let Some(inner) = weak.upgrade() {
                let removed = inner.fanout.borrow_mut().remove_subscriber(id);
                if removed {
                    inner.listener_released();
                }
            }
        });
        Ok(ViewSubscription::new(receiver, drop_reason, release))
    }

    /// Run `hook` once when the view is torn down.
    pub fn on_teardown(&self, hook: impl FnOnce() + 'static) {
        {
            let mut state = self.inner.state.borrow_mut();
            if !state.destroyed {
                state.teardown.push(Box::new(hook));
                return;
            }
        }
        hook();
    }

    /// Tear the view down. Idempotent.
    pub fn destroy(&self) {
        self.inner.destroy();
    }
}

impl fmt::Debug for FilterView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.borrow();
        f.debug_struct("FilterView")
            .field("id", &self.inner.id)
            .field("members", &state.members.len())
            .field("loading", &state.loading)
            .field("destroyed", &state.destroyed)
            .finish()
    }
}

impl ViewInner {
    fn weak(&self) -> Weak<ViewInner> {
        self.me.clone()
    }

    fn is_destroyed(&self) -> bool {
        self.state.borrow().destroyed
    }

    fn is_member(&self, id: &EntityId) -> bool {
        self.state.borrow().members.contains_key(id)
    }

    fn member(&self, id: &EntityId) -> Option<EntityRef> {
        self.state
            .borrow()
            .members
            .get(id)
            .map(|member| Rc::clone(&member.handle))
    }

    fn start(&self, offline: bool) {
        let _entered = self.span.enter();
        tracing::info!(
            collection = %self.collection,
            remote = self.subscription.is_remote(),
            offline,
            "activating filter view"
        );

        for handle in self.ctx.store.loaded() {
            if !handle.is_loading() && self.filter.matches_all(&handle.fields()) {
                self.add(handle);
            }
        }

        self.register_handlers();

        if offline {
            self.replay_backlog();
        } else {
            self.state.borrow_mut().local_done = true;
        }

        if let Some(ack) = self.subscription.open() {
            let weak = self.weak();
            ack.on_settle(move |result| {
                if let Some(inner) = weak.upgrade() {
                    inner.on_subscribed(result.map_err(|e| e.reason));
                }
            });
        }

        self.maybe_ready();
    }

    fn register_handlers(&self) {
        let mut unsubs = Vec::with_capacity(EventKind::ALL.len() + 2);
        for kind in EventKind::ALL {
            let action_type = kind.action_type(&self.collection);
            if kind.op == OpKind::Create {
                let tag = LogHandler::Pre(self.subscription.retention_handler());
                unsubs.push(self.ctx.log.on_type(&action_type, tag));
            }
            let weak = self.weak();
            let handler = LogHandler::Post(Rc::new(move |action: &Action, meta: &EventMeta| {
                if let Some(inner) = weak.upgrade() {
                    inner.on_action(kind, action, meta);
                }
            }));
            unsubs.push(self.ctx.log.on_type(&action_type, handler));
        }
        self.state.borrow_mut().log_unsubs.extend(unsubs);
    }

    fn replay_backlog(&self) {
        let replay = Rc::new(Replay {
            seen: RefCell::new(HashSet::new()),
            outstanding: Cell::new(0),
            walked: Cell::new(false),
        });
        let weak = self.weak();
        let walker = Rc::clone(&replay);
        let done = self
            .ctx
            .log
            .for_each_existing(Box::new(move |action: &Action, meta: &EventMeta| {
                if let Some(inner) = weak.upgrade() {
                    inner.replay_entry(&walker, action, meta);
                }
            }));
        let weak = self.weak();
        done.on_settle(move |()| {
            replay.walked.set(true);
            if let Some(inner) = weak.upgrade() {
                inner.replay_progress(&replay);
            }
        });
    }

    fn replay_entry(&self, replay: &Rc<Replay>, action: &Action, meta: &EventMeta) {
        if self.is_destroyed() {
            return;
        }
        let Ok(kind) = EventKind::parse(&self.collection, action.action_type.as_str()) else {
            return;
        };
        if replay.seen.borrow().contains(&action.id) {
            return;
        }
        match kind.op {
            OpKind::Create | OpKind::Update => {
                if !self.filter.matches_some(&action.fields) {
                    return;
                }
                replay.seen.borrow_mut().insert(action.id.clone());
                if kind.op == OpKind::Create && self.filter.matches_all(&action.fields) {
                    self.subscription.retain(&meta.id);
                }
                if self.is_member(&action.id) {
                    return;
                }
                replay.outstanding.set(replay.outstanding.get() + 1);
                let tracker = Rc::clone(replay);
                let scheduled = self.check_later(&action.id, move |inner, _added| {
                    tracker.outstanding.set(tracker.outstanding.get().saturating_sub(1));
                    inner.replay_progress(&tracker);
                });
                if !scheduled {
                    replay.outstanding.set(replay.outstanding.get().saturating_sub(1));
                }
            }
            OpKind::Delete => {
                replay.seen.borrow_mut().insert(action.id.clone());
            }
        }
    }

    fn replay_progress(&self, replay: &Replay) {
        if !replay.walked.get() || replay.outstanding.get() > 0 {
            return;
        }
        replay.seen.borrow_mut().clear();
        let finished = {
            let mut state = self.state.borrow_mut();
            !std::mem::replace(&mut state.local_done, true)
        };
        if finished {
            tracing::debug!(view = %self.id, "backlog replay finished");
            self.maybe_ready();
        }
    }

    fn on_subscribed(&self, result: Result<(), String>) {
        if self.is_destroyed() {
            return;
        }
        match result {
            Ok(()) => {
                self.state.borrow_mut().remote_done = true;
                self.maybe_ready();
            }
            Err(reason) => {
                self.subscription.mark_failed();
                let topic = self.subscription.topic_label();
                tracing::warn!(view = %self.id, %topic, %reason, "remote subscription rejected");
                self.ready
                    .settle(Err(ViewError::SubscriptionRejected { topic, reason }));
            }
        }
    }

    fn maybe_ready(&self) {
        let ready = {
            let mut state = self.state.borrow_mut();
            if state.destroyed || !state.local_done || !state.remote_done || !state.loading {
                return;
            }
            if !self.ready.is_pending() {
                return;
            }
            state.loading = false;
            true
        };
        if ready {
            tracing::debug!(view = %self.id, "filter view ready");
            self.ready.settle(Ok(()));
        }
    }

    fn on_action(&self, kind: EventKind, action: &Action, meta: &EventMeta) {
        if self.is_destroyed() {
            return;
        }
        let _entered = self.span.enter();
        match kind.op {
            OpKind::Create => self.on_create(kind, action, meta),
            OpKind::Update => self.on_update(kind, action, meta),
            OpKind::Delete => self.on_delete(kind, action, meta),
        }
    }

    fn on_create(&self, kind: EventKind, action: &Action, meta: &EventMeta) {
        if !self.filter.matches_all(&action.fields) {
            return;
        }
        let handle = self.ctx.store.load(&action.id);
        handle.apply_creation(action, meta);
        self.add(handle);
        if kind.is_optimistic() {
            let weak = self.weak();
            let id = action.id.clone();
            self.ctx.tracker.outcome(&meta.id).on_settle(move |outcome| {
                if let Outcome::Rejected { reason } = outcome
                    && let Some(inner) = weak.upgrade()
                {
                    tracing::debug!(view = %inner.id, entity = %id, %reason, "rolling back optimistic create");
                    inner.remove(&id);
                }
            });
        }
    }

    fn on_update(&self, kind: EventKind, action: &Action, meta: &EventMeta) {
        if let Some(handle) = self.member(&action.id) {
            if self.filter.matches_all(&handle.fields()) {
                return;
            }
            if kind.is_optimistic() {
                self.remove_and_listen(handle, meta.id.clone());
            } else {
                self.remove(&action.id);
            }
            return;
        }
        if !self.filter.matches_some(&action.fields) {
            return;
        }
        if !kind.is_optimistic() {
            self.check_later(&action.id, |_, _| {});
            return;
        }
        let op = meta.id.clone();
        let id = action.id.clone();
        let scheduled = self.check_later(&action.id, move |inner, added| {
            if added {
                inner.recheck_on_rejection(&op, id);
            }
        });
        if !scheduled {
            // The pending check reads this update's fields too, so its
            // rejection must still be able to undo the add.
            self.recheck_on_rejection(&meta.id, action.id.clone());
        }
    }

    /// Re-check `id`'s membership if `op` is rejected.
    fn recheck_on_rejection(&self, op: &OperationId, id: EntityId) {
        let weak = self.weak();
        self.ctx.tracker.outcome(op).on_settle(move |outcome| {
            if outcome.is_rejected()
                && let Some(inner) = weak.upgrade()
            {
                inner.recheck_after_rollback(&id);
            }
        });
    }

    fn on_delete(&self, kind: EventKind, action: &Action, meta: &EventMeta) {
        let Some(handle) = self.member(&action.id) else {
            return;
        };
        if let Some(created) = handle.created_at()
            && !self.ctx.log.is_causally_before(&created, &meta.stamp)
        {
            tracing::trace!(entity = %action.id, op = %meta.id, "ignoring stale delete");
            return;
        }
        if kind.is_optimistic() {
            self.remove_and_listen(handle, meta.id.clone());
        } else {
            self.remove(&action.id);
        }
    }

    /// Load `id`, wait for it, and add it if it full-matches. `then` runs
    /// with whether it was added. Returns false when a check for `id` is
    /// already in flight.
    fn check_later(
        &self,
        id: &EntityId,
        then: impl FnOnce(&ViewInner, bool) + 'static,
    ) -> bool {
        if !self.state.borrow_mut().checking.insert(id.clone()) {
            return false;
        }
        let handle = self.ctx.store.load(id);
        let weak = self.weak();
        let id = id.clone();
        handle.ready().on_settle({
            let handle = Rc::clone(&handle);
            move |()| {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                inner.state.borrow_mut().checking.remove(&id);
                if inner.is_destroyed() {
                    return;
                }
                let added = inner.filter.matches_all(&handle.fields());
                if added {
                    inner.add(handle);
                } else {
                    inner.ctx.store.release_if_idle(&id);
                }
                then(&inner, added);
            }
        });
        true
    }

    /// A rejected optimistic update had added `id`: drop it now if it no
    /// longer matches, otherwise re-check on its next change.
    fn recheck_after_rollback(&self, id: &EntityId) {
        if self.is_destroyed() {
            return;
        }
        let Some(handle) = self.member(id) else {
            return;
        };
        if !self.filter.matches_all(&handle.fields()) {
            tracing::debug!(view = %self.id, entity = %id, "rolling back optimistic update");
            self.remove(id);
            return;
        }
        let slot: Rc<RefCell<Option<Unsubscribe>>> = Rc::new(RefCell::new(None));
        let weak = self.weak();
        let once = Rc::clone(&slot);
        let listener: EntityListener = Rc::new(move |id: &EntityId, _: &Fields| {
            let Some(unsubscribe) = once.borrow_mut().take() else {
                return;
            };
            unsubscribe.call();
            if let Some(inner) = weak.upgrade()
                && let Some(handle) = inner.member(id)
                && !inner.filter.matches_all(&handle.fields())
            {
                inner.remove(id);
            }
        });
        let unsubscribe = handle.add_listener(listener);
        *slot.borrow_mut() = Some(unsubscribe);
    }

    /// Remove a member while an optimistic operation is pending, keeping the
    /// entity alive; re-add it if the operation is rejected.
    fn remove_and_listen(&self, handle: EntityRef, op: OperationId) {
        let keep_alive = handle.add_listener(Rc::new(|_: &EntityId, _: &Fields| {}));
        self.remove(handle.id());
        let weak = self.weak();
        self.ctx.tracker.outcome(&op).on_settle(move |outcome| {
            if let Outcome::Rejected { reason } = outcome
                && let Some(inner) = weak.upgrade()
                && !inner.is_destroyed()
            {
                tracing::debug!(view = %inner.id, entity = %handle.id(), %reason, "restoring member after rejection");
                inner.add(Rc::clone(&handle));
            }
            keep_alive.call();
        });
    }

    fn add(&self, handle: EntityRef) {
        let id = handle.id().clone();
        {
            let state = self.state.borrow();
            if state.destroyed || state.members.contains_key(&id) {
                return;
            }
        }
        let key = self
            .options
            .sort_by
            .as_ref()
            .map(|sort_by| sort_by.sort_key(&handle.fields()));
        let unsubscribe = handle.add_listener(self.member_listener());
        let sorted = {
            let mut state = self.state.borrow_mut();
            state.members.insert(
                id.clone(),
                Member {
                    handle: Rc::clone(&handle),
                    unsubscribe,
                },
            );
            match (state.sorted.as_mut(), key) {
                (Some(index), Some(key)) => index.insert(id, key, handle).is_some(),
                _ => false,
            }
        };
        self.emit(ViewEvent::Members(self.members_snapshot()));
        if sorted {
            self.emit_sorted();
        }
    }

    fn remove(&self, id: &EntityId) {
        let (member, sorted) = {
            let mut state = self.state.borrow_mut();
            let Some(member) = state.members.remove(id) else {
                return;
            };
            let sorted = state
                .sorted
                .as_mut()
                .is_some_and(|index| index.remove(id).is_some());
            (member, sorted)
        };
        member.unsubscribe.call();
        self.emit(ViewEvent::Members(self.members_snapshot()));
        if sorted {
            self.emit_sorted();
        }
    }

    fn member_listener(&self) -> EntityListener {
        let weak = self.weak();
        Rc::new(move |id: &EntityId, diff: &Fields| {
            if let Some(inner) = weak.upgrade() {
                inner.on_member_changed(id, diff);
            }
        })
    }

    fn on_member_changed(&self, id: &EntityId, diff: &Fields) {
        if self.is_destroyed() {
            return;
        }
        if let Some(sort_by) = &self.options.sort_by
            && let Some(handle) = self.member(id)
        {
            let key = sort_by.sort_key(&handle.fields());
            let moved = {
                let mut state = self.state.borrow_mut();
                state
                    .sorted
                    .as_mut()
                    .is_some_and(|index| index.reposition(id, key, handle).changed_order())
            };
            if moved {
                self.emit_sorted();
            }
        }
        if !self.options.list_changes_only {
            self.emit(ViewEvent::EntityChanged {
                id: id.clone(),
                diff: diff.clone(),
            });
        }
    }

    fn members_snapshot(&self) -> BTreeMap<EntityId, EntityRef> {
        self.state
            .borrow()
            .members
            .iter()
            .map(|(id, member)| (id.clone(), Rc::clone(&member.handle)))
            .collect()
    }

    fn emit_sorted(&self) {
        let sorted = self
            .state
            .borrow()
            .sorted
            .as_ref()
            .map(|index| index.handles().to_vec());
        if let Some(sorted) = sorted {
            self.emit(ViewEvent::Sorted(sorted));
        }
    }

    fn emit(&self, event: ViewEvent) {
        let (listeners, dropped) = {
            let mut fanout = self.fanout.borrow_mut();
            let dropped = fanout.publish(&event.to_update());
            (fanout.listeners(), dropped)
        };
        for listener in listeners {
            listener(&event);
        }
        if dropped > 0 {
            tracing::debug!(view = %self.id, dropped, "dropped lagging subscribers");
            self.listener_released();
        }
    }

    fn listener_released(&self) {
        let idle = self.fanout.borrow().listener_count() == 0;
        if idle && !self.is_destroyed() {
            tracing::debug!(view = %self.id, "last listener removed");
            self.destroy();
        }
    }

    fn destroy(&self) {
        let (log_unsubs, members, teardown) = {
            let mut state = self.state.borrow_mut();
            if state.destroyed {
                return;
            }
            state.destroyed = true;
            state.loading = false;
            state.checking.clear();
            if let Some(index) = state.sorted.as_mut() {
                index.clear();
            }
            (
                std::mem::take(&mut state.log_unsubs),
                std::mem::take(&mut state.members),
                std::mem::take(&mut state.teardown),
            )
        };
        let _entered = self.span.enter();
        for unsubscribe in log_unsubs {
            unsubscribe.call();
        }
        self.subscription.close();
        for member in members.into_values() {
            member.unsubscribe.call();
        }
        self.fanout.borrow_mut().close_all(DropReason::ViewDestroyed);
        self.ready.settle(Err(ViewError::Destroyed {
            view: self.id.to_string(),
        }));
        for hook in teardown {
            hook();
        }
        tracing::debug!(view = %self.id, "filter view destroyed");
    }
}
