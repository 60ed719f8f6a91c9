//! Memoizing view registry.
//!
//! Identical activations share one `FilterView`. Each activation gets its own
//! `ViewHandle` lease; destroying a handle releases only what was registered
//! through it. The shared view is torn down when its last listener goes away,
//! or when the last lease is destroyed.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::ops::Deref;
use std::rc::{Rc, Weak};

use crate::collab::{Unsubscribe, ViewContext};
use crate::config::{Config, ViewDefaults};
use crate::core::{Filter, Limits, ViewId};

use super::ViewError;
use super::engine::FilterView;
use super::fanout::{SubscriberLimits, ViewEvent, ViewSubscription};
use super::options::ViewOptions;

#[derive(Clone, Default)]
pub struct ViewRegistry {
    inner: Rc<RegistryState>,
}

#[derive(Default)]
struct RegistryState {
    limits: Limits,
    defaults: ViewDefaults,
    views: RefCell<HashMap<ViewId, Entry>>,
}

struct Entry {
    view: FilterView,
    leases: usize,
}

impl RegistryState {
    /// A lease on `view` was destroyed.
    fn release_lease(&self, view: &FilterView) {
        let last = {
            let mut views = self.views.borrow_mut();
            let Some(entry) = views.get_mut(view.id()) else {
                return;
            };
            if !FilterView::ptr_eq(&entry.view, view) {
                return;
            }
            entry.leases = entry.leases.saturating_sub(1);
            if entry.leases > 0 {
                return;
            }
            views.remove(view.id()).map(|entry| entry.view)
        };
        if let Some(view) = last {
            tracing::debug!(view = %view.id(), "last lease released");
            view.destroy();
        }
    }
}

impl ViewRegistry {
    pub fn new(limits: Limits) -> Self {
        Self {
            inner: Rc::new(RegistryState {
                limits,
                defaults: ViewDefaults::default(),
                views: RefCell::new(HashMap::new()),
            }),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            inner: Rc::new(RegistryState {
                limits: config.limits.clone(),
                defaults: config.defaults.clone(),
                views: RefCell::new(HashMap::new()),
            }),
        }
    }

    /// Options seeded from the configured defaults.
    pub fn default_options(&self) -> ViewOptions {
        ViewOptions::from_defaults(&self.inner.defaults)
    }

    /// Lease on the existing live view for these inputs, or on a freshly
    /// activated one.
    pub fn activate(
        &self,
        ctx: &ViewContext,
        filter: Filter,
        options: ViewOptions,
    ) -> Result<ViewHandle, ViewError> {
        let collection = ctx
            .store
            .descriptor()
            .collection_type()
            .map_err(|e| ViewError::Misconfigured {
                reason: e.to_string(),
            })?;
        let id = ViewId::from_parts(&collection, &filter.canonical_key(), &options.options_key());
        let mut existing = None;
        if let Some(entry) = self.inner.views.borrow_mut().get_mut(&id)
            && !entry.view.is_destroyed()
        {
            entry.leases += 1;
            existing = Some(entry.view.clone());
        }
        if let Some(view) = existing {
            return Ok(self.lease(view));
        }

        let view = FilterView::activate(ctx.clone(), filter, options, &self.inner.limits)?;
        let registry = Rc::downgrade(&self.inner);
        let key = id.clone();
        view.on_teardown(move || {
            if let Some(registry) = registry.upgrade() {
                let mut views = registry.views.borrow_mut();
                if views.get(&key).is_some_and(|entry| entry.view.is_destroyed()) {
                    views.remove(&key);
                }
            }
        });
        if !view.is_destroyed() {
            self.inner.views.borrow_mut().insert(
                id,
                Entry {
                    view: view.clone(),
                    leases: 1,
                },
            );
        }
        Ok(self.lease(view))
    }

    fn lease(&self, view: FilterView) -> ViewHandle {
        ViewHandle {
            view,
            registry: Rc::downgrade(&self.inner),
            owned: Rc::new(RefCell::new(Owned::default())),
        }
    }

    /// Live view registered under `id`.
    pub fn get(&self, id: &ViewId) -> Option<FilterView> {
        self.inner
            .views
            .borrow()
            .get(id)
            .map(|entry| &entry.view)
            .filter(|view| !view.is_destroyed())
            .cloned()
    }

    /// Outstanding leases on the view registered under `id`.
    pub fn leases(&self, id: &ViewId) -> usize {
        self.inner
            .views
            .borrow()
            .get(id)
            .map_or(0, |entry| entry.leases)
    }

    pub fn len(&self) -> usize {
        self.inner.views.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ids(&self) -> Vec<ViewId> {
        self.inner.views.borrow().keys().cloned().collect()
    }

    /// Destroy every registered view.
    pub fn destroy_all(&self) {
        let views: Vec<FilterView> = self
            .inner
            .views
            .borrow()
            .values()
            .map(|entry| entry.view.clone())
            .collect();
        for view in views {
            view.destroy();
        }
        self.inner.views.borrow_mut().clear();
    }
}

/// One caller's lease on a registry-managed view.
///
/// Dereferences to the shared `FilterView` for reads. Listeners and
/// subscriptions added through the handle are tracked, and `destroy`
/// releases only those plus the lease itself.
pub struct ViewHandle {
    view: FilterView,
    registry: Weak<RegistryState>,
    owned: Rc<RefCell<Owned>>,
}

#[derive(Default)]
struct Owned {
    next: u64,
    releases: BTreeMap<u64, Unsubscribe>,
    destroyed: bool,
}

impl ViewHandle {
    pub fn view(&self) -> &FilterView {
        &self.view
    }

    pub fn add_listener(&self, listener: impl Fn(&ViewEvent) + 'static) -> Unsubscribe {
        let release = self.view.add_listener(listener);
        self.track(release)
    }

    pub fn subscribe(&self, limits: SubscriberLimits) -> Result<ViewSubscription, ViewError> {
        let subscription = self.view.subscribe(limits)?;
        Ok(subscription.map_release(|release| self.track(release)))
    }

    /// Release this lease's listeners and the lease. Idempotent.
    pub fn destroy(&self) {
        let releases = {
            let mut owned = self.owned.borrow_mut();
            if std::mem::replace(&mut owned.destroyed, true) {
                return;
            }
            std::mem::take(&mut owned.releases)
        };
        for release in releases.into_values() {
            release.call();
        }
        match self.registry.upgrade() {
            Some(registry) => registry.release_lease(&self.view),
            None => self.view.destroy(),
        }
    }

    fn track(&self, release: Unsubscribe) -> Unsubscribe {
        let key = {
            let mut owned = self.owned.borrow_mut();
            if owned.destroyed {
                drop(owned);
                release.call();
                return Unsubscribe::noop();
            }
            let key = owned.next;
            owned.next += 1;
            owned.releases.insert(key, release);
            key
        };
        let owned = Rc::downgrade(&self.owned);
        Unsubscribe::new(move || {
            let release = owned
                .upgrade()
                .and_then(|owned| owned.borrow_mut().releases.remove(&key));
            if let Some(release) = release {
                release.call();
            }
        })
    }
}

impl Deref for ViewHandle {
    type Target = FilterView;

    fn deref(&self) -> &FilterView {
        &self.view
    }
}

impl fmt::Debug for ViewHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewHandle")
            .field("view", &self.view)
            .field("owned", &self.owned.borrow().releases.len())
            .finish()
    }
}

thread_local! {
    static GLOBAL: ViewRegistry = ViewRegistry::default();
}

/// The registry shared by every activation on this thread.
pub fn global() -> ViewRegistry {
    GLOBAL.with(ViewRegistry::clone)
}

/// Activate through the thread's global registry.
pub fn activate(
    ctx: &ViewContext,
    filter: Filter,
    options: ViewOptions,
) -> Result<ViewHandle, ViewError> {
    global().activate(ctx, filter, options)
}
