//! Memoized activation through `ViewRegistry`.

use livefilter::config::{Config, ViewDefaults};
use livefilter::core::Limits;
use livefilter::view::{self, FilterView, SubscriberLimits, ViewOptions, ViewRegistry};

use crate::fixtures::harness::{Harness, Recorder, by_due, id, open_filter, task};

#[test]
fn identical_activations_share_one_view() {
    let h = Harness::local();
    let registry = ViewRegistry::new(Limits::default());

    let first = registry.activate(&h.ctx(), open_filter(), by_due()).unwrap();
    let second = registry.activate(&h.ctx(), open_filter(), by_due()).unwrap();
    assert!(FilterView::ptr_eq(&first, &second));
    assert_eq!(registry.len(), 1);

    let unsorted = registry
        .activate(&h.ctx(), open_filter(), ViewOptions::new())
        .unwrap();
    assert!(!FilterView::ptr_eq(&first, &unsorted));
    let quiet = registry
        .activate(&h.ctx(), open_filter(), by_due().list_changes_only(true))
        .unwrap();
    assert!(!FilterView::ptr_eq(&first, &quiet));
    assert_eq!(registry.len(), 3);
}

#[test]
fn view_lives_until_its_last_listener_leaves() {
    let h = Harness::local();
    let registry = ViewRegistry::new(Limits::default());
    let view = registry.activate(&h.ctx(), open_filter(), by_due()).unwrap();
    let first = Recorder::attach(&view);
    let shared = registry.activate(&h.ctx(), open_filter(), by_due()).unwrap();
    let second = Recorder::attach(&shared);

    first.detach();
    assert!(!view.is_destroyed());
    assert_eq!(registry.len(), 1);

    h.created("a", task("open", 1));
    assert!(shared.contains(&id("a")));

    second.detach();
    assert!(view.is_destroyed());
    assert!(registry.is_empty());
    assert!(registry.get(view.id()).is_none());

    let fresh = registry.activate(&h.ctx(), open_filter(), by_due()).unwrap();
    assert!(!FilterView::ptr_eq(&view, &fresh));
    assert!(fresh.contains(&id("a")));
}

#[test]
fn destroying_one_lease_keeps_shared_view_alive() {
    let h = Harness::local();
    let registry = ViewRegistry::new(Limits::default());
    let first = registry.activate(&h.ctx(), open_filter(), by_due()).unwrap();
    let second = registry.activate(&h.ctx(), open_filter(), by_due()).unwrap();
    let _first_listener = first.add_listener(|_| {});
    let _second_listener = second.add_listener(|_| {});
    assert_eq!(first.listener_count(), 2);
    assert_eq!(registry.leases(first.id()), 2);

    first.destroy();
    first.destroy();

    assert!(!second.is_destroyed());
    assert_eq!(second.listener_count(), 1);
    assert_eq!(registry.leases(second.id()), 1);
    h.created("a", task("open", 1));
    assert!(second.contains(&id("a")));

    second.destroy();
    assert!(second.is_destroyed());
    assert!(registry.is_empty());
}

#[test]
fn last_lease_tears_down_a_view_without_listeners() {
    let h = Harness::local();
    let registry = ViewRegistry::new(Limits::default());
    let first = registry.activate(&h.ctx(), open_filter(), by_due()).unwrap();
    let second = registry.activate(&h.ctx(), open_filter(), by_due()).unwrap();

    first.destroy();
    assert!(!second.is_destroyed());

    second.destroy();
    assert!(second.is_destroyed());
    assert!(registry.is_empty());
}

#[test]
fn lease_release_token_is_independent_of_destroy() {
    let h = Harness::local();
    let registry = ViewRegistry::new(Limits::default());
    let first = registry.activate(&h.ctx(), open_filter(), by_due()).unwrap();
    let second = registry.activate(&h.ctx(), open_filter(), by_due()).unwrap();
    let listener = first.add_listener(|_| {});
    let sub = second.subscribe(SubscriberLimits::new(8).unwrap()).unwrap();

    listener.call();
    assert_eq!(second.listener_count(), 1);

    // The lease already gave its listener back; destroying it releases
    // only the lease.
    first.destroy();
    assert!(!second.is_destroyed());

    h.created("a", task("open", 1));
    assert_eq!(sub.drain().len(), 2);

    second.destroy();
    assert!(second.is_destroyed());
    assert!(sub.try_recv().is_err());
}

#[test]
fn destroyed_view_is_not_handed_out() {
    let h = Harness::local();
    let registry = ViewRegistry::new(Limits::default());
    let view = registry.activate(&h.ctx(), open_filter(), by_due()).unwrap();
    view.destroy();
    assert!(registry.is_empty());

    let again = registry.activate(&h.ctx(), open_filter(), by_due()).unwrap();
    assert!(!again.is_destroyed());
}

#[test]
fn destroy_all_tears_down_every_view() {
    let h = Harness::local();
    let registry = ViewRegistry::new(Limits::default());
    let sorted = registry.activate(&h.ctx(), open_filter(), by_due()).unwrap();
    let plain = registry
        .activate(&h.ctx(), open_filter(), ViewOptions::new())
        .unwrap();

    registry.destroy_all();

    assert!(sorted.is_destroyed());
    assert!(plain.is_destroyed());
    assert!(registry.is_empty());
}

#[test]
fn global_registry_is_shared_per_thread() {
    let h = Harness::local();
    let first = view::activate(&h.ctx(), open_filter(), by_due()).unwrap();
    let second = view::global()
        .activate(&h.ctx(), open_filter(), by_due())
        .unwrap();
    assert!(FilterView::ptr_eq(&first, &second));
    view::global().destroy_all();
}

#[test]
fn configured_defaults_seed_options() {
    let config = Config {
        defaults: ViewDefaults {
            list_changes_only: true,
        },
        ..Config::default()
    };
    let registry = ViewRegistry::from_config(&config);
    assert!(registry.default_options().list_changes_only);
    assert!(registry.default_options().sort_by.is_none());
}
