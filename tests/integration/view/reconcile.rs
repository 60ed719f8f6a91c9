//! Reconciliation of optimistic and confirmed operations.

use livefilter::collab::{CollectionDescriptor, EntityHandle};
use livefilter::core::{Fields, OpKind, Provenance};
use livefilter::memory::{ManualRemote, MemoryRecordStore};
use livefilter::view::{ViewOptions, ViewUpdate};

use crate::fixtures::harness::{Harness, Recorder, by_due, id, ids, open_filter, task};

#[test]
fn stale_delete_is_ignored() {
    let h = Harness::local();
    let view = h.activate(open_filter(), by_due());
    let stale = h.log.next_meta();
    h.created("a", task("open", 1));
    let rec = Recorder::attach(&view);

    h.log
        .add_with_meta(h.action(OpKind::Delete, Provenance::Confirmed, "a", Fields::new()), stale);

    assert!(view.contains(&id("a")));
    assert!(rec.take().is_empty());

    h.deleted("a");
    assert!(view.is_empty());
    assert_eq!(
        rec.take(),
        vec![ViewUpdate::Members(Vec::new()), ViewUpdate::Sorted(Vec::new())]
    );
}

#[test]
fn duplicate_add_and_missing_remove_are_silent() {
    let h = Harness::local();
    let view = h.activate(open_filter(), by_due());
    h.created("a", task("open", 1));
    let rec = Recorder::attach(&view);

    h.created("a", task("open", 1));
    h.deleted("zz");
    h.changed("zz", Fields::new().with("due", 4));

    assert_eq!(view.len(), 1);
    assert!(rec.take().is_empty());
}

#[test]
fn non_matching_create_is_not_loaded() {
    let h = Harness::local();
    let view = h.activate(open_filter(), ViewOptions::new());
    h.created("a", task("closed", 1));
    assert!(view.is_empty());
    assert!(!h.store.is_resident(&id("a")));
}

#[test]
fn rejected_optimistic_create_is_removed() {
    let h = Harness::local();
    let view = h.activate(open_filter(), by_due());
    let meta = h.create("a", task("open", 1));
    assert!(view.contains(&id("a")));

    h.tracker.reject(&meta.id, "denied");
    assert!(view.is_empty());
    assert_eq!(view.sorted_ids(), Some(Vec::new()));
}

#[test]
fn confirmed_optimistic_create_stays() {
    let h = Harness::local();
    let view = h.activate(open_filter(), by_due());
    let meta = h.create("a", task("open", 1));
    h.tracker.confirm(&meta.id);
    assert!(view.contains(&id("a")));
}

#[test]
fn confirmed_update_into_filter_loads_and_adds() {
    let h = Harness::local();
    let view = h.activate(open_filter(), by_due());
    h.created("a", task("closed", 5));
    h.created("b", task("open", 1));

    h.changed("a", Fields::new().with("status", "open"));
    assert_eq!(view.sorted_ids(), Some(ids(&["b", "a"])));

    h.changed("a", Fields::new().with("status", "closed"));
    assert_eq!(view.sorted_ids(), Some(ids(&["b"])));
}

#[test]
fn failed_check_releases_idle_handle() {
    let h = Harness::local();
    let view = h.activate(open_filter().with("owner", "ann"), ViewOptions::new());
    h.created("a", task("open", 1).with("owner", "bob"));

    // Touches a filter key with the right value, but the full snapshot still fails.
    h.changed("a", Fields::new().with("status", "open"));

    assert!(view.is_empty());
    assert!(!h.store.is_resident(&id("a")));
}

#[test]
fn rejected_optimistic_update_that_added_is_removed() {
    let h = Harness::local();
    let view = h.activate(open_filter(), by_due());
    h.created("a", task("closed", 1));

    let meta = h.change("a", Fields::new().with("status", "open"));
    assert!(view.contains(&id("a")));

    h.tracker.reject(&meta.id, "denied");
    assert!(view.is_empty());
    let a = h.store.entity(&id("a")).unwrap();
    assert_eq!(a.fields(), task("closed", 1));
    assert_eq!(a.listener_count(), 0);
}

#[test]
fn confirmed_optimistic_update_that_added_stays() {
    let h = Harness::local();
    let view = h.activate(open_filter(), by_due());
    h.created("a", task("closed", 1));
    let meta = h.change("a", Fields::new().with("status", "open"));
    h.tracker.confirm(&meta.id);
    assert!(view.contains(&id("a")));
}

#[test]
fn rejected_optimistic_delete_readds() {
    let h = Harness::local();
    let view = h.activate(open_filter(), by_due());
    h.created("a", task("open", 2));
    h.created("b", task("open", 1));

    let meta = h.delete("a");
    assert_eq!(view.sorted_ids(), Some(ids(&["b"])));
    assert_eq!(h.store.entity(&id("a")).unwrap().listener_count(), 1);

    h.tracker.reject(&meta.id, "denied");
    assert_eq!(view.sorted_ids(), Some(ids(&["b", "a"])));
    assert_eq!(h.store.entity(&id("a")).unwrap().listener_count(), 1);
}

#[test]
fn confirmed_optimistic_delete_stays_removed() {
    let h = Harness::local();
    let view = h.activate(open_filter(), by_due());
    h.created("a", task("open", 2));
    let meta = h.delete("a");
    h.tracker.confirm(&meta.id);
    assert!(view.is_empty());
    assert_eq!(h.store.entity(&id("a")).unwrap().listener_count(), 0);
}

#[test]
fn pending_check_ignores_further_updates_and_reads_final_state() {
    let store = MemoryRecordStore::new(CollectionDescriptor::new("tasks")).with_manual_loads();
    let h = Harness::with_store(store, ManualRemote::new());
    let view = h.activate(open_filter(), ViewOptions::new());
    h.store.seed(&id("a"), task("closed", 1));

    h.changed("a", Fields::new().with("status", "open"));
    h.changed("a", Fields::new().with("status", "open").with("due", 3));
    h.changed("a", Fields::new().with("status", "closed"));
    assert!(view.is_empty());

    h.store.finish_load(&id("a"));
    assert!(view.is_empty());

    h.changed("a", Fields::new().with("status", "open"));
    assert!(!view.contains(&id("a")));
    h.store.finish_load(&id("a"));
    assert!(view.contains(&id("a")));
    let a = view.members().remove(&id("a")).unwrap();
    assert_eq!(a.fields(), task("open", 3));
}

fn owned_by_ann() -> livefilter::core::Filter {
    open_filter().with("owner", "ann")
}

fn manual_harness() -> Harness {
    let store = MemoryRecordStore::new(CollectionDescriptor::new("tasks")).with_manual_loads();
    Harness::with_store(store, ManualRemote::new())
}

#[test]
fn optimistic_update_folded_into_pending_check_rolls_back() {
    let h = manual_harness();
    let view = h.activate(owned_by_ann(), ViewOptions::new());
    h.store
        .seed(&id("x"), Fields::new().with("status", "closed").with("owner", "bob"));

    h.changed("x", Fields::new().with("owner", "ann"));
    let opt = h.change("x", Fields::new().with("status", "open"));
    h.store.finish_load(&id("x"));
    assert!(view.contains(&id("x")));

    h.tracker.reject(&opt.id, "denied");

    let x = h.store.entity(&id("x")).unwrap();
    assert_eq!(
        x.fields(),
        Fields::new().with("status", "closed").with("owner", "ann")
    );
    assert!(!view.contains(&id("x")));
    assert_eq!(x.listener_count(), 0);
}

#[test]
fn optimistic_update_rejected_before_pending_check_finishes() {
    let h = manual_harness();
    let view = h.activate(owned_by_ann(), ViewOptions::new());
    h.store
        .seed(&id("x"), Fields::new().with("status", "closed").with("owner", "bob"));

    h.changed("x", Fields::new().with("owner", "ann"));
    let opt = h.change("x", Fields::new().with("status", "open"));
    h.tracker.reject(&opt.id, "denied");
    h.store.finish_load(&id("x"));

    assert!(view.is_empty());
    assert!(!h.store.is_resident(&id("x")));
}

#[test]
fn list_changes_only_suppresses_field_events() {
    let h = Harness::local();
    let view = h.activate(open_filter(), by_due().list_changes_only(true));
    h.created("a", task("open", 1));
    h.created("b", task("open", 2));
    let rec = Recorder::attach(&view);

    h.changed("a", Fields::new().with("title", "renamed"));
    assert!(rec.take().is_empty());

    h.changed("a", Fields::new().with("due", 3));
    assert_eq!(rec.take(), vec![ViewUpdate::Sorted(ids(&["b", "a"]))]);
}

#[test]
fn unsorted_view_only_reports_membership() {
    let h = Harness::local();
    let view = h.activate(open_filter(), ViewOptions::new());
    let rec = Recorder::attach(&view);
    h.created("a", task("open", 1));
    assert!(view.sorted().is_none());
    assert_eq!(rec.take(), vec![ViewUpdate::Members(ids(&["a"]))]);
}

#[test]
fn missing_sort_field_sorts_first() {
    let h = Harness::local();
    let view = h.activate(open_filter(), by_due());
    h.created("a", task("open", 1));
    h.created("b", Fields::new().with("status", "open"));
    assert_eq!(view.sorted_ids(), Some(ids(&["b", "a"])));
}
