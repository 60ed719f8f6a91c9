//! End-to-end behavior of a sorted `status = open` view.

use livefilter::collab::EntityHandle;
use livefilter::core::{FieldValue, Fields};
use livefilter::view::ViewUpdate;

use crate::fixtures::harness::{Harness, Recorder, by_due, id, ids, open_filter, task};

fn seeded() -> (Harness, livefilter::view::FilterView, Recorder) {
    let h = Harness::local();
    let view = h.activate(open_filter(), by_due());
    let rec = Recorder::attach(&view);
    h.created("a", task("open", 2));
    h.created("b", task("open", 1));
    h.created("c", task("open", 3));
    (h, view, rec)
}

#[test]
fn confirmed_creates_are_sorted_by_due_then_id() {
    let (_h, view, rec) = seeded();
    assert_eq!(view.sorted_ids(), Some(ids(&["b", "a", "c"])));
    assert_eq!(view.len(), 3);

    let updates = rec.take();
    assert_eq!(
        updates.last(),
        Some(&ViewUpdate::Sorted(ids(&["b", "a", "c"])))
    );
    assert_eq!(
        updates.iter().filter(|u| matches!(u, ViewUpdate::Members(_))).count(),
        3
    );
}

#[test]
fn confirmed_update_repositions_member() {
    let (h, view, rec) = seeded();
    rec.take();

    h.changed("a", Fields::new().with("due", 0));

    assert_eq!(view.sorted_ids(), Some(ids(&["a", "b", "c"])));
    assert_eq!(
        rec.take(),
        vec![
            ViewUpdate::Sorted(ids(&["a", "b", "c"])),
            ViewUpdate::EntityChanged {
                id: id("a"),
                diff: Fields::new().with("due", 0),
            },
        ]
    );
}

#[test]
fn key_change_without_order_change_is_silent() {
    let (h, view, rec) = seeded();
    rec.take();

    h.changed("c", Fields::new().with("due", 10));

    assert_eq!(view.sorted_ids(), Some(ids(&["b", "a", "c"])));
    assert_eq!(
        rec.take(),
        vec![ViewUpdate::EntityChanged {
            id: id("c"),
            diff: Fields::new().with("due", 10),
        }]
    );
}

#[test]
fn rejected_optimistic_close_restores_position() {
    let (h, view, rec) = seeded();
    h.changed("a", Fields::new().with("due", 0));
    rec.take();

    let meta = h.change("b", Fields::new().with("status", "closed"));

    assert!(!view.contains(&id("b")));
    assert_eq!(view.sorted_ids(), Some(ids(&["a", "c"])));
    assert_eq!(
        rec.take(),
        vec![
            ViewUpdate::EntityChanged {
                id: id("b"),
                diff: Fields::new().with("status", "closed"),
            },
            ViewUpdate::Members(ids(&["a", "c"])),
            ViewUpdate::Sorted(ids(&["a", "c"])),
        ]
    );

    assert!(h.tracker.reject(&meta.id, "denied"));

    assert_eq!(view.sorted_ids(), Some(ids(&["a", "b", "c"])));
    assert_eq!(
        rec.take(),
        vec![
            ViewUpdate::Members(ids(&["a", "b", "c"])),
            ViewUpdate::Sorted(ids(&["a", "b", "c"])),
        ]
    );
    let b = view.members().remove(&id("b")).expect("b restored");
    assert_eq!(b.fields(), task("open", 1));
    // Only the view's own listener is left; the keep-alive was released.
    assert_eq!(h.store.entity(&id("b")).unwrap().listener_count(), 1);
}

#[test]
fn confirmed_optimistic_close_releases_entity() {
    let (h, view, _rec) = seeded();
    let meta = h.change("b", Fields::new().with("status", "closed"));
    let b = h.store.entity(&id("b")).unwrap();
    assert_eq!(b.listener_count(), 1);

    assert!(h.tracker.confirm(&meta.id));

    assert!(!view.contains(&id("b")));
    assert_eq!(b.listener_count(), 0);
    assert_eq!(b.fields().get("status"), Some(&FieldValue::from("closed")));
}
