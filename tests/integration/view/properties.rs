//! Randomized confirmed traffic against a plain model of the collection.

use std::collections::BTreeMap;

use livefilter::core::{EntityId, FieldValue, Fields};
use proptest::prelude::*;

use crate::fixtures::harness::{Harness, by_due, id, open_filter, task};

#[derive(Clone, Debug)]
struct Step {
    selector: u8,
    entity: u8,
    open: bool,
    due: i64,
}

fn step() -> impl Strategy<Value = Step> {
    (any::<u8>(), 0u8..5, any::<bool>(), 0i64..3).prop_map(|(selector, entity, open, due)| Step {
        selector,
        entity,
        open,
        due,
    })
}

fn status(open: bool) -> &'static str {
    if open { "open" } else { "closed" }
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 96, .. ProptestConfig::default() })]

    #[test]
    fn membership_tracks_confirmed_state(steps in prop::collection::vec(step(), 1..40)) {
        let h = Harness::local();
        let view = h.activate(open_filter(), by_due());
        let mut model: BTreeMap<EntityId, Fields> = BTreeMap::new();

        for step in &steps {
            let raw = format!("e{}", step.entity);
            let key = id(&raw);
            let fields = task(status(step.open), step.due);
            if !model.contains_key(&key) {
                h.created(&raw, fields.clone());
                model.insert(key, fields);
            } else if step.selector % 3 == 0 {
                h.deleted(&raw);
                model.remove(&key);
            } else {
                h.changed(&raw, fields.clone());
                model.insert(key, fields);
            }
        }

        let open = FieldValue::from("open");
        let mut expected: Vec<(FieldValue, EntityId)> = model
            .iter()
            .filter(|(_, fields)| fields.get("status") == Some(&open))
            .map(|(id, fields)| (fields.get("due").cloned().unwrap_or(FieldValue::Null), id.clone()))
            .collect();
        expected.sort();

        let members: Vec<EntityId> = view.members().into_keys().collect();
        let mut expected_members: Vec<EntityId> = expected.iter().map(|(_, id)| id.clone()).collect();
        expected_members.sort();
        prop_assert_eq!(members, expected_members);

        let sorted = view.sorted_ids().unwrap_or_default();
        let expected_sorted: Vec<EntityId> = expected.into_iter().map(|(_, id)| id).collect();
        prop_assert_eq!(sorted, expected_sorted);
    }
}
