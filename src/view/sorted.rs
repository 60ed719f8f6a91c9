//! Sorted member index.
//!
//! Two parallel vectors ordered by (sort key, entity id): the composite keys
//! and the member handles. They are only ever spliced together. Positions are
//! found by binary search; inserts and removals shift the tail, so updates
//! cost O(n) in the worst case. That is fine for view-sized sets but is the
//! scaling limit of this structure.

use std::collections::HashMap;

use crate::core::{EntityId, FieldValue};

/// What a key change did to an entry's position.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reposition {
    /// The id is not indexed.
    Missing,
    /// The derived key did not change.
    KeyUnchanged,
    /// The key changed; `from == to` means the order is the same.
    Moved { from: usize, to: usize },
}

impl Reposition {
    /// True only when the entry ended up at a different index.
    pub fn changed_order(&self) -> bool {
        matches!(self, Reposition::Moved { from, to } if from != to)
    }
}

#[derive(Clone, Debug)]
pub struct SortedIndex<H> {
    keys: Vec<(FieldValue, EntityId)>,
    handles: Vec<H>,
    values: HashMap<EntityId, FieldValue>,
}

impl<H> Default for SortedIndex<H> {
    fn default() -> Self {
        Self {
            keys: Vec::new(),
            handles: Vec::new(),
            values: HashMap::new(),
        }
    }
}

impl<H: Clone> SortedIndex<H> {
    pub fn new() -> Self {
        Self::default()
    }

    /// `Ok(pos)` if (key, id) is present, otherwise `Err(insertion point)`.
    fn search(&self, key: &FieldValue, id: &EntityId) -> Result<usize, usize> {
        self.keys
            .binary_search_by(|(k, i)| k.cmp(key).then_with(|| i.cmp(id)))
    }

    /// Insert a new entry; returns its position, or `None` if already indexed.
    pub fn insert(&mut self, id: EntityId, key: FieldValue, handle: H) -> Option<usize> {
        if self.values.contains_key(&id) {
            return None;
        }
        let pos = match self.search(&key, &id) {
            Ok(pos) | Err(pos) => pos,
        };
        self.values.insert(id.clone(), key.clone());
        self.keys.insert(pos, (key, id));
        self.handles.insert(pos, handle);
        Some(pos)
    }

    /// Remove an entry by id; returns the position it occupied.
    pub fn remove(&mut self, id: &EntityId) -> Option<usize> {
        let key = self.values.remove(id)?;
        let pos = match self.search(&key, id) {
            Ok(pos) => pos,
            Err(_) => {
                debug_assert!(false, "sort index lost track of {id}");
                return None;
            }
        };
        self.keys.remove(pos);
        self.handles.remove(pos);
        Some(pos)
    }

    /// Move an entry after its key changed to `key`.
    pub fn reposition(&mut self, id: &EntityId, key: FieldValue, handle: H) -> Reposition {
        match self.values.get(id) {
            None => return Reposition::Missing,
            Some(prev) if *prev == key => return Reposition::KeyUnchanged,
            Some(_) => {}
        }
        let Some(from) = self.remove(id) else {
            return Reposition::Missing;
        };
        let to = self.insert(id.clone(), key, handle).unwrap_or(from);
        Reposition::Moved { from, to }
    }

    pub fn sort_key(&self, id: &EntityId) -> Option<&FieldValue> {
        self.values.get(id)
    }

    pub fn position(&self, id: &EntityId) -> Option<usize> {
        let key = self.values.get(id)?;
        self.search(key, id).ok()
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.values.contains_key(id)
    }

    pub fn handles(&self) -> &[H] {
        &self.handles
    }

    pub fn ids(&self) -> impl Iterator<Item = &EntityId> {
        self.keys.iter().map(|(_, id)| id)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn clear(&mut self) {
        self.keys.clear();
        self.handles.clear();
        self.values.clear();
    }
}
