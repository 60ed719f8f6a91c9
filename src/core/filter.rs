//! Layer 3: Field-equality filters
//!
//! The membership evaluator: a conjunctive equality filter checked against
//! either a full entity snapshot (full-match) or the touched fields of a
//! partial update (partial-match).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::value::{FieldValue, Fields};

/// Immutable field-name → required-value mapping.
///
/// An empty filter matches every entity.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Filter(BTreeMap<String, FieldValue>);

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.0.iter()
    }

    /// Every constraint is satisfied by `snapshot`. Absent fields never match.
    pub fn matches_all(&self, snapshot: &Fields) -> bool {
        self.0
            .iter()
            .all(|(name, required)| snapshot.get(name) == Some(required))
    }

    /// Cheap pre-check for a partial update carrying only `touched` fields.
    ///
    /// True when the filter is empty, or when at least one touched field is a
    /// filter key with the required value and no touched filter key
    /// mismatches. Keys the update does not touch are not consulted.
    pub fn matches_some(&self, touched: &Fields) -> bool {
        let mut some = self.0.is_empty();
        for (name, required) in &self.0 {
            match touched.get(name) {
                Some(value) if value == required => some = true,
                Some(_) => return false,
                None => {}
            }
        }
        some
    }

    /// Stable textual form, used in view identities and remote topics.
    pub fn canonical_key(&self) -> String {
        // BTreeMap keeps keys sorted, so equal filters render identically.
        serde_json::to_string(&self.0).unwrap_or_else(|_| String::from("{}"))
    }
}

impl FromIterator<(String, FieldValue)> for Filter {
    fn from_iter<I: IntoIterator<Item = (String, FieldValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
