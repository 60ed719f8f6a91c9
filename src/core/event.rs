//! Layer 4: Log actions
//!
//! Action: what an operation does to one entity
//! EventMeta: where the operation sits in the log (id, causal stamp,
//! retention reasons)
//! EventKind: the six type tags a collection's actions are published under

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::{CoreError, UnknownActionType};
use super::identity::{CollectionType, EntityId, OperationId, ViewId};
use super::time::CausalStamp;
use super::value::Fields;

/// Mutation intent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpKind {
    Create,
    Update,
    Delete,
}

/// Whether an operation is already durable or still awaits the authority.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Durable: replayed from the log or received from the remote.
    Confirmed,
    /// Locally originated; may still be rejected and rolled back.
    Optimistic,
}

/// One of the six per-collection log types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventKind {
    pub op: OpKind,
    pub provenance: Provenance,
}

impl EventKind {
    pub const ALL: [EventKind; 6] = [
        EventKind::new(OpKind::Create, Provenance::Confirmed),
        EventKind::new(OpKind::Create, Provenance::Optimistic),
        EventKind::new(OpKind::Update, Provenance::Confirmed),
        EventKind::new(OpKind::Update, Provenance::Optimistic),
        EventKind::new(OpKind::Delete, Provenance::Confirmed),
        EventKind::new(OpKind::Delete, Provenance::Optimistic),
    ];

    pub const fn new(op: OpKind, provenance: Provenance) -> Self {
        Self { op, provenance }
    }

    pub fn is_optimistic(&self) -> bool {
        matches!(self.provenance, Provenance::Optimistic)
    }

    fn suffix(&self) -> &'static str {
        match (self.op, self.provenance) {
            (OpKind::Create, Provenance::Confirmed) => "created",
            (OpKind::Create, Provenance::Optimistic) => "create",
            (OpKind::Update, Provenance::Confirmed) => "changed",
            (OpKind::Update, Provenance::Optimistic) => "change",
            (OpKind::Delete, Provenance::Confirmed) => "deleted",
            (OpKind::Delete, Provenance::Optimistic) => "delete",
        }
    }

    /// Log type string, e.g. `tasks/changed`.
    pub fn action_type(&self, collection: &CollectionType) -> ActionType {
        ActionType(format!("{collection}/{}", self.suffix()))
    }

    pub fn parse(collection: &CollectionType, raw: &str) -> Result<Self, CoreError> {
        let unknown = || UnknownActionType {
            collection: collection.to_string(),
            raw: raw.to_string(),
        };
        let suffix = raw
            .strip_prefix(collection.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
            .ok_or_else(unknown)?;
        EventKind::ALL
            .into_iter()
            .find(|kind| kind.suffix() == suffix)
            .ok_or_else(|| unknown().into())
    }
}

/// Fully qualified log type string.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionType(String);

impl ActionType {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ActionType({:?})", self.0)
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Operation payload.
///
/// `fields` holds the full initial snapshot for creates and only the touched
/// fields for updates; deletes carry none.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    #[serde(rename = "type")]
    pub action_type: ActionType,
    pub id: EntityId,
    #[serde(default, skip_serializing_if = "Fields::is_empty")]
    pub fields: Fields,
}

impl Action {
    pub fn new(
        collection: &CollectionType,
        kind: EventKind,
        id: EntityId,
        fields: Fields,
    ) -> Self {
        Self {
            action_type: kind.action_type(collection),
            id,
            fields,
        }
    }
}

/// Log metadata attached to every action.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMeta {
    pub id: OperationId,
    pub stamp: CausalStamp,
    /// Retention reasons; an entry without reasons may be collected.
    #[serde(default)]
    pub reasons: BTreeSet<String>,
}

impl EventMeta {
    pub fn new(id: OperationId, stamp: CausalStamp) -> Self {
        Self {
            id,
            stamp,
            reasons: BTreeSet::new(),
        }
    }

    pub fn add_reason(&mut self, view: &ViewId) {
        self.reasons.insert(view.as_str().to_string());
    }

    pub fn has_reason(&self, view: &ViewId) -> bool {
        self.reasons.contains(view.as_str())
    }
}
