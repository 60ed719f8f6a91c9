//! Core domain types for live filtered views (Layers 0-4)
//!
//! Module hierarchy follows type dependency order:
//! - time: CausalStamp (Layer 0)
//! - identity: ReplicaId, EntityId, OperationId, CollectionType, ViewId (Layer 1)
//! - value: FieldValue, Fields (Layer 2)
//! - filter: Filter, the membership evaluator (Layer 3)
//! - event: Action, EventMeta, EventKind (Layer 4)
//!
//! `deferred` is the settle-once primitive every suspension point uses.

pub mod deferred;
pub mod error;
pub mod event;
pub mod filter;
pub mod identity;
pub mod limits;
pub mod time;
pub mod value;

pub use deferred::Deferred;
pub use error::{CoreError, InvalidId, UnknownActionType};
pub use event::{Action, ActionType, EventKind, EventMeta, OpKind, Provenance};
pub use filter::Filter;
pub use identity::{
    CollectionType, EntityId, OperationId, ReplicaId, UNSET_COLLECTION_TYPE, ViewId,
};
pub use limits::Limits;
pub use time::CausalStamp;
pub use value::{FieldValue, Fields};
