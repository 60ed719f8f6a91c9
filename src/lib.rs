#![forbid(unsafe_code)]

pub mod collab;
pub mod config;
pub mod core;
pub mod error;
pub mod memory;
pub mod telemetry;
pub mod view;

pub use error::{Effect, Error, Transience};
pub type Result<T> = std::result::Result<T, Error>;

// Re-export the types most embedders need at the crate root
pub use crate::collab::{
    CollectionDescriptor, ConfirmationTracker, EntityHandle, EntityRef, EventLog, Outcome,
    RecordStore, RemoteSync, Topic, Unsubscribe, ViewContext,
};
pub use crate::core::{
    Action, CausalStamp, CollectionType, Deferred, EntityId, EventKind, EventMeta, FieldValue,
    Fields, Filter, Limits, OperationId, ReplicaId, ViewId,
};
pub use crate::view::{
    FilterView, SortBy, ViewError, ViewEvent, ViewHandle, ViewOptions, ViewRegistry, ViewUpdate,
};
