//! Core capability errors (parsing, validation).
//!
//! These are bounded and stable: core errors represent refusal states,
//! not library implementation details.

use thiserror::Error;

use crate::error::{Effect, Transience};

/// Invalid identifier.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum InvalidId {
    #[error("entity id `{raw}` is invalid: {reason}")]
    Entity { raw: String, reason: String },
    #[error("operation id `{raw}` is invalid: {reason}")]
    Operation { raw: String, reason: String },
    #[error("replica id `{raw}` is invalid: {reason}")]
    Replica { raw: String, reason: String },
    #[error("collection type `{raw}` is invalid: {reason}")]
    Collection { raw: String, reason: String },
}

/// Action type string that does not belong to a collection's six log types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("action type `{raw}` is not a {collection} create/update/delete type")]
pub struct UnknownActionType {
    pub collection: String,
    pub raw: String,
}

/// Canonical error enum for core capability.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CoreError {
    #[error(transparent)]
    InvalidId(#[from] InvalidId),
    #[error(transparent)]
    UnknownActionType(#[from] UnknownActionType),
}

impl CoreError {
    pub fn transience(&self) -> Transience {
        // Core errors are pure input failures.
        Transience::Permanent
    }

    pub fn effect(&self) -> Effect {
        Effect::None
    }
}
