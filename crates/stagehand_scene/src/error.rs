//! Error types for the scene engine

use crate::item::ItemId;
use crate::primitive::PrimitiveId;
use thiserror::Error;

/// Errors surfaced by the stage pipelines and execution contexts.
///
/// Invariant violations (`ItemAlreadyAttached`, `ItemNotAttached`,
/// `PrimitiveAlreadyAttached`, `PrimitiveNotAttached`) indicate a caller bug:
/// they are fatal to the offending request and never silently reconciled.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SceneError {
    /// Integration was requested for an item that is already attached
    #[error("item {0} is already attached")]
    ItemAlreadyAttached(ItemId),

    /// Disintegration (or primitive ownership) was requested for an item
    /// that is not attached
    #[error("item {0} is not attached")]
    ItemNotAttached(ItemId),

    /// Integration was requested for a primitive that is already attached
    #[error("primitive {0} is already attached")]
    PrimitiveAlreadyAttached(PrimitiveId),

    /// Disintegration was requested for a primitive that is not attached
    #[error("primitive {0} is not attached")]
    PrimitiveNotAttached(PrimitiveId),

    /// The attachment adapter does not support this primitive kind
    #[error("unsupported primitive kind: {0}")]
    UnsupportedPrimitive(&'static str),

    /// The execution context's drain task has shut down
    #[error("{0} execution context is closed")]
    ContextClosed(&'static str),

    /// A backend call failed
    #[error("backend error: {0}")]
    Backend(String),
}

/// Result type for scene engine operations
pub type Result<T> = std::result::Result<T, SceneError>;
