//! Domain error types for permission computation.

use thiserror::Error;

/// Domain-specific errors for permission computation.
#[derive(Debug, Error)]
pub enum DomainError {
    /// Target type string not in the closed catalogue. Unknown types
    /// encountered while deriving a grant from raw rows are fatal.
    #[error("unknown target type: {value}")]
    UnknownTargetType { value: String },

    /// Non-global target row without a numeric id.
    #[error("target type {target_type} requires an id")]
    MalformedTarget { target_type: String },

    /// A grant references a target whose parent entity does not exist.
    /// This is a data-integrity violation and is never retried.
    #[error("parent {entity} not found for id {id}")]
    ParentNotFound { entity: String, id: i64 },

    /// The batch fetch implementation returned a result vector whose
    /// length does not match the deduplicated key set.
    #[error("batch result size mismatch (expected {expected}, got {actual})")]
    BatchMismatch { expected: usize, actual: usize },

    /// The underlying batched fetch failed; every pending caller of
    /// that batch receives this error.
    #[error("batch fetch failed: {message}")]
    BatchFetchFailed { message: String },
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
