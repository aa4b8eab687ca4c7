//! Storage error types.

use thiserror::Error;

/// Storage-specific errors.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Participant not found.
    #[error("participant not found: {participant_id}")]
    ParticipantNotFound { participant_id: i64 },

    /// No live grant for the (grantee, target) pair.
    #[error("grant not found for grantee {grantee_id} on target {target_id}")]
    GrantNotFound { grantee_id: i64, target_id: i64 },

    /// A live grant already exists for the (grantee, target) pair.
    #[error("grant already exists for grantee {grantee_id} on target {target_id}")]
    GrantAlreadyExists { grantee_id: i64, target_id: i64 },

    /// Invite not found.
    #[error("invite not found: {invite_id}")]
    InviteNotFound { invite_id: i64 },

    /// Invalid input error.
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
