//! Identity error types.

use thiserror::Error;

/// Errors raised while resolving identity or checking access.
///
/// A rejected credential is not an error: the provider's 401 becomes
/// a [`ProviderOutcome::Forbidden`] value, cached negatively and
/// surfaced to callers as an access denial.
///
/// [`ProviderOutcome::Forbidden`]: crate::provider::ProviderOutcome::Forbidden
#[derive(Debug, Error)]
pub enum IdentityError {
    /// The identity provider answered with an unexpected status.
    /// Anything other than success or 401 is fatal.
    #[error("identity provider returned status {status}")]
    ProviderStatus { status: u16 },

    /// The provider answered 2xx but the body is missing required
    /// fields or has the wrong types. Never silently coerced.
    #[error("malformed identity provider response: {message}")]
    MalformedResponse { message: String },

    /// Transport-level failure talking to the provider.
    #[error("identity provider request failed: {source}")]
    Http {
        #[from]
        source: reqwest::Error,
    },

    #[error(transparent)]
    Storage(#[from] rolegate_storage::StorageError),

    #[error(transparent)]
    Domain(#[from] rolegate_domain::DomainError),

    /// A spawned resolution task failed to complete.
    #[error("background task failed: {message}")]
    TaskFailed { message: String },
}

/// Result type for identity operations.
pub type IdentityResult<T> = Result<T, IdentityError>;
