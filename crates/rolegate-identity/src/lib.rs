//! rolegate-identity: Identity resolution and access checking
//!
//! This crate wires the permission engine together end to end:
//!
//! 1. [`IdentityResolver`] turns a bearer token into a participant,
//!    racing the local-token lookup against the external identity
//!    provider (with negative caching of rejected tokens) and
//!    activating pending invites for newly seen emails.
//! 2. [`AccessChecker`] loads the participant's grants, computes the
//!    permissions of each grant concurrently (parent chains resolved
//!    through batch loaders), merges them, and evaluates a declared
//!    permission condition against the result.

pub mod access;
pub mod config;
pub mod error;
pub mod provider;
pub mod resolver;
pub mod token;

pub use access::AccessChecker;
pub use config::AuthConfig;
pub use error::{IdentityError, IdentityResult};
pub use provider::{AccountInfo, AccountProvider, HttpAccountProvider, ProviderOutcome};
pub use resolver::IdentityResolver;
