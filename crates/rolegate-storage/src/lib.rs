//! rolegate-storage: Storage abstraction for authorization data
//!
//! Defines the [`GrantStore`] and [`IdentityStore`] traits plus an
//! in-memory implementation used for embedding and tests. Target types
//! are plain strings at this layer; typed conversion happens in
//! `rolegate-domain`.

pub mod error;
pub mod memory;
pub mod traits;

pub use error::{StorageError, StorageResult};
pub use memory::MemoryAuthStore;
pub use traits::{
    AccessTokenRecord, GrantInput, GrantLogRecord, GrantRecord, GrantStore, GranteeRecord,
    IdentityStore, InviteRecord, ParticipantRecord, RawRoleGrant, TargetRecord,
};
