//! Storage trait definitions for grants, the audit log, and identity
//! data.
//!
//! Every grant mutation writes a [`GrantLogRecord`] first and applies
//! the change in the same transaction; the log is append-only and is
//! the durable source of truth for who changed what, when.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StorageResult;

/// A stored grantee row. Grantees are created lazily, once per
/// participant, and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GranteeRecord {
    pub id: i64,
    pub participant_id: i64,
}

/// A stored target row. The global target has `target_id: None`;
/// every other row references a domain entity by numeric id. Created
/// once per (type, id) pair and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetRecord {
    pub id: i64,
    pub target_type: String,
    pub target_id: Option<i64>,
}

/// The live grant for one (grantee, target) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantRecord {
    pub grantee_id: i64,
    pub target_id: i64,
    pub roles: Vec<String>,
}

/// Append-only audit row written before every grant mutation.
/// Never updated or deleted by this subsystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantLogRecord {
    pub target_id: i64,
    pub grantee_id: i64,
    pub new_roles: Vec<String>,
    pub actor: i64,
    pub date: DateTime<Utc>,
}

/// One row of the three-way grantee -> grant -> target join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRoleGrant {
    pub participant_id: i64,
    pub target_type: String,
    pub target_id: Option<i64>,
    pub roles: Vec<String>,
}

/// Input to the audited grant write path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantInput {
    pub participant_id: i64,
    pub target_type: String,
    pub target_id: Option<i64>,
    pub roles: Vec<String>,
}

/// A stored participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantRecord {
    pub id: i64,
    /// Stable subject id assigned by the external identity provider;
    /// `None` for participants that only ever used local tokens.
    pub provider_subject: Option<String>,
    pub name: String,
    pub email: Option<String>,
}

/// A local access token, stored and matched only as a SHA-256 hex
/// digest of the opaque bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessTokenRecord {
    pub token_hash: String,
    pub participant_id: i64,
    pub expires_at: DateTime<Utc>,
}

/// A pending invitation addressed to an email. Activation turns it
/// into a grant and deletes the invite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InviteRecord {
    pub id: i64,
    pub email: String,
    pub target_type: String,
    pub target_id: Option<i64>,
    pub roles: Vec<String>,
    /// Participant who issued the invite; recorded as the actor of the
    /// grant created on activation.
    pub actor: i64,
}

/// Grant persistence with an audited write path.
///
/// Implementations must be thread-safe (Send + Sync) and must apply
/// the audit log append and the grant mutation atomically.
#[async_trait]
pub trait GrantStore: Send + Sync + 'static {
    /// Returns the grantee row for a participant, creating it on
    /// first use.
    async fn find_or_create_grantee(&self, participant_id: i64) -> StorageResult<GranteeRecord>;

    /// Returns the target row for a (type, id) pair, creating it on
    /// first use.
    async fn find_or_create_target(
        &self,
        target_type: &str,
        target_id: Option<i64>,
    ) -> StorageResult<TargetRecord>;

    /// Current live grant for a (participant, target) pair, if any.
    async fn find_grant(
        &self,
        participant_id: i64,
        target_type: &str,
        target_id: Option<i64>,
    ) -> StorageResult<Option<GrantRecord>>;

    /// Creates a grant. Fails if a live grant already exists for the
    /// pair, or if the role list is empty.
    async fn create_grant(
        &self,
        input: &GrantInput,
        actor: i64,
        date: DateTime<Utc>,
    ) -> StorageResult<()>;

    /// Replaces the role set of an existing grant. An empty role list
    /// deletes the grant; the audit entry recording the empty role
    /// set remains.
    async fn update_grant(
        &self,
        input: &GrantInput,
        actor: i64,
        date: DateTime<Utc>,
    ) -> StorageResult<()>;

    /// Reads current state and dispatches to create or update.
    ///
    /// # Consistency
    ///
    /// The read-then-write is not safe against two concurrent writers
    /// to the same (grantee, target) pair unless the implementation
    /// serializes writes internally; callers needing that guarantee
    /// against other backends must serialize at a higher level.
    async fn create_or_update_grant(
        &self,
        input: &GrantInput,
        actor: i64,
        date: DateTime<Utc>,
    ) -> StorageResult<()>;

    /// Batch retrieval of grants for a set of participants: a
    /// three-way join grantee -> grant -> target, reconstructed into a
    /// mapping from participant id to role grants. Participants with
    /// no grants are absent from the result.
    async fn grants_for_participants(
        &self,
        participant_ids: &[i64],
    ) -> StorageResult<HashMap<i64, Vec<RawRoleGrant>>>;

    /// Full audit log, oldest first.
    async fn grant_log(&self) -> StorageResult<Vec<GrantLogRecord>>;

    /// Audit log entries for one target, oldest first.
    async fn grant_log_for_target(
        &self,
        target_type: &str,
        target_id: Option<i64>,
    ) -> StorageResult<Vec<GrantLogRecord>>;
}

/// Participant, access-token, and invite persistence used by the
/// identity resolver.
#[async_trait]
pub trait IdentityStore: Send + Sync + 'static {
    async fn participant_by_id(&self, id: i64) -> StorageResult<Option<ParticipantRecord>>;

    /// Looks a participant up by the identity provider's stable
    /// subject id.
    async fn participant_by_subject(&self, subject: &str)
        -> StorageResult<Option<ParticipantRecord>>;

    async fn create_participant(
        &self,
        subject: &str,
        name: &str,
        email: &str,
    ) -> StorageResult<ParticipantRecord>;

    async fn update_participant_email(&self, id: i64, email: &str) -> StorageResult<()>;

    /// Non-expired access token matching the given SHA-256 hex digest.
    async fn access_token_by_hash(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> StorageResult<Option<AccessTokenRecord>>;

    async fn store_access_token(
        &self,
        token_hash: &str,
        participant_id: i64,
        expires_at: DateTime<Utc>,
    ) -> StorageResult<()>;

    /// Pending invites addressed to an email.
    async fn invites_for_email(&self, email: &str) -> StorageResult<Vec<InviteRecord>>;

    async fn create_invite(
        &self,
        email: &str,
        target_type: &str,
        target_id: Option<i64>,
        roles: &[String],
        actor: i64,
    ) -> StorageResult<i64>;

    async fn delete_invite(&self, invite_id: i64) -> StorageResult<()>;
}
