//! In-memory storage implementation for embedding and tests.
//!
//! Uses DashMap for thread-safe concurrent access. The audited grant
//! write path is serialized by a single write mutex held across the
//! log append and the grant mutation, which makes each mutation (and
//! `create_or_update_grant`'s read-then-write) atomic in this
//! implementation. Read paths are linear scans; this store is not
//! intended for large datasets.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::error::{StorageError, StorageResult};
use crate::traits::{
    AccessTokenRecord, GrantInput, GrantLogRecord, GrantRecord, GrantStore, GranteeRecord,
    IdentityStore, InviteRecord, ParticipantRecord, RawRoleGrant, TargetRecord,
};

/// In-memory implementation of [`GrantStore`] and [`IdentityStore`].
#[derive(Debug, Default)]
pub struct MemoryAuthStore {
    /// Grantee rows keyed by participant id.
    grantees: DashMap<i64, GranteeRecord>,
    /// Target rows keyed by (type, id) pair.
    targets: DashMap<(String, Option<i64>), TargetRecord>,
    /// Live grants keyed by (grantee row id, target row id).
    grants: DashMap<(i64, i64), GrantRecord>,
    /// Append-only audit log, oldest first.
    grant_log: RwLock<Vec<GrantLogRecord>>,
    participants: DashMap<i64, ParticipantRecord>,
    /// Access tokens keyed by token hash.
    tokens: DashMap<String, AccessTokenRecord>,
    invites: DashMap<i64, InviteRecord>,
    /// Shared id sequence for all row kinds.
    next_id: AtomicI64,
    /// Serializes the audited grant write path.
    write_lock: Mutex<()>,
}

impl MemoryAuthStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new in-memory store wrapped in Arc.
    pub fn new_shared() -> std::sync::Arc<Self> {
        std::sync::Arc::new(Self::new())
    }

    fn allocate_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn grantee_inner(&self, participant_id: i64) -> GranteeRecord {
        self.grantees
            .entry(participant_id)
            .or_insert_with(|| GranteeRecord {
                id: self.allocate_id(),
                participant_id,
            })
            .value()
            .clone()
    }

    fn target_inner(&self, target_type: &str, target_id: Option<i64>) -> TargetRecord {
        self.targets
            .entry((target_type.to_string(), target_id))
            .or_insert_with(|| TargetRecord {
                id: self.allocate_id(),
                target_type: target_type.to_string(),
                target_id,
            })
            .value()
            .clone()
    }

    fn find_grant_inner(
        &self,
        participant_id: i64,
        target_type: &str,
        target_id: Option<i64>,
    ) -> Option<GrantRecord> {
        let grantee = self.grantees.get(&participant_id)?;
        let target = self
            .targets
            .get(&(target_type.to_string(), target_id))?;
        self.grants
            .get(&(grantee.id, target.id))
            .map(|grant| grant.value().clone())
    }

    /// Audited create. Caller must hold the write lock.
    async fn create_grant_locked(
        &self,
        input: &GrantInput,
        actor: i64,
        date: DateTime<Utc>,
    ) -> StorageResult<()> {
        if input.roles.is_empty() {
            return Err(StorageError::InvalidInput {
                message: "cannot create a grant with an empty role list".to_string(),
            });
        }
        let grantee = self.grantee_inner(input.participant_id);
        let target = self.target_inner(&input.target_type, input.target_id);
        if self.grants.contains_key(&(grantee.id, target.id)) {
            return Err(StorageError::GrantAlreadyExists {
                grantee_id: grantee.id,
                target_id: target.id,
            });
        }

        // Audit entry first, then the mutation.
        self.grant_log.write().await.push(GrantLogRecord {
            target_id: target.id,
            grantee_id: grantee.id,
            new_roles: input.roles.clone(),
            actor,
            date,
        });
        self.grants.insert(
            (grantee.id, target.id),
            GrantRecord {
                grantee_id: grantee.id,
                target_id: target.id,
                roles: input.roles.clone(),
            },
        );
        debug!(
            grantee_id = grantee.id,
            target_id = target.id,
            roles = ?input.roles,
            actor,
            "grant created"
        );
        Ok(())
    }

    /// Audited update/delete. Caller must hold the write lock.
    async fn update_grant_locked(
        &self,
        input: &GrantInput,
        actor: i64,
        date: DateTime<Utc>,
    ) -> StorageResult<()> {
        let grantee = self.grantee_inner(input.participant_id);
        let target = self.target_inner(&input.target_type, input.target_id);
        let key = (grantee.id, target.id);

        if !input.roles.is_empty() && !self.grants.contains_key(&key) {
            return Err(StorageError::GrantNotFound {
                grantee_id: grantee.id,
                target_id: target.id,
            });
        }

        self.grant_log.write().await.push(GrantLogRecord {
            target_id: target.id,
            grantee_id: grantee.id,
            new_roles: input.roles.clone(),
            actor,
            date,
        });

        if input.roles.is_empty() {
            // An empty role set deletes the grant; the log entry stays.
            self.grants.remove(&key);
            debug!(grantee_id = grantee.id, target_id = target.id, actor, "grant deleted");
        } else {
            self.grants.insert(
                key,
                GrantRecord {
                    grantee_id: grantee.id,
                    target_id: target.id,
                    roles: input.roles.clone(),
                },
            );
            debug!(
                grantee_id = grantee.id,
                target_id = target.id,
                roles = ?input.roles,
                actor,
                "grant roles replaced"
            );
        }
        Ok(())
    }
}

#[async_trait]
impl GrantStore for MemoryAuthStore {
    async fn find_or_create_grantee(&self, participant_id: i64) -> StorageResult<GranteeRecord> {
        Ok(self.grantee_inner(participant_id))
    }

    async fn find_or_create_target(
        &self,
        target_type: &str,
        target_id: Option<i64>,
    ) -> StorageResult<TargetRecord> {
        Ok(self.target_inner(target_type, target_id))
    }

    async fn find_grant(
        &self,
        participant_id: i64,
        target_type: &str,
        target_id: Option<i64>,
    ) -> StorageResult<Option<GrantRecord>> {
        Ok(self.find_grant_inner(participant_id, target_type, target_id))
    }

    async fn create_grant(
        &self,
        input: &GrantInput,
        actor: i64,
        date: DateTime<Utc>,
    ) -> StorageResult<()> {
        let _tx = self.write_lock.lock().await;
        self.create_grant_locked(input, actor, date).await
    }

    async fn update_grant(
        &self,
        input: &GrantInput,
        actor: i64,
        date: DateTime<Utc>,
    ) -> StorageResult<()> {
        let _tx = self.write_lock.lock().await;
        self.update_grant_locked(input, actor, date).await
    }

    async fn create_or_update_grant(
        &self,
        input: &GrantInput,
        actor: i64,
        date: DateTime<Utc>,
    ) -> StorageResult<()> {
        // The write lock spans the read and the dispatched write, so
        // the read-then-write race documented on the trait does not
        // apply to this implementation.
        let _tx = self.write_lock.lock().await;
        let existing = self.find_grant_inner(
            input.participant_id,
            &input.target_type,
            input.target_id,
        );
        match existing {
            Some(_) => self.update_grant_locked(input, actor, date).await,
            None => self.create_grant_locked(input, actor, date).await,
        }
    }

    async fn grants_for_participants(
        &self,
        participant_ids: &[i64],
    ) -> StorageResult<HashMap<i64, Vec<RawRoleGrant>>> {
        // Target rows indexed by row id for the final leg of the join.
        let targets_by_id: HashMap<i64, TargetRecord> = self
            .targets
            .iter()
            .map(|entry| (entry.value().id, entry.value().clone()))
            .collect();

        let mut result: HashMap<i64, Vec<RawRoleGrant>> = HashMap::new();
        for &participant_id in participant_ids {
            let Some(grantee) = self.grantees.get(&participant_id).map(|g| g.value().clone())
            else {
                continue;
            };
            for entry in self.grants.iter() {
                if entry.grantee_id != grantee.id {
                    continue;
                }
                let Some(target) = targets_by_id.get(&entry.target_id) else {
                    continue;
                };
                result
                    .entry(participant_id)
                    .or_default()
                    .push(RawRoleGrant {
                        participant_id,
                        target_type: target.target_type.clone(),
                        target_id: target.target_id,
                        roles: entry.roles.clone(),
                    });
            }
        }
        Ok(result)
    }

    async fn grant_log(&self) -> StorageResult<Vec<GrantLogRecord>> {
        Ok(self.grant_log.read().await.clone())
    }

    async fn grant_log_for_target(
        &self,
        target_type: &str,
        target_id: Option<i64>,
    ) -> StorageResult<Vec<GrantLogRecord>> {
        let Some(target) = self
            .targets
            .get(&(target_type.to_string(), target_id))
            .map(|t| t.value().clone())
        else {
            return Ok(Vec::new());
        };
        Ok(self
            .grant_log
            .read()
            .await
            .iter()
            .filter(|entry| entry.target_id == target.id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl IdentityStore for MemoryAuthStore {
    async fn participant_by_id(&self, id: i64) -> StorageResult<Option<ParticipantRecord>> {
        Ok(self.participants.get(&id).map(|p| p.value().clone()))
    }

    async fn participant_by_subject(
        &self,
        subject: &str,
    ) -> StorageResult<Option<ParticipantRecord>> {
        Ok(self
            .participants
            .iter()
            .find(|entry| entry.provider_subject.as_deref() == Some(subject))
            .map(|entry| entry.value().clone()))
    }

    async fn create_participant(
        &self,
        subject: &str,
        name: &str,
        email: &str,
    ) -> StorageResult<ParticipantRecord> {
        let participant = ParticipantRecord {
            id: self.allocate_id(),
            provider_subject: Some(subject.to_string()),
            name: name.to_string(),
            email: Some(email.to_string()),
        };
        self.participants.insert(participant.id, participant.clone());
        Ok(participant)
    }

    async fn update_participant_email(&self, id: i64, email: &str) -> StorageResult<()> {
        let mut participant =
            self.participants
                .get_mut(&id)
                .ok_or(StorageError::ParticipantNotFound {
                    participant_id: id,
                })?;
        participant.email = Some(email.to_string());
        Ok(())
    }

    async fn access_token_by_hash(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> StorageResult<Option<AccessTokenRecord>> {
        Ok(self
            .tokens
            .get(token_hash)
            .filter(|token| token.expires_at > now)
            .map(|token| token.value().clone()))
    }

    async fn store_access_token(
        &self,
        token_hash: &str,
        participant_id: i64,
        expires_at: DateTime<Utc>,
    ) -> StorageResult<()> {
        self.tokens.insert(
            token_hash.to_string(),
            AccessTokenRecord {
                token_hash: token_hash.to_string(),
                participant_id,
                expires_at,
            },
        );
        Ok(())
    }

    async fn invites_for_email(&self, email: &str) -> StorageResult<Vec<InviteRecord>> {
        let mut invites: Vec<InviteRecord> = self
            .invites
            .iter()
            .filter(|entry| entry.email == email)
            .map(|entry| entry.value().clone())
            .collect();
        invites.sort_by_key(|invite| invite.id);
        Ok(invites)
    }

    async fn create_invite(
        &self,
        email: &str,
        target_type: &str,
        target_id: Option<i64>,
        roles: &[String],
        actor: i64,
    ) -> StorageResult<i64> {
        let id = self.allocate_id();
        self.invites.insert(
            id,
            InviteRecord {
                id,
                email: email.to_string(),
                target_type: target_type.to_string(),
                target_id,
                roles: roles.to_vec(),
                actor,
            },
        );
        Ok(id)
    }

    async fn delete_invite(&self, invite_id: i64) -> StorageResult<()> {
        self.invites
            .remove(&invite_id)
            .map(|_| ())
            .ok_or(StorageError::InviteNotFound { invite_id })
    }
}
