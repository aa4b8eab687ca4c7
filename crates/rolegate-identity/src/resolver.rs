//! Identity resolution.
//!
//! Given a bearer token, finds the authenticated participant. Two
//! paths run concurrently: the local-token lookup (hashed token
//! against stored access tokens) and the external identity provider.
//! The local path wins if it yields a participant; the loser is not
//! cancelled, but its result is still awaited by a detached task so a
//! failure never dangles unobserved.
//!
//! Provider outcomes are cached under the hashed token, including
//! `Forbidden` (negative caching), so a known-bad token does not
//! hammer the provider until the cache entry expires.

use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use rolegate_domain::cache::TtlCache;
use rolegate_storage::{GrantInput, GrantStore, IdentityStore, InviteRecord, ParticipantRecord};

use crate::error::{IdentityError, IdentityResult};
use crate::provider::{AccountInfo, AccountProvider, ProviderOutcome};
use crate::token::hash_token;

/// Hook invoked once per invite activated during resolution, after
/// the grant has been created and the invite deleted.
pub type InviteHook = Arc<dyn Fn(&InviteRecord) + Send + Sync>;

/// Resolves bearer tokens to participants.
pub struct IdentityResolver<S> {
    store: Arc<S>,
    provider: Arc<dyn AccountProvider>,
    cache: Arc<TtlCache<ProviderOutcome>>,
    invite_hook: Option<InviteHook>,
}

impl<S> Clone for IdentityResolver<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            provider: Arc::clone(&self.provider),
            cache: Arc::clone(&self.cache),
            invite_hook: self.invite_hook.clone(),
        }
    }
}

impl<S> IdentityResolver<S>
where
    S: GrantStore + IdentityStore,
{
    /// The cache is injected explicitly (not hidden process state) so
    /// tests can substitute a fresh instance per run.
    pub fn new(
        store: Arc<S>,
        provider: Arc<dyn AccountProvider>,
        cache: Arc<TtlCache<ProviderOutcome>>,
    ) -> Self {
        Self {
            store,
            provider,
            cache,
            invite_hook: None,
        }
    }

    pub fn with_invite_hook(mut self, hook: InviteHook) -> Self {
        self.invite_hook = Some(hook);
        self
    }

    /// Resolves the participant for a request. `Ok(None)` means
    /// unauthenticated: no token, no matching local token, or a token
    /// the provider rejected.
    pub async fn resolve(&self, token: Option<&str>) -> IdentityResult<Option<ParticipantRecord>> {
        let Some(token) = token else {
            return Ok(None);
        };

        // Start the provider path first; both paths then race.
        let external = {
            let resolver = self.clone();
            let token = token.to_string();
            tokio::spawn(async move { resolver.resolve_external(&token).await })
        };

        match self.resolve_local(token).await {
            Ok(Some(participant)) => {
                observe_loser(external);
                Ok(Some(participant))
            }
            Ok(None) => match external.await {
                Ok(result) => result,
                Err(err) => Err(IdentityError::TaskFailed {
                    message: err.to_string(),
                }),
            },
            // A local-path failure is returned to the caller, but the
            // provider task's outcome must not dangle either.
            Err(err) => {
                observe_loser(external);
                Err(err)
            }
        }
    }

    /// Local path: hash the token and look up a non-expired access
    /// token record.
    async fn resolve_local(&self, token: &str) -> IdentityResult<Option<ParticipantRecord>> {
        let hash = hash_token(token);
        let Some(record) = self.store.access_token_by_hash(&hash, Utc::now()).await? else {
            return Ok(None);
        };
        Ok(self.store.participant_by_id(record.participant_id).await?)
    }

    /// External path: cached provider lookup, then find-or-create the
    /// participant by provider subject.
    async fn resolve_external(&self, token: &str) -> IdentityResult<Option<ParticipantRecord>> {
        let outcome = match self.cache.get(token) {
            Some(outcome) => outcome,
            None => {
                let outcome = self.provider.account_info(token).await?;
                // Success and Forbidden are both cached; the negative
                // entry shields the provider from a known-bad token.
                self.cache.store(token, outcome.clone());
                outcome
            }
        };

        match outcome {
            ProviderOutcome::Forbidden { message } => {
                debug!(%message, "identity provider rejected token");
                Ok(None)
            }
            ProviderOutcome::Account(account) => {
                Ok(Some(self.participant_for_account(&account).await?))
            }
        }
    }

    /// Finds or creates the participant for a provider account. First
    /// sight of a subject, or an email change on an existing one,
    /// activates any pending invites addressed to the new email.
    async fn participant_for_account(
        &self,
        account: &AccountInfo,
    ) -> IdentityResult<ParticipantRecord> {
        match self.store.participant_by_subject(&account.sub).await? {
            Some(existing) => {
                if existing.email.as_deref() != Some(account.email.as_str()) {
                    self.store
                        .update_participant_email(existing.id, &account.email)
                        .await?;
                    self.activate_invites(existing.id, &account.email).await?;
                    Ok(ParticipantRecord {
                        email: Some(account.email.clone()),
                        ..existing
                    })
                } else {
                    Ok(existing)
                }
            }
            None => {
                let created = self
                    .store
                    .create_participant(&account.sub, &account.name, &account.email)
                    .await?;
                self.activate_invites(created.id, &account.email).await?;
                Ok(created)
            }
        }
    }

    /// Turns each pending invite for the email into a grant (audited,
    /// actor taken from the invite), deletes the invite, and runs the
    /// per-invite hook.
    async fn activate_invites(&self, participant_id: i64, email: &str) -> IdentityResult<()> {
        for invite in self.store.invites_for_email(email).await? {
            let input = GrantInput {
                participant_id,
                target_type: invite.target_type.clone(),
                target_id: invite.target_id,
                roles: invite.roles.clone(),
            };
            self.store
                .create_or_update_grant(&input, invite.actor, Utc::now())
                .await?;
            self.store.delete_invite(invite.id).await?;
            if let Some(hook) = &self.invite_hook {
                hook(&invite);
            }
        }
        Ok(())
    }
}

/// Awaits the losing provider task in the background so its outcome
/// never dangles; a failure is logged and swallowed.
fn observe_loser(handle: JoinHandle<IdentityResult<Option<ParticipantRecord>>>) {
    tokio::spawn(async move {
        match handle.await {
            Ok(Err(err)) => debug!(%err, "provider lookup lost the race and failed"),
            Err(err) => error!(%err, "provider lookup task panicked"),
            Ok(Ok(_)) => {}
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::DateTime;

    use rolegate_domain::cache::CacheConfig;
    use rolegate_storage::{
        AccessTokenRecord, GrantLogRecord, GrantRecord, GrantStore, GranteeRecord, IdentityStore,
        MemoryAuthStore, RawRoleGrant, StorageError, StorageResult, TargetRecord,
    };

    /// Scripted provider: one fixed outcome per token, counting calls.
    struct ScriptedProvider {
        outcomes: Mutex<std::collections::HashMap<String, ProviderOutcome>>,
        calls: AtomicUsize,
    }

    impl ScriptedProvider {
        fn new() -> Self {
            Self {
                outcomes: Mutex::new(std::collections::HashMap::new()),
                calls: AtomicUsize::new(0),
            }
        }

        fn with_account(self, token: &str, sub: &str, name: &str, email: &str) -> Self {
            self.outcomes.lock().unwrap().insert(
                token.to_string(),
                ProviderOutcome::Account(AccountInfo {
                    sub: sub.to_string(),
                    name: name.to_string(),
                    email: email.to_string(),
                }),
            );
            self
        }

        fn with_forbidden(self, token: &str) -> Self {
            self.outcomes.lock().unwrap().insert(
                token.to_string(),
                ProviderOutcome::Forbidden {
                    message: "Invalid Token".to_string(),
                },
            );
            self
        }
    }

    #[async_trait]
    impl AccountProvider for ScriptedProvider {
        async fn account_info(&self, token: &str) -> IdentityResult<ProviderOutcome> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcomes
                .lock()
                .unwrap()
                .get(token)
                .cloned()
                .ok_or(IdentityError::ProviderStatus { status: 500 })
        }
    }

    fn resolver_with(
        store: Arc<MemoryAuthStore>,
        provider: Arc<ScriptedProvider>,
    ) -> IdentityResolver<MemoryAuthStore> {
        let cache = Arc::new(TtlCache::new(
            CacheConfig::default().with_lifetime(Duration::from_secs(60)),
        ));
        IdentityResolver::new(store, provider, cache)
    }

    #[tokio::test]
    async fn test_no_token_is_unauthenticated() {
        let store = MemoryAuthStore::new_shared();
        let resolver = resolver_with(store, Arc::new(ScriptedProvider::new()));

        assert_eq!(resolver.resolve(None).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_local_token_resolves_its_participant() {
        // Arrange
        let store = MemoryAuthStore::new_shared();
        let local = store
            .create_participant("local-sub", "Local", "local@example.org")
            .await
            .unwrap();
        store
            .store_access_token(
                &hash_token("tok-local"),
                local.id,
                Utc::now() + chrono::Duration::hours(1),
            )
            .await
            .unwrap();
        let resolver = resolver_with(store, Arc::new(ScriptedProvider::new()));

        // Act
        let resolved = resolver.resolve(Some("tok-local")).await.unwrap();

        // Assert
        assert_eq!(resolved.unwrap().id, local.id);
    }

    #[tokio::test]
    async fn test_local_token_takes_precedence_over_the_provider() {
        // Arrange - the same token is valid locally AND at the
        // provider, resolving to two different participants.
        let store = MemoryAuthStore::new_shared();
        let local = store
            .create_participant("local-sub", "Local", "local@example.org")
            .await
            .unwrap();
        store
            .store_access_token(
                &hash_token("tok-both"),
                local.id,
                Utc::now() + chrono::Duration::hours(1),
            )
            .await
            .unwrap();
        let provider = Arc::new(ScriptedProvider::new().with_account(
            "tok-both",
            "external-sub",
            "External",
            "external@example.org",
        ));
        let resolver = resolver_with(store.clone(), provider);

        // Act
        let resolved = resolver.resolve(Some("tok-both")).await.unwrap().unwrap();

        // Assert - the local participant wins
        assert_eq!(resolved.id, local.id);
    }

    #[tokio::test]
    async fn test_external_token_creates_participant_on_first_sight() {
        let store = MemoryAuthStore::new_shared();
        let provider = Arc::new(ScriptedProvider::new().with_account(
            "tok-ext",
            "sub-1",
            "Kim",
            "kim@example.org",
        ));
        let resolver = resolver_with(store.clone(), provider);

        let resolved = resolver.resolve(Some("tok-ext")).await.unwrap().unwrap();

        assert_eq!(resolved.provider_subject.as_deref(), Some("sub-1"));
        assert_eq!(resolved.email.as_deref(), Some("kim@example.org"));
        // Resolving again reuses the stored participant.
        let again = resolver.resolve(Some("tok-ext")).await.unwrap().unwrap();
        assert_eq!(again.id, resolved.id);
    }

    #[tokio::test]
    async fn test_forbidden_outcome_is_cached_negatively() {
        // Arrange
        let store = MemoryAuthStore::new_shared();
        let provider = Arc::new(ScriptedProvider::new().with_forbidden("tok-bad"));
        let resolver = resolver_with(store, provider.clone());

        // Act - two resolutions with the same bad token
        assert_eq!(resolver.resolve(Some("tok-bad")).await.unwrap(), None);
        assert_eq!(resolver.resolve(Some("tok-bad")).await.unwrap(), None);

        // Assert - the provider was only consulted once
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_successful_outcome_is_cached_too() {
        let store = MemoryAuthStore::new_shared();
        let provider = Arc::new(ScriptedProvider::new().with_account(
            "tok-ext",
            "sub-1",
            "Kim",
            "kim@example.org",
        ));
        let resolver = resolver_with(store, provider.clone());

        resolver.resolve(Some("tok-ext")).await.unwrap();
        resolver.resolve(Some("tok-ext")).await.unwrap();

        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_provider_failure_surfaces_when_local_path_misses() {
        let store = MemoryAuthStore::new_shared();
        // No scripted outcome: the provider answers 500.
        let resolver = resolver_with(store, Arc::new(ScriptedProvider::new()));

        let err = resolver.resolve(Some("tok-unknown")).await.unwrap_err();

        assert!(matches!(err, IdentityError::ProviderStatus { status: 500 }));
    }

    #[tokio::test]
    async fn test_invites_are_activated_on_first_sight() {
        // Arrange - a pending invite for the email the provider will
        // report
        let store = MemoryAuthStore::new_shared();
        let roles = vec!["readonly".to_string()];
        store
            .create_invite("kim@example.org", "plan", Some(10), &roles, 99)
            .await
            .unwrap();
        let provider = Arc::new(ScriptedProvider::new().with_account(
            "tok-ext",
            "sub-1",
            "Kim",
            "kim@example.org",
        ));
        let activated = Arc::new(AtomicUsize::new(0));
        let hook: InviteHook = {
            let activated = Arc::clone(&activated);
            Arc::new(move |_invite| {
                activated.fetch_add(1, Ordering::SeqCst);
            })
        };
        let resolver =
            resolver_with(store.clone(), provider).with_invite_hook(hook);

        // Act
        let resolved = resolver.resolve(Some("tok-ext")).await.unwrap().unwrap();

        // Assert - a grant exists, the invite is gone, the hook ran once
        let grant = store
            .find_grant(resolved.id, "plan", Some(10))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(grant.roles, vec!["readonly"]);
        assert!(store
            .invites_for_email("kim@example.org")
            .await
            .unwrap()
            .is_empty());
        assert_eq!(activated.load(Ordering::SeqCst), 1);

        // The grant's audit entry records the inviter as actor.
        let log = store.grant_log_for_target("plan", Some(10)).await.unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].actor, 99);
    }

    #[tokio::test]
    async fn test_email_change_activates_invites_for_the_new_email() {
        // Arrange - participant already known under sub-1 with an old
        // email; an invite waits on the new one
        let store = MemoryAuthStore::new_shared();
        store
            .create_participant("sub-1", "Kim", "old@example.org")
            .await
            .unwrap();
        let roles = vec!["planLead".to_string()];
        store
            .create_invite("new@example.org", "plan", Some(10), &roles, 99)
            .await
            .unwrap();
        let provider = Arc::new(ScriptedProvider::new().with_account(
            "tok-ext",
            "sub-1",
            "Kim",
            "new@example.org",
        ));
        let resolver = resolver_with(store.clone(), provider);

        // Act
        let resolved = resolver.resolve(Some("tok-ext")).await.unwrap().unwrap();

        // Assert
        assert_eq!(resolved.email.as_deref(), Some("new@example.org"));
        let grant = store
            .find_grant(resolved.id, "plan", Some(10))
            .await
            .unwrap();
        assert_eq!(grant.unwrap().roles, vec!["planLead"]);
    }

    /// Delegates to a real in-memory store but fails every token
    /// lookup, as a backend outage would.
    struct BrokenTokenStore {
        inner: Arc<MemoryAuthStore>,
    }

    #[async_trait]
    impl IdentityStore for BrokenTokenStore {
        async fn participant_by_id(&self, id: i64) -> StorageResult<Option<ParticipantRecord>> {
            self.inner.participant_by_id(id).await
        }

        async fn participant_by_subject(
            &self,
            subject: &str,
        ) -> StorageResult<Option<ParticipantRecord>> {
            self.inner.participant_by_subject(subject).await
        }

        async fn create_participant(
            &self,
            subject: &str,
            name: &str,
            email: &str,
        ) -> StorageResult<ParticipantRecord> {
            self.inner.create_participant(subject, name, email).await
        }

        async fn update_participant_email(&self, id: i64, email: &str) -> StorageResult<()> {
            self.inner.update_participant_email(id, email).await
        }

        async fn access_token_by_hash(
            &self,
            _token_hash: &str,
            _now: DateTime<Utc>,
        ) -> StorageResult<Option<AccessTokenRecord>> {
            Err(StorageError::InvalidInput {
                message: "token table unavailable".to_string(),
            })
        }

        async fn store_access_token(
            &self,
            token_hash: &str,
            participant_id: i64,
            expires_at: DateTime<Utc>,
        ) -> StorageResult<()> {
            self.inner
                .store_access_token(token_hash, participant_id, expires_at)
                .await
        }

        async fn invites_for_email(&self, email: &str) -> StorageResult<Vec<InviteRecord>> {
            self.inner.invites_for_email(email).await
        }

        async fn create_invite(
            &self,
            email: &str,
            target_type: &str,
            target_id: Option<i64>,
            roles: &[String],
            actor: i64,
        ) -> StorageResult<i64> {
            self.inner
                .create_invite(email, target_type, target_id, roles, actor)
                .await
        }

        async fn delete_invite(&self, invite_id: i64) -> StorageResult<()> {
            self.inner.delete_invite(invite_id).await
        }
    }

    #[async_trait]
    impl GrantStore for BrokenTokenStore {
        async fn find_or_create_grantee(
            &self,
            participant_id: i64,
        ) -> StorageResult<GranteeRecord> {
            self.inner.find_or_create_grantee(participant_id).await
        }

        async fn find_or_create_target(
            &self,
            target_type: &str,
            target_id: Option<i64>,
        ) -> StorageResult<TargetRecord> {
            self.inner.find_or_create_target(target_type, target_id).await
        }

        async fn find_grant(
            &self,
            participant_id: i64,
            target_type: &str,
            target_id: Option<i64>,
        ) -> StorageResult<Option<GrantRecord>> {
            self.inner.find_grant(participant_id, target_type, target_id).await
        }

        async fn create_grant(
            &self,
            input: &GrantInput,
            actor: i64,
            date: DateTime<Utc>,
        ) -> StorageResult<()> {
            self.inner.create_grant(input, actor, date).await
        }

        async fn update_grant(
            &self,
            input: &GrantInput,
            actor: i64,
            date: DateTime<Utc>,
        ) -> StorageResult<()> {
            self.inner.update_grant(input, actor, date).await
        }

        async fn create_or_update_grant(
            &self,
            input: &GrantInput,
            actor: i64,
            date: DateTime<Utc>,
        ) -> StorageResult<()> {
            self.inner.create_or_update_grant(input, actor, date).await
        }

        async fn grants_for_participants(
            &self,
            participant_ids: &[i64],
        ) -> StorageResult<HashMap<i64, Vec<RawRoleGrant>>> {
            self.inner.grants_for_participants(participant_ids).await
        }

        async fn grant_log(&self) -> StorageResult<Vec<GrantLogRecord>> {
            self.inner.grant_log().await
        }

        async fn grant_log_for_target(
            &self,
            target_type: &str,
            target_id: Option<i64>,
        ) -> StorageResult<Vec<GrantLogRecord>> {
            self.inner.grant_log_for_target(target_type, target_id).await
        }
    }

    #[tokio::test]
    async fn test_local_lookup_failure_surfaces_without_dropping_the_race() {
        // Arrange - the token store is down, while the provider would
        // happily vouch for the token
        let store = Arc::new(BrokenTokenStore {
            inner: MemoryAuthStore::new_shared(),
        });
        let provider = Arc::new(ScriptedProvider::new().with_account(
            "tok",
            "sub-1",
            "Kim",
            "kim@example.org",
        ));
        let cache = Arc::new(TtlCache::new(
            CacheConfig::default().with_lifetime(Duration::from_secs(60)),
        ));
        let resolver = IdentityResolver::new(store, provider, cache);

        // Act
        let err = resolver.resolve(Some("tok")).await.unwrap_err();

        // Assert - the storage failure is what the caller sees; the
        // in-flight provider task is drained in the background instead
        // of being abandoned mid-race
        assert!(matches!(err, IdentityError::Storage(_)));
    }
}
