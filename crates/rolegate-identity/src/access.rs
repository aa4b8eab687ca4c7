//! End-to-end access checking.
//!
//! Ties the pieces together: loads a participant's role grants from
//! storage, computes permissions per grant (parent lookups going
//! through the shared batch loaders), merges them into one granted
//! set, and evaluates permission conditions against it.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;

use rolegate_domain::aggregate;
use rolegate_domain::calculator::{calculate_permissions, ParentFetchers};
use rolegate_domain::model::{GrantedPermissions, RoleGrant};
use rolegate_domain::policy::{has_required_permissions, PermissionCondition};
use rolegate_storage::GrantStore;

use crate::error::IdentityResult;

/// Computes granted permissions and evaluates conditions for
/// participants.
pub struct AccessChecker<S> {
    store: Arc<S>,
    fetchers: ParentFetchers,
    /// Extra global permissions granted to every authenticated
    /// participant regardless of roles, e.g. self-service rights.
    additional_global: Option<HashSet<String>>,
}

impl<S> Clone for AccessChecker<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            fetchers: self.fetchers.clone(),
            additional_global: self.additional_global.clone(),
        }
    }
}

impl<S> AccessChecker<S>
where
    S: GrantStore,
{
    pub fn new(store: Arc<S>, fetchers: ParentFetchers) -> Self {
        Self {
            store,
            fetchers,
            additional_global: None,
        }
    }

    pub fn with_additional_global(mut self, permissions: HashSet<String>) -> Self {
        self.additional_global = Some(permissions);
        self
    }

    /// Computes the full granted-permission set for one participant:
    /// one permission computation per role grant, merged. Parent
    /// lookups for the grants share the batch loaders, so a
    /// participant with many cluster grants costs one parent query.
    pub async fn granted_permissions(
        &self,
        participant_id: i64,
    ) -> IdentityResult<GrantedPermissions> {
        let mut by_participant = self
            .store
            .grants_for_participants(&[participant_id])
            .await?;
        let raw = by_participant.remove(&participant_id).unwrap_or_default();

        let mut grants = Vec::with_capacity(raw.len());
        for row in &raw {
            grants.push(RoleGrant::from_raw(
                row.participant_id,
                &row.target_type,
                row.target_id,
                row.roles.clone(),
            )?);
        }

        let computed = join_all(grants.iter().map(|grant| {
            calculate_permissions(grant, &self.fetchers, self.additional_global.as_ref())
        }))
        .await;

        let mut sets = Vec::with_capacity(computed.len());
        for result in computed {
            sets.push(result?);
        }
        Ok(aggregate::merge(sets))
    }

    /// Evaluates a permission condition for a participant.
    pub async fn check(
        &self,
        participant_id: i64,
        condition: &PermissionCondition,
    ) -> IdentityResult<bool> {
        let granted = self.granted_permissions(participant_id).await?;
        Ok(has_required_permissions(&granted, condition))
    }
}
