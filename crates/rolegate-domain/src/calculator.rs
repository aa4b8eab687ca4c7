//! Permission calculation for a single role grant.
//!
//! Maps one grant to the set of permissions it confers, applying a
//! fixed table of role -> permission-set rules per target type. Two
//! target types cascade onto a parent entity that must be resolved
//! first: an operation-cluster role also populates permissions on the
//! parent operation, and a governing-entity role also populates a
//! `viewData` permission on the parent plan. Parent chains are
//! resolved through [`BatchLoader`]s so that computing many grants
//! concurrently issues one batched lookup per entity type.

use std::collections::HashSet;

use tracing::error;

use crate::batch::BatchLoader;
use crate::error::{DomainError, DomainResult};
use crate::model::{catalog, GrantedPermissions, RoleGrant, Target, TargetType};

/// Batch loaders resolving parent entities for cascading rules.
///
/// Keys and values are entity ids: an operation cluster id loads its
/// parent operation id, and a governing entity id loads its parent
/// plan id. The backing fetch implementations belong to the caller;
/// this crate only defines the shape.
#[derive(Clone)]
pub struct ParentFetchers {
    pub cluster_operations: BatchLoader<i64, i64>,
    pub governing_entity_plans: BatchLoader<i64, i64>,
}

/// Computes the permissions conferred by one grant.
///
/// `additional_global`, when supplied, is unioned into the global set
/// unconditionally; it injects capabilities not modeled by the grant
/// system (service accounts, for example). The resulting global set is
/// normalized away when empty. A grant whose parent entity cannot be
/// resolved fails with [`DomainError::ParentNotFound`].
pub async fn calculate_permissions(
    grant: &RoleGrant,
    fetchers: &ParentFetchers,
    additional_global: Option<&HashSet<String>>,
) -> DomainResult<GrantedPermissions> {
    let mut granted = GrantedPermissions::new();
    let roles = recognized_roles(grant);

    match grant.target {
        Target::Global => {
            for role in &roles {
                if *role == catalog::ROLE_HPC_ADMIN {
                    for permission in catalog::all_global_permissions() {
                        granted.add_global(*permission);
                    }
                }
            }
        }
        Target::Operation { id } => {
            for role in &roles {
                if *role == catalog::ROLE_OPERATION_LEAD {
                    granted.add_global(catalog::GLOBAL_VIEW_PERMITTED_OPERATION_METADATA);
                    granted.add_scoped(TargetType::Operation, id, catalog::OPERATION_VIEW_METADATA);
                    granted.add_scoped(TargetType::Operation, id, catalog::OPERATION_EDIT_METADATA);
                    granted.add_scoped(
                        TargetType::Operation,
                        id,
                        catalog::OPERATION_VIEW_CLUSTER_METADATA,
                    );
                    granted.add_scoped(
                        TargetType::Operation,
                        id,
                        catalog::OPERATION_CREATE_CLUSTERS,
                    );
                }
            }
        }
        Target::OperationCluster { id } => {
            if !roles.is_empty() {
                let operation_id = fetchers
                    .cluster_operations
                    .load(id)
                    .await?
                    .ok_or_else(|| DomainError::ParentNotFound {
                        entity: "operation".to_string(),
                        id,
                    })?;
                for role in &roles {
                    if *role == catalog::ROLE_CLUSTER_LEAD {
                        granted.add_global(catalog::GLOBAL_VIEW_PERMITTED_OPERATION_METADATA);
                        // Cascade onto the parent operation.
                        granted.add_scoped(
                            TargetType::Operation,
                            operation_id,
                            catalog::OPERATION_VIEW_CLUSTER_METADATA,
                        );
                        granted.add_scoped(
                            TargetType::Operation,
                            operation_id,
                            catalog::OPERATION_VIEW_METADATA,
                        );
                        granted.add_scoped(
                            TargetType::OperationCluster,
                            id,
                            catalog::CLUSTER_VIEW_METADATA,
                        );
                        granted.add_scoped(
                            TargetType::OperationCluster,
                            id,
                            catalog::CLUSTER_VIEW_DATA,
                        );
                        granted.add_scoped(
                            TargetType::OperationCluster,
                            id,
                            catalog::CLUSTER_VIEW_ASSIGNMENT_DATA,
                        );
                        granted.add_scoped(
                            TargetType::OperationCluster,
                            id,
                            catalog::CLUSTER_EDIT_ASSIGNMENT_RAW_DATA,
                        );
                    }
                }
            }
        }
        Target::Plan { id } => {
            for role in &roles {
                match *role {
                    r if r == catalog::ROLE_PLAN_LEAD => {
                        granted.add_scoped(TargetType::Plan, id, catalog::PLAN_VIEW_DATA);
                        granted.add_scoped(TargetType::Plan, id, catalog::PLAN_EDIT_DATA);
                    }
                    r if r == catalog::ROLE_READONLY => {
                        granted.add_scoped(TargetType::Plan, id, catalog::PLAN_VIEW_DATA);
                    }
                    _ => {}
                }
            }
        }
        Target::Project { id } => {
            for role in &roles {
                if *role == catalog::ROLE_PROJECT_OWNER {
                    granted.add_scoped(TargetType::Project, id, catalog::PROJECT_VIEW_DATA);
                    granted.add_scoped(TargetType::Project, id, catalog::PROJECT_EDIT_DATA);
                }
            }
        }
        Target::GoverningEntity { id } => {
            if !roles.is_empty() {
                // A missing parent plan is a data-integrity violation.
                let plan_id = fetchers
                    .governing_entity_plans
                    .load(id)
                    .await?
                    .ok_or_else(|| DomainError::ParentNotFound {
                        entity: "plan".to_string(),
                        id,
                    })?;
                for role in &roles {
                    if *role == catalog::ROLE_CLUSTER_LEAD {
                        granted.add_scoped(
                            TargetType::GoverningEntity,
                            id,
                            catalog::GOVERNING_ENTITY_VIEW_DATA,
                        );
                        granted.add_scoped(
                            TargetType::GoverningEntity,
                            id,
                            catalog::GOVERNING_ENTITY_EDIT_DATA,
                        );
                        granted.add_scoped(TargetType::Plan, plan_id, catalog::PLAN_VIEW_DATA);
                    }
                }
            }
        }
    }

    if let Some(extra) = additional_global {
        for permission in extra {
            granted.add_global(permission.clone());
        }
    }

    granted.normalize();
    Ok(granted)
}

/// Filters the grant's roles down to those recognized for its target
/// type. Invalid role strings are logged and skipped, not fatal, to
/// tolerate legacy data.
fn recognized_roles(grant: &RoleGrant) -> Vec<&str> {
    let known = catalog::valid_roles(grant.target.target_type());
    grant
        .roles
        .iter()
        .filter_map(|role| {
            if known.contains(&role.as_str()) {
                Some(role.as_str())
            } else {
                error!(
                    role = %role,
                    target_type = %grant.target.target_type(),
                    "ignoring unrecognized role on grant"
                );
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::batch::BatchFetch;
    use crate::model::Grantee;

    /// Parent lookup backed by a fixed child -> parent table.
    struct TableFetch {
        table: Vec<(i64, i64)>,
    }

    #[async_trait]
    impl BatchFetch<i64, i64> for TableFetch {
        async fn fetch_batch(&self, keys: &[i64]) -> DomainResult<Vec<Option<i64>>> {
            Ok(keys
                .iter()
                .map(|k| {
                    self.table
                        .iter()
                        .find(|(child, _)| child == k)
                        .map(|(_, parent)| *parent)
                })
                .collect())
        }
    }

    fn fetchers(clusters: Vec<(i64, i64)>, governing_entities: Vec<(i64, i64)>) -> ParentFetchers {
        ParentFetchers {
            cluster_operations: BatchLoader::new(
                Arc::new(TableFetch { table: clusters }),
                Duration::from_millis(1),
            ),
            governing_entity_plans: BatchLoader::new(
                Arc::new(TableFetch {
                    table: governing_entities,
                }),
                Duration::from_millis(1),
            ),
        }
    }

    fn grant(target: Target, roles: &[&str]) -> RoleGrant {
        RoleGrant {
            grantee: Grantee::User { participant_id: 1 },
            target,
            roles: roles.iter().map(|r| r.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn test_hpc_admin_receives_the_full_global_catalogue() {
        // Arrange
        let grant = grant(Target::Global, &[catalog::ROLE_HPC_ADMIN]);

        // Act
        let granted = calculate_permissions(&grant, &fetchers(vec![], vec![]), None)
            .await
            .unwrap();

        // Assert
        let global = granted.global.expect("global set should be present");
        let expected: HashSet<String> = catalog::all_global_permissions()
            .iter()
            .map(|p| p.to_string())
            .collect();
        assert_eq!(global, expected);
    }

    #[tokio::test]
    async fn test_no_roles_yields_absent_global_set() {
        let grant = grant(Target::Global, &[]);

        let granted = calculate_permissions(&grant, &fetchers(vec![], vec![]), None)
            .await
            .unwrap();

        assert_eq!(granted.global, None);
        assert!(granted.scoped.is_empty());
    }

    #[tokio::test]
    async fn test_operation_lead_gets_scoped_edit_and_global_visibility() {
        let grant = grant(
            Target::Operation { id: 42 },
            &[catalog::ROLE_OPERATION_LEAD],
        );

        let granted = calculate_permissions(&grant, &fetchers(vec![], vec![]), None)
            .await
            .unwrap();

        assert!(granted.has_global(catalog::GLOBAL_VIEW_PERMITTED_OPERATION_METADATA));
        for permission in [
            catalog::OPERATION_VIEW_METADATA,
            catalog::OPERATION_EDIT_METADATA,
            catalog::OPERATION_VIEW_CLUSTER_METADATA,
            catalog::OPERATION_CREATE_CLUSTERS,
        ] {
            assert!(granted.has_scoped(TargetType::Operation, 42, permission));
        }
    }

    #[tokio::test]
    async fn test_cluster_lead_cascades_onto_the_parent_operation() {
        // Arrange - cluster 7 belongs to operation 3
        let grant = grant(
            Target::OperationCluster { id: 7 },
            &[catalog::ROLE_CLUSTER_LEAD],
        );

        // Act
        let granted = calculate_permissions(&grant, &fetchers(vec![(7, 3)], vec![]), None)
            .await
            .unwrap();

        // Assert - global visibility
        assert!(granted.has_global(catalog::GLOBAL_VIEW_PERMITTED_OPERATION_METADATA));

        // ... permissions cascaded to operation 3
        assert!(granted.has_scoped(TargetType::Operation, 3, catalog::OPERATION_VIEW_CLUSTER_METADATA));
        assert!(granted.has_scoped(TargetType::Operation, 3, catalog::OPERATION_VIEW_METADATA));

        // ... and cluster-scoped permissions at 7
        for permission in [
            catalog::CLUSTER_VIEW_METADATA,
            catalog::CLUSTER_VIEW_DATA,
            catalog::CLUSTER_VIEW_ASSIGNMENT_DATA,
            catalog::CLUSTER_EDIT_ASSIGNMENT_RAW_DATA,
        ] {
            assert!(granted.has_scoped(TargetType::OperationCluster, 7, permission));
        }
    }

    #[tokio::test]
    async fn test_governing_entity_role_adds_view_data_on_the_parent_plan() {
        let grant = grant(
            Target::GoverningEntity { id: 9 },
            &[catalog::ROLE_CLUSTER_LEAD],
        );

        let granted = calculate_permissions(&grant, &fetchers(vec![], vec![(9, 100)]), None)
            .await
            .unwrap();

        assert!(granted.has_scoped(TargetType::GoverningEntity, 9, catalog::GOVERNING_ENTITY_VIEW_DATA));
        assert!(granted.has_scoped(TargetType::Plan, 100, catalog::PLAN_VIEW_DATA));
    }

    #[tokio::test]
    async fn test_missing_governing_entity_parent_is_fatal() {
        let grant = grant(
            Target::GoverningEntity { id: 9 },
            &[catalog::ROLE_CLUSTER_LEAD],
        );

        let err = calculate_permissions(&grant, &fetchers(vec![], vec![]), None)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DomainError::ParentNotFound { entity, id: 9 } if entity == "plan"
        ));
    }

    #[tokio::test]
    async fn test_unrecognized_roles_are_filtered_not_fatal() {
        // A legacy role string next to a valid one: only the valid one
        // contributes permissions.
        let grant = grant(
            Target::Plan { id: 5 },
            &["definitelyNotARole", catalog::ROLE_READONLY],
        );

        let granted = calculate_permissions(&grant, &fetchers(vec![], vec![]), None)
            .await
            .unwrap();

        assert!(granted.has_scoped(TargetType::Plan, 5, catalog::PLAN_VIEW_DATA));
        assert!(!granted.has_scoped(TargetType::Plan, 5, catalog::PLAN_EDIT_DATA));
    }

    #[tokio::test]
    async fn test_additional_global_permissions_are_unioned_unconditionally() {
        let grant = grant(Target::Plan { id: 5 }, &[]);
        let extra: HashSet<String> = ["serviceIngest".to_string()].into_iter().collect();

        let granted = calculate_permissions(&grant, &fetchers(vec![], vec![]), Some(&extra))
            .await
            .unwrap();

        assert!(granted.has_global("serviceIngest"));
    }
}
