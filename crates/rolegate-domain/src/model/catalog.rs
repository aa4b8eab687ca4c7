//! Role and permission catalogues, scoped by target type.
//!
//! Roles and permissions are plain string constants. Role strings on a
//! grant that are not in the catalogue for the grant's target type are
//! filtered out and logged during calculation, never rejected outright
//! (legacy data tolerance).

use super::TargetType;

// Roles

/// Global role granting the entire global permission catalogue.
pub const ROLE_HPC_ADMIN: &str = "hpc_admin";
pub const ROLE_OPERATION_LEAD: &str = "operationLead";
pub const ROLE_CLUSTER_LEAD: &str = "clusterLead";
pub const ROLE_PLAN_LEAD: &str = "planLead";
pub const ROLE_READONLY: &str = "readonly";
pub const ROLE_PROJECT_OWNER: &str = "projectOwner";

// Global permissions

pub const GLOBAL_VIEW_PERMITTED_OPERATION_METADATA: &str = "viewPermittedOperationMetadata";
pub const GLOBAL_VIEW_ANY_OPERATION_METADATA: &str = "viewAnyOperationMetadata";
pub const GLOBAL_VIEW_ANY_OPERATION_DATA: &str = "viewAnyOperationData";
pub const GLOBAL_CREATE_OPERATIONS: &str = "createOperations";
pub const GLOBAL_MODIFY_ANY_ACCESS: &str = "modifyAnyAccess";

// Operation-scoped permissions

pub const OPERATION_VIEW_METADATA: &str = "viewMetadata";
pub const OPERATION_EDIT_METADATA: &str = "editMetadata";
pub const OPERATION_VIEW_CLUSTER_METADATA: &str = "viewClusterMetadata";
pub const OPERATION_CREATE_CLUSTERS: &str = "createClusters";

// Operation-cluster-scoped permissions

pub const CLUSTER_VIEW_METADATA: &str = "viewMetadata";
pub const CLUSTER_VIEW_DATA: &str = "viewData";
pub const CLUSTER_VIEW_ASSIGNMENT_DATA: &str = "viewAssignmentData";
pub const CLUSTER_EDIT_ASSIGNMENT_RAW_DATA: &str = "editAssignmentRawData";

// Plan / project / governing-entity-scoped permissions

pub const PLAN_VIEW_DATA: &str = "viewData";
pub const PLAN_EDIT_DATA: &str = "editData";
pub const PROJECT_VIEW_DATA: &str = "viewData";
pub const PROJECT_EDIT_DATA: &str = "editData";
pub const GOVERNING_ENTITY_VIEW_DATA: &str = "viewData";
pub const GOVERNING_ENTITY_EDIT_DATA: &str = "editData";

/// The full global permission catalogue. `hpc_admin` grants all of it.
pub fn all_global_permissions() -> &'static [&'static str] {
    &[
        GLOBAL_VIEW_PERMITTED_OPERATION_METADATA,
        GLOBAL_VIEW_ANY_OPERATION_METADATA,
        GLOBAL_VIEW_ANY_OPERATION_DATA,
        GLOBAL_CREATE_OPERATIONS,
        GLOBAL_MODIFY_ANY_ACCESS,
    ]
}

/// Roles recognized for grants on a given target type.
pub fn valid_roles(target_type: TargetType) -> &'static [&'static str] {
    match target_type {
        TargetType::Global => &[ROLE_HPC_ADMIN],
        TargetType::Operation => &[ROLE_OPERATION_LEAD],
        TargetType::OperationCluster => &[ROLE_CLUSTER_LEAD],
        TargetType::Plan => &[ROLE_PLAN_LEAD, ROLE_READONLY],
        TargetType::Project => &[ROLE_PROJECT_OWNER],
        TargetType::GoverningEntity => &[ROLE_CLUSTER_LEAD],
    }
}
