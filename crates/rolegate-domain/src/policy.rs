//! Declared permission requirements and their evaluation.
//!
//! A requirement is a boolean tree over individual permissions: the
//! literal sentinels `"anyone"` and `"noone"`, conjunctions, and
//! disjunctions, nested arbitrarily. The wire shape is JSON:
//!
//! ```json
//! {"or": [
//!   {"type": "global", "permission": "viewAnyOperationData"},
//!   {"and": [
//!     {"type": "operation", "id": 3, "permission": "viewMetadata"},
//!     "anyone"
//!   ]}
//! ]}
//! ```
//!
//! A scoped leaf without an id, or a global leaf carrying one, fails
//! deserialization; malformed trees are never silently coerced.

use serde::{Deserialize, Serialize};

use crate::model::{GrantedPermissions, TargetType};

/// Literal condition constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sentinel {
    #[serde(rename = "anyone")]
    Anyone,
    #[serde(rename = "noone")]
    Noone,
}

/// One required permission: global, or scoped to a specific target id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RequiredPermissionWire", into = "RequiredPermissionWire")]
pub enum RequiredPermission {
    Global {
        permission: String,
    },
    Scoped {
        target_type: TargetType,
        id: i64,
        permission: String,
    },
}

/// Flat wire shape for a requirement leaf.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RequiredPermissionWire {
    #[serde(rename = "type")]
    target_type: TargetType,
    permission: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<i64>,
}

impl TryFrom<RequiredPermissionWire> for RequiredPermission {
    type Error = String;

    fn try_from(wire: RequiredPermissionWire) -> Result<Self, Self::Error> {
        match (wire.target_type, wire.id) {
            (TargetType::Global, None) => Ok(RequiredPermission::Global {
                permission: wire.permission,
            }),
            (TargetType::Global, Some(_)) => {
                Err("global requirement must not carry an id".to_string())
            }
            (target_type, Some(id)) => Ok(RequiredPermission::Scoped {
                target_type,
                id,
                permission: wire.permission,
            }),
            (target_type, None) => Err(format!("{target_type} requirement requires an id")),
        }
    }
}

impl From<RequiredPermission> for RequiredPermissionWire {
    fn from(required: RequiredPermission) -> Self {
        match required {
            RequiredPermission::Global { permission } => RequiredPermissionWire {
                target_type: TargetType::Global,
                permission,
                id: None,
            },
            RequiredPermission::Scoped {
                target_type,
                id,
                permission,
            } => RequiredPermissionWire {
                target_type,
                permission,
                id: Some(id),
            },
        }
    }
}

/// Boolean tree declaring what permissions an action requires.
///
/// Modeled as a closed tagged type rather than discriminating on
/// object shape at evaluation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PermissionCondition {
    Sentinel(Sentinel),
    And { and: Vec<PermissionCondition> },
    Or { or: Vec<PermissionCondition> },
    Requires(RequiredPermission),
}

impl PermissionCondition {
    pub fn anyone() -> Self {
        PermissionCondition::Sentinel(Sentinel::Anyone)
    }

    pub fn noone() -> Self {
        PermissionCondition::Sentinel(Sentinel::Noone)
    }

    pub fn and(conditions: Vec<PermissionCondition>) -> Self {
        PermissionCondition::And { and: conditions }
    }

    pub fn or(conditions: Vec<PermissionCondition>) -> Self {
        PermissionCondition::Or { or: conditions }
    }

    pub fn global(permission: impl Into<String>) -> Self {
        PermissionCondition::Requires(RequiredPermission::Global {
            permission: permission.into(),
        })
    }

    pub fn scoped(target_type: TargetType, id: i64, permission: impl Into<String>) -> Self {
        PermissionCondition::Requires(RequiredPermission::Scoped {
            target_type,
            id,
            permission: permission.into(),
        })
    }
}

/// Evaluates a condition tree against an aggregated permission result.
///
/// Disjunctions succeed on the first true branch and conjunctions fail
/// on the first false branch. A missing scoped entry is an empty set,
/// not an error.
pub fn has_required_permissions(
    granted: &GrantedPermissions,
    condition: &PermissionCondition,
) -> bool {
    match condition {
        PermissionCondition::Sentinel(Sentinel::Anyone) => true,
        PermissionCondition::Sentinel(Sentinel::Noone) => false,
        PermissionCondition::And { and } => and
            .iter()
            .all(|branch| has_required_permissions(granted, branch)),
        PermissionCondition::Or { or } => or
            .iter()
            .any(|branch| has_required_permissions(granted, branch)),
        PermissionCondition::Requires(RequiredPermission::Global { permission }) => {
            granted.has_global(permission)
        }
        PermissionCondition::Requires(RequiredPermission::Scoped {
            target_type,
            id,
            permission,
        }) => granted.has_scoped(*target_type, *id, permission),
    }
}
