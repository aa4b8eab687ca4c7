//! Core grant data model.
//!
//! A [`Grantee`] holds roles on a [`Target`]; the hydrated view of one
//! stored grant is a [`RoleGrant`]. The computed result for a caller is
//! a [`GrantedPermissions`]: a global permission set plus, per target
//! type, a mapping from target id to a permission set.

pub mod catalog;

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// The closed set of target types a grant can apply to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TargetType {
    Global,
    Operation,
    OperationCluster,
    Plan,
    Project,
    GoverningEntity,
}

impl TargetType {
    /// Wire name of this target type.
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetType::Global => "global",
            TargetType::Operation => "operation",
            TargetType::OperationCluster => "operationCluster",
            TargetType::Plan => "plan",
            TargetType::Project => "project",
            TargetType::GoverningEntity => "governingEntity",
        }
    }
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "global" => Ok(TargetType::Global),
            "operation" => Ok(TargetType::Operation),
            "operationCluster" => Ok(TargetType::OperationCluster),
            "plan" => Ok(TargetType::Plan),
            "project" => Ok(TargetType::Project),
            "governingEntity" => Ok(TargetType::GoverningEntity),
            other => Err(DomainError::UnknownTargetType {
                value: other.to_string(),
            }),
        }
    }
}

/// Who a grant applies to. Currently only users; group and bot
/// grantees may be added later. Immutable once created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Grantee {
    User { participant_id: i64 },
}

impl Grantee {
    pub fn participant_id(&self) -> i64 {
        match self {
            Grantee::User { participant_id } => *participant_id,
        }
    }
}

/// What a grant applies to: the global singleton, or one domain entity
/// identified by a numeric id. Created once per (type, id) pair and
/// never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    Global,
    Operation { id: i64 },
    OperationCluster { id: i64 },
    Plan { id: i64 },
    Project { id: i64 },
    GoverningEntity { id: i64 },
}

impl Target {
    /// Derives a target from raw row data. An unknown target type is
    /// fatal; a non-global type without an id is fatal.
    pub fn from_raw(target_type: &str, target_id: Option<i64>) -> DomainResult<Self> {
        let target_type = target_type.parse::<TargetType>()?;
        match (target_type, target_id) {
            (TargetType::Global, _) => Ok(Target::Global),
            (TargetType::Operation, Some(id)) => Ok(Target::Operation { id }),
            (TargetType::OperationCluster, Some(id)) => Ok(Target::OperationCluster { id }),
            (TargetType::Plan, Some(id)) => Ok(Target::Plan { id }),
            (TargetType::Project, Some(id)) => Ok(Target::Project { id }),
            (TargetType::GoverningEntity, Some(id)) => Ok(Target::GoverningEntity { id }),
            (target_type, None) => Err(DomainError::MalformedTarget {
                target_type: target_type.to_string(),
            }),
        }
    }

    pub fn target_type(&self) -> TargetType {
        match self {
            Target::Global => TargetType::Global,
            Target::Operation { .. } => TargetType::Operation,
            Target::OperationCluster { .. } => TargetType::OperationCluster,
            Target::Plan { .. } => TargetType::Plan,
            Target::Project { .. } => TargetType::Project,
            Target::GoverningEntity { .. } => TargetType::GoverningEntity,
        }
    }

    /// Numeric id of the referenced entity; `None` for the global target.
    pub fn id(&self) -> Option<i64> {
        match self {
            Target::Global => None,
            Target::Operation { id }
            | Target::OperationCluster { id }
            | Target::Plan { id }
            | Target::Project { id }
            | Target::GoverningEntity { id } => Some(*id),
        }
    }
}

/// Hydrated view of one stored grant: (grantee, target, roles).
///
/// Role ordering is irrelevant; at most one live grant exists per
/// (grantee, target) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleGrant {
    pub grantee: Grantee,
    pub target: Target,
    pub roles: Vec<String>,
}

impl RoleGrant {
    /// Builds a grant from a raw storage row. Fails on unknown target
    /// types; invalid role strings are tolerated here and filtered
    /// later during permission calculation.
    pub fn from_raw(
        participant_id: i64,
        target_type: &str,
        target_id: Option<i64>,
        roles: Vec<String>,
    ) -> DomainResult<Self> {
        Ok(RoleGrant {
            grantee: Grantee::User { participant_id },
            target: Target::from_raw(target_type, target_id)?,
            roles,
        })
    }
}

/// Aggregated permissions computed for one caller.
///
/// The global set is represented as absent rather than empty; the
/// per-type scoped maps are created lazily as permissions are added.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GrantedPermissions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global: Option<HashSet<String>>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub scoped: HashMap<TargetType, HashMap<i64, HashSet<String>>>,
}

impl GrantedPermissions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one global permission.
    pub fn add_global(&mut self, permission: impl Into<String>) {
        self.global
            .get_or_insert_with(HashSet::new)
            .insert(permission.into());
    }

    /// Adds one permission at a specific target id, creating the
    /// per-type mapping lazily.
    pub fn add_scoped(&mut self, target_type: TargetType, id: i64, permission: impl Into<String>) {
        self.scoped
            .entry(target_type)
            .or_default()
            .entry(id)
            .or_default()
            .insert(permission.into());
    }

    pub fn has_global(&self, permission: &str) -> bool {
        self.global
            .as_ref()
            .is_some_and(|set| set.contains(permission))
    }

    /// Whether the permission is present at the given target id. A
    /// missing entry is an empty set, not an error.
    pub fn has_scoped(&self, target_type: TargetType, id: i64, permission: &str) -> bool {
        self.scoped
            .get(&target_type)
            .and_then(|by_id| by_id.get(&id))
            .is_some_and(|set| set.contains(permission))
    }

    /// Normalizes an empty global set to absent.
    pub fn normalize(&mut self) {
        if self.global.as_ref().is_some_and(|set| set.is_empty()) {
            self.global = None;
        }
    }
}
