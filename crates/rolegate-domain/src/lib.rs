//! rolegate-domain: Core permission-computation logic
//!
//! This crate contains the pure authorization logic including:
//! - Grant data model and role/permission catalogues
//! - Permission calculator with cascading rules across target levels
//! - Aggregation of per-grant results into one composite structure
//! - Policy evaluation over boolean condition trees
//! - Keyed TTL cache for identity lookups
//! - Deferred batch loader for parent-entity resolution
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                rolegate-domain                   │
//! ├─────────────────────────────────────────────────┤
//! │  model/      - Grantees, targets, catalogues    │
//! │  calculator  - Role grant -> permission sets    │
//! │  aggregate   - Merge per-grant results          │
//! │  policy      - Condition tree evaluation        │
//! │  cache       - TTL cache with hashed keys       │
//! │  batch       - Coalescing single-key lookups    │
//! └─────────────────────────────────────────────────┘
//! ```

pub mod aggregate;
pub mod batch;
pub mod cache;
pub mod calculator;
pub mod error;
pub mod model;
pub mod policy;

// Re-export commonly used types at the crate root
pub use error::{DomainError, DomainResult};
pub use model::{GrantedPermissions, Grantee, RoleGrant, Target, TargetType};
pub use policy::{has_required_permissions, PermissionCondition, RequiredPermission};
