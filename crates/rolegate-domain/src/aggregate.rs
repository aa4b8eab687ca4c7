//! Merging per-grant permission results into one composite structure.
//!
//! Individual grant results are computed concurrently and combined
//! afterwards, so `merge` must be associative and commutative: the
//! order in which results arrive cannot affect the outcome.

use std::collections::HashSet;

use crate::model::GrantedPermissions;

/// Unions a sequence of per-grant results. Global sets are unioned;
/// for each (target type, target id) the recorded permission sets are
/// unioned, creating the per-type mapping lazily. An empty global set
/// is normalized to absent.
pub fn merge<I>(results: I) -> GrantedPermissions
where
    I: IntoIterator<Item = GrantedPermissions>,
{
    let mut merged = GrantedPermissions::new();
    for result in results {
        if let Some(global) = result.global {
            merged
                .global
                .get_or_insert_with(HashSet::new)
                .extend(global);
        }
        for (target_type, by_id) in result.scoped {
            let type_map = merged.scoped.entry(target_type).or_default();
            for (id, permissions) in by_id {
                type_map.entry(id).or_default().extend(permissions);
            }
        }
    }
    merged.normalize();
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TargetType;

    fn sample_a() -> GrantedPermissions {
        let mut granted = GrantedPermissions::new();
        granted.add_global("viewPermittedOperationMetadata");
        granted.add_scoped(TargetType::Operation, 1, "viewMetadata");
        granted.add_scoped(TargetType::Operation, 1, "editMetadata");
        granted.add_scoped(TargetType::Plan, 9, "viewData");
        granted
    }

    fn sample_b() -> GrantedPermissions {
        let mut granted = GrantedPermissions::new();
        granted.add_global("createOperations");
        granted.add_scoped(TargetType::Operation, 1, "viewClusterMetadata");
        granted.add_scoped(TargetType::Operation, 2, "viewMetadata");
        granted
    }

    #[test]
    fn test_merge_is_commutative() {
        let ab = merge([sample_a(), sample_b()]);
        let ba = merge([sample_b(), sample_a()]);

        assert_eq!(ab, ba);
    }

    #[test]
    fn test_merge_is_associative() {
        let nested = merge([merge([sample_a()]), sample_b()]);
        let flat = merge([sample_a(), sample_b()]);

        assert_eq!(nested, flat);
    }

    #[test]
    fn test_merge_unions_sets_at_the_same_target() {
        let merged = merge([sample_a(), sample_b()]);

        for permission in ["viewMetadata", "editMetadata", "viewClusterMetadata"] {
            assert!(merged.has_scoped(TargetType::Operation, 1, permission));
        }
        assert!(merged.has_scoped(TargetType::Operation, 2, "viewMetadata"));
        assert!(merged.has_scoped(TargetType::Plan, 9, "viewData"));
        assert!(merged.has_global("viewPermittedOperationMetadata"));
        assert!(merged.has_global("createOperations"));
    }

    #[test]
    fn test_merge_of_nothing_is_empty() {
        let merged = merge([]);

        assert_eq!(merged, GrantedPermissions::new());
        assert_eq!(merged.global, None);
    }

    #[test]
    fn test_merge_normalizes_empty_global_sets_away() {
        let empty_global = GrantedPermissions {
            global: Some(std::collections::HashSet::new()),
            ..Default::default()
        };

        let merged = merge([empty_global]);

        assert_eq!(merged.global, None);
    }
}
