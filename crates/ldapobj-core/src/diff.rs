//! Attribute diff engine
//!
//! Computes the directory mutations that turn an observed object into the
//! desired one.
//!
//! ## Rules
//!
//! 1. Object classes are additive only. Classes in `desired` but not in
//!    `observed` are added with a single [`MutationOp::AddObjectClasses`];
//!    existing classes are never removed.
//! 2. Observed-side pass, for every non-ignored observed attribute type:
//!    - present in `desired` with a different value *set* (order is not
//!      compared): replace the whole attribute with the desired list
//!    - absent from `desired`: delete the attribute
//! 3. Desired-side pass: non-ignored types missing from `observed` are added
//!    with their full value list.
//!
//! Output order is: class additions, then the observed-side pass, then the
//! desired-side pass. Within a pass, attribute types come out in map order.
//! Ignored attribute types never appear in the output.

use crate::ignore::IgnoreSet;
use crate::model::{DirectoryObject, MutationOp};
use tracing::debug;

/// Compute the mutations turning `observed` into `desired`
///
/// # Parameters
///
/// - `observed`: the object as last read or recorded
/// - `desired`: the object as configured
/// - `ignore`: attribute types excluded from both passes
///
/// # Returns
///
/// The ordered operation list; empty when the two objects have converged.
pub fn diff(
    observed: &DirectoryObject,
    desired: &DirectoryObject,
    ignore: &IgnoreSet,
) -> Vec<MutationOp> {
    let mut operations = Vec::new();

    let mut classes_to_add: Vec<String> = Vec::new();
    for class in &desired.object_classes {
        if !observed.object_classes.contains(class) && !classes_to_add.contains(class) {
            classes_to_add.push(class.clone());
        }
    }
    if !classes_to_add.is_empty() {
        debug!("Adding object classes {:?} to {}", classes_to_add, desired.dn);
        operations.push(MutationOp::AddObjectClasses {
            classes: classes_to_add,
        });
    }

    for (attribute_type, observed_values) in &observed.attributes {
        if ignore.is_ignored(attribute_type) {
            continue;
        }
        match desired.attributes.get(attribute_type) {
            Some(desired_values) => {
                if values_differ(observed_values, desired_values) {
                    debug!("Changing attribute {} of {}", attribute_type, desired.dn);
                    operations.push(MutationOp::ReplaceAttribute {
                        attribute_type: attribute_type.clone(),
                        values: desired_values.clone(),
                    });
                }
            }
            None => {
                debug!("Removing attribute {} of {}", attribute_type, desired.dn);
                operations.push(MutationOp::DeleteAttribute {
                    attribute_type: attribute_type.clone(),
                    values: Vec::new(),
                });
            }
        }
    }

    for (attribute_type, desired_values) in &desired.attributes {
        if ignore.is_ignored(attribute_type) || observed.attributes.contains_key(attribute_type) {
            continue;
        }
        debug!("Adding attribute {} to {}", attribute_type, desired.dn);
        operations.push(MutationOp::AddAttribute {
            attribute_type: attribute_type.clone(),
            values: desired_values.clone(),
        });
    }

    operations
}

/// Whether any value is present on one side but not the other
fn values_differ(observed: &[String], desired: &[String]) -> bool {
    observed.iter().any(|value| !desired.contains(value))
        || desired.iter().any(|value| !observed.contains(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AttributeMap;

    fn object(classes: &[&str], attributes: &[(&str, &[&str])]) -> DirectoryObject {
        DirectoryObject {
            dn: "cn=test,dc=example,dc=com".to_string(),
            object_classes: classes.iter().map(|c| c.to_string()).collect(),
            attributes: attributes
                .iter()
                .map(|(name, values)| {
                    (
                        name.to_string(),
                        values.iter().map(|v| v.to_string()).collect(),
                    )
                })
                .collect::<AttributeMap>(),
        }
    }

    fn ignore(names: &[&str]) -> IgnoreSet {
        names.iter().copied().collect()
    }

    #[test]
    fn test_converged_objects_produce_no_operations() {
        let o = object(&["person"], &[("cn", &["x"]), ("sn", &["a", "b"])]);
        assert!(diff(&o, &o, &IgnoreSet::new()).is_empty());
    }

    #[test]
    fn test_value_order_is_not_a_change() {
        let observed = object(&["person"], &[("sn", &["a", "b"])]);
        let desired = object(&["person"], &[("sn", &["b", "a"])]);
        assert!(diff(&observed, &desired, &IgnoreSet::new()).is_empty());
    }

    #[test]
    fn test_new_attribute_is_added() {
        let observed = object(&["person"], &[("cn", &["x"]), ("sn", &["y"])]);
        let desired = object(
            &["person"],
            &[("cn", &["x"]), ("sn", &["y"]), ("mail", &["z"])],
        );

        assert_eq!(
            diff(&observed, &desired, &IgnoreSet::new()),
            vec![MutationOp::AddAttribute {
                attribute_type: "mail".to_string(),
                values: vec!["z".to_string()],
            }]
        );
    }

    #[test]
    fn test_single_value_change_replaces_whole_attribute() {
        let observed = object(&["person"], &[("sn", &["a", "b"])]);
        let desired = object(&["person"], &[("sn", &["a", "c"])]);

        assert_eq!(
            diff(&observed, &desired, &IgnoreSet::new()),
            vec![MutationOp::ReplaceAttribute {
                attribute_type: "sn".to_string(),
                values: vec!["a".to_string(), "c".to_string()],
            }]
        );
    }

    #[test]
    fn test_removed_attribute_is_deleted_entirely() {
        let observed = object(&["person"], &[("sn", &["a"]), ("description", &["d1", "d2"])]);
        let desired = object(&["person"], &[("sn", &["a"])]);

        assert_eq!(
            diff(&observed, &desired, &IgnoreSet::new()),
            vec![MutationOp::DeleteAttribute {
                attribute_type: "description".to_string(),
                values: vec![],
            }]
        );
    }

    #[test]
    fn test_ignored_attribute_is_never_touched() {
        let observed = object(&["person"], &[("sn", &["old"]), ("userPassword", &["a"])]);
        let desired = object(&["person"], &[("sn", &["new"]), ("description", &["d"])]);
        let ops = diff(
            &observed,
            &desired,
            &ignore(&["sn", "userPassword", "description"]),
        );
        assert!(ops.is_empty(), "unexpected operations: {:?}", ops);
    }

    #[test]
    fn test_object_classes_are_only_added() {
        let observed = object(&["person", "uidObject"], &[]);
        let desired = object(&["person"], &[]);
        assert!(diff(&observed, &desired, &IgnoreSet::new()).is_empty());

        let observed = object(&["person"], &[]);
        let desired = object(&["person", "uidObject", "uidObject"], &[]);
        assert_eq!(
            diff(&observed, &desired, &IgnoreSet::new()),
            vec![MutationOp::AddObjectClasses {
                classes: vec!["uidObject".to_string()],
            }]
        );
    }

    #[test]
    fn test_pass_ordering() {
        let observed = object(&["person"], &[("sn", &["a"]), ("description", &["d"])]);
        let desired = object(
            &["person", "uidObject"],
            &[("sn", &["b"]), ("uid", &["test"])],
        );

        let ops = diff(&observed, &desired, &IgnoreSet::new());
        assert_eq!(ops.len(), 4);
        assert!(matches!(ops[0], MutationOp::AddObjectClasses { .. }));
        assert!(matches!(
            ops[1],
            MutationOp::DeleteAttribute { .. } | MutationOp::ReplaceAttribute { .. }
        ));
        assert!(matches!(
            ops[2],
            MutationOp::DeleteAttribute { .. } | MutationOp::ReplaceAttribute { .. }
        ));
        assert!(matches!(ops[3], MutationOp::AddAttribute { .. }));
    }
}
