//! Ignore-set filter
//!
//! Decides whether an attribute type takes part in drift detection. The same
//! membership test backs the read path (ignored attributes are not recorded),
//! the update path (ignored attributes are neither replaced, deleted nor
//! added) and plan adjustment (ignored attributes keep their recorded value).
//!
//! Matching is exact and case-sensitive: `userPassword` and `userpassword`
//! are different entries.

use serde::{Deserialize, Serialize};

/// Set of attribute type names excluded from management
///
/// Keeps the operator's order. A repeated name is kept once, at its first
/// position, so `["sn", "mail", "sn"]` is recorded as `["sn", "mail"]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct IgnoreSet(Vec<String>);

impl IgnoreSet {
    /// Create an empty ignore set
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `attribute_type` is excluded from management
    pub fn is_ignored(&self, attribute_type: &str) -> bool {
        is_ignored(attribute_type, &self.0)
    }

    /// Add an attribute type to the set
    ///
    /// Returns `false` when it was already present.
    pub fn insert(&mut self, attribute_type: impl Into<String>) -> bool {
        let attribute_type = attribute_type.into();
        if self.is_ignored(&attribute_type) {
            return false;
        }
        self.0.push(attribute_type);
        true
    }

    /// Attribute types ignored by either set, `self` first
    pub fn union(&self, other: &IgnoreSet) -> IgnoreSet {
        self.iter().chain(other.iter()).collect()
    }

    /// Iterate the ignored attribute types in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Number of ignored attribute types
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether nothing is ignored
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for IgnoreSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = IgnoreSet::new();
        for attribute_type in iter {
            set.insert(attribute_type);
        }
        set
    }
}

impl From<Vec<String>> for IgnoreSet {
    fn from(list: Vec<String>) -> Self {
        list.into_iter().collect()
    }
}

impl From<IgnoreSet> for Vec<String> {
    fn from(set: IgnoreSet) -> Self {
        set.0
    }
}

/// Membership test over a raw ignore list
pub fn is_ignored(attribute_type: &str, ignore_list: &[String]) -> bool {
    ignore_list.iter().any(|ignored| ignored == attribute_type)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_membership_is_case_sensitive() {
        let ignore: IgnoreSet = ["userPassword"].into_iter().collect();

        assert!(ignore.is_ignored("userPassword"));
        assert!(!ignore.is_ignored("userpassword"));
        assert!(!ignore.is_ignored("sn"));
    }

    #[test]
    fn test_raw_list_matches_set() {
        let list = vec!["sn".to_string(), "mail".to_string()];
        let set: IgnoreSet = list.iter().cloned().collect();

        for name in ["sn", "mail", "cn", "SN"] {
            assert_eq!(is_ignored(name, &list), set.is_ignored(name));
        }
    }

    #[test]
    fn test_union() {
        let a: IgnoreSet = ["sn"].into_iter().collect();
        let b: IgnoreSet = ["mail", "sn"].into_iter().collect();

        let both = a.union(&b);
        assert_eq!(both.iter().collect::<Vec<_>>(), ["sn", "mail"]);
    }

    #[test]
    fn test_serializes_as_list() {
        let set: IgnoreSet = ["userPassword", "description"].into_iter().collect();
        let json = serde_json::to_value(&set).unwrap();
        assert_eq!(json, serde_json::json!(["userPassword", "description"]));

        let back: IgnoreSet = serde_json::from_value(json).unwrap();
        assert_eq!(back, set);
    }

    #[test]
    fn test_keeps_operator_order_without_repeats() {
        let set: IgnoreSet =
            serde_json::from_value(serde_json::json!(["sn", "mail", "sn", "cn"])).unwrap();

        assert_eq!(set.len(), 3);
        assert_eq!(
            serde_json::to_value(&set).unwrap(),
            serde_json::json!(["sn", "mail", "cn"])
        );
    }
}
