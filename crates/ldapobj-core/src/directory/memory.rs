// # Memory Directory
//
// In-memory implementation of Directory.
//
// ## Purpose
//
// Behaves like a small LDAP server without schema checking, so the engine
// can be exercised end to end without a network. Server rejections use the
// LDAP result names a real server would report.
//
// ## Supported Filters
//
// - `(objectClass=*)` and `(&)`: every entry in scope
// - `(attr=*)`: entries that have the attribute
// - `(attr=value)`: entries with an exact value match
//
// Anything else is rejected with `InvalidInput`.
//
// ## Crash Behavior
//
// All entries are lost when the value is dropped.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::config::DirectoryConfig;
use crate::error::{Error, WriteOperation};
use crate::model::{AttributeMap, DirectoryEntry, MutationOp, OBJECT_CLASS, SearchScope};
use crate::traits::{Directory, DirectoryFactory};

/// In-memory directory
///
/// Clones share the same entries, so a test can keep one handle for
/// inspection while the engine owns another.
///
/// # Example
///
/// ```rust,no_run
/// use ldapobj_core::directory::MemoryDirectory;
/// use ldapobj_core::model::{DirectoryEntry, OBJECT_CLASS};
///
/// #[tokio::main]
/// async fn main() {
///     let directory = MemoryDirectory::new();
///     directory
///         .seed(DirectoryEntry::new("dc=example,dc=com").with_attribute(OBJECT_CLASS, ["domain"]))
///         .await;
///     assert_eq!(directory.len().await, 1);
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryDirectory {
    entries: Arc<RwLock<BTreeMap<String, AttributeMap>>>,
}

impl MemoryDirectory {
    /// Create an empty directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite an entry without any checks
    pub async fn seed(&self, entry: DirectoryEntry) {
        let mut guard = self.entries.write().await;
        guard.insert(entry.dn, entry.attributes);
    }

    /// Current content of an entry, `objectClass` included
    pub async fn entry(&self, dn: &str) -> Option<DirectoryEntry> {
        let guard = self.entries.read().await;
        guard.get(dn).map(|attributes| DirectoryEntry {
            dn: dn.to_string(),
            attributes: attributes.clone(),
        })
    }

    /// Number of entries
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Check if the directory is empty
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl Directory for MemoryDirectory {
    async fn search(
        &self,
        base_dn: &str,
        scope: SearchScope,
        filter: &str,
        attributes: &[String],
    ) -> Result<Vec<DirectoryEntry>, Error> {
        let filter = Filter::parse(filter)?;
        let guard = self.entries.read().await;

        if !guard.contains_key(base_dn) {
            return Ok(Vec::new());
        }

        let results = guard
            .iter()
            .filter(|(dn, _)| in_scope(dn, base_dn, scope))
            .filter(|(_, entry)| filter.matches(entry))
            .map(|(dn, entry)| DirectoryEntry {
                dn: dn.clone(),
                attributes: select_attributes(entry, attributes),
            })
            .collect();
        Ok(results)
    }

    async fn add(&self, dn: &str, attributes: &AttributeMap) -> Result<(), Error> {
        let mut guard = self.entries.write().await;
        if guard.contains_key(dn) {
            return Err(Error::directory_write(
                WriteOperation::Add,
                dn,
                "Entry Already Exists",
            ));
        }
        if attributes.get(OBJECT_CLASS).is_none_or(|classes| classes.is_empty()) {
            return Err(Error::directory_write(
                WriteOperation::Add,
                dn,
                "Object Class Violation: no objectClass attribute",
            ));
        }

        let entry = attributes
            .iter()
            .filter(|(_, values)| !values.is_empty())
            .map(|(name, values)| (name.clone(), values.clone()))
            .collect();
        guard.insert(dn.to_string(), entry);
        Ok(())
    }

    async fn modify(&self, dn: &str, operations: &[MutationOp]) -> Result<(), Error> {
        let mut guard = self.entries.write().await;
        let current = guard
            .get(dn)
            .ok_or_else(|| Error::directory_write(WriteOperation::Modify, dn, "No Such Object"))?;

        // Applied to a copy so a rejected request leaves the entry untouched
        let mut updated = current.clone();
        for operation in operations {
            apply_operation(&mut updated, operation)
                .map_err(|message| Error::directory_write(WriteOperation::Modify, dn, message))?;
        }
        if updated.get(OBJECT_CLASS).is_none_or(|classes| classes.is_empty()) {
            return Err(Error::directory_write(
                WriteOperation::Modify,
                dn,
                "Object Class Violation: objectClass cannot be removed",
            ));
        }

        guard.insert(dn.to_string(), updated);
        Ok(())
    }

    async fn delete(&self, dn: &str) -> Result<(), Error> {
        let mut guard = self.entries.write().await;
        let child_prefix = format!(",{}", dn);
        if guard.keys().any(|key| key.ends_with(&child_prefix)) {
            return Err(Error::directory_write(
                WriteOperation::Delete,
                dn,
                "Not Allowed On Non-Leaf",
            ));
        }
        guard
            .remove(dn)
            .map(|_| ())
            .ok_or_else(|| Error::directory_write(WriteOperation::Delete, dn, "No Such Object"))
    }

    fn directory_name(&self) -> &'static str {
        "memory"
    }
}

fn apply_operation(entry: &mut AttributeMap, operation: &MutationOp) -> Result<(), String> {
    match operation {
        MutationOp::AddAttribute {
            attribute_type,
            values,
        } => add_values(entry, attribute_type, values),
        MutationOp::AddObjectClasses { classes } => add_values(entry, OBJECT_CLASS, classes),
        MutationOp::ReplaceAttribute {
            attribute_type,
            values,
        } => {
            if values.is_empty() {
                entry.remove(attribute_type);
            } else {
                entry.insert(attribute_type.clone(), values.clone());
            }
            Ok(())
        }
        MutationOp::DeleteAttribute {
            attribute_type,
            values,
        } => {
            let Some(current) = entry.get_mut(attribute_type) else {
                return Err(format!("No Such Attribute: {}", attribute_type));
            };
            if values.is_empty() {
                entry.remove(attribute_type);
                return Ok(());
            }
            for value in values {
                let Some(position) = current.iter().position(|v| v == value) else {
                    return Err(format!("No Such Attribute: {}={}", attribute_type, value));
                };
                current.remove(position);
            }
            if current.is_empty() {
                entry.remove(attribute_type);
            }
            Ok(())
        }
    }
}

fn add_values(entry: &mut AttributeMap, attribute_type: &str, values: &[String]) -> Result<(), String> {
    let current = entry.entry(attribute_type.to_string()).or_default();
    for value in values {
        if current.contains(value) {
            return Err(format!("Type Or Value Exists: {}={}", attribute_type, value));
        }
        current.push(value.clone());
    }
    Ok(())
}

fn in_scope(dn: &str, base_dn: &str, scope: SearchScope) -> bool {
    match scope {
        SearchScope::BaseObject => dn == base_dn,
        SearchScope::SingleLevel => dn
            .split_once(',')
            .is_some_and(|(_, parent)| parent == base_dn),
        SearchScope::WholeSubtree => {
            dn == base_dn
                || dn
                    .strip_suffix(base_dn)
                    .is_some_and(|rest| rest.ends_with(','))
        }
    }
}

fn select_attributes(entry: &AttributeMap, requested: &[String]) -> AttributeMap {
    if requested.is_empty() || requested.iter().any(|name| name == "*") {
        return entry.clone();
    }
    entry
        .iter()
        .filter(|(name, _)| requested.iter().any(|r| r.eq_ignore_ascii_case(name)))
        .map(|(name, values)| (name.clone(), values.clone()))
        .collect()
}

/// The small filter subset understood by the memory directory
enum Filter {
    All,
    Present(String),
    Equals(String, String),
}

impl Filter {
    fn parse(filter: &str) -> Result<Self, Error> {
        let filter = filter.trim();
        if filter == "(&)" {
            return Ok(Filter::All);
        }
        let inner = filter
            .strip_prefix('(')
            .and_then(|rest| rest.strip_suffix(')'))
            .ok_or_else(|| Error::invalid_input(format!("unsupported filter: {}", filter)))?;
        let (attribute, value) = inner
            .split_once('=')
            .ok_or_else(|| Error::invalid_input(format!("unsupported filter: {}", filter)))?;
        if attribute.is_empty() || attribute.contains(['(', ')', '&', '|', '!']) {
            return Err(Error::invalid_input(format!("unsupported filter: {}", filter)));
        }

        match value {
            "*" if attribute.eq_ignore_ascii_case(OBJECT_CLASS) => Ok(Filter::All),
            "*" => Ok(Filter::Present(attribute.to_string())),
            _ => Ok(Filter::Equals(attribute.to_string(), value.to_string())),
        }
    }

    fn matches(&self, entry: &AttributeMap) -> bool {
        let values_of = |attribute: &str| {
            entry
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(attribute))
                .map(|(_, values)| values)
        };
        match self {
            Filter::All => true,
            Filter::Present(attribute) => values_of(attribute).is_some(),
            Filter::Equals(attribute, value) => {
                values_of(attribute).is_some_and(|values| values.contains(value))
            }
        }
    }
}

/// Factory for [`MemoryDirectory`]
///
/// Every call creates a fresh, empty directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryDirectoryFactory;

#[async_trait]
impl DirectoryFactory for MemoryDirectoryFactory {
    async fn create(&self, config: &DirectoryConfig) -> Result<Box<dyn Directory>, Error> {
        match config {
            DirectoryConfig::Memory => Ok(Box::new(MemoryDirectory::new())),
            other => Err(Error::config(format!(
                "memory directory factory cannot build a {} directory",
                other.type_name()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "dc=example,dc=com";

    async fn seeded() -> MemoryDirectory {
        let directory = MemoryDirectory::new();
        directory
            .seed(DirectoryEntry::new(BASE).with_attribute(OBJECT_CLASS, ["domain"]))
            .await;
        directory
            .seed(
                DirectoryEntry::new("ou=people,dc=example,dc=com")
                    .with_attribute(OBJECT_CLASS, ["organizationalUnit"]),
            )
            .await;
        directory
            .seed(
                DirectoryEntry::new("cn=alice,ou=people,dc=example,dc=com")
                    .with_attribute(OBJECT_CLASS, ["person"])
                    .with_attribute("sn", ["Liddell"])
                    .with_attribute("mail", ["alice@example.com"]),
            )
            .await;
        directory
    }

    fn all() -> Vec<String> {
        vec!["*".to_string()]
    }

    #[tokio::test]
    async fn test_search_scopes() {
        let directory = seeded().await;

        let base = directory
            .search(BASE, SearchScope::BaseObject, "(objectClass=*)", &all())
            .await
            .unwrap();
        assert_eq!(base.len(), 1);

        let one = directory
            .search(BASE, SearchScope::SingleLevel, "(&)", &all())
            .await
            .unwrap();
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].dn, "ou=people,dc=example,dc=com");

        let sub = directory
            .search(BASE, SearchScope::WholeSubtree, "(objectClass=*)", &all())
            .await
            .unwrap();
        assert_eq!(sub.len(), 3);
    }

    #[tokio::test]
    async fn test_search_missing_base_is_empty() {
        let directory = seeded().await;

        let results = directory
            .search("cn=nobody,dc=example,dc=com", SearchScope::BaseObject, "(&)", &all())
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_search_filters_and_selection() {
        let directory = seeded().await;

        let people = directory
            .search(BASE, SearchScope::WholeSubtree, "(sn=Liddell)", &["mail".to_string()])
            .await
            .unwrap();
        assert_eq!(people.len(), 1);
        assert_eq!(people[0].attributes.len(), 1);
        assert!(people[0].attributes.contains_key("mail"));

        let with_mail = directory
            .search(BASE, SearchScope::WholeSubtree, "(mail=*)", &all())
            .await
            .unwrap();
        assert_eq!(with_mail.len(), 1);

        let err = directory
            .search(BASE, SearchScope::WholeSubtree, "(|(a=b)(c=d))", &all())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_add_rejections() {
        let directory = seeded().await;

        let existing = AttributeMap::from([(OBJECT_CLASS.to_string(), vec!["person".to_string()])]);
        let err = directory
            .add("cn=alice,ou=people,dc=example,dc=com", &existing)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Entry Already Exists"));

        let no_class = AttributeMap::from([("sn".to_string(), vec!["x".to_string()])]);
        let err = directory
            .add("cn=bob,ou=people,dc=example,dc=com", &no_class)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Object Class Violation"));
    }

    #[tokio::test]
    async fn test_modify_is_atomic() {
        let directory = seeded().await;
        let dn = "cn=alice,ou=people,dc=example,dc=com";

        let operations = vec![
            MutationOp::ReplaceAttribute {
                attribute_type: "sn".to_string(),
                values: vec!["Changed".to_string()],
            },
            MutationOp::DeleteAttribute {
                attribute_type: "description".to_string(),
                values: vec![],
            },
        ];
        let err = directory.modify(dn, &operations).await.unwrap_err();
        assert!(err.to_string().contains("No Such Attribute"));

        let entry = directory.entry(dn).await.unwrap();
        assert_eq!(entry.attributes["sn"], vec!["Liddell"]);
    }

    #[tokio::test]
    async fn test_modify_operations() {
        let directory = seeded().await;
        let dn = "cn=alice,ou=people,dc=example,dc=com";

        let operations = vec![
            MutationOp::AddObjectClasses {
                classes: vec!["inetOrgPerson".to_string()],
            },
            MutationOp::DeleteAttribute {
                attribute_type: "mail".to_string(),
                values: vec![],
            },
            MutationOp::AddAttribute {
                attribute_type: "givenName".to_string(),
                values: vec!["Alice".to_string()],
            },
        ];
        directory.modify(dn, &operations).await.unwrap();

        let entry = directory.entry(dn).await.unwrap();
        assert_eq!(entry.object_classes(), ["person", "inetOrgPerson"]);
        assert!(!entry.attributes.contains_key("mail"));
        assert_eq!(entry.attributes["givenName"], vec!["Alice"]);

        let duplicate = vec![MutationOp::AddAttribute {
            attribute_type: "givenName".to_string(),
            values: vec!["Alice".to_string()],
        }];
        let err = directory.modify(dn, &duplicate).await.unwrap_err();
        assert!(err.to_string().contains("Type Or Value Exists"));
    }

    #[tokio::test]
    async fn test_delete() {
        let directory = seeded().await;

        let err = directory.delete("ou=people,dc=example,dc=com").await.unwrap_err();
        assert!(err.to_string().contains("Not Allowed On Non-Leaf"));

        directory
            .delete("cn=alice,ou=people,dc=example,dc=com")
            .await
            .unwrap();
        assert_eq!(directory.len().await, 2);

        let err = directory
            .delete("cn=alice,ou=people,dc=example,dc=com")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::DirectoryWrite {
                operation: WriteOperation::Delete,
                ..
            }
        ));
    }
}
