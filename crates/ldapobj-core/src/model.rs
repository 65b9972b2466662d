//! Domain types for directory objects
//!
//! - [`DirectoryEntry`]: an entry exactly as a directory search returned it
//! - [`DirectoryObject`]: the same entry with `objectClass` split out
//! - [`DesiredState`]: validated desired object, built from an [`ObjectConfig`]
//! - [`ObjectState`]: the record persisted after each lifecycle call
//! - [`MutationOp`]: one change produced by the diff engine

use crate::error::{Error, Result};
use crate::ignore::IgnoreSet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Name of the object class attribute type
pub const OBJECT_CLASS: &str = "objectClass";

/// Attribute type name to ordered values
pub type AttributeMap = BTreeMap<String, Vec<String>>;

/// Directory search scope
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SearchScope {
    /// Only the base entry itself
    #[default]
    BaseObject,
    /// Direct children of the base entry
    SingleLevel,
    /// The base entry and all of its descendants
    WholeSubtree,
}

impl SearchScope {
    /// Protocol name of the scope
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchScope::BaseObject => "baseObject",
            SearchScope::SingleLevel => "singleLevel",
            SearchScope::WholeSubtree => "wholeSubtree",
        }
    }
}

impl fmt::Display for SearchScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchScope {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "baseObject" => Ok(SearchScope::BaseObject),
            "singleLevel" => Ok(SearchScope::SingleLevel),
            "wholeSubtree" => Ok(SearchScope::WholeSubtree),
            other => Err(Error::invalid_input(format!(
                "unknown search scope '{}', expected one of baseObject, singleLevel, wholeSubtree",
                other
            ))),
        }
    }
}

/// An entry as returned by a directory search
///
/// `objectClass` is still part of `attributes` here; it is split out when the
/// entry is converted into a [`DirectoryObject`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    /// Distinguished name of the entry
    pub dn: String,
    /// All returned attributes, `objectClass` included
    pub attributes: AttributeMap,
}

impl DirectoryEntry {
    /// Create an entry without attributes
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            attributes: AttributeMap::new(),
        }
    }

    /// Set the values of one attribute type
    pub fn with_attribute<I, S>(mut self, attribute_type: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes.insert(
            attribute_type.into(),
            values.into_iter().map(Into::into).collect(),
        );
        self
    }

    /// Object classes of the entry, empty when none were returned
    pub fn object_classes(&self) -> &[String] {
        self.attributes
            .get(OBJECT_CLASS)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

/// A directory object with its object classes as a first-class field
///
/// Invariant: `attributes` never contains `objectClass`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryObject {
    /// Distinguished name of the object
    pub dn: String,
    /// Object classes in directory order
    pub object_classes: Vec<String>,
    /// Every other attribute
    pub attributes: AttributeMap,
}

impl DirectoryObject {
    /// Rebuild the wire form, with `objectClass` merged back into the attributes
    pub fn to_entry(&self) -> DirectoryEntry {
        let mut attributes = self.attributes.clone();
        attributes.insert(OBJECT_CLASS.to_string(), self.object_classes.clone());
        DirectoryEntry {
            dn: self.dn.clone(),
            attributes,
        }
    }
}

impl From<DirectoryEntry> for DirectoryObject {
    fn from(entry: DirectoryEntry) -> Self {
        let mut attributes = entry.attributes;
        let object_classes = attributes.remove(OBJECT_CLASS).unwrap_or_default();
        Self {
            dn: entry.dn,
            object_classes,
            attributes,
        }
    }
}

/// Desired object as it arrives from configuration, before validation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectConfig {
    /// DN of the object
    pub dn: String,
    /// Classes the object implements
    pub object_classes: Vec<String>,
    /// Attribute type to values
    #[serde(default)]
    pub attributes: Option<AttributeMap>,
    /// Attribute types whose changes are ignored
    #[serde(default)]
    pub ignore_changes: Option<Vec<String>>,
}

/// Validated desired state of one directory object
///
/// Built fresh from configuration for every plan/apply pass and not mutated
/// during reconciliation (plan adjustment produces a new value).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredState {
    /// DN of the object
    pub dn: String,
    /// Classes the object implements (non-empty)
    pub object_classes: Vec<String>,
    /// Managed attributes, `objectClass` excluded
    pub attributes: AttributeMap,
    /// Attribute types excluded from management
    pub ignore_changes: IgnoreSet,
}

impl DesiredState {
    /// Create a desired state with no attributes and an empty ignore list
    pub fn new<I, S>(dn: impl Into<String>, object_classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            dn: dn.into(),
            object_classes: object_classes.into_iter().map(Into::into).collect(),
            attributes: AttributeMap::new(),
            ignore_changes: IgnoreSet::new(),
        }
    }

    /// Set the values of one attribute type
    pub fn with_attribute<I, S>(mut self, attribute_type: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes.insert(
            attribute_type.into(),
            values.into_iter().map(Into::into).collect(),
        );
        self
    }

    /// Exclude one attribute type from management
    pub fn with_ignored(mut self, attribute_type: impl Into<String>) -> Self {
        self.ignore_changes.insert(attribute_type);
        self
    }

    /// Decode and validate a desired state from an untyped JSON payload
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let config: ObjectConfig = serde_json::from_value(value)
            .map_err(|e| Error::config_conversion(e.to_string()))?;
        Self::try_from(config)
    }

    /// The desired object without its ignore list
    pub fn to_object(&self) -> DirectoryObject {
        DirectoryObject {
            dn: self.dn.clone(),
            object_classes: self.object_classes.clone(),
            attributes: self.attributes.clone(),
        }
    }

    /// Check the invariants a desired state must hold
    pub fn validate(&self) -> Result<()> {
        if self.dn.trim().is_empty() {
            return Err(Error::config_conversion("dn cannot be empty"));
        }
        if self.object_classes.is_empty() {
            return Err(Error::config_conversion(format!(
                "object_classes of {} cannot be empty",
                self.dn
            )));
        }
        if self.object_classes.iter().any(|class| class.is_empty()) {
            return Err(Error::config_conversion(format!(
                "object_classes of {} contains an empty class name",
                self.dn
            )));
        }
        for (attribute_type, values) in &self.attributes {
            if attribute_type.is_empty() {
                return Err(Error::config_conversion(format!(
                    "attributes of {} contain an empty attribute type",
                    self.dn
                )));
            }
            if attribute_type.eq_ignore_ascii_case(OBJECT_CLASS) {
                return Err(Error::config_conversion(format!(
                    "{} must be set through object_classes, not attributes ({})",
                    OBJECT_CLASS, self.dn
                )));
            }
            if values.is_empty() {
                return Err(Error::config_conversion(format!(
                    "attribute {} of {} has no values",
                    attribute_type, self.dn
                )));
            }
        }
        Ok(())
    }
}

impl TryFrom<ObjectConfig> for DesiredState {
    type Error = Error;

    fn try_from(config: ObjectConfig) -> Result<Self> {
        let desired = Self {
            dn: config.dn,
            object_classes: config.object_classes,
            attributes: config.attributes.unwrap_or_default(),
            ignore_changes: config.ignore_changes.unwrap_or_default().into_iter().collect(),
        };
        desired.validate()?;
        Ok(desired)
    }
}

/// Recorded state of a managed object
///
/// This is what gets persisted after every lifecycle call and what the next
/// update is diffed against. The identifier is always the DN.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectState {
    /// Resource identifier (equal to `dn`)
    pub id: String,
    /// DN of the object
    pub dn: String,
    /// Recorded object classes
    pub object_classes: Vec<String>,
    /// Recorded managed attributes
    #[serde(default)]
    pub attributes: AttributeMap,
    /// Ignore list the object was last reconciled with
    #[serde(default)]
    pub ignore_changes: IgnoreSet,
}

impl ObjectState {
    /// Record a desired state as applied
    pub fn from_desired(desired: &DesiredState) -> Self {
        Self {
            id: desired.dn.clone(),
            dn: desired.dn.clone(),
            object_classes: desired.object_classes.clone(),
            attributes: desired.attributes.clone(),
            ignore_changes: desired.ignore_changes.clone(),
        }
    }

    /// Record an object read from the directory, dropping ignored attributes
    pub fn from_object(object: DirectoryObject, ignore_changes: IgnoreSet) -> Self {
        let attributes = object
            .attributes
            .into_iter()
            .filter(|(attribute_type, _)| !ignore_changes.is_ignored(attribute_type))
            .collect();
        Self {
            id: object.dn.clone(),
            dn: object.dn,
            object_classes: object.object_classes,
            attributes,
            ignore_changes,
        }
    }

    /// The recorded object without its ignore list
    pub fn to_object(&self) -> DirectoryObject {
        DirectoryObject {
            dn: self.dn.clone(),
            object_classes: self.object_classes.clone(),
            attributes: self.attributes.clone(),
        }
    }
}

/// One directory mutation produced by the diff engine
///
/// Each variant maps onto one modification of an LDAP modify request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum MutationOp {
    /// Add an attribute that is not present yet
    AddAttribute {
        /// Attribute type
        attribute_type: String,
        /// Values to add
        values: Vec<String>,
    },
    /// Replace every value of an attribute
    ReplaceAttribute {
        /// Attribute type
        attribute_type: String,
        /// New complete value list
        values: Vec<String>,
    },
    /// Delete values of an attribute; no values deletes the whole attribute
    DeleteAttribute {
        /// Attribute type
        attribute_type: String,
        /// Values to delete, empty for all
        values: Vec<String>,
    },
    /// Add object classes to the entry
    AddObjectClasses {
        /// Classes to add
        classes: Vec<String>,
    },
}

impl MutationOp {
    /// Attribute type the operation touches
    pub fn attribute_type(&self) -> &str {
        match self {
            MutationOp::AddAttribute { attribute_type, .. }
            | MutationOp::ReplaceAttribute { attribute_type, .. }
            | MutationOp::DeleteAttribute { attribute_type, .. } => attribute_type,
            MutationOp::AddObjectClasses { .. } => OBJECT_CLASS,
        }
    }

    /// Values carried by the operation
    pub fn values(&self) -> &[String] {
        match self {
            MutationOp::AddAttribute { values, .. }
            | MutationOp::ReplaceAttribute { values, .. }
            | MutationOp::DeleteAttribute { values, .. } => values,
            MutationOp::AddObjectClasses { classes } => classes,
        }
    }

    /// Copy of the operation with the values of sensitive attributes redacted
    pub fn masked(&self, sensitive_attributes: &[String]) -> MutationOp {
        if !crate::ignore::is_ignored(self.attribute_type(), sensitive_attributes) {
            return self.clone();
        }
        let redact = |values: &[String]| {
            values
                .iter()
                .map(|_| crate::diagnostics::REDACTED.to_string())
                .collect::<Vec<_>>()
        };
        match self {
            MutationOp::AddAttribute {
                attribute_type,
                values,
            } => MutationOp::AddAttribute {
                attribute_type: attribute_type.clone(),
                values: redact(values),
            },
            MutationOp::ReplaceAttribute {
                attribute_type,
                values,
            } => MutationOp::ReplaceAttribute {
                attribute_type: attribute_type.clone(),
                values: redact(values),
            },
            MutationOp::DeleteAttribute {
                attribute_type,
                values,
            } => MutationOp::DeleteAttribute {
                attribute_type: attribute_type.clone(),
                values: redact(values),
            },
            MutationOp::AddObjectClasses { .. } => self.clone(),
        }
    }
}

impl fmt::Display for MutationOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MutationOp::AddAttribute {
                attribute_type,
                values,
            } => write!(f, "add {}: {:?}", attribute_type, values),
            MutationOp::ReplaceAttribute {
                attribute_type,
                values,
            } => write!(f, "replace {}: {:?}", attribute_type, values),
            MutationOp::DeleteAttribute {
                attribute_type,
                values,
            } if values.is_empty() => write!(f, "delete {}", attribute_type),
            MutationOp::DeleteAttribute {
                attribute_type,
                values,
            } => write!(f, "delete {}: {:?}", attribute_type, values),
            MutationOp::AddObjectClasses { classes } => {
                write!(f, "add {}: {:?}", OBJECT_CLASS, classes)
            }
        }
    }
}
