//! Read-only entry points
//!
//! Object lookup and search for callers that only observe the directory.
//! Neither applies an ignore list.

use crate::accessor::{self, ALL_USER_ATTRIBUTES, MATCH_ALL_FILTER};
use crate::error::Result;
use crate::model::{AttributeMap, SearchScope};
use crate::traits::Directory;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// An object as looked up, with no filtering applied
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectData {
    /// Identifier (equal to `dn`)
    pub id: String,
    /// DN of the object
    pub dn: String,
    /// Object classes
    pub object_classes: Vec<String>,
    /// Every returned attribute except `objectClass`
    pub attributes: AttributeMap,
}

/// Look up one object by DN
///
/// `additional_attributes` names attributes not covered by `*`, such as
/// operational attributes.
pub async fn lookup_object(
    directory: &dyn Directory,
    dn: &str,
    additional_attributes: &[String],
) -> Result<ObjectData> {
    let object = accessor::fetch(directory, dn, additional_attributes).await?;
    Ok(ObjectData {
        id: dn.to_string(),
        dn: dn.to_string(),
        object_classes: object.object_classes,
        attributes: object.attributes,
    })
}

/// A directory search
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    /// Search base
    pub base_dn: String,
    /// Search scope, `baseObject` when not set
    #[serde(default)]
    pub scope: SearchScope,
    /// LDAP filter, matches everything when not set
    #[serde(default)]
    pub filter: Option<String>,
    /// Attributes requested on top of `*`
    #[serde(default)]
    pub additional_attributes: Vec<String>,
}

impl SearchQuery {
    /// Base-scope, match-all search at `base_dn`
    pub fn new(base_dn: impl Into<String>) -> Self {
        Self {
            base_dn: base_dn.into(),
            ..Self::default()
        }
    }

    /// Set the scope
    pub fn with_scope(mut self, scope: SearchScope) -> Self {
        self.scope = scope;
        self
    }

    /// Set the filter
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Filter actually sent
    pub fn effective_filter(&self) -> &str {
        self.filter.as_deref().unwrap_or(MATCH_ALL_FILTER)
    }

    /// Identifier of the search: `base/scope/filter`
    pub fn id(&self) -> String {
        format!("{}/{}/{}", self.base_dn, self.scope, self.effective_filter())
    }
}

/// Result of a search
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchData {
    /// Identifier of the search
    pub id: String,
    /// Attributes of every returned entry, `objectClass` included, in server order
    pub results: Vec<AttributeMap>,
}

/// Run a search
pub async fn search(directory: &dyn Directory, query: &SearchQuery) -> Result<SearchData> {
    let mut attributes = vec![ALL_USER_ATTRIBUTES.to_string()];
    attributes.extend(query.additional_attributes.iter().cloned());

    let entries = directory
        .search(
            &query.base_dn,
            query.scope,
            query.effective_filter(),
            &attributes,
        )
        .await?;
    debug!("Search {} returned {} entries", query.id(), entries.len());

    Ok(SearchData {
        id: query.id(),
        results: entries.into_iter().map(|entry| entry.attributes).collect(),
    })
}
