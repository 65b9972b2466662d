//! Test doubles and common utilities for contract tests
//!
//! The doubles wrap a [`MemoryDirectory`] so every test works against real
//! entries, while recording each request and injecting failures on demand.

#![allow(dead_code)]

use async_trait::async_trait;
use ldapobj_core::directory::MemoryDirectory;
use ldapobj_core::error::{Error, Result, WriteOperation};
use ldapobj_core::model::{AttributeMap, DirectoryEntry, MutationOp, OBJECT_CLASS, SearchScope};
use ldapobj_core::traits::Directory;
use std::sync::{Arc, Mutex};

/// One request seen by a [`RecordingDirectory`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryCall {
    Search { base_dn: String },
    Add { dn: String, attributes: AttributeMap },
    Modify { dn: String, operations: Vec<MutationOp> },
    Delete { dn: String },
}

#[derive(Debug, Default)]
struct Faults {
    fail_delete: bool,
    fail_modify_of: Option<String>,
    duplicate_search_results: bool,
}

/// A directory that records every request and can be told to fail
///
/// Clones share the recorded calls, the fault settings and the entries.
#[derive(Debug, Clone, Default)]
pub struct RecordingDirectory {
    inner: MemoryDirectory,
    calls: Arc<Mutex<Vec<DirectoryCall>>>,
    faults: Arc<Mutex<Faults>>,
}

impl RecordingDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// The backing memory directory
    pub fn memory(&self) -> &MemoryDirectory {
        &self.inner
    }

    /// Every request so far, in order
    pub fn calls(&self) -> Vec<DirectoryCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Write requests only (searches dropped)
    pub fn writes(&self) -> Vec<DirectoryCall> {
        self.calls()
            .into_iter()
            .filter(|call| !matches!(call, DirectoryCall::Search { .. }))
            .collect()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Reject every delete request
    pub fn fail_deletes(&self) {
        self.faults.lock().unwrap().fail_delete = true;
    }

    /// Reject modify requests touching `attribute_type`
    pub fn fail_modify_of(&self, attribute_type: &str) {
        self.faults.lock().unwrap().fail_modify_of = Some(attribute_type.to_string());
    }

    /// Return every search result twice
    pub fn duplicate_search_results(&self) {
        self.faults.lock().unwrap().duplicate_search_results = true;
    }

    fn record(&self, call: DirectoryCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl Directory for RecordingDirectory {
    async fn search(
        &self,
        base_dn: &str,
        scope: SearchScope,
        filter: &str,
        attributes: &[String],
    ) -> Result<Vec<DirectoryEntry>> {
        self.record(DirectoryCall::Search {
            base_dn: base_dn.to_string(),
        });
        let mut entries = self.inner.search(base_dn, scope, filter, attributes).await?;
        if self.faults.lock().unwrap().duplicate_search_results {
            entries.extend(entries.clone());
        }
        Ok(entries)
    }

    async fn add(&self, dn: &str, attributes: &AttributeMap) -> Result<()> {
        self.record(DirectoryCall::Add {
            dn: dn.to_string(),
            attributes: attributes.clone(),
        });
        self.inner.add(dn, attributes).await
    }

    async fn modify(&self, dn: &str, operations: &[MutationOp]) -> Result<()> {
        self.record(DirectoryCall::Modify {
            dn: dn.to_string(),
            operations: operations.to_vec(),
        });
        let failing = self.faults.lock().unwrap().fail_modify_of.clone();
        if let Some(attribute_type) = failing
            && operations.iter().any(|op| op.attribute_type() == attribute_type)
        {
            return Err(Error::directory_write(
                WriteOperation::Modify,
                dn,
                format!("Constraint Violation: {}", attribute_type),
            ));
        }
        self.inner.modify(dn, operations).await
    }

    async fn delete(&self, dn: &str) -> Result<()> {
        self.record(DirectoryCall::Delete { dn: dn.to_string() });
        if self.faults.lock().unwrap().fail_delete {
            return Err(Error::directory_write(
                WriteOperation::Delete,
                dn,
                "Insufficient Access Rights",
            ));
        }
        self.inner.delete(dn).await
    }

    fn directory_name(&self) -> &'static str {
        "recording"
    }
}

/// Build an attribute map from string slices
pub fn attributes(pairs: &[(&str, &[&str])]) -> AttributeMap {
    pairs
        .iter()
        .map(|(name, values)| {
            (
                name.to_string(),
                values.iter().map(|v| v.to_string()).collect(),
            )
        })
        .collect()
}

/// Seed an entry with the given classes and attributes
pub async fn seed(directory: &MemoryDirectory, dn: &str, classes: &[&str], pairs: &[(&str, &[&str])]) {
    let mut entry = DirectoryEntry::new(dn).with_attribute(OBJECT_CLASS, classes.iter().copied());
    entry.attributes.extend(attributes(pairs));
    directory.seed(entry).await;
}
