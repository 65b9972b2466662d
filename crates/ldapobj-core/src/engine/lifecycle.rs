//! Object lifecycle controller
//!
//! Create, read, update, delete and import for one directory object. Every
//! call works against the directory handle it was built with and returns the
//! [`ObjectState`] to record; persisting it is the caller's job.
//!
//! ## States
//!
//! ```text
//!            create                     update (same DN)
//!   Absent ─────────▶ Present ◀───────────────────┐
//!     ▲                  │  └──────────────────────┘
//!     └──────────────────┘
//!            delete
//! ```
//!
//! An update that changes the DN deletes the old entry and creates the new
//! one. If the delete fails, the create is never attempted.

use crate::accessor;
use crate::config::{EngineConfig, ModifyMode};
use crate::diagnostics::to_ldif;
use crate::diff::diff;
use crate::error::Result;
use crate::ignore::IgnoreSet;
use crate::model::{DesiredState, DirectoryObject, MutationOp, ObjectState};
use crate::traits::Directory;
use serde::Serialize;
use std::slice;
use tracing::{debug, info, warn};

/// What an update did to the directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum Change {
    /// The entry was added
    Created,
    /// Modify requests were sent
    Modified {
        /// Operations applied, in order
        operations: Vec<MutationOp>,
    },
    /// The DN changed: the old entry was deleted and the new one added
    Recreated {
        /// DN of the deleted entry
        old_dn: String,
    },
    /// Nothing to do
    Unchanged,
}

impl Change {
    /// Copy with sensitive attribute values redacted
    pub fn masked(&self, sensitive_attributes: &[String]) -> Self {
        match self {
            Change::Modified { operations } => Change::Modified {
                operations: operations
                    .iter()
                    .map(|op| op.masked(sensitive_attributes))
                    .collect(),
            },
            other => other.clone(),
        }
    }
}

/// Result of an update
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyOutcome {
    /// State to record
    pub state: ObjectState,
    /// What was sent to the directory
    pub change: Change,
}

/// Lifecycle operations bound to one directory connection
pub struct Lifecycle<'a> {
    directory: &'a dyn Directory,
    config: &'a EngineConfig,
}

impl<'a> Lifecycle<'a> {
    /// Bind the lifecycle operations to a directory and engine settings
    pub fn new(directory: &'a dyn Directory, config: &'a EngineConfig) -> Self {
        Self { directory, config }
    }

    /// Add the desired object to the directory
    ///
    /// The add request carries `objectClass` and every desired attribute,
    /// ignored ones included. The recorded state leaves ignored attributes
    /// out, exactly as a read would.
    ///
    /// # Returns
    ///
    /// - `Ok(ObjectState)`: The state to record, with `id` set to the DN
    /// - `Err(Error::DirectoryWrite)`: The server rejected the add
    pub async fn create(&self, desired: &DesiredState) -> Result<ObjectState> {
        let object = desired.to_object();
        let entry = object.to_entry();

        debug!(
            "Adding entry:\n{}",
            to_ldif(&entry.dn, &entry.attributes, &self.config.sensitive_attributes)
        );
        self.directory.add(&entry.dn, &entry.attributes).await?;
        info!("Created {}", desired.dn);

        Ok(ObjectState::from_object(object, desired.ignore_changes.clone()))
    }

    /// Read the object at `dn`
    ///
    /// Attributes whose type is in `ignore_changes` are left out of the
    /// returned state. The DN is kept as given, not as the server spells it.
    ///
    /// # Returns
    ///
    /// - `Ok(ObjectState)`: The observed state
    /// - `Err(Error::NotFoundOrAmbiguous)`: The object is gone (or the DN is ambiguous)
    pub async fn read(&self, dn: &str, ignore_changes: &IgnoreSet) -> Result<ObjectState> {
        let mut object = accessor::fetch(self.directory, dn, &[]).await?;
        object.dn = dn.to_string();
        debug!("Read {} ({} attribute types)", dn, object.attributes.len());
        Ok(ObjectState::from_object(object, ignore_changes.clone()))
    }

    /// Bring the object from its recorded state to the desired one
    ///
    /// The diff ignores every attribute type listed in either the recorded
    /// or the desired ignore list.
    ///
    /// # Errors
    ///
    /// Any rejected request stops the update and is returned as is. Requests
    /// that already succeeded are not rolled back.
    pub async fn update(&self, prior: &ObjectState, desired: &DesiredState) -> Result<ApplyOutcome> {
        if prior.dn != desired.dn {
            warn!(
                "DN changed from {} to {}, recreating the object",
                prior.dn, desired.dn
            );
            self.delete(&prior.dn).await?;
            let state = self.create(desired).await?;
            return Ok(ApplyOutcome {
                state,
                change: Change::Recreated {
                    old_dn: prior.dn.clone(),
                },
            });
        }

        let ignore = prior.ignore_changes.union(&desired.ignore_changes);
        let operations = diff(&prior.to_object(), &desired.to_object(), &ignore);
        let state = updated_state(prior, desired);

        if operations.is_empty() {
            debug!("{} is up to date", desired.dn);
            return Ok(ApplyOutcome {
                state,
                change: Change::Unchanged,
            });
        }

        self.send_modifications(&desired.dn, &operations).await?;
        info!("Updated {} ({} operations)", desired.dn, operations.len());

        Ok(ApplyOutcome {
            state,
            change: Change::Modified { operations },
        })
    }

    /// Delete the entry at `dn`
    ///
    /// On failure the object is presumed to still exist.
    pub async fn delete(&self, dn: &str) -> Result<()> {
        debug!("Deleting {}", dn);
        self.directory.delete(dn).await?;
        info!("Deleted {}", dn);
        Ok(())
    }

    /// Adopt an existing object, starting from its DN only
    ///
    /// Without an ignore list every attribute is imported as managed. With
    /// one, ignored attributes are left out and the list is recorded.
    pub async fn import(&self, dn: &str, ignore_changes: Option<IgnoreSet>) -> Result<ObjectState> {
        let ignore_changes = ignore_changes.unwrap_or_default();
        let state = self.read(dn, &ignore_changes).await?;
        info!("Imported {}", dn);
        Ok(state)
    }

    async fn send_modifications(&self, dn: &str, operations: &[MutationOp]) -> Result<()> {
        for operation in operations {
            debug!(
                "Modifying {}: {}",
                dn,
                operation.masked(&self.config.sensitive_attributes)
            );
        }
        match self.config.modify_mode {
            ModifyMode::SingleRequest => self.directory.modify(dn, operations).await,
            ModifyMode::PerOperation => {
                for operation in operations {
                    self.directory.modify(dn, slice::from_ref(operation)).await?;
                }
                Ok(())
            }
        }
    }
}

/// The state an update leaves behind
///
/// Object classes only ever grow, so the recorded classes are the prior ones
/// followed by the newly added ones. Managed attributes come from `desired`,
/// except types the prior ignore list still covered: nothing was written for
/// those, so they stay unrecorded until the next read picks them up.
fn updated_state(prior: &ObjectState, desired: &DesiredState) -> ObjectState {
    let mut object_classes = prior.object_classes.clone();
    for class in &desired.object_classes {
        if !object_classes.contains(class) {
            object_classes.push(class.clone());
        }
    }
    let attributes = desired
        .attributes
        .iter()
        .filter(|(attribute_type, _)| !prior.ignore_changes.is_ignored(attribute_type))
        .map(|(attribute_type, values)| (attribute_type.clone(), values.clone()))
        .collect();
    let object = DirectoryObject {
        dn: desired.dn.clone(),
        object_classes,
        attributes,
    };
    ObjectState::from_object(object, desired.ignore_changes.clone())
}
