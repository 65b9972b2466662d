//! Plan adjustment and planned actions
//!
//! Adjustment keeps ignored attributes out of the rendered plan: whatever the
//! configuration says, an ignored attribute is planned with its last recorded
//! value.

use crate::diff::diff;
use crate::model::{DesiredState, MutationOp, ObjectState};
use serde::Serialize;

/// Force every ignored attribute of `planned` back to its recorded value
///
/// The ignore list consulted is the planned one. An ignored attribute with
/// no recorded value is dropped from the plan.
///
/// Returns `planned` unchanged when nothing is recorded yet (first create)
/// or when there is no plan (deletion).
pub fn adjust_plan(prior: Option<&ObjectState>, planned: Option<DesiredState>) -> Option<DesiredState> {
    let Some(prior) = prior else {
        return planned;
    };
    let mut planned = planned?;

    let ignored: Vec<String> = planned.ignore_changes.iter().map(str::to_string).collect();
    for attribute_type in ignored {
        match prior.attributes.get(&attribute_type) {
            Some(values) => {
                planned.attributes.insert(attribute_type, values.clone());
            }
            None => {
                planned.attributes.remove(&attribute_type);
            }
        }
    }
    Some(planned)
}

/// What applying a desired state would do
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PlannedAction {
    /// Add a new entry
    Create,
    /// Modify the existing entry
    Update {
        /// Operations that would be sent
        operations: Vec<MutationOp>,
    },
    /// Delete the entry at `old_dn` and add one at `new_dn`
    Replace {
        /// DN that would be deleted
        old_dn: String,
        /// DN that would be added
        new_dn: String,
    },
    /// Already converged
    NoOp,
}

impl PlannedAction {
    /// Decide the action for an (already adjusted) desired state
    pub fn decide(prior: Option<&ObjectState>, desired: &DesiredState) -> Self {
        let Some(prior) = prior else {
            return PlannedAction::Create;
        };
        if prior.dn != desired.dn {
            return PlannedAction::Replace {
                old_dn: prior.dn.clone(),
                new_dn: desired.dn.clone(),
            };
        }
        let ignore = prior.ignore_changes.union(&desired.ignore_changes);
        let operations = diff(&prior.to_object(), &desired.to_object(), &ignore);
        if operations.is_empty() {
            PlannedAction::NoOp
        } else {
            PlannedAction::Update { operations }
        }
    }

    /// Whether applying would change the directory
    pub fn has_changes(&self) -> bool {
        !matches!(self, PlannedAction::NoOp)
    }

    /// Copy with sensitive attribute values redacted
    pub fn masked(&self, sensitive_attributes: &[String]) -> Self {
        match self {
            PlannedAction::Update { operations } => PlannedAction::Update {
                operations: operations
                    .iter()
                    .map(|op| op.masked(sensitive_attributes))
                    .collect(),
            },
            other => other.clone(),
        }
    }
}
