//! Reconciliation engine
//!
//! The ReconcileEngine is responsible for:
//! - Refreshing the recorded state of a managed object from the directory
//! - Adjusting plans so ignored attributes never show a diff
//! - Driving the lifecycle controller (create/update/delete/import)
//! - Persisting the resulting state after every successful call
//!
//! ## Architecture
//!
//! ```text
//!                     desired state (manifest)
//!                               │
//!                               ▼
//!                      ┌─────────────────┐
//!                      │ ReconcileEngine │
//!                      └─────────────────┘
//!                               │
//!         ┌─────────────────────┼─────────────────────┐
//!         │                     │                     │
//!         ▼                     ▼                     ▼
//! ┌──────────────┐     ┌─────────────────┐     ┌─────────────┐
//! │  StateStore  │     │    Lifecycle    │     │   Events    │
//! │ (recorded)   │     │ diff + requests │     │  (notify)   │
//! └──────────────┘     └─────────────────┘     └─────────────┘
//!                               │
//!                               ▼
//!                      ┌─────────────────┐
//!                      │    Directory    │
//!                      └─────────────────┘
//! ```
//!
//! ## Apply Flow
//!
//! 1. Load the recorded state; if there is none, create the object
//! 2. Refresh it from the directory; if the object vanished, create it
//! 3. Adjust the desired state for ignored attributes
//! 4. Update (modify in place, or recreate when the DN changed)
//! 5. Record the resulting state and emit an event
//!
//! Nothing is retried. Every directory error ends the call and is returned.

pub mod lifecycle;
pub mod plan;
pub mod query;

pub use lifecycle::{ApplyOutcome, Change, Lifecycle};
pub use plan::{PlannedAction, adjust_plan};
pub use query::{ObjectData, SearchData, SearchQuery};

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::ignore::IgnoreSet;
use crate::model::{DesiredState, MutationOp, ObjectState};
use crate::traits::{Directory, StateRecord, StateStore};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Events emitted by the ReconcileEngine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// A new entry was added
    ObjectCreated {
        /// Resource name
        name: String,
        /// DN of the entry
        dn: String,
    },

    /// Modify requests were sent (sensitive values redacted)
    ObjectUpdated {
        /// Resource name
        name: String,
        /// DN of the entry
        dn: String,
        /// Operations applied
        operations: Vec<MutationOp>,
    },

    /// Apply found nothing to change
    ObjectUnchanged {
        /// Resource name
        name: String,
        /// DN of the entry
        dn: String,
    },

    /// The DN changed and the object was deleted and added again
    ObjectRecreated {
        /// Resource name
        name: String,
        /// DN of the deleted entry
        old_dn: String,
        /// DN of the new entry
        new_dn: String,
    },

    /// The entry was deleted and its record dropped
    ObjectDeleted {
        /// Resource name
        name: String,
        /// DN of the deleted entry
        dn: String,
    },

    /// An existing entry was adopted
    ObjectImported {
        /// Resource name
        name: String,
        /// DN of the entry
        dn: String,
    },

    /// The recorded state was refreshed from the directory
    ObjectRefreshed {
        /// Resource name
        name: String,
        /// DN of the entry
        dn: String,
    },

    /// A refresh found the entry gone; its record was dropped
    ObjectVanished {
        /// Resource name
        name: String,
        /// DN that no longer resolves
        dn: String,
    },

    /// A lifecycle call failed
    OperationFailed {
        /// Resource name
        name: String,
        /// Error message, as returned to the caller
        error: String,
    },
}

/// Reconciliation engine
///
/// Owns one directory connection and one state store. Calls for different
/// resource names may run concurrently; calls for the same name must be
/// serialized by the caller.
///
/// ## Lifecycle
///
/// 1. Create with [`ReconcileEngine::new()`]
/// 2. Call [`plan`](Self::plan), [`apply`](Self::apply),
///    [`refresh`](Self::refresh), [`destroy`](Self::destroy) or
///    [`import`](Self::import) per resource
/// 3. [`flush`](Self::flush) before exiting
///
/// ## Load Resistance
///
/// Events go to a bounded channel. When it is full, new events are dropped
/// with a warning instead of blocking the engine.
pub struct ReconcileEngine {
    /// Directory connection
    directory: Box<dyn Directory>,

    /// Recorded state of managed objects
    state_store: Box<dyn StateStore>,

    /// Engine settings
    config: EngineConfig,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<EngineEvent>,
}

impl ReconcileEngine {
    /// Create a new engine
    ///
    /// # Parameters
    ///
    /// - `directory`: Directory connection
    /// - `state_store`: State store implementation
    /// - `config`: Engine settings
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields engine events
    pub fn new(
        directory: Box<dyn Directory>,
        state_store: Box<dyn StateStore>,
        config: EngineConfig,
    ) -> Result<(Self, mpsc::Receiver<EngineEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.event_channel_capacity);

        let engine = Self {
            directory,
            state_store,
            config,
            event_tx: tx,
        };

        Ok((engine, rx))
    }

    /// Directory the engine talks to
    pub fn directory(&self) -> &dyn Directory {
        self.directory.as_ref()
    }

    /// Engine settings
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn lifecycle(&self) -> Lifecycle<'_> {
        Lifecycle::new(self.directory.as_ref(), &self.config)
    }

    /// Show what applying `desired` under `name` would do, without writing
    ///
    /// The recorded state is refreshed from the directory first; the refreshed
    /// state is not persisted.
    pub async fn plan(&self, name: &str, desired: DesiredState) -> Result<PlannedAction> {
        let prior = self.observed_state(name).await?;
        let adjusted = adjust_plan(prior.as_ref(), Some(desired.clone())).unwrap_or(desired);
        let action = PlannedAction::decide(prior.as_ref(), &adjusted);
        debug!("Plan for {}: {:?}", name, action.masked(&self.config.sensitive_attributes));
        Ok(action)
    }

    /// Bring the object managed under `name` to `desired`
    ///
    /// # Returns
    ///
    /// - `Ok(ApplyOutcome)`: What was done and the recorded state
    /// - `Err(Error)`: The first directory or state store error
    pub async fn apply(&self, name: &str, desired: DesiredState) -> Result<ApplyOutcome> {
        let result = self.apply_inner(name, desired).await;
        self.report_failure(name, result)
    }

    async fn apply_inner(&self, name: &str, desired: DesiredState) -> Result<ApplyOutcome> {
        desired.validate()?;
        let lifecycle = self.lifecycle();

        let outcome = match self.observed_state(name).await? {
            None => ApplyOutcome {
                state: lifecycle.create(&desired).await?,
                change: Change::Created,
            },
            // A new DN means a fresh add, which sends ignored attributes too
            Some(prior) if prior.dn != desired.dn => lifecycle.update(&prior, &desired).await?,
            Some(prior) => {
                let adjusted =
                    adjust_plan(Some(&prior), Some(desired.clone())).unwrap_or(desired);
                lifecycle.update(&prior, &adjusted).await?
            }
        };

        self.state_store
            .set_state(name, outcome.state.clone())
            .await?;

        let dn = outcome.state.dn.clone();
        match &outcome.change {
            Change::Created => {
                self.emit_event(EngineEvent::ObjectCreated {
                    name: name.to_string(),
                    dn,
                });
            }
            Change::Modified { operations } => {
                self.emit_event(EngineEvent::ObjectUpdated {
                    name: name.to_string(),
                    dn,
                    operations: operations
                        .iter()
                        .map(|op| op.masked(&self.config.sensitive_attributes))
                        .collect(),
                });
            }
            Change::Recreated { old_dn } => {
                self.emit_event(EngineEvent::ObjectRecreated {
                    name: name.to_string(),
                    old_dn: old_dn.clone(),
                    new_dn: dn,
                });
            }
            Change::Unchanged => {
                self.emit_event(EngineEvent::ObjectUnchanged {
                    name: name.to_string(),
                    dn,
                });
            }
        }

        Ok(outcome)
    }

    /// Re-read the object managed under `name` and record what was found
    ///
    /// # Returns
    ///
    /// - `Ok(Some(ObjectState))`: The refreshed state
    /// - `Ok(None)`: The object is gone; its record was dropped so the next
    ///   apply creates it again
    /// - `Err(Error::NotFound)`: Nothing is recorded under `name`
    pub async fn refresh(&self, name: &str) -> Result<Option<ObjectState>> {
        let result = self.refresh_inner(name).await;
        self.report_failure(name, result)
    }

    async fn refresh_inner(&self, name: &str) -> Result<Option<ObjectState>> {
        let recorded = self.recorded(name).await?;

        match self
            .lifecycle()
            .read(&recorded.dn, &recorded.ignore_changes)
            .await
        {
            Ok(state) => {
                self.state_store.set_state(name, state.clone()).await?;
                self.emit_event(EngineEvent::ObjectRefreshed {
                    name: name.to_string(),
                    dn: state.dn.clone(),
                });
                Ok(Some(state))
            }
            Err(e) if e.is_not_found_or_ambiguous() => {
                warn!("{} ({}) is gone: {}", name, recorded.dn, e);
                self.state_store.delete_record(name).await?;
                self.emit_event(EngineEvent::ObjectVanished {
                    name: name.to_string(),
                    dn: recorded.dn,
                });
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Delete the object managed under `name` and drop its record
    ///
    /// When the delete fails the record is kept: the object is presumed to
    /// still exist.
    pub async fn destroy(&self, name: &str) -> Result<()> {
        let result = self.destroy_inner(name).await;
        self.report_failure(name, result)
    }

    async fn destroy_inner(&self, name: &str) -> Result<()> {
        let recorded = self.recorded(name).await?;
        self.lifecycle().delete(&recorded.dn).await?;
        self.state_store.delete_record(name).await?;
        self.emit_event(EngineEvent::ObjectDeleted {
            name: name.to_string(),
            dn: recorded.dn,
        });
        Ok(())
    }

    /// Start managing the existing object at `dn` under `name`
    pub async fn import(
        &self,
        name: &str,
        dn: &str,
        ignore_changes: Option<IgnoreSet>,
    ) -> Result<ObjectState> {
        let result = self.import_inner(name, dn, ignore_changes).await;
        self.report_failure(name, result)
    }

    async fn import_inner(
        &self,
        name: &str,
        dn: &str,
        ignore_changes: Option<IgnoreSet>,
    ) -> Result<ObjectState> {
        if let Some(existing) = self.state_store.get_state(name).await? {
            return Err(Error::invalid_input(format!(
                "{} already manages {}",
                name, existing.dn
            )));
        }

        let state = self.lifecycle().import(dn, ignore_changes).await?;
        self.state_store.set_state(name, state.clone()).await?;
        self.emit_event(EngineEvent::ObjectImported {
            name: name.to_string(),
            dn: state.dn.clone(),
        });
        Ok(state)
    }

    /// Recorded state for `name`, without touching the directory
    pub async fn state(&self, name: &str) -> Result<Option<ObjectState>> {
        self.state_store.get_state(name).await
    }

    /// Recorded state for `name` together with when it was recorded
    pub async fn record(&self, name: &str) -> Result<Option<StateRecord>> {
        self.state_store.get_record(name).await
    }

    /// Names of every managed object
    pub async fn recorded_names(&self) -> Result<Vec<String>> {
        self.state_store.list_records().await
    }

    /// Look up an object without managing it
    pub async fn lookup_object(&self, dn: &str, additional_attributes: &[String]) -> Result<ObjectData> {
        query::lookup_object(self.directory.as_ref(), dn, additional_attributes).await
    }

    /// Search the directory
    pub async fn search(&self, query: &SearchQuery) -> Result<SearchData> {
        query::search(self.directory.as_ref(), query).await
    }

    /// Persist pending state
    pub async fn flush(&self) -> Result<()> {
        self.state_store.flush().await?;
        info!("State flushed");
        Ok(())
    }

    async fn recorded(&self, name: &str) -> Result<ObjectState> {
        self.state_store
            .get_state(name)
            .await?
            .ok_or_else(|| Error::not_found(format!("no recorded state for {}", name)))
    }

    /// Recorded state refreshed from the directory, `None` when there is
    /// nothing recorded or the object is gone
    async fn observed_state(&self, name: &str) -> Result<Option<ObjectState>> {
        let Some(recorded) = self.state_store.get_state(name).await? else {
            return Ok(None);
        };
        match self
            .lifecycle()
            .read(&recorded.dn, &recorded.ignore_changes)
            .await
        {
            Ok(state) => Ok(Some(state)),
            Err(e) if e.is_not_found_or_ambiguous() => {
                warn!("{} ({}) is gone and will be created again", name, recorded.dn);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn report_failure<T>(&self, name: &str, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            error!("{}: {}", name, e);
            self.emit_event(EngineEvent::OperationFailed {
                name: name.to_string(),
                error: e.to_string(),
            });
        }
        result
    }

    /// Emit an engine event
    ///
    /// # Parameters
    ///
    /// - `event`: The event to emit
    fn emit_event(&self, event: EngineEvent) {
        if self.event_tx.try_send(event).is_err() {
            warn!(
                "Event channel full, dropping event. Consider increasing event_channel_capacity."
            );
        }
    }
}
