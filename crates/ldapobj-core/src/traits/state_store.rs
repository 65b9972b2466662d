// # State Store Trait
//
// Defines the interface for persistent state management.
//
// ## Purpose
//
// The state store remembers, per managed resource name:
// - The object state recorded after the last successful lifecycle call
// - When it was recorded
//
// The next update diffs against this record, and `destroy`/`refresh` use it
// to find the object's DN.
//
// ## Implementations
//
// - File-based: versioned JSON file
// - In-memory: for tests and embedding

use async_trait::async_trait;

use crate::config::StateStoreConfig;
use crate::model::ObjectState;

/// State record for one managed object
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct StateRecord {
    /// The recorded object state
    pub state: ObjectState,
    /// Timestamp of the last lifecycle call that produced `state`
    pub last_updated: chrono::DateTime<chrono::Utc>,
}

impl StateRecord {
    /// Create a new state record stamped with the current time
    pub fn new(state: ObjectState) -> Self {
        Self {
            state,
            last_updated: chrono::Utc::now(),
        }
    }
}

/// Trait for state store implementations
///
/// # Thread Safety
///
/// All methods must be safe to call concurrently from multiple tasks.
///
/// # Trust Level: Trusted (Core Component)
///
/// ## Allowed Capabilities
/// - ✅ Perform I/O for persistent storage
/// - ✅ Implement locking for thread safety
///
/// ## Forbidden Capabilities
/// - ❌ Talk to the directory (owned by `Directory`)
/// - ❌ Decide what to change (owned by the diff engine)
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Get the recorded object state for a resource
    ///
    /// # Returns
    ///
    /// - `Ok(Some(ObjectState))`: The recorded state
    /// - `Ok(None)`: Nothing recorded
    /// - `Err(Error)`: Storage error
    async fn get_state(&self, name: &str) -> Result<Option<ObjectState>, crate::Error>;

    /// Get the full state record, including when it was recorded
    async fn get_record(&self, name: &str) -> Result<Option<StateRecord>, crate::Error>;

    /// Record a new object state for a resource (creates or replaces)
    async fn set_state(&self, name: &str, state: ObjectState) -> Result<(), crate::Error>;

    /// Delete a state record
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Successfully deleted (or didn't exist)
    /// - `Err(Error)`: Storage error
    async fn delete_record(&self, name: &str) -> Result<(), crate::Error>;

    /// List all resource names in the store
    async fn list_records(&self) -> Result<Vec<String>, crate::Error>;

    /// Persist any pending changes
    async fn flush(&self) -> Result<(), crate::Error>;
}

/// Helper trait for constructing state stores from configuration
#[async_trait]
pub trait StateStoreFactory: Send + Sync {
    /// Create a StateStore instance from configuration
    async fn create(&self, config: &StateStoreConfig) -> Result<Box<dyn StateStore>, crate::Error>;
}
