// # Memory State Store
//
// In-memory implementation of StateStore.
//
// ## Purpose
//
// Keeps object records for the lifetime of the process only. Useful for
// tests and for embedding the engine where the host persists state itself.
//
// ## Crash Behavior
//
// - All records are lost on restart/crash
// - The next apply sees no record and treats every object as new, so the
//   add request fails with "Entry Already Exists" for objects that survived;
//   use `import` to adopt them again

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::Error;
use crate::config::StateStoreConfig;
use crate::model::ObjectState;
use crate::traits::state_store::{StateRecord, StateStore, StateStoreFactory};

/// In-memory state store implementation
///
/// # Example
///
/// ```rust,no_run
/// use ldapobj_core::model::{DesiredState, ObjectState};
/// use ldapobj_core::state::MemoryStateStore;
/// use ldapobj_core::traits::state_store::StateStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MemoryStateStore::new();
///     let desired = DesiredState::new("cn=test,dc=example,dc=com", ["person"]);
///
///     store.set_state("test", ObjectState::from_desired(&desired)).await?;
///
///     let state = store.get_state("test").await?;
///     assert_eq!(state.map(|s| s.dn), Some(desired.dn));
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryStateStore {
    inner: Arc<RwLock<BTreeMap<String, StateRecord>>>,
}

impl MemoryStateStore {
    /// Create a new empty memory state store
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of records in the store
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Check if the store is empty
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// Clear all records from the store
    pub async fn clear(&self) {
        self.inner.write().await.clear();
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn get_state(&self, name: &str) -> Result<Option<ObjectState>, Error> {
        let guard = self.inner.read().await;
        Ok(guard.get(name).map(|record| record.state.clone()))
    }

    async fn get_record(&self, name: &str) -> Result<Option<StateRecord>, Error> {
        let guard = self.inner.read().await;
        Ok(guard.get(name).cloned())
    }

    async fn set_state(&self, name: &str, state: ObjectState) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        guard.insert(name.to_string(), StateRecord::new(state));
        Ok(())
    }

    async fn delete_record(&self, name: &str) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        guard.remove(name);
        Ok(())
    }

    async fn list_records(&self) -> Result<Vec<String>, Error> {
        let guard = self.inner.read().await;
        Ok(guard.keys().cloned().collect())
    }

    async fn flush(&self) -> Result<(), Error> {
        Ok(())
    }
}

/// Factory for [`MemoryStateStore`]
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryStateStoreFactory;

#[async_trait]
impl StateStoreFactory for MemoryStateStoreFactory {
    async fn create(&self, config: &StateStoreConfig) -> Result<Box<dyn StateStore>, Error> {
        match config {
            StateStoreConfig::Memory => Ok(Box::new(MemoryStateStore::new())),
            other => Err(Error::config(format!(
                "memory state store factory cannot build a {} store",
                other.type_name()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DesiredState;

    fn state(dn: &str) -> ObjectState {
        ObjectState::from_desired(&DesiredState::new(dn, ["person"]).with_attribute("sn", ["test"]))
    }

    #[tokio::test]
    async fn test_memory_store_basic() {
        let store = MemoryStateStore::new();
        assert!(store.is_empty().await);

        store.set_state("test", state("cn=test,dc=example,dc=com")).await.unwrap();
        assert_eq!(store.len().await, 1);

        let retrieved = store.get_state("test").await.unwrap().unwrap();
        assert_eq!(retrieved.id, "cn=test,dc=example,dc=com");
        assert_eq!(retrieved.attributes["sn"], vec!["test"]);

        store.delete_record("test").await.unwrap();
        assert!(store.get_state("test").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_store_list_is_sorted() {
        let store = MemoryStateStore::new();
        store.set_state("b", state("cn=b,dc=example,dc=com")).await.unwrap();
        store.set_state("a", state("cn=a,dc=example,dc=com")).await.unwrap();

        let names = store.list_records().await.unwrap();
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn test_factory_rejects_other_configs() {
        let factory = MemoryStateStoreFactory;
        assert!(factory.create(&StateStoreConfig::Memory).await.is_ok());

        let file = StateStoreConfig::File {
            path: "state.json".to_string(),
        };
        assert!(factory.create(&file).await.is_err());
    }
}
