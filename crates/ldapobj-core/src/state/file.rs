// # File State Store
//
// File-based implementation of StateStore with crash recovery.
//
// ## Purpose
//
// Remembers what each managed object looked like after the last successful
// lifecycle call, across process restarts. Updates are diffed against this
// record, so losing it turns the next apply into a create.
//
// ## Crash Recovery
//
// - Atomic writes: Uses write-then-rename for atomicity
// - Corruption detection: Validates JSON on load
// - Automatic backup: Keeps .backup of last known good state
// - Recovery: Falls back to backup if corruption detected
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "records": {
//     "test": {
//       "state": {
//         "id": "cn=test,dc=example,dc=com",
//         "dn": "cn=test,dc=example,dc=com",
//         "object_classes": ["person"],
//         "attributes": { "sn": ["test"] },
//         "ignore_changes": ["userPassword"]
//       },
//       "last_updated": "2025-01-09T12:00:00Z"
//     }
//   }
// }
// ```

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use crate::Error;
use crate::config::StateStoreConfig;
use crate::model::ObjectState;
use crate::traits::state_store::{StateRecord, StateStore, StateStoreFactory};

/// State file format version
const STATE_FILE_VERSION: &str = "1.0";

/// File-based state store with crash recovery
///
/// Every mutation is written through to disk before the call returns.
///
/// # Example
///
/// ```rust,no_run
/// use ldapobj_core::state::FileStateStore;
/// use ldapobj_core::traits::state_store::StateStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileStateStore::new("/var/lib/ldapobj/state.json").await?;
///     for name in store.list_records().await? {
///         println!("{}", name);
///     }
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct FileStateStore {
    path: PathBuf,
    state: Arc<RwLock<FileState>>,
}

#[derive(Debug)]
struct FileState {
    records: BTreeMap<String, StateRecord>,
    dirty: bool,
}

/// Serializable state file format
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct StateFileFormat {
    version: String,
    records: BTreeMap<String, StateRecord>,
}

impl FileStateStore {
    /// Create or load a file state store
    ///
    /// This will:
    /// 1. Create parent directories if needed
    /// 2. Try to load the existing state file
    /// 3. If it is corrupted, try to load from backup
    /// 4. If both fail, start with empty state
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).await.map_err(|e| {
                Error::config(format!(
                    "Failed to create state directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let records = Self::load_state_with_recovery(&path).await?;

        Ok(Self {
            path,
            state: Arc::new(RwLock::new(FileState {
                records,
                dirty: false,
            })),
        })
    }

    /// Path of the state file
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load_state_with_recovery(
        path: &Path,
    ) -> Result<BTreeMap<String, StateRecord>, Error> {
        let err = match Self::load_state(path).await {
            Ok(records) => {
                tracing::debug!("Loaded state from file: {} records", records.len());
                return Ok(records);
            }
            Err(err @ LoadError::Corrupted(_)) => err,
            Err(LoadError::Unreadable(err)) => return Err(err),
        };

        tracing::warn!(
            "State file appears corrupted: {}. Attempting recovery from backup.",
            err
        );

        let backup_path = Self::backup_path(path);
        if !backup_path.exists() {
            tracing::warn!("No backup file found. Starting with empty state.");
            return Ok(BTreeMap::new());
        }

        match Self::load_state(&backup_path).await {
            Ok(records) => {
                tracing::info!("Recovered state from backup: {} records", records.len());
                if let Err(restore_err) = Self::restore_from_backup(path, &backup_path).await {
                    tracing::error!(
                        "Failed to restore state file from backup: {}",
                        restore_err
                    );
                }
                Ok(records)
            }
            Err(backup_err) => {
                tracing::error!(
                    "Backup also corrupted: {}. Starting with empty state.",
                    backup_err
                );
                Ok(BTreeMap::new())
            }
        }
    }

    async fn load_state(path: &Path) -> Result<BTreeMap<String, StateRecord>, LoadError> {
        if !path.exists() {
            tracing::debug!("State file does not exist: {}", path.display());
            return Ok(BTreeMap::new());
        }

        let content = fs::read_to_string(path).await.map_err(|e| {
            LoadError::Unreadable(Error::state_store(format!(
                "Failed to read state file {}: {}",
                path.display(),
                e
            )))
        })?;

        let state_file: StateFileFormat = serde_json::from_str(&content).map_err(|e| {
            LoadError::Corrupted(Error::state_store(format!(
                "Failed to parse state file {}: {}",
                path.display(),
                e
            )))
        })?;

        if state_file.version != STATE_FILE_VERSION {
            tracing::warn!(
                "State file version mismatch: expected {}, got {}. \
                Attempting to load anyway.",
                STATE_FILE_VERSION,
                state_file.version
            );
        }

        Ok(state_file.records)
    }

    /// Write state to file atomically
    async fn write_state(&self) -> Result<(), Error> {
        let mut state_guard = self.state.write().await;

        let state_file = StateFileFormat {
            version: STATE_FILE_VERSION.to_string(),
            records: state_guard.records.clone(),
        };
        let json = serde_json::to_string_pretty(&state_file)
            .map_err(|e| Error::state_store(format!("Failed to serialize state: {}", e)))?;

        let temp_path = self.temp_path();
        {
            let mut file = fs::File::create(&temp_path).await.map_err(|e| {
                Error::state_store(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
            file.write_all(json.as_bytes()).await.map_err(|e| {
                Error::state_store(format!(
                    "Failed to write to temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
            file.flush().await.map_err(|e| {
                Error::state_store(format!(
                    "Failed to flush temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
        }

        if self.path.exists() {
            let backup_path = Self::backup_path(&self.path);
            if let Err(e) = fs::copy(&self.path, &backup_path).await {
                tracing::warn!("Failed to create backup: {}", e);
            }
        }

        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::state_store(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        state_guard.dirty = false;
        tracing::trace!("State written to file: {}", self.path.display());
        Ok(())
    }

    async fn restore_from_backup(path: &Path, backup_path: &Path) -> Result<(), Error> {
        fs::copy(backup_path, path).await.map_err(|e| {
            Error::state_store(format!(
                "Failed to restore from backup {} to {}: {}",
                backup_path.display(),
                path.display(),
                e
            ))
        })?;

        tracing::info!("Restored state file from backup");
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        temp
    }

    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }

    async fn mutate(&self, apply: impl FnOnce(&mut BTreeMap<String, StateRecord>)) -> Result<(), Error> {
        {
            let mut state_guard = self.state.write().await;
            apply(&mut state_guard.records);
            state_guard.dirty = true;
        }
        self.write_state().await
    }
}

/// Why a state file could not be loaded
#[derive(Debug, thiserror::Error)]
enum LoadError {
    /// The file exists but does not parse
    #[error("{0}")]
    Corrupted(Error),
    /// The file could not be read at all
    #[error("{0}")]
    Unreadable(Error),
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn get_state(&self, name: &str) -> Result<Option<ObjectState>, Error> {
        let state_guard = self.state.read().await;
        Ok(state_guard.records.get(name).map(|r| r.state.clone()))
    }

    async fn get_record(&self, name: &str) -> Result<Option<StateRecord>, Error> {
        let state_guard = self.state.read().await;
        Ok(state_guard.records.get(name).cloned())
    }

    async fn set_state(&self, name: &str, state: ObjectState) -> Result<(), Error> {
        let record = StateRecord::new(state);
        self.mutate(|records| {
            records.insert(name.to_string(), record);
        })
        .await
    }

    async fn delete_record(&self, name: &str) -> Result<(), Error> {
        self.mutate(|records| {
            records.remove(name);
        })
        .await
    }

    async fn list_records(&self) -> Result<Vec<String>, Error> {
        let state_guard = self.state.read().await;
        Ok(state_guard.records.keys().cloned().collect())
    }

    async fn flush(&self) -> Result<(), Error> {
        let dirty = self.state.read().await.dirty;
        if dirty { self.write_state().await } else { Ok(()) }
    }
}

/// Factory for [`FileStateStore`]
#[derive(Debug, Clone, Copy, Default)]
pub struct FileStateStoreFactory;

#[async_trait]
impl StateStoreFactory for FileStateStoreFactory {
    async fn create(&self, config: &StateStoreConfig) -> Result<Box<dyn StateStore>, Error> {
        match config {
            StateStoreConfig::File { path } => Ok(Box::new(FileStateStore::new(path).await?)),
            other => Err(Error::config(format!(
                "file state store factory cannot build a {} store",
                other.type_name()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DesiredState;
    use tempfile::tempdir;

    fn state(sn: &str) -> ObjectState {
        ObjectState::from_desired(
            &DesiredState::new("cn=test,dc=example,dc=com", ["person"])
                .with_attribute("sn", [sn])
                .with_ignored("userPassword"),
        )
    }

    #[tokio::test]
    async fn test_file_store_basic() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");

        let store = FileStateStore::new(&path).await.unwrap();
        assert!(store.list_records().await.unwrap().is_empty());

        store.set_state("test", state("one")).await.unwrap();
        assert!(path.exists());

        // A new instance sees the persisted record
        let store2 = FileStateStore::new(&path).await.unwrap();
        let retrieved = store2.get_state("test").await.unwrap().unwrap();
        assert_eq!(retrieved, state("one"));
        assert!(retrieved.ignore_changes.is_ignored("userPassword"));
    }

    #[tokio::test]
    async fn test_file_store_corruption_recovery() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");

        let store = FileStateStore::new(&path).await.unwrap();
        store.set_state("test", state("one")).await.unwrap();
        // Second write leaves the first one in the backup
        store.set_state("test", state("two")).await.unwrap();

        let backup_path = FileStateStore::backup_path(&path);
        assert!(backup_path.exists(), "Backup file should exist after write");

        fs::write(&path, b"corrupted json data").await.unwrap();

        let store2 = FileStateStore::new(&path).await.unwrap();
        let recovered = store2.get_state("test").await.unwrap().unwrap();
        assert_eq!(recovered.attributes["sn"], vec!["one"]);
    }

    #[tokio::test]
    async fn test_file_store_delete_persists() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");

        let store = FileStateStore::new(&path).await.unwrap();
        store.set_state("a", state("one")).await.unwrap();
        store.set_state("b", state("two")).await.unwrap();
        store.delete_record("a").await.unwrap();

        let store2 = FileStateStore::new(&path).await.unwrap();
        assert_eq!(store2.list_records().await.unwrap(), vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn test_factory_builds_file_store() {
        let dir = tempdir().unwrap();
        let config = StateStoreConfig::File {
            path: dir.path().join("state.json").display().to_string(),
        };

        let store = FileStateStoreFactory.create(&config).await.unwrap();
        store.set_state("test", state("one")).await.unwrap();
        assert!(store.get_state("test").await.unwrap().is_some());
    }
}
