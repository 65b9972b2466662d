//! Plugin-based directory registry
//!
//! The registry maps configuration type names to factories, so new directory
//! backends and state stores can be plugged in without touching the engine.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ldapobj_core::registry::DirectoryRegistry;
//! use ldapobj_core::config::DirectoryConfig;
//!
//! let registry = DirectoryRegistry::with_builtins();
//! ldapobj_ldap::register(&registry);
//!
//! let directory = registry.create_directory(&config.directory).await?;
//! let state_store = registry.create_state_store(&config.state_store).await?;
//! ```
//!
//! ## Registration
//!
//! Backends register themselves during initialization:
//!
//! ```rust,ignore
//! // In the ldapobj-ldap crate
//! pub fn register(registry: &DirectoryRegistry) {
//!     registry.register_directory("ldap", Box::new(LdapDirectoryFactory));
//! }
//! ```

use crate::config::{DirectoryConfig, StateStoreConfig};
use crate::directory::MemoryDirectoryFactory;
use crate::error::{Error, Result};
use crate::state::{FileStateStoreFactory, MemoryStateStoreFactory};
use crate::traits::{Directory, DirectoryFactory, StateStore, StateStoreFactory};
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Registry of directory and state store factories
///
/// ## Thread Safety
///
/// The registry uses interior mutability with RwLock, allowing concurrent
/// reads and exclusive writes. Locks are never held across an await.
#[derive(Default)]
pub struct DirectoryRegistry {
    /// Registered directory factories
    directories: RwLock<BTreeMap<String, Arc<dyn DirectoryFactory>>>,

    /// Registered state store factories
    state_stores: RwLock<BTreeMap<String, Arc<dyn StateStoreFactory>>>,
}

impl DirectoryRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the in-process backends registered
    ///
    /// - directories: `memory`
    /// - state stores: `memory`, `file`
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.register_directory("memory", Box::new(MemoryDirectoryFactory));
        registry.register_state_store("memory", Box::new(MemoryStateStoreFactory));
        registry.register_state_store("file", Box::new(FileStateStoreFactory));
        registry
    }

    /// Register a directory factory
    ///
    /// # Parameters
    ///
    /// - `name`: Directory type name (e.g., "ldap", "memory")
    /// - `factory`: Factory object for creating directory instances
    pub fn register_directory(&self, name: impl Into<String>, factory: Box<dyn DirectoryFactory>) {
        let mut directories = self
            .directories
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        directories.insert(name.into(), Arc::from(factory));
    }

    /// Register a state store factory
    ///
    /// # Parameters
    ///
    /// - `name`: State store type name (e.g., "file", "memory")
    /// - `factory`: Factory object for creating state store instances
    pub fn register_state_store(
        &self,
        name: impl Into<String>,
        factory: Box<dyn StateStoreFactory>,
    ) {
        let mut stores = self
            .state_stores
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        stores.insert(name.into(), Arc::from(factory));
    }

    /// Create (and connect) a directory from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn Directory>)`: Created directory
    /// - `Err(Error)`: If the type is not registered or creation fails
    pub async fn create_directory(&self, config: &DirectoryConfig) -> Result<Box<dyn Directory>> {
        let directory_type = config.type_name();
        let factory = {
            let directories = self
                .directories
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            directories
                .get(directory_type)
                .cloned()
                .ok_or_else(|| Error::config(format!("Unknown directory type: {}", directory_type)))?
        };

        factory.create(config).await
    }

    /// Create a state store from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn StateStore>)`: Created state store instance
    /// - `Err(Error)`: If store type is not registered or creation fails
    pub async fn create_state_store(&self, config: &StateStoreConfig) -> Result<Box<dyn StateStore>> {
        let store_type = config.type_name();
        let factory = {
            let stores = self
                .state_stores
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            stores
                .get(store_type)
                .cloned()
                .ok_or_else(|| Error::config(format!("Unknown state store type: {}", store_type)))?
        };

        factory.create(config).await
    }

    /// List all registered directory types
    pub fn list_directories(&self) -> Vec<String> {
        let directories = self
            .directories
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        directories.keys().cloned().collect()
    }

    /// List all registered state store types
    pub fn list_state_stores(&self) -> Vec<String> {
        let stores = self
            .state_stores
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        stores.keys().cloned().collect()
    }

    /// Check if a directory type is registered
    pub fn has_directory(&self, name: &str) -> bool {
        let directories = self
            .directories
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        directories.contains_key(name)
    }

    /// Check if a state store type is registered
    pub fn has_state_store(&self, name: &str) -> bool {
        let stores = self
            .state_stores
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        stores.contains_key(name)
    }
}
