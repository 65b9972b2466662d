// # Directory Trait
//
// Defines the connection boundary between the reconciler and a directory
// server.
//
// ## Implementations
//
// - LDAP v3 over `ldap3`: `ldapobj-ldap` crate
// - In-memory: `ldapobj_core::directory::MemoryDirectory` (tests, embedding)
//
// ## Usage
//
// ```rust,ignore
// use ldapobj_core::{Directory, SearchScope};
//
// async fn show(directory: &dyn Directory) -> ldapobj_core::Result<()> {
//     let entries = directory
//         .search("cn=test,dc=example,dc=com", SearchScope::BaseObject, "(objectClass=*)", &["*".to_string()])
//         .await?;
//     for entry in entries {
//         println!("{}", entry.dn);
//     }
//     Ok(())
// }
// ```

use async_trait::async_trait;

use crate::config::DirectoryConfig;
use crate::model::{AttributeMap, DirectoryEntry, MutationOp, SearchScope};

/// Trait for directory connections
///
/// Every method is one round trip to the directory. Implementations hold a
/// single connection and are handed to the engine explicitly; there is no
/// process-wide connection handle.
///
/// # Trust Level: Untrusted
///
/// Directories are external integrations:
///
/// ## Allowed Capabilities
/// - ✅ Talk to their own server only
/// - ✅ Translate server results into [`DirectoryEntry`] values and errors
///
/// ## Forbidden Capabilities
/// - ❌ Retry failed requests (every error is terminal for the call)
/// - ❌ Decide what to change (owned by the diff engine)
/// - ❌ Access the state store (owned by `ReconcileEngine`)
/// - ❌ Cache entries between calls (every read must hit the server)
#[async_trait]
pub trait Directory: Send + Sync {
    /// Search the directory
    ///
    /// A search whose base entry does not exist must return an empty list
    /// rather than an error, so that callers can apply their own
    /// result-count contract.
    ///
    /// # Parameters
    ///
    /// - `base_dn`: Search base
    /// - `scope`: Search scope
    /// - `filter`: LDAP filter string
    /// - `attributes`: Requested attribute names (`*` for all user attributes)
    async fn search(
        &self,
        base_dn: &str,
        scope: SearchScope,
        filter: &str,
        attributes: &[String],
    ) -> Result<Vec<DirectoryEntry>, crate::Error>;

    /// Add a new entry
    ///
    /// `attributes` includes `objectClass`.
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Entry created
    /// - `Err(Error::DirectoryWrite)`: Server rejected the request
    async fn add(&self, dn: &str, attributes: &AttributeMap) -> Result<(), crate::Error>;

    /// Apply a list of modifications to an entry in one modify request
    ///
    /// # Returns
    ///
    /// - `Ok(())`: All modifications applied
    /// - `Err(Error::DirectoryWrite)`: Server rejected the request
    async fn modify(&self, dn: &str, operations: &[MutationOp]) -> Result<(), crate::Error>;

    /// Delete an entry
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Entry deleted
    /// - `Err(Error::DirectoryWrite)`: Server rejected the request
    async fn delete(&self, dn: &str) -> Result<(), crate::Error>;

    /// Get the directory implementation name (for logging/debugging)
    fn directory_name(&self) -> &'static str;
}

/// Helper trait for constructing directories from configuration
#[async_trait]
pub trait DirectoryFactory: Send + Sync {
    /// Create (and connect) a Directory from configuration
    async fn create(&self, config: &DirectoryConfig) -> Result<Box<dyn Directory>, crate::Error>;
}
