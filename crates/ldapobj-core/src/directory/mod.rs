// # Directory Implementations
//
// In-process implementations of the Directory trait. The LDAP-backed
// implementation lives in the `ldapobj-ldap` crate.

pub mod memory;

pub use memory::{MemoryDirectory, MemoryDirectoryFactory};
