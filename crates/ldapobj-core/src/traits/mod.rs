//! Core traits for the reconciler
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`Directory`]: Search and write entries on a directory server
//! - [`StateStore`]: Persistent record of managed object state

pub mod directory;
pub mod state_store;

pub use directory::{Directory, DirectoryFactory};
pub use state_store::{StateRecord, StateStore, StateStoreFactory};
