// # State Store Implementations
//
// Where the engine keeps the recorded state of every managed object between
// runs.

pub mod file;
pub mod memory;

pub use file::{FileStateStore, FileStateStoreFactory};
pub use memory::{MemoryStateStore, MemoryStateStoreFactory};
