// # ldapobj-core
//
// Core library for declarative management of LDAP directory objects.
//
// ## Architecture Overview
//
// - **Directory**: Trait for the directory connection (search/add/modify/delete)
// - **accessor**: Exact-one-result lookup of a single entry
// - **ignore**: Ignore-set filter deciding which attribute types are managed
// - **diff**: Attribute diff engine producing ordered mutation operations
// - **engine**: Lifecycle controller, plan adjustment and the ReconcileEngine
// - **StateStore**: Trait for the recorded state of managed objects
// - **DirectoryRegistry**: Plugin-based registry for directories and state stores
//
// ## Design Principles
//
// 1. **Separation of Concerns**: Diffing is pure; only the lifecycle controller talks to the directory
// 2. **Explicit Connections**: Every component receives its directory handle; there is no global one
// 3. **Plugin-Based**: Backends are registered dynamically, no hard-coded if-else
// 4. **Library-First**: All core functionality can be used as a library
// 5. **No Retries**: Every directory error is terminal for the call and surfaces unchanged

pub mod accessor;
pub mod config;
pub mod diagnostics;
pub mod diff;
pub mod directory;
pub mod engine;
pub mod error;
pub mod ignore;
pub mod model;
pub mod registry;
pub mod state;
pub mod traits;

// Re-export core types for convenience
pub use config::{DirectoryConfig, EngineConfig, Manifest, ModifyMode, ReconcileConfig, StateStoreConfig};
pub use directory::MemoryDirectory;
pub use engine::{
    ApplyOutcome, Change, EngineEvent, Lifecycle, ObjectData, PlannedAction, ReconcileEngine,
    SearchData, SearchQuery,
};
pub use error::{Error, Result, WriteOperation};
pub use ignore::IgnoreSet;
pub use model::{
    AttributeMap, DesiredState, DirectoryEntry, DirectoryObject, MutationOp, ObjectConfig,
    ObjectState, SearchScope,
};
pub use registry::DirectoryRegistry;
pub use state::{FileStateStore, MemoryStateStore};
pub use traits::{Directory, StateStore};
