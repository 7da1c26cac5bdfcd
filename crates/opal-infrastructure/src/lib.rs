//! Infrastructure layer of the OPAL engine.
//!
//! Implements the persistence ports defined in `opal-core`: platform path
//! resolution, file- and memory-backed key-value stores, the restart
//! snapshot repository, and TOML settings persistence.

pub mod kv_file;
pub mod kv_memory;
pub mod paths;
pub mod settings_file;
pub mod snapshot;

pub use kv_file::FileKeyValueStore;
pub use kv_memory::MemoryKeyValueStore;
pub use paths::OpalPaths;
pub use settings_file::SettingsService;
pub use snapshot::{EngineSnapshot, SnapshotRepository};
