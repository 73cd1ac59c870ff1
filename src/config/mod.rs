//! Configuration Management Module
//!
//! Explorer settings (timeouts, batch policy, host key pin, registry TTL) and
//! their JSON storage.

pub mod storage;
pub mod types;

pub use storage::{config_dir, config_file, ConfigStorage, StorageError};
pub use types::{ExplorerConfig, CONFIG_VERSION};
