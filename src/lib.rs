//! sshfe - remote file operations backend over SSH
//!
//! Holds one SSH session per logged-in user and serves a browser file
//! manager's operations (list, rename, move, copy, delete, chmod, mkdir,
//! upload, download) against the remote host.
//!
//! ```ignore
//! let registry = Arc::new(SessionRegistry::new(ConfigStorage::new()?.load().await?));
//! registry.spawn_reaper();
//!
//! let token = registry.open_session(&"host:22".parse()?, &Credentials::new("alice", secret)).await?;
//! let explorer = registry.get(&token).ok_or("session expired")?;
//! let reply = api::dispatch(&explorer, &request).await;
//! ```

pub mod api;
pub mod config;
pub mod explorer;
pub mod registry;
pub mod ssh;

pub use config::{ConfigStorage, ExplorerConfig};
pub use explorer::{
    BatchPolicy, DirectoryEntry, DownloadStream, EntryKind, ExplorerError, RemoteFileExplorer,
    RemoteShell, UploadStream,
};
pub use registry::{RegistryStats, SessionRegistry};
pub use ssh::{Credentials, HostKeyPolicy, RemoteHost};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global tracing subscriber (`RUST_LOG`, default `info`).
///
/// Does nothing if a subscriber is already installed.
pub fn init_logging() {
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
