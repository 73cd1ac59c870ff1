//! Remote file operations over SSH
//!
//! # Architecture
//!
//! - `path`: every user path is made absolute before it reaches anything else
//! - `command`: quoted shell commands for each operation and the listing probe
//! - `listing`: parser for the probe output
//! - `shell`: the `RemoteShell` contract, implemented by `SshConnection`
//! - `remote`: `RemoteFileExplorer`, the surface the web layer calls

pub mod command;
mod connection;
mod error;
pub mod listing;
pub mod path;
mod remote;
mod shell;
mod stream;

#[cfg(test)]
pub(crate) mod fake;
#[cfg(test)]
pub(crate) mod loopback;

pub use connection::SshConnection;
pub use error::{BatchFailure, ExplorerError, Result};
pub use listing::{DirectoryEntry, EntryKind};
pub use path::{normalize, RemotePath};
pub use remote::{BatchPolicy, RemoteFileExplorer};
pub use shell::{CommandOutput, RemoteShell};
pub use stream::{upload_channel, DownloadStream, UploadChunk, UploadSink, UploadStream};
