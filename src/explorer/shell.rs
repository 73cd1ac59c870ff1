//! The session connection contract

use async_trait::async_trait;

use super::command::RemoteCommand;
use super::error::Result;
use super::path::RemotePath;
use super::stream::{DownloadStream, UploadStream};

/// Result of running one remote command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Combined stdout and stderr, in arrival order
    pub output: String,
    /// `None` if the channel closed without reporting a status
    pub exit_status: Option<u32>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_status == Some(0)
    }
}

/// One authenticated connection to one remote host.
///
/// Implementations serialize work on the connection: a command or an open
/// stream holds it exclusively until it completes or is dropped. After
/// [`close`](Self::close) every call fails with `ConnectionClosed`.
#[async_trait]
pub trait RemoteShell: Send + Sync {
    /// Run a command to completion and capture its combined output.
    ///
    /// Only transport problems are errors here; the exit status is reported
    /// as-is and judged by the caller.
    async fn execute(&self, command: &RemoteCommand) -> Result<CommandOutput>;

    /// Start a remote receiver writing to `destination/filename`.
    async fn open_upload_stream(&self, destination: &RemotePath, filename: &str) -> Result<UploadStream>;

    /// Stat `path` and stream its contents; directories fail with `NotAFile`.
    async fn open_download_stream(&self, path: &RemotePath) -> Result<DownloadStream>;

    /// Tear down the transport. Idempotent.
    async fn close(&self);

    fn is_open(&self) -> bool;
}
