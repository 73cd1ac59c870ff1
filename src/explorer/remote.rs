//! Remote file explorer
//!
//! The operation surface used by the web layer. Every method normalizes its
//! paths, builds the remote command and waits for the remote side to finish.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::io::AsyncRead;
use tracing::{debug, info, warn};

use super::command::{self, RemoteCommand};
use super::connection::SshConnection;
use super::error::{BatchFailure, ExplorerError, Result};
use super::listing::{self, DirectoryEntry};
use super::path::{client_file_name, normalize, RemotePath};
use super::shell::RemoteShell;
use super::stream::{DownloadStream, UploadStream};
use crate::config::ExplorerConfig;
use crate::ssh::{Credentials, RemoteHost};

/// How multi-path operations report failures
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchPolicy {
    /// Run every command; the result is that of the last one
    #[default]
    LastError,
    /// Stop at the first failure
    FailFast,
    /// Run every command and return all failures as `ExplorerError::Batch`
    Aggregate,
}

pub struct RemoteFileExplorer {
    shell: Arc<dyn RemoteShell>,
    batch_policy: BatchPolicy,
}

impl RemoteFileExplorer {
    /// Open an SSH connection and wrap it.
    pub async fn connect(host: &RemoteHost, credentials: &Credentials, config: &ExplorerConfig) -> Result<Self> {
        let connection = SshConnection::open(host, credentials, config).await?;
        info!("File explorer connected: {}", connection.label());
        Ok(Self::new(Arc::new(connection), config.batch_policy))
    }

    pub fn new(shell: Arc<dyn RemoteShell>, batch_policy: BatchPolicy) -> Self {
        Self { shell, batch_policy }
    }

    pub fn batch_policy(&self) -> BatchPolicy {
        self.batch_policy
    }

    /// List a directory in remote order.
    pub async fn list(&self, path: &str) -> Result<Vec<DirectoryEntry>> {
        let path = normalize(path);
        let output = self.run(&command::list_probe(&path)).await?;
        let entries = listing::parse(&output);
        debug!("Listed {}: {} entries", path, entries.len());
        Ok(entries)
    }

    pub async fn rename(&self, path: &str, new_path: &str) -> Result<()> {
        self.run(&command::rename(&normalize(path), &normalize(new_path)))
            .await
            .map(|_| ())
    }

    /// Move each path into `new_path`, one remote command per path.
    pub async fn move_items<S: AsRef<str>>(&self, paths: &[S], new_path: &str) -> Result<()> {
        let sources = normalize_all(paths);
        let commands = command::move_into(&sources, &normalize(new_path));
        self.run_batch(&sources, commands).await
    }

    /// Recursive copy into `new_path`. With a single source, a non-empty
    /// `single_filename` names the copy.
    pub async fn copy<S: AsRef<str>>(&self, paths: &[S], new_path: &str, single_filename: &str) -> Result<()> {
        let sources = normalize_all(paths);
        let commands = command::copy_into(&sources, &normalize(new_path), Some(single_filename))?;
        self.run_batch(&sources, commands).await
    }

    pub async fn delete<S: AsRef<str>>(&self, paths: &[S]) -> Result<()> {
        let targets = normalize_all(paths);
        let commands = command::delete(&targets);
        self.run_batch(&targets, commands).await
    }

    pub async fn mkdir(&self, path: &str) -> Result<()> {
        self.run(&command::mkdir(&normalize(path))).await.map(|_| ())
    }

    pub async fn chmod<S: AsRef<str>>(&self, paths: &[S], mode: &str, recursive: bool) -> Result<()> {
        let targets = normalize_all(paths);
        let commands = command::chmod(&targets, mode, recursive);
        self.run_batch(&targets, commands).await
    }

    /// Start an upload of `filename` into `destination`; the caller feeds the
    /// returned stream and calls `finish`.
    pub async fn open_upload(&self, destination: &str, filename: &str) -> Result<UploadStream> {
        let destination = normalize(destination);
        let name = client_file_name(filename);
        info!("Upload of {:?} into {}", name, destination);
        self.shell.open_upload_stream(&destination, name).await
    }

    /// Upload everything `reader` yields. Returns the number of bytes stored.
    pub async fn upload<R>(&self, destination: &str, filename: &str, reader: &mut R) -> Result<u64>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let mut stream = self.open_upload(destination, filename).await?;
        stream.copy_from(reader).await?;
        stream.finish().await
    }

    /// Stream a remote file; directories fail with `NotAFile`.
    pub async fn download(&self, path: &str) -> Result<DownloadStream> {
        let path = normalize(path);
        info!("Download of {}", path);
        self.shell.open_download_stream(&path).await
    }

    pub async fn close(&self) {
        self.shell.close().await;
    }

    pub fn is_open(&self) -> bool {
        self.shell.is_open()
    }

    /// Execute one command and hold it to its contract; returns the output.
    async fn run(&self, command: &RemoteCommand) -> Result<String> {
        let output = self.shell.execute(command).await?;
        command.check(output).map(|output| output.output)
    }

    async fn run_batch(&self, paths: &[RemotePath], commands: Vec<RemoteCommand>) -> Result<()> {
        let mut outcome: Result<()> = Ok(());
        let mut failures = Vec::new();

        for (path, command) in paths.iter().zip(&commands) {
            let error = match self.run(command).await {
                Ok(_) => {
                    outcome = Ok(());
                    continue;
                }
                Err(error) => error,
            };
            warn!("Batch step failed for {}: {}", path, error);

            match self.batch_policy {
                BatchPolicy::LastError => outcome = Err(error),
                BatchPolicy::FailFast => return Err(error),
                BatchPolicy::Aggregate => failures.push(BatchFailure {
                    path: path.to_string(),
                    error,
                }),
            }
        }

        if !failures.is_empty() {
            return Err(ExplorerError::Batch(failures));
        }
        outcome
    }
}

fn normalize_all<S: AsRef<str>>(paths: &[S]) -> Vec<RemotePath> {
    paths.iter().map(|path| normalize(path.as_ref())).collect()
}
