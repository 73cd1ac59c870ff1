//! In-memory `RemoteShell` for tests

use std::collections::{HashMap, HashSet, VecDeque};
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::command::{self, RemoteCommand};
use super::error::{ExplorerError, Result};
use super::path::RemotePath;
use super::shell::{CommandOutput, RemoteShell};
use super::stream::{upload_channel, DownloadStream, UploadChunk, UploadStream};

#[derive(Default)]
struct FakeState {
    commands: Vec<String>,
    responses: VecDeque<CommandOutput>,
    files: HashMap<String, Vec<u8>>,
    dirs: HashSet<String>,
    transfers: usize,
}

/// Records commands, replays scripted results and keeps uploaded files
#[derive(Default)]
pub(crate) struct FakeShell {
    state: Arc<Mutex<FakeState>>,
    closed: AtomicBool,
}

impl FakeShell {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue the result of the next unscripted command.
    pub(crate) fn respond(&self, exit_status: u32, output: &str) {
        self.state.lock().responses.push_back(CommandOutput {
            output: output.to_string(),
            exit_status: Some(exit_status),
        });
    }

    pub(crate) fn commands(&self) -> Vec<String> {
        self.state.lock().commands.clone()
    }

    pub(crate) fn add_dir(&self, path: &str) {
        self.state.lock().dirs.insert(path.to_string());
    }

    pub(crate) fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.state.lock().files.get(path).cloned()
    }

    /// Number of downloads that actually started moving bytes
    pub(crate) fn transfers(&self) -> usize {
        self.state.lock().transfers
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(ExplorerError::ConnectionClosed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RemoteShell for FakeShell {
    async fn execute(&self, command: &RemoteCommand) -> Result<CommandOutput> {
        self.ensure_open()?;
        let mut state = self.state.lock();
        state.commands.push(command.text().to_string());
        Ok(state.responses.pop_front().unwrap_or(CommandOutput {
            output: String::new(),
            exit_status: Some(0),
        }))
    }

    async fn open_upload_stream(&self, destination: &RemotePath, filename: &str) -> Result<UploadStream> {
        let target = destination.join(filename)?;
        self.ensure_open()?;
        self.state
            .lock()
            .commands
            .push(command::receive_file(&target).text().to_string());

        let (stream, mut sink) = upload_channel(target.clone(), 2);
        let state = self.state.clone();
        tokio::spawn(async move {
            let mut received = Vec::new();
            loop {
                match sink.next_chunk().await {
                    Some(UploadChunk::Data(data)) => received.extend_from_slice(&data),
                    Some(UploadChunk::Finish) => break,
                    None => return,
                }
            }
            let len = received.len() as u64;
            state.lock().files.insert(target.to_string(), received);
            sink.complete(Ok(len));
        });
        Ok(stream)
    }

    async fn open_download_stream(&self, path: &RemotePath) -> Result<DownloadStream> {
        self.ensure_open()?;
        let mut state = self.state.lock();
        if state.dirs.contains(path.as_str()) {
            return Err(ExplorerError::NotAFile(path.to_string()));
        }
        let data = state
            .files
            .get(path.as_str())
            .cloned()
            .ok_or_else(|| ExplorerError::RemoteCommand {
                command: format!("sftp stat {}", path),
                status: None,
                output: "No such file".to_string(),
            })?;
        state.transfers += 1;
        let size = data.len() as u64;
        Ok(DownloadStream::new(path.clone(), Some(size), Cursor::new(data)))
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    fn is_open(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
    }
}
