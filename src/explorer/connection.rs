//! SSH-backed session connection
//!
//! Commands run on fresh exec channels; downloads go through an SFTP subsystem
//! channel. All of it is serialized by one per-connection lock, which streams
//! keep for as long as they live.

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use russh::client::Msg;
use russh::{Channel, ChannelMsg, ChannelReadHalf, ChannelWriteHalf};
use russh_sftp::client::error::Error as SftpErrorInner;
use russh_sftp::client::fs::File as SftpFile;
use russh_sftp::client::SftpSession as RusshSftpSession;
use tokio::io::{AsyncRead, ReadBuf};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use super::command::{self, RemoteCommand};
use super::error::{ExplorerError, Result};
use super::path::RemotePath;
use super::shell::{CommandOutput, RemoteShell};
use super::stream::{upload_channel, DownloadStream, UploadChunk, UploadSink, UploadStream};
use crate::config::ExplorerConfig;
use crate::ssh::{spawn_handle_owner_task, Credentials, HandleController, RemoteHost, SshClient};

/// One authenticated SSH connection for one user session
pub struct SshConnection {
    label: String,
    controller: HandleController,
    lock: Arc<Mutex<()>>,
    closed: AtomicBool,
    command_timeout: Option<Duration>,
    upload_queue_depth: usize,
}

impl SshConnection {
    /// Connect and authenticate. No retry: the first failure is returned.
    pub async fn open(host: &RemoteHost, credentials: &Credentials, config: &ExplorerConfig) -> Result<Self> {
        let session = SshClient::new(host.clone(), config.connect_options())
            .connect(credentials)
            .await?;

        let label = format!("{}@{}", credentials.username(), host);
        let controller = spawn_handle_owner_task(session, label.clone());
        Ok(Self::from_controller(label, controller, config))
    }

    pub(crate) fn from_controller(label: String, controller: HandleController, config: &ExplorerConfig) -> Self {
        Self {
            label,
            controller,
            lock: Arc::new(Mutex::new(())),
            closed: AtomicBool::new(false),
            command_timeout: config.command_timeout(),
            upload_queue_depth: config.upload_queue_depth,
        }
    }

    /// `user@host:port`
    pub fn label(&self) -> &str {
        &self.label
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ExplorerError::ConnectionClosed);
        }
        if !self.controller.is_connected() {
            return Err(ExplorerError::Transport(format!("connection to {} lost", self.label)));
        }
        Ok(())
    }

    /// Take the connection lock, re-checking liveness after the wait.
    async fn acquire(&self) -> Result<OwnedMutexGuard<()>> {
        self.ensure_open()?;
        let guard = self.lock.clone().lock_owned().await;
        self.ensure_open()?;
        Ok(guard)
    }

    async fn exec_channel(&self, command: &RemoteCommand) -> Result<Channel<Msg>> {
        let channel = self.controller.open_session_channel().await?;
        channel
            .exec(true, command.text())
            .await
            .map_err(|e| ExplorerError::Transport(format!("Failed to execute command: {}", e)))?;
        Ok(channel)
    }
}

#[async_trait]
impl RemoteShell for SshConnection {
    async fn execute(&self, command: &RemoteCommand) -> Result<CommandOutput> {
        let _guard = self.acquire().await?;
        debug!("Remote exec on {}: {}", self.label, command);

        let (mut reader, writer) = self.exec_channel(command).await?.split();
        let output = collect_with_deadline(
            &mut reader,
            &writer,
            OutputCollector::default(),
            self.command_timeout,
            command,
        )
        .await?;
        debug!("Remote exec finished with status {:?}", output.exit_status);
        Ok(output)
    }

    async fn open_upload_stream(&self, destination: &RemotePath, filename: &str) -> Result<UploadStream> {
        let target = destination.join(filename)?;
        let guard = self.acquire().await?;

        let command = command::receive_file(&target);
        let channel = self.exec_channel(&command).await?;
        let (stream, sink) = upload_channel(target.clone(), self.upload_queue_depth);

        info!("Upload to {} on {} started", target, self.label);
        let deadline = self.command_timeout;
        tokio::spawn(async move {
            let _guard = guard;
            run_upload(channel, sink, command, deadline).await;
        });

        Ok(stream)
    }

    async fn open_download_stream(&self, path: &RemotePath) -> Result<DownloadStream> {
        let guard = self.acquire().await?;

        let channel = self.controller.open_session_channel().await?;
        channel
            .request_subsystem(true, "sftp")
            .await
            .map_err(|e| ExplorerError::Transport(format!("Failed to request SFTP subsystem: {}", e)))?;
        let sftp = RusshSftpSession::new(channel.into_stream())
            .await
            .map_err(|e| ExplorerError::Transport(format!("Failed to start SFTP session: {}", e)))?;

        let metadata = sftp
            .metadata(path.as_str())
            .await
            .map_err(|e| map_sftp_error(e, "stat", path))?;
        if metadata.is_dir() {
            debug!("Download refused, {} is a directory", path);
            return Err(ExplorerError::NotAFile(path.to_string()));
        }

        let file = sftp
            .open(path.as_str())
            .await
            .map_err(|e| map_sftp_error(e, "open", path))?;

        info!("Download of {} from {} started", path, self.label);
        let reader = SftpFileReader {
            file: Box::pin(file),
            _session: Arc::new(sftp),
        };
        Ok(DownloadStream::new(path.clone(), metadata.size, reader).with_guard(guard))
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("Closing connection {}", self.label);
        self.controller.disconnect().await;
    }

    fn is_open(&self) -> bool {
        !self.closed.load(Ordering::Acquire) && self.controller.is_connected()
    }
}

/// Output of an exec channel gathered so far
#[derive(Default)]
struct OutputCollector {
    output: Vec<u8>,
    exit_status: Option<u32>,
    closed: bool,
}

impl OutputCollector {
    /// Record one channel message.
    ///
    /// Stdout and stderr are interleaved in arrival order. EOF is not the end:
    /// the exit status usually follows it.
    fn absorb(&mut self, msg: Option<ChannelMsg>) {
        match msg {
            Some(ChannelMsg::Data { data }) => self.output.extend_from_slice(&data),
            Some(ChannelMsg::ExtendedData { data, .. }) => self.output.extend_from_slice(&data),
            Some(ChannelMsg::ExitStatus { exit_status }) => self.exit_status = Some(exit_status),
            Some(ChannelMsg::Close) | None => self.closed = true,
            Some(_) => {}
        }
    }

    fn finish(self) -> CommandOutput {
        CommandOutput {
            output: String::from_utf8_lossy(&self.output).into_owned(),
            exit_status: self.exit_status,
        }
    }
}

/// Drain an exec channel until it closes.
async fn collect_output(reader: &mut ChannelReadHalf, mut collector: OutputCollector) -> CommandOutput {
    while !collector.closed {
        collector.absorb(reader.wait().await);
    }
    collector.finish()
}

async fn collect_with_deadline(
    reader: &mut ChannelReadHalf,
    writer: &ChannelWriteHalf<Msg>,
    collector: OutputCollector,
    deadline: Option<Duration>,
    command: &RemoteCommand,
) -> Result<CommandOutput> {
    let Some(limit) = deadline else {
        return Ok(collect_output(reader, collector).await);
    };

    let result = tokio::time::timeout(limit, collect_output(reader, collector)).await;
    match result {
        Ok(output) => Ok(output),
        Err(_) => {
            warn!("Remote command timed out after {:?}: {}", limit, command);
            let _ = writer.close().await;
            Err(ExplorerError::Timeout(format!(
                "command did not finish within {} seconds",
                limit.as_secs()
            )))
        }
    }
}

/// Transport side of an upload; holds the connection lock via its caller.
async fn run_upload(
    channel: Channel<Msg>,
    mut sink: UploadSink,
    command: RemoteCommand,
    deadline: Option<Duration>,
) {
    let result = pump_upload(channel, &mut sink, &command, deadline).await;
    match &result {
        Ok(total) => info!("Upload finished: {} bytes", total),
        Err(e) => warn!("Upload failed: {}", e),
    }
    sink.complete(result);
}

/// How the writer side of an upload ended
enum Feed {
    Finished(u64),
    Abandoned(u64),
}

async fn feed_channel(writer: &ChannelWriteHalf<Msg>, sink: &mut UploadSink) -> Result<Feed> {
    let mut total = 0u64;
    loop {
        match sink.next_chunk().await {
            Some(UploadChunk::Data(data)) => {
                writer
                    .data(&data[..])
                    .await
                    .map_err(|e| ExplorerError::Transport(format!("Failed to send upload data: {}", e)))?;
                total += data.len() as u64;
            }
            Some(UploadChunk::Finish) => return Ok(Feed::Finished(total)),
            None => return Ok(Feed::Abandoned(total)),
        }
    }
}

async fn pump_upload(
    channel: Channel<Msg>,
    sink: &mut UploadSink,
    command: &RemoteCommand,
    deadline: Option<Duration>,
) -> Result<u64> {
    let (mut reader, writer) = channel.split();
    let mut collector = OutputCollector::default();

    // A send waiting on the channel window only returns if the receiver keeps
    // reading, so its exit has to be watched for while feeding.
    let fed = {
        let feed = feed_channel(&writer, sink);
        tokio::pin!(feed);
        loop {
            tokio::select! {
                fed = &mut feed => break Some(fed),
                msg = reader.wait() => {
                    collector.absorb(msg);
                    if collector.closed || collector.exit_status.is_some() {
                        break None;
                    }
                }
            }
        }
    };

    let total = match fed {
        Some(Ok(Feed::Finished(total))) => total,
        Some(Ok(Feed::Abandoned(total))) => {
            warn!("Upload abandoned after {} bytes", total);
            let _ = writer.close().await;
            return Err(ExplorerError::Transport(
                "upload abandoned before completion".to_string(),
            ));
        }
        Some(Err(e)) => {
            let _ = writer.close().await;
            return Err(e);
        }
        None => {
            let output = collect_with_deadline(&mut reader, &writer, collector, deadline, command).await?;
            let output = command.check(output)?;
            return Err(ExplorerError::Transport(format!(
                "receiver exited before the upload finished: {}",
                output.output.trim()
            )));
        }
    };

    // Let the receiver flush and exit before the channel goes away
    writer
        .eof()
        .await
        .map_err(|e| ExplorerError::Transport(format!("Failed to send EOF: {}", e)))?;
    let output = collect_with_deadline(&mut reader, &writer, collector, deadline, command).await?;
    command.check(output)?;

    Ok(total)
}

fn map_sftp_error(err: SftpErrorInner, operation: &str, path: &RemotePath) -> ExplorerError {
    let message = err.to_string();
    if matches!(err, SftpErrorInner::Status(_)) {
        ExplorerError::RemoteCommand {
            command: format!("sftp {} {}", operation, path),
            status: None,
            output: message,
        }
    } else {
        ExplorerError::Transport(format!("SFTP {} failed for {}: {}", operation, path, message))
    }
}

/// SFTP file handle that keeps its session alive
struct SftpFileReader {
    file: Pin<Box<SftpFile>>,
    _session: Arc<RusshSftpSession>,
}

impl AsyncRead for SftpFileReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        self.get_mut().file.as_mut().poll_read(cx, buf)
    }
}
