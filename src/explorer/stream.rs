//! Upload and download byte streams
//!
//! An upload is a pair: the caller writes into an [`UploadStream`] and the
//! transport drains the matching [`UploadSink`]. Chunks cross a bounded queue,
//! so a slow remote side pushes back on the writer instead of buffering the
//! whole file.

use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};
use tokio::sync::{mpsc, oneshot, OwnedMutexGuard};
use tokio_util::io::ReaderStream;
use tracing::debug;

use super::error::{ExplorerError, Result};
use super::path::RemotePath;

const COPY_CHUNK_SIZE: usize = 64 * 1024;

/// Message from the writer to the transport
#[derive(Debug)]
pub enum UploadChunk {
    Data(Bytes),
    /// Writer is done; flush and report
    Finish,
}

/// Create a connected upload pair with room for `depth` in-flight chunks.
pub fn upload_channel(target: RemotePath, depth: usize) -> (UploadStream, UploadSink) {
    let (chunk_tx, chunk_rx) = mpsc::channel(depth.max(1));
    let (done_tx, done_rx) = oneshot::channel();
    (
        UploadStream {
            target,
            chunk_tx: Some(chunk_tx),
            done_rx: Some(done_rx),
            bytes_written: 0,
        },
        UploadSink {
            chunk_rx,
            done_tx: Some(done_tx),
        },
    )
}

/// Writable side of an upload.
///
/// Dropping it without calling [`finish`](Self::finish) aborts the transfer.
pub struct UploadStream {
    target: RemotePath,
    chunk_tx: Option<mpsc::Sender<UploadChunk>>,
    done_rx: Option<oneshot::Receiver<Result<u64>>>,
    bytes_written: u64,
}

impl UploadStream {
    pub fn target(&self) -> &RemotePath {
        &self.target
    }

    /// Bytes accepted so far
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Queue a chunk; waits while the queue is full.
    pub async fn write(&mut self, data: Bytes) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        let len = data.len() as u64;
        let sent = match &self.chunk_tx {
            Some(tx) => tx.send(UploadChunk::Data(data)).await.is_ok(),
            None => false,
        };
        if !sent {
            return Err(self.receiver_error().await);
        }
        self.bytes_written += len;
        Ok(())
    }

    /// Pump an async reader into the upload until EOF. Returns bytes copied.
    pub async fn copy_from<R>(&mut self, reader: &mut R) -> Result<u64>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let mut copied = 0u64;
        let mut buf = BytesMut::with_capacity(COPY_CHUNK_SIZE);
        loop {
            buf.reserve(COPY_CHUNK_SIZE);
            let n = reader.read_buf(&mut buf).await?;
            if n == 0 {
                break;
            }
            copied += n as u64;
            self.write(buf.split().freeze()).await?;
        }
        Ok(copied)
    }

    /// Signal end of data and wait for the remote side to confirm.
    ///
    /// Returns the number of bytes the remote side received.
    pub async fn finish(mut self) -> Result<u64> {
        let sent = match self.chunk_tx.take() {
            Some(tx) => tx.send(UploadChunk::Finish).await.is_ok(),
            None => false,
        };
        if !sent {
            return Err(self.receiver_error().await);
        }
        match self.done_rx.take() {
            Some(done_rx) => match done_rx.await {
                Ok(result) => {
                    debug!("Upload to {} finished", self.target);
                    result
                }
                Err(_) => Err(ExplorerError::Transport(
                    "upload receiver ended without a result".to_string(),
                )),
            },
            None => Err(ExplorerError::Transport("upload already finished".to_string())),
        }
    }

    /// The reason the transport side stopped accepting chunks
    async fn receiver_error(&mut self) -> ExplorerError {
        self.chunk_tx = None;
        match self.done_rx.take() {
            Some(done_rx) => match done_rx.await {
                Ok(Err(e)) => e,
                Ok(Ok(_)) | Err(_) => {
                    ExplorerError::Transport("upload receiver closed early".to_string())
                }
            },
            None => ExplorerError::Transport("upload already finished".to_string()),
        }
    }
}

impl fmt::Debug for UploadStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadStream")
            .field("target", &self.target)
            .field("bytes_written", &self.bytes_written)
            .field("finished", &self.chunk_tx.is_none())
            .finish()
    }
}

/// Transport side of an upload
pub struct UploadSink {
    chunk_rx: mpsc::Receiver<UploadChunk>,
    done_tx: Option<oneshot::Sender<Result<u64>>>,
}

impl UploadSink {
    /// Next chunk from the writer. `None` means the writer was dropped
    /// without finishing.
    pub async fn next_chunk(&mut self) -> Option<UploadChunk> {
        self.chunk_rx.recv().await
    }

    /// Report the outcome to the writer's `finish`.
    pub fn complete(mut self, result: Result<u64>) {
        self.chunk_rx.close();
        if let Some(done_tx) = self.done_tx.take() {
            let _ = done_tx.send(result);
        }
    }
}

/// Readable side of a download.
///
/// Single pass; holding it keeps the connection reserved.
pub struct DownloadStream {
    reader: Pin<Box<dyn AsyncRead + Send>>,
    path: RemotePath,
    size: Option<u64>,
    _guard: Option<OwnedMutexGuard<()>>,
}

impl DownloadStream {
    pub fn new<R>(path: RemotePath, size: Option<u64>, reader: R) -> Self
    where
        R: AsyncRead + Send + 'static,
    {
        Self {
            reader: Box::pin(reader),
            path,
            size,
            _guard: None,
        }
    }

    /// Keep `guard` locked until the stream is dropped.
    pub fn with_guard(mut self, guard: OwnedMutexGuard<()>) -> Self {
        self._guard = Some(guard);
        self
    }

    pub fn path(&self) -> &RemotePath {
        &self.path
    }

    /// File size reported by the remote stat, if any
    pub fn size(&self) -> Option<u64> {
        self.size
    }

    /// Chunked `Bytes` stream, e.g. for an HTTP response body
    pub fn into_stream(self) -> ReaderStream<Self> {
        ReaderStream::new(self)
    }

    /// Read the whole file into memory.
    pub async fn read_all(mut self) -> Result<Vec<u8>> {
        let mut data = Vec::with_capacity(self.size.unwrap_or(0).min(1 << 20) as usize);
        self.read_to_end(&mut data).await?;
        Ok(data)
    }
}

impl fmt::Debug for DownloadStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadStream")
            .field("path", &self.path)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

impl AsyncRead for DownloadStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        self.get_mut().reader.as_mut().poll_read(cx, buf)
    }
}
