//! Explorer error taxonomy

use std::fmt;

use thiserror::Error;

use crate::ssh::SshError;

pub type Result<T> = std::result::Result<T, ExplorerError>;

#[derive(Error, Debug)]
pub enum ExplorerError {
    /// Bad credentials, rejected host key or unreachable host at connect time
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Connection lost mid-operation
    #[error("Transport error: {0}")]
    Transport(String),

    /// A remote command ended with a nonzero (or missing) exit status
    #[error("Remote command failed ({}): {output}", StatusDisplay(.status))]
    RemoteCommand {
        command: String,
        status: Option<u32>,
        output: String,
    },

    #[error("Not a file: {0}")]
    NotAFile(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Every per-path failure of a batch, in issue order
    #[error("{} of the batch operations failed; last: {}", .0.len(), LastFailure(.0))]
    Batch(Vec<BatchFailure>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExplorerError {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            ExplorerError::Authentication(_) => "authentication",
            ExplorerError::Transport(_) => "transport",
            ExplorerError::RemoteCommand { .. } => "remote_command",
            ExplorerError::NotAFile(_) => "not_a_file",
            ExplorerError::ConnectionClosed => "connection_closed",
            ExplorerError::Timeout(_) => "timeout",
            ExplorerError::InvalidArgument(_) => "invalid_argument",
            ExplorerError::Batch(_) => "batch",
            ExplorerError::Io(_) => "io",
        }
    }
}

impl From<SshError> for ExplorerError {
    fn from(err: SshError) -> Self {
        match err {
            SshError::ConnectionFailed(_)
            | SshError::AuthenticationFailed(_)
            | SshError::HostKeyRejected(_)
            | SshError::Timeout(_) => ExplorerError::Authentication(err.to_string()),
            SshError::Disconnected
            | SshError::ChannelError(_)
            | SshError::ProtocolError(_)
            | SshError::IoError(_) => ExplorerError::Transport(err.to_string()),
        }
    }
}

impl serde::Serialize for ExplorerError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// One failed path of a batch operation
#[derive(Debug)]
pub struct BatchFailure {
    pub path: String,
    pub error: ExplorerError,
}

struct StatusDisplay<'a>(&'a Option<u32>);

impl fmt::Display for StatusDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(code) => write!(f, "exit status {}", code),
            None => f.write_str("no exit status"),
        }
    }
}

struct LastFailure<'a>(&'a [BatchFailure]);

impl fmt::Display for LastFailure<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.last() {
            Some(failure) => write!(f, "{}: {}", failure.path, failure.error),
            None => f.write_str("none"),
        }
    }
}
