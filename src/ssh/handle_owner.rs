//! Handle Owner Task
//!
//! Only one task owns the `Handle<ClientHandler>`. Everything else talks to it
//! through a `HandleController`, which sends commands over an mpsc channel and
//! waits for the reply on a oneshot.
//!
//! ```ignore
//! let controller = spawn_handle_owner_task(session, "alice@host:22".into());
//! let channel = controller.open_session_channel().await?;
//! ```

use russh::client::Msg;
use russh::Channel;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{info, warn};

use super::client::SshSession;
use super::error::SshError;

/// Commands sent to the Handle Owner Task
pub enum HandleCommand {
    /// Open a session channel (exec / sftp subsystem)
    ChannelOpenSession {
        reply_tx: oneshot::Sender<Result<Channel<Msg>, russh::Error>>,
    },

    /// Disconnect the SSH connection
    Disconnect,
}

/// Controller for sending commands to the Handle Owner Task
///
/// Cloning only copies the sender; every clone has full control of the
/// connection, so it must not leave the process.
#[derive(Clone)]
pub struct HandleController {
    cmd_tx: mpsc::Sender<HandleCommand>,
    link_lost: watch::Receiver<bool>,
}

impl HandleController {
    /// Create a controller around an existing sender.
    ///
    /// Used by tests. In production, use `spawn_handle_owner_task`.
    pub fn new(cmd_tx: mpsc::Sender<HandleCommand>) -> Self {
        let (_, link_lost) = watch::channel(false);
        Self::with_link(cmd_tx, link_lost)
    }

    pub(crate) fn with_link(cmd_tx: mpsc::Sender<HandleCommand>, link_lost: watch::Receiver<bool>) -> Self {
        Self { cmd_tx, link_lost }
    }

    /// Open a session channel
    pub async fn open_session_channel(&self) -> Result<Channel<Msg>, SshError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(HandleCommand::ChannelOpenSession { reply_tx })
            .await
            .map_err(|_| SshError::Disconnected)?;
        reply_rx
            .await
            .map_err(|_| SshError::Disconnected)?
            .map_err(|e| SshError::ChannelError(e.to_string()))
    }

    /// Disconnect the SSH connection
    pub async fn disconnect(&self) {
        let _ = self.cmd_tx.send(HandleCommand::Disconnect).await;
    }

    /// Check if the Handle Owner Task is still running and the transport
    /// has not gone away underneath it
    pub fn is_connected(&self) -> bool {
        !self.cmd_tx.is_closed() && !*self.link_lost.borrow()
    }
}

/// Spawn the Handle Owner Task
///
/// Consumes the session and returns a `HandleController` for sending commands.
/// The task also exits when the transport ends on its own.
/// `label` only identifies the connection in logs.
pub fn spawn_handle_owner_task(session: SshSession, label: String) -> HandleController {
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<HandleCommand>(64);
    let SshSession { handle, link_lost } = session;
    let controller = HandleController::with_link(cmd_tx, link_lost.clone());

    tokio::spawn(async move {
        let mut link_lost = link_lost;

        info!("Handle owner task started for {}", label);

        loop {
            let cmd = tokio::select! {
                cmd = cmd_rx.recv() => cmd,
                _ = wait_link_lost(&mut link_lost) => {
                    warn!("Transport to {} ended", label);
                    break;
                }
            };
            match cmd {
                Some(HandleCommand::ChannelOpenSession { reply_tx }) => {
                    let result = handle.channel_open_session().await;
                    if reply_tx.send(result).is_err() {
                        warn!("Caller dropped before receiving channel_open_session result");
                    }
                }
                Some(HandleCommand::Disconnect) => {
                    info!("Disconnect requested for {}", label);
                    break;
                }
                None => {
                    info!("All controllers dropped for {}", label);
                    break;
                }
            }
        }

        drain_pending_commands(&mut cmd_rx);

        let _ = handle
            .disconnect(russh::Disconnect::ByApplication, "Session closed", "en")
            .await;
        info!("Handle owner task terminated for {}", label);
    });

    controller
}

/// Resolves once the transport is gone
async fn wait_link_lost(link_lost: &mut watch::Receiver<bool>) {
    let _ = link_lost.wait_for(|lost| *lost).await;
}

/// Drain all pending commands, returning a Disconnect error to each
fn drain_pending_commands(cmd_rx: &mut mpsc::Receiver<HandleCommand>) {
    cmd_rx.close();

    while let Ok(cmd) = cmd_rx.try_recv() {
        match cmd {
            HandleCommand::ChannelOpenSession { reply_tx } => {
                let _ = reply_tx.send(Err(russh::Error::Disconnect));
            }
            HandleCommand::Disconnect => {}
        }
    }
}
