//! In-process SSH server for connection tests
//!
//! Speaks just enough of a remote host for `SshConnection`: password login,
//! `cat > '<path>'` receivers, one scripted command and a read-only SFTP
//! subsystem over an in-memory file table.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use russh::keys::ssh_key::rand_core::OsRng;
use russh::keys::{Algorithm, PrivateKey};
use russh::server::{self, Auth, Msg, Session};
use russh::{Channel, ChannelId, CryptoVec};
use russh_sftp::protocol::{Attrs, Data, FileAttributes, Handle, OpenFlags, Status, StatusCode};
use tokio::net::TcpListener;

use crate::ssh::{Credentials, RemoteHost};

pub(crate) const USER: &str = "tester";
pub(crate) const PASSWORD: &str = "secret";

/// Prints `to stdout` and `to stderr`, exits 3
pub(crate) const REPORT_COMMAND: &str = "report";

/// Receivers for targets under here fail like a read-only mount
pub(crate) const READ_ONLY_DIR: &str = "/ro/";

/// Server receive window; uploads larger than this need the server to read
pub(crate) const WINDOW_SIZE: u32 = 32 * 1024;

#[derive(Default)]
struct ServerState {
    files: HashMap<String, Vec<u8>>,
    dirs: HashSet<String>,
    commands: Vec<String>,
    opened: Vec<String>,
    sessions: Vec<server::Handle>,
}

pub(crate) struct LoopbackServer {
    addr: SocketAddr,
    state: Arc<Mutex<ServerState>>,
}

impl LoopbackServer {
    pub(crate) async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let key = PrivateKey::random(&mut OsRng, Algorithm::Ed25519).unwrap();
        let config = Arc::new(server::Config {
            keys: vec![key],
            window_size: WINDOW_SIZE,
            inactivity_timeout: None,
            auth_rejection_time: Duration::from_millis(10),
            auth_rejection_time_initial: Some(Duration::ZERO),
            ..Default::default()
        });
        let state = Arc::new(Mutex::new(ServerState::default()));

        tokio::spawn({
            let state = state.clone();
            async move {
                while let Ok((socket, _)) = listener.accept().await {
                    let handler = LoopbackHandler::new(state.clone());
                    if let Ok(running) = server::run_stream(config.clone(), socket, handler).await {
                        state.lock().sessions.push(running.handle());
                    }
                }
            }
        });

        Self { addr, state }
    }

    pub(crate) fn host(&self) -> RemoteHost {
        RemoteHost::new(self.addr.ip().to_string(), self.addr.port())
    }

    pub(crate) fn credentials(&self) -> Credentials {
        Credentials::new(USER, PASSWORD)
    }

    pub(crate) fn add_file(&self, path: &str, content: &[u8]) {
        self.state.lock().files.insert(path.to_string(), content.to_vec());
    }

    pub(crate) fn add_dir(&self, path: &str) {
        self.state.lock().dirs.insert(path.to_string());
    }

    pub(crate) fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.state.lock().files.get(path).cloned()
    }

    /// Paths the SFTP subsystem opened, in order
    pub(crate) fn opened(&self) -> Vec<String> {
        self.state.lock().opened.clone()
    }

    pub(crate) fn commands(&self) -> Vec<String> {
        self.state.lock().commands.clone()
    }

    /// Disconnect every client from the server side.
    pub(crate) async fn drop_clients(&self) {
        let sessions = self.state.lock().sessions.clone();
        for session in sessions {
            let _ = session
                .disconnect(russh::Disconnect::ByApplication, "going away".to_string(), "en".to_string())
                .await;
        }
    }
}

/// Target of a `cat > '<path>'` receiver
fn receive_target(command: &str) -> Option<String> {
    let quoted = command.strip_prefix("cat > ")?;
    Some(quoted.trim_matches('\'').to_string())
}

fn finish_exec(
    session: &mut Session,
    channel: ChannelId,
    stdout: &str,
    stderr: &str,
    exit_status: u32,
) -> Result<(), russh::Error> {
    if !stdout.is_empty() {
        session.data(channel, CryptoVec::from(stdout))?;
    }
    if !stderr.is_empty() {
        session.extended_data(channel, 1, CryptoVec::from(stderr))?;
    }
    session.exit_status_request(channel, exit_status)?;
    session.eof(channel)?;
    session.close(channel)
}

struct PendingReceive {
    target: String,
    data: Vec<u8>,
}

struct LoopbackHandler {
    state: Arc<Mutex<ServerState>>,
    channels: HashMap<ChannelId, Channel<Msg>>,
    receives: HashMap<ChannelId, PendingReceive>,
}

impl LoopbackHandler {
    fn new(state: Arc<Mutex<ServerState>>) -> Self {
        Self {
            state,
            channels: HashMap::new(),
            receives: HashMap::new(),
        }
    }
}

impl server::Handler for LoopbackHandler {
    type Error = russh::Error;

    async fn auth_password(&mut self, user: &str, password: &str) -> Result<Auth, Self::Error> {
        if user == USER && password == PASSWORD {
            Ok(Auth::Accept)
        } else {
            Ok(Auth::reject())
        }
    }

    async fn channel_open_session(
        &mut self,
        channel: Channel<Msg>,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        self.channels.insert(channel.id(), channel);
        Ok(true)
    }

    async fn exec_request(
        &mut self,
        channel: ChannelId,
        data: &[u8],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        // exec input arrives through `data` below, not the channel object
        self.channels.remove(&channel);
        let command = String::from_utf8_lossy(data).into_owned();
        self.state.lock().commands.push(command.clone());
        session.channel_success(channel)?;

        if let Some(target) = receive_target(&command) {
            if target.starts_with(READ_ONLY_DIR) {
                let message = format!("sh: {}: Permission denied\n", target);
                return finish_exec(session, channel, "", &message, 1);
            }
            self.receives.insert(
                channel,
                PendingReceive {
                    target,
                    data: Vec::new(),
                },
            );
            return Ok(());
        }

        if command == REPORT_COMMAND {
            finish_exec(session, channel, "to stdout\n", "to stderr\n", 3)
        } else {
            finish_exec(session, channel, "", "", 0)
        }
    }

    async fn data(&mut self, channel: ChannelId, data: &[u8], _session: &mut Session) -> Result<(), Self::Error> {
        if let Some(receive) = self.receives.get_mut(&channel) {
            receive.data.extend_from_slice(data);
        }
        Ok(())
    }

    async fn channel_eof(&mut self, channel: ChannelId, session: &mut Session) -> Result<(), Self::Error> {
        if let Some(receive) = self.receives.remove(&channel) {
            self.state.lock().files.insert(receive.target, receive.data);
            finish_exec(session, channel, "", "", 0)?;
        }
        Ok(())
    }

    async fn subsystem_request(
        &mut self,
        channel_id: ChannelId,
        name: &str,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        match self.channels.remove(&channel_id) {
            Some(channel) if name == "sftp" => {
                session.channel_success(channel_id)?;
                let sftp = SftpFiles {
                    state: self.state.clone(),
                    handles: HashMap::new(),
                    next_handle: 0,
                };
                russh_sftp::server::run(channel.into_stream(), sftp).await;
            }
            _ => session.channel_failure(channel_id)?,
        }
        Ok(())
    }
}

/// Read-only SFTP view of the file table
struct SftpFiles {
    state: Arc<Mutex<ServerState>>,
    handles: HashMap<String, String>,
    next_handle: u32,
}

impl russh_sftp::server::Handler for SftpFiles {
    type Error = StatusCode;

    fn unimplemented(&self) -> Self::Error {
        StatusCode::OpUnsupported
    }

    async fn stat(&mut self, id: u32, path: String) -> Result<Attrs, Self::Error> {
        let state = self.state.lock();
        let attrs = if state.dirs.contains(&path) {
            FileAttributes {
                permissions: Some(0o040755),
                ..FileAttributes::empty()
            }
        } else if let Some(data) = state.files.get(&path) {
            FileAttributes {
                size: Some(data.len() as u64),
                permissions: Some(0o100644),
                ..FileAttributes::empty()
            }
        } else {
            return Err(StatusCode::NoSuchFile);
        };
        Ok(Attrs { id, attrs })
    }

    async fn open(
        &mut self,
        id: u32,
        filename: String,
        _pflags: OpenFlags,
        _attrs: FileAttributes,
    ) -> Result<Handle, Self::Error> {
        {
            let mut state = self.state.lock();
            if !state.files.contains_key(&filename) {
                return Err(StatusCode::NoSuchFile);
            }
            state.opened.push(filename.clone());
        }
        self.next_handle += 1;
        let handle = self.next_handle.to_string();
        self.handles.insert(handle.clone(), filename);
        Ok(Handle { id, handle })
    }

    async fn read(&mut self, id: u32, handle: String, offset: u64, len: u32) -> Result<Data, Self::Error> {
        let path = self.handles.get(&handle).ok_or(StatusCode::Failure)?;
        let state = self.state.lock();
        let content = state.files.get(path).ok_or(StatusCode::NoSuchFile)?;
        let start = usize::try_from(offset).map_err(|_| StatusCode::Eof)?;
        if start >= content.len() {
            return Err(StatusCode::Eof);
        }
        let end = content.len().min(start + len as usize);
        Ok(Data {
            id,
            data: content[start..end].to_vec(),
        })
    }

    async fn close(&mut self, id: u32, handle: String) -> Result<Status, Self::Error> {
        self.handles.remove(&handle);
        Ok(Status {
            id,
            status_code: StatusCode::Ok,
            error_message: "Ok".to_string(),
            language_tag: "en-US".to_string(),
        })
    }
}
