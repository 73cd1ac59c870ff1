//! SSH Client implementation using russh

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use russh::client::{self, DisconnectReason, Handle};
use russh::keys::{PublicKey, PublicKeyBase64};
use sha2::{Digest, Sha256};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::config::{ConnectOptions, Credentials, HostKeyPolicy, RemoteHost};
use super::error::SshError;

/// An authenticated transport
///
/// `link_lost` turns `true` once russh ends the session, whether the peer
/// disconnected or the transport failed. It also resolves when the handler is
/// dropped.
pub struct SshSession {
    pub handle: Handle<ClientHandler>,
    pub link_lost: watch::Receiver<bool>,
}

/// Opens authenticated SSH transports
pub struct SshClient {
    host: RemoteHost,
    options: ConnectOptions,
}

impl SshClient {
    pub fn new(host: RemoteHost, options: ConnectOptions) -> Self {
        Self { host, options }
    }

    /// Connect and authenticate with a password.
    ///
    /// Resolution, handshake and authentication all run under the connect
    /// timeout.
    pub async fn connect(self, credentials: &Credentials) -> Result<SshSession, SshError> {
        let target = self.host.socket_target();
        info!("Connecting to SSH server at {}", target);

        let ssh_config = client::Config {
            inactivity_timeout: None,
            keepalive_interval: Some(self.options.keepalive_interval),
            keepalive_max: 3,
            ..Default::default()
        };

        let handler = ClientHandler::new(self.host.clone(), self.options.host_key.clone());
        let link_lost = handler.link_watch();

        let handle = tokio::time::timeout(
            self.options.connect_timeout,
            Self::handshake(Arc::new(ssh_config), target.clone(), handler, credentials),
        )
        .await
        .map_err(|_| SshError::Timeout(format!("Connection to {} timed out", target)))??;

        info!("SSH authentication successful for {}@{}", credentials.username(), target);
        Ok(SshSession { handle, link_lost })
    }

    async fn handshake(
        config: Arc<client::Config>,
        target: String,
        handler: ClientHandler,
        credentials: &Credentials,
    ) -> Result<Handle<ClientHandler>, SshError> {
        let socket_addr = tokio::net::lookup_host(&target)
            .await
            .map_err(|e| SshError::ConnectionFailed(format!("Failed to resolve address: {}", e)))?
            .next()
            .ok_or_else(|| SshError::ConnectionFailed("No address found".to_string()))?;

        let mut handle = client::connect(config, socket_addr, handler)
            .await
            .map_err(|e| match e {
                SshError::HostKeyRejected(_) => e,
                other => SshError::ConnectionFailed(other.to_string()),
            })?;

        debug!("SSH handshake completed");

        let authenticated = handle
            .authenticate_password(credentials.username(), credentials.secret())
            .await
            .map_err(|e| SshError::AuthenticationFailed(e.to_string()))?;

        if !authenticated.success() {
            return Err(SshError::AuthenticationFailed(
                "Authentication rejected by server".to_string(),
            ));
        }

        Ok(handle)
    }
}

/// Compute the OpenSSH-style SHA256 fingerprint of a raw public key blob
pub fn fingerprint_of(key_bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key_bytes);
    let hash = hasher.finalize();
    format!("SHA256:{}", BASE64.encode(hash).trim_end_matches('='))
}

/// Client handler for russh callbacks; checks the server key against the
/// configured policy.
pub struct ClientHandler {
    host: RemoteHost,
    policy: HostKeyPolicy,
    link_lost: watch::Sender<bool>,
}

impl ClientHandler {
    pub fn new(host: RemoteHost, policy: HostKeyPolicy) -> Self {
        let (link_lost, _) = watch::channel(false);
        Self {
            host,
            policy,
            link_lost,
        }
    }

    /// Subscribe to the end of the transport
    pub fn link_watch(&self) -> watch::Receiver<bool> {
        self.link_lost.subscribe()
    }

    fn verify(&self, fingerprint: &str) -> Result<bool, SshError> {
        match &self.policy {
            HostKeyPolicy::AcceptAny => {
                debug!("Accepting host key for {} ({})", self.host, fingerprint);
                Ok(true)
            }
            HostKeyPolicy::Pinned { fingerprint: expected } if expected == fingerprint => {
                info!("Host key verified for {}", self.host);
                Ok(true)
            }
            HostKeyPolicy::Pinned { fingerprint: expected } => {
                warn!(
                    "Host key mismatch for {}: expected {}, got {}",
                    self.host, expected, fingerprint
                );
                Err(SshError::HostKeyRejected(format!(
                    "Key for {} does not match pinned fingerprint. Expected: {}, Actual: {}",
                    self.host, expected, fingerprint
                )))
            }
        }
    }
}

impl client::Handler for ClientHandler {
    type Error = SshError;

    async fn check_server_key(&mut self, server_public_key: &PublicKey) -> Result<bool, Self::Error> {
        let fingerprint = fingerprint_of(&server_public_key.public_key_bytes());
        self.verify(&fingerprint)
    }

    async fn disconnected(&mut self, reason: DisconnectReason<Self::Error>) -> Result<(), Self::Error> {
        self.link_lost.send_replace(true);
        match reason {
            DisconnectReason::ReceivedDisconnect(info) => {
                info!("{} closed the connection: {}", self.host, info.message);
                Ok(())
            }
            DisconnectReason::Error(e) => {
                warn!("Connection to {} lost: {}", self.host, e);
                Err(e)
            }
        }
    }
}
