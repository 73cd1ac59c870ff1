//! SSH connection parameters

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

/// Remote endpoint a session connects to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemoteHost {
    /// Hostname or IP address
    pub address: String,

    /// SSH port (default: 22)
    #[serde(default = "default_port")]
    pub port: u16,
}

impl RemoteHost {
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
        }
    }

    /// `host:port` form accepted by the resolver (IPv6 literals are bracketed)
    pub fn socket_target(&self) -> String {
        if self.address.contains(':') {
            format!("[{}]:{}", self.address, self.port)
        } else {
            format!("{}:{}", self.address, self.port)
        }
    }
}

impl fmt::Display for RemoteHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.socket_target())
    }
}

impl FromStr for RemoteHost {
    type Err = String;

    /// Parse `host`, `host:port`, `[v6]:port` or a bare IPv6 literal
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err("empty host".to_string());
        }

        if let Some(rest) = s.strip_prefix('[') {
            let (addr, tail) = rest
                .split_once(']')
                .ok_or_else(|| format!("unterminated IPv6 literal: {}", s))?;
            let port = match tail.strip_prefix(':') {
                Some(p) => p.parse().map_err(|_| format!("invalid port: {}", p))?,
                None if tail.is_empty() => default_port(),
                None => return Err(format!("unexpected trailing text: {}", tail)),
            };
            return Ok(Self::new(addr, port));
        }

        match s.split_once(':') {
            // More than one colon without brackets: bare IPv6 literal
            Some((_, rest)) if rest.contains(':') => Ok(Self::new(s, default_port())),
            Some((host, port)) => {
                let port = port
                    .parse()
                    .map_err(|_| format!("invalid port: {}", port))?;
                Ok(Self::new(host, port))
            }
            None => Ok(Self::new(s, default_port())),
        }
    }
}

/// Username and secret for password authentication.
///
/// Lives in memory for the session only; the secret is wiped on drop and never
/// printed by `Debug`.
#[derive(Clone)]
pub struct Credentials {
    username: String,
    secret: Zeroizing<String>,
}

impl Credentials {
    pub fn new(username: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            secret: Zeroizing::new(secret.into()),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// How the server's host key is checked
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostKeyPolicy {
    /// Accept whatever key the server presents
    #[default]
    AcceptAny,

    /// Only accept a key whose SHA256 fingerprint matches (`SHA256:...`)
    Pinned { fingerprint: String },
}

/// Transport tuning for a single connection attempt
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// Bound on resolve + handshake + authentication
    pub connect_timeout: Duration,
    /// Keepalive interval for the transport
    pub keepalive_interval: Duration,
    /// Host key check
    pub host_key: HostKeyPolicy,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            keepalive_interval: Duration::from_secs(30),
            host_key: HostKeyPolicy::AcceptAny,
        }
    }
}

fn default_port() -> u16 {
    22
}
