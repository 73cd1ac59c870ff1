//! Configuration Types

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::explorer::BatchPolicy;
use crate::ssh::{ConnectOptions, HostKeyPolicy};

/// Current config file version
pub const CONFIG_VERSION: u32 = 1;

/// Explorer settings; every field has a default so partial files load
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExplorerConfig {
    #[serde(default = "default_version")]
    pub version: u32,

    /// Bound on connect + handshake + authentication (seconds)
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Per-command deadline (seconds). Unset means commands may run forever.
    #[serde(default)]
    pub command_timeout_secs: Option<u64>,

    /// Transport keepalive interval (seconds)
    #[serde(default = "default_keepalive_interval")]
    pub keepalive_interval_secs: u64,

    #[serde(default)]
    pub batch_policy: BatchPolicy,

    #[serde(default)]
    pub host_key: HostKeyPolicy,

    /// Idle time before the registry evicts a session (seconds)
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// How often the registry sweeps for idle sessions (seconds)
    #[serde(default = "default_reaper_interval")]
    pub reaper_interval_secs: u64,

    /// In-flight upload chunks before the writer waits
    #[serde(default = "default_upload_queue_depth")]
    pub upload_queue_depth: usize,
}

fn default_version() -> u32 {
    CONFIG_VERSION
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_keepalive_interval() -> u64 {
    30
}

fn default_idle_timeout() -> u64 {
    30 * 60 // 30 minutes
}

fn default_reaper_interval() -> u64 {
    60
}

fn default_upload_queue_depth() -> usize {
    8
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            connect_timeout_secs: default_connect_timeout(),
            command_timeout_secs: None,
            keepalive_interval_secs: default_keepalive_interval(),
            batch_policy: BatchPolicy::default(),
            host_key: HostKeyPolicy::default(),
            idle_timeout_secs: default_idle_timeout(),
            reaper_interval_secs: default_reaper_interval(),
            upload_queue_depth: default_upload_queue_depth(),
        }
    }
}

impl ExplorerConfig {
    pub fn connect_options(&self) -> ConnectOptions {
        ConnectOptions {
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            keepalive_interval: Duration::from_secs(self.keepalive_interval_secs),
            host_key: self.host_key.clone(),
        }
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_secs.map(Duration::from_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    /// Never zero, so the reaper's interval timer is valid
    pub fn reaper_interval(&self) -> Duration {
        Duration::from_secs(self.reaper_interval_secs.max(1))
    }
}
