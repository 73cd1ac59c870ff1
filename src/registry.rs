//! Session Registry
//!
//! Maps an opaque session token to the `RemoteFileExplorer` that serves it.
//! The web layer stores the token in its cookie and looks the explorer up on
//! every request. Sessions end on explicit logout or after sitting idle for
//! longer than the configured TTL; either way the SSH connection is closed.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::ExplorerConfig;
use crate::explorer::{RemoteFileExplorer, Result};
use crate::ssh::{Credentials, RemoteHost};

/// One registered session
pub struct SessionEntry {
    explorer: Arc<RemoteFileExplorer>,

    pub created_at: DateTime<Utc>,

    /// Last use (Unix timestamp, milliseconds)
    last_active: AtomicI64,
}

impl SessionEntry {
    fn new(explorer: Arc<RemoteFileExplorer>, now: DateTime<Utc>) -> Self {
        Self {
            explorer,
            created_at: now,
            last_active: AtomicI64::new(now.timestamp_millis()),
        }
    }

    fn touch(&self, now: DateTime<Utc>) {
        self.last_active.store(now.timestamp_millis(), Ordering::Release);
    }

    pub fn last_active(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.last_active.load(Ordering::Acquire)).unwrap_or(self.created_at)
    }

    fn idle_millis(&self, now: DateTime<Utc>) -> i64 {
        now.timestamp_millis() - self.last_active.load(Ordering::Acquire)
    }
}

/// Registry statistics (for monitoring)
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryStats {
    pub total_sessions: usize,
    /// Sessions whose connection is still live
    pub open_sessions: usize,
    pub idle_timeout_secs: u64,
    /// Longest idle time among current sessions
    pub max_idle_secs: Option<i64>,
}

pub struct SessionRegistry {
    sessions: DashMap<String, Arc<SessionEntry>>,
    config: ExplorerConfig,
    reaper: Mutex<Option<JoinHandle<()>>>,
}

impl SessionRegistry {
    pub fn new(config: ExplorerConfig) -> Self {
        Self {
            sessions: DashMap::new(),
            config,
            reaper: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ExplorerConfig {
        &self.config
    }

    /// Connect a new explorer and register it. Returns the session token.
    pub async fn open_session(&self, host: &RemoteHost, credentials: &Credentials) -> Result<String> {
        let explorer = RemoteFileExplorer::connect(host, credentials, &self.config).await?;
        Ok(self.register(Arc::new(explorer)))
    }

    /// Register an explorer under a fresh random token.
    pub fn register(&self, explorer: Arc<RemoteFileExplorer>) -> String {
        let token = Uuid::new_v4().to_string();
        self.sessions
            .insert(token.clone(), Arc::new(SessionEntry::new(explorer, Utc::now())));
        info!("Session registered ({} active)", self.sessions.len());
        token
    }

    /// Register an explorer under `token`; a session already stored there is
    /// closed.
    pub async fn insert(&self, token: String, explorer: Arc<RemoteFileExplorer>) {
        let previous = self
            .sessions
            .insert(token, Arc::new(SessionEntry::new(explorer, Utc::now())));
        if let Some(previous) = previous {
            debug!("Replacing existing session");
            previous.explorer.close().await;
        }
    }

    /// Look up a session and mark it active.
    ///
    /// A session whose connection has died is dropped and `None` returned.
    pub fn get(&self, token: &str) -> Option<Arc<RemoteFileExplorer>> {
        let entry = self.sessions.get(token).map(|e| e.value().clone())?;

        if !entry.explorer.is_open() {
            self.sessions.remove_if(token, |_, current| Arc::ptr_eq(current, &entry));
            info!("Dropped session with a dead connection");
            return None;
        }

        entry.touch(Utc::now());
        Some(entry.explorer.clone())
    }

    /// End a session and close its connection. Returns false for an unknown
    /// token.
    pub async fn logout(&self, token: &str) -> bool {
        match self.sessions.remove(token) {
            Some((_, entry)) => {
                entry.explorer.close().await;
                info!("Session logged out ({} active)", self.sessions.len());
                true
            }
            None => false,
        }
    }

    /// Close and remove every session idle longer than the TTL.
    pub async fn evict_idle(&self) -> usize {
        self.evict_idle_at(Utc::now()).await
    }

    async fn evict_idle_at(&self, now: DateTime<Utc>) -> usize {
        let ttl_millis = (self.config.idle_timeout_secs as i64).saturating_mul(1000);

        let idle: Vec<String> = self
            .sessions
            .iter()
            .filter(|e| e.value().idle_millis(now) > ttl_millis)
            .map(|e| e.key().clone())
            .collect();

        // Re-check under the shard lock: a request may have touched it since
        let evicted: Vec<Arc<SessionEntry>> = idle
            .iter()
            .filter_map(|token| {
                self.sessions
                    .remove_if(token, |_, entry| entry.idle_millis(now) > ttl_millis)
                    .map(|(_, entry)| entry)
            })
            .collect();

        for entry in &evicted {
            entry.explorer.close().await;
        }

        if !evicted.is_empty() {
            info!(
                "Evicted {} idle session(s) ({} active)",
                evicted.len(),
                self.sessions.len()
            );
        }
        evicted.len()
    }

    /// Start the periodic idle sweep. Replaces a running sweep.
    pub fn spawn_reaper(self: &Arc<Self>) {
        let registry: Weak<Self> = Arc::downgrade(self);
        let period = self.config.reaper_interval();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // the first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(registry) = registry.upgrade() else {
                    break;
                };
                registry.evict_idle().await;
            }
            debug!("Session reaper stopped");
        });

        if let Some(previous) = self.reaper.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Stop the sweep and close every session.
    pub async fn shutdown(&self) {
        if let Some(reaper) = self.reaper.lock().take() {
            reaper.abort();
        }

        let tokens: Vec<String> = self.sessions.iter().map(|e| e.key().clone()).collect();
        let entries: Vec<Arc<SessionEntry>> = tokens
            .iter()
            .filter_map(|token| self.sessions.remove(token).map(|(_, entry)| entry))
            .collect();

        for entry in &entries {
            entry.explorer.close().await;
        }
        info!("Session registry shut down, closed {} session(s)", entries.len());
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn stats(&self) -> RegistryStats {
        let now = Utc::now();
        let mut open_sessions = 0;
        let mut max_idle_millis: Option<i64> = None;

        for entry in self.sessions.iter() {
            if entry.explorer.is_open() {
                open_sessions += 1;
            }
            let idle = entry.idle_millis(now);
            max_idle_millis = Some(max_idle_millis.map_or(idle, |max| max.max(idle)));
        }

        RegistryStats {
            total_sessions: self.sessions.len(),
            open_sessions,
            idle_timeout_secs: self.config.idle_timeout_secs,
            max_idle_secs: max_idle_millis.map(|ms| ms / 1000),
        }
    }
}

impl Drop for SessionRegistry {
    fn drop(&mut self) {
        if let Some(reaper) = self.reaper.get_mut().take() {
            reaper.abort();
        }
    }
}
