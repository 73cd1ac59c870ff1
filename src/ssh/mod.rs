//! SSH module - authenticated transports for the file explorer
//!
//! This module provides the connection layer using the russh library.
//!
//! # Features
//! - Password authentication with a bounded connect timeout
//! - Optional host key pinning by SHA256 fingerprint
//! - Single-owner handle task; channels are opened through `HandleController`

mod client;
mod config;
mod error;
mod handle_owner;

pub use client::{fingerprint_of, ClientHandler, SshClient, SshSession};
pub use config::{ConnectOptions, Credentials, HostKeyPolicy, RemoteHost};
pub use error::SshError;
pub use handle_owner::{spawn_handle_owner_task, HandleCommand, HandleController};
