//! Remote path handling
//!
//! Remote paths always use `/`. Every path that reaches the command builder or
//! an SFTP call is a `RemotePath`, and the only way to build one is
//! [`normalize`], so "absolute before quoting" holds by construction.

use std::fmt;

use serde::Serialize;

use super::error::{ExplorerError, Result};

/// An absolute remote path (always starts with `/`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct RemotePath(String);

/// Make `path` absolute by prepending `/` when missing.
///
/// No other transformation: `..`, duplicate separators and symlinks are left
/// for the remote host to interpret.
pub fn normalize(path: &str) -> RemotePath {
    if is_absolute_remote_path(path) {
        RemotePath(path.to_string())
    } else {
        RemotePath(format!("/{}", path))
    }
}

/// Check if a remote path is absolute.
pub fn is_absolute_remote_path(path: &str) -> bool {
    path.starts_with('/')
}

/// Join remote path components using `/` separator.
pub fn join_remote_path(base: &str, component: &str) -> String {
    if base.ends_with('/') {
        format!("{}{}", base, component)
    } else {
        format!("{}/{}", base, component)
    }
}

/// Validate a single name component (a filename, not a path).
///
/// Rejects empty names, `.`/`..` and anything containing a separator, so a
/// joined destination can never escape its directory.
pub fn file_component(name: &str) -> Result<&str> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') || name.contains('\0') {
        return Err(ExplorerError::InvalidArgument(format!(
            "not a plain file name: {:?}",
            name
        )));
    }
    Ok(name)
}

/// Last component of a client-supplied upload name.
///
/// Some browsers send the full local path, with either separator.
pub fn client_file_name(name: &str) -> &str {
    name.rsplit(['/', '\\']).next().unwrap_or(name)
}

impl RemotePath {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Append a validated name component.
    pub fn join(&self, name: &str) -> Result<RemotePath> {
        let name = file_component(name)?;
        Ok(RemotePath(join_remote_path(&self.0, name)))
    }

    /// The path with a trailing `/`, so tools like `mv`/`cp` treat it as a
    /// target directory.
    pub fn as_directory(&self) -> String {
        if self.0.ends_with('/') {
            self.0.clone()
        } else {
            format!("{}/", self.0)
        }
    }

    /// Last non-empty component, or `/` for the root.
    pub fn file_name(&self) -> &str {
        self.0
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .filter(|name| !name.is_empty())
            .unwrap_or("/")
    }
}

impl fmt::Display for RemotePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RemotePath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
