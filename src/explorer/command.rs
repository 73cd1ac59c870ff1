//! Remote command construction
//!
//! Every variable argument (paths, modes, names) is passed through
//! [`shell_quote`] and placed after `--`, so client input can neither break out
//! of its argument nor be read as an option.

use std::fmt;

use super::error::{ExplorerError, Result};
use super::path::RemotePath;
use super::shell::CommandOutput;

/// Quote a string as a single POSIX shell word.
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

/// A fully quoted command. It succeeds only if the remote side reports exit
/// status 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCommand {
    text: String,
}

impl RemoteCommand {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Turn a finished run into a result.
    ///
    /// A missing exit status counts as failure.
    pub fn check(&self, output: CommandOutput) -> Result<CommandOutput> {
        if output.exit_status == Some(0) {
            return Ok(output);
        }
        Err(ExplorerError::RemoteCommand {
            command: self.text.clone(),
            status: output.exit_status,
            output: output.output,
        })
    }
}

impl fmt::Display for RemoteCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Create a directory and its parents; succeeds if it already exists.
pub fn mkdir(path: &RemotePath) -> RemoteCommand {
    RemoteCommand::new(format!("mkdir -p -- {}", shell_quote(path.as_str())))
}

/// Rename (or move) a single entry.
pub fn rename(path: &RemotePath, new_path: &RemotePath) -> RemoteCommand {
    RemoteCommand::new(format!(
        "mv -- {} {}",
        shell_quote(path.as_str()),
        shell_quote(new_path.as_str())
    ))
}

/// One `mv` per source, each into `destination`.
pub fn move_into(paths: &[RemotePath], destination: &RemotePath) -> Vec<RemoteCommand> {
    let target = shell_quote(&destination.as_directory());
    paths
        .iter()
        .map(|path| RemoteCommand::new(format!("mv -- {} {}", shell_quote(path.as_str()), target)))
        .collect()
}

/// One recursive `cp` per source.
///
/// With exactly one source and a non-empty `single_filename`, the copy is
/// created as `destination/single_filename`. Otherwise each source keeps its
/// basename inside `destination` and `single_filename` is ignored.
pub fn copy_into(
    paths: &[RemotePath],
    destination: &RemotePath,
    single_filename: Option<&str>,
) -> Result<Vec<RemoteCommand>> {
    let target = match (paths.len(), single_filename.filter(|name| !name.is_empty())) {
        (1, Some(name)) => destination.join(name)?.to_string(),
        _ => destination.as_directory(),
    };
    let target = shell_quote(&target);

    Ok(paths
        .iter()
        .map(|path| RemoteCommand::new(format!("cp -r -- {} {}", shell_quote(path.as_str()), target)))
        .collect())
}

/// One recursive, non-interactive `rm` per path.
pub fn delete(paths: &[RemotePath]) -> Vec<RemoteCommand> {
    paths
        .iter()
        .map(|path| {
            RemoteCommand::new(format!("rm --interactive=never -r -- {}", shell_quote(path.as_str())))
        })
        .collect()
}

/// One `chmod` per path; `mode` is forwarded verbatim as a single argument.
pub fn chmod(paths: &[RemotePath], mode: &str, recursive: bool) -> Vec<RemoteCommand> {
    let flag = if recursive { "-R " } else { "" };
    let mode = shell_quote(mode);
    paths
        .iter()
        .map(|path| {
            RemoteCommand::new(format!("chmod {}-- {} {}", flag, mode, shell_quote(path.as_str())))
        })
        .collect()
}

/// Receiver for an upload: everything on stdin goes to `target`.
pub fn receive_file(target: &RemotePath) -> RemoteCommand {
    RemoteCommand::new(format!("cat > {}", shell_quote(target.as_str())))
}

/// Turns `ls -l` lines into `perm|links|owner|group|size|date|time|name`.
///
/// The name is whatever follows the seventh field, verbatim. Device files
/// print `major, minor` in place of the size; both halves are kept together.
const LISTING_AWK: &str = r#"{ line = $0; n = 7; size = $5; d = $6; t = $7
  if ($5 ~ /,$/) { n = 8; size = $5 $6; d = $7; t = $8 }
  for (i = 1; i <= n; i++) sub(/^[ \t]*[^ \t]+/, "", line)
  sub(/^[ \t]/, "", line)
  printf "%s|%s|%s|%s|%s|%s|%s|%s\n", $1, $2, $3, $4, size, d, t, line }"#;

/// Long-form listing of `path`, one `|`-separated record per entry.
///
/// The probe keeps the exit status of `ls`, so a missing or unreadable
/// directory fails instead of producing an empty listing.
pub fn list_probe(path: &RemotePath) -> RemoteCommand {
    let script = format!(
        "out=$(LC_ALL=C ls --time-style=long-iso -1 -q -l --hide-control-chars -- {}) || exit $?; printf '%s\\n' \"$out\" | awk {}",
        shell_quote(path.as_str()),
        shell_quote(LISTING_AWK)
    );
    RemoteCommand::new(format!("sh -c {}", shell_quote(&script)))
}
