//! Listing probe output parser

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Summary header tokens printed by `ls -l` in various locales
const HEADER_TOKENS: &[&str] = &["total", "总用量", "合計", "insgesamt", "итого", "razem", "totale"];

const FIELD_SEPARATOR: char = '|';

/// Fixed-width part of a POSIX permission string (type + 9 mode bits)
const RIGHTS_LEN: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Dir,
}

impl EntryKind {
    pub fn is_dir(self) -> bool {
        matches!(self, EntryKind::Dir)
    }
}

/// One entry of a directory listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub name: String,
    /// Permission string with the type marker normalized to `d` or `-`
    pub rights: String,
    /// Size as printed by the remote tool (not parsed)
    pub size: String,
    /// `YYYY-MM-DD HH:MM:00`
    pub date: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    #[serde(rename = "linkTarget", default, skip_serializing_if = "Option::is_none")]
    pub link_target: Option<String>,
}

impl DirectoryEntry {
    /// Parsed modification time, if the remote date had the expected shape
    pub fn modified_at(&self) -> Option<NaiveDateTime> {
        NaiveDateTime::parse_from_str(&self.date, "%Y-%m-%d %H:%M:%S").ok()
    }
}

/// Parse listing probe output into entries, in input order.
///
/// Blank lines, summary headers and lines with fewer than eight fields are
/// skipped rather than failing the listing.
pub fn parse(raw: &str) -> Vec<DirectoryEntry> {
    raw.lines().filter_map(parse_line).collect()
}

fn parse_line(line: &str) -> Option<DirectoryEntry> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    let first_token = line.split_whitespace().next()?;
    if is_header(first_token) {
        return None;
    }

    let fields: Vec<&str> = line.splitn(8, FIELD_SEPARATOR).collect();
    if fields.len() < 8 {
        return None;
    }

    let raw_rights = fields[0].trim();
    if is_header(raw_rights) || raw_rights.is_empty() {
        return None;
    }

    let mut name = fields[7];
    if name.is_empty() {
        return None;
    }

    let is_link = raw_rights.starts_with('l');
    let mut link_target = None;
    if is_link {
        if let Some((link, target)) = name.split_once(" -> ") {
            name = link;
            link_target = Some(target.to_string());
        }
    }

    let kind = if raw_rights.starts_with('d') {
        EntryKind::Dir
    } else {
        EntryKind::File
    };

    Some(DirectoryEntry {
        name: name.to_string(),
        rights: normalize_rights(raw_rights),
        size: fields[4].trim().to_string(),
        date: format!("{} {}:00", fields[5].trim(), fields[6].trim()),
        kind,
        link_target,
    })
}

fn is_header(token: &str) -> bool {
    HEADER_TOKENS.contains(&token)
}

/// Drop ACL/SELinux/xattr markers, map every type marker except `d` to `-`
/// and clear a trailing sticky marker.
///
/// Lossy for sticky entries: `t` also means others-execute, and that bit is
/// reported as `-` together with the sticky flag (`drwxrwxrwt` becomes
/// `drwxrwxrw-`).
fn normalize_rights(raw: &str) -> String {
    let mut chars: Vec<char> = raw.chars().collect();

    if chars.len() > RIGHTS_LEN && matches!(chars.last(), Some('+' | '.' | '@')) {
        chars.truncate(RIGHTS_LEN);
    }

    if let Some(first) = chars.first_mut() {
        if *first != 'd' {
            *first = '-';
        }
    }

    if chars.len() > 1 {
        if let Some(last) = chars.last_mut() {
            if *last == 't' || *last == 'T' {
                *last = '-';
            }
        }
    }

    chars.into_iter().collect()
}
