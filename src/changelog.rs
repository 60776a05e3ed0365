//! Change log construction.
//!
//! The change log records, per file, the lines a [`RewriteRule`] wants to
//! replace, in scan order and without de-duplication. It is built read-only
//! and consumed twice by [`crate::rewrite`]: once to apply, once to revert.

use crate::rule::RewriteRule;
use filetime::FileTime;
use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use xxhash_rust::xxh3::xxh3_64;

/// One recorded substitution. Both lines carry the same terminator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeEntry {
    pub original: String,
    pub replacement: String,
}

/// Every entry recorded for a single file, plus what the file looked like
/// when the entries were recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileChanges {
    pub path: PathBuf,
    pub entries: Vec<ChangeEntry>,
    /// xxh3 of the content observed while building
    pub fingerprint: u64,
    /// mtime observed while building
    #[serde(skip)]
    pub modified: Option<FileTime>,
}

#[derive(Error, Debug)]
#[error("Failed to read {path}: {source}")]
pub struct ReadError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// Mapping from file to its ordered entries. Files without entries are never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChangeLog {
    files: Vec<FileChanges>,
}

/// Split a raw line into its body and terminator (`\n`, `\r\n`, or empty).
pub(crate) fn split_terminator(line: &[u8]) -> (&[u8], &[u8]) {
    let body_len = if line.ends_with(b"\r\n") {
        line.len() - 2
    } else if line.ends_with(b"\n") {
        line.len() - 1
    } else {
        line.len()
    };
    line.split_at(body_len)
}

/// Iterate over lines of `content`, each including its terminator.
pub(crate) fn lines(content: &[u8]) -> impl Iterator<Item = &[u8]> {
    content.split_inclusive(|byte| *byte == b'\n')
}

/// Scan `content` and collect an entry for every line the rule rewrites.
pub fn scan(content: &[u8], rule: &impl RewriteRule) -> Vec<ChangeEntry> {
    let mut entries = Vec::new();
    for line in lines(content) {
        let (body, terminator) = split_terminator(line);
        // Lines that are not UTF-8 cannot match a text rule.
        let Ok(body) = std::str::from_utf8(body) else {
            continue;
        };
        let Some(replacement) = rule.rewrite(body) else {
            continue;
        };
        // Terminators are ASCII, so this is lossless.
        let terminator = String::from_utf8_lossy(terminator);
        entries.push(ChangeEntry {
            original: format!("{body}{terminator}"),
            replacement: format!("{replacement}{terminator}"),
        });
    }
    entries
}

impl ChangeLog {
    /// Build the change log for `files` under `rule`.
    ///
    /// Performs no writes. Any unreadable file aborts the whole build.
    pub fn build<I, P>(files: I, rule: &impl RewriteRule) -> Result<Self, ReadError>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut seen = HashSet::new();
        let mut log = ChangeLog::default();

        for path in files {
            let path = path.as_ref();
            if !seen.insert(path.to_path_buf()) {
                continue;
            }

            let content = fs::read(path).map_err(|source| ReadError {
                path: path.to_path_buf(),
                source,
            })?;

            let entries = scan(&content, rule);
            if entries.is_empty() {
                continue;
            }

            let modified = fs::metadata(path)
                .ok()
                .map(|meta| FileTime::from_last_modification_time(&meta));

            tracing::debug!(file = %path.display(), entries = entries.len(), "recorded changes");
            log.files.push(FileChanges {
                path: path.to_path_buf(),
                entries,
                fingerprint: xxh3_64(&content),
                modified,
            });
        }

        Ok(log)
    }

    pub fn files(&self) -> &[FileChanges] {
        &self.files
    }

    pub fn get(&self, path: &Path) -> Option<&FileChanges> {
        self.files.iter().find(|changes| changes.path == path)
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Total entries across every file.
    pub fn entry_count(&self) -> usize {
        self.files.iter().map(|changes| changes.entries.len()).sum()
    }
}
