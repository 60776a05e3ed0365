//! Transactional in-place rewriting.
//!
//! [`RewriteGuard::apply`] rewrites every file in a [`ChangeLog`]; dropping or
//! finishing the guard reverts them. [`with_rewritten_files`] wraps a closure
//! in that guard so the revert runs on every exit path, unwinding included.
//!
//! Matching is positional-sequential: each file is read top to bottom with a
//! cursor into its entry list, and a line is substituted only when it equals
//! the entry under the cursor. Under non-interference, revert restores the
//! exact bytes observed when the log was built. When a file drifts, the
//! unmatched entries are left alone and a warning is logged.
//!
//! A file that already holds a replacement-shaped line ahead of a recorded
//! original cannot be reverted positionally. Apply detects this and keeps the
//! pre-apply bytes in memory; they are written back only if the file is
//! unchanged since apply.

use crate::changelog::{lines, ChangeEntry, ChangeLog, FileChanges};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use xxhash_rust::xxh3::xxh3_64;

/// Which side of each entry is expected and which is emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// `original` -> `replacement`
    Apply,
    /// `replacement` -> `original`
    Revert,
}

/// Output of one substitution pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Substitution {
    pub content: Vec<u8>,
    /// Number of entries consumed, i.e. the final cursor position
    pub matched: usize,
}

/// Run one positional-sequential pass of `entries` over `content`.
pub fn substitute(content: &[u8], entries: &[ChangeEntry], direction: Direction) -> Substitution {
    let mut output = Vec::with_capacity(content.len() + entries.len());
    let mut cursor = 0;

    for line in lines(content) {
        if let Some(entry) = entries.get(cursor) {
            let (expected, emitted) = match direction {
                Direction::Apply => (&entry.original, &entry.replacement),
                Direction::Revert => (&entry.replacement, &entry.original),
            };
            if line == expected.as_bytes() {
                output.extend_from_slice(emitted.as_bytes());
                cursor += 1;
                continue;
            }
        }
        output.extend_from_slice(line);
    }

    Substitution {
        content: output,
        matched: cursor,
    }
}

#[derive(Error, Debug)]
pub enum RewriteError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl RewriteError {
    pub fn path(&self) -> &Path {
        match self {
            RewriteError::Read { path, .. } | RewriteError::Write { path, .. } => path,
        }
    }
}

/// Rewriting a file failed before the protected work could run.
///
/// Files rewritten before the failure were reverted; anything that could not
/// be restored is listed in `revert_failures`.
#[derive(Error, Debug)]
#[error("Failed to apply rewrite: {source}")]
pub struct ApplyError {
    #[source]
    pub source: RewriteError,
    pub revert_failures: Vec<RevertError>,
}

/// One file could not be restored.
#[derive(Error, Debug)]
#[error("Failed to revert rewrite: {source}")]
pub struct RevertError {
    #[from]
    pub source: RewriteError,
}

/// Failure of a rewritten scope.
#[derive(Error, Debug)]
pub enum ScopeError<E> {
    #[error(transparent)]
    Apply(#[from] ApplyError),

    /// The protected work failed; revert has already been attempted.
    #[error("Protected work failed: {error}")]
    Work {
        error: E,
        revert_failures: Vec<RevertError>,
    },

    /// The protected work succeeded but some files could not be restored.
    #[error("Failed to restore {} file(s) after rewriting", .failures.len())]
    Revert { failures: Vec<RevertError> },
}

impl<E> ScopeError<E> {
    /// Files left in rewritten state, whatever the primary failure was.
    pub fn revert_failures(&self) -> &[RevertError] {
        match self {
            ScopeError::Apply(err) => &err.revert_failures,
            ScopeError::Work {
                revert_failures, ..
            } => revert_failures,
            ScopeError::Revert { failures } => failures,
        }
    }
}

/// Summary of a revert pass.
#[derive(Debug, Default)]
#[must_use = "RevertReport carries revert failures"]
pub struct RevertReport {
    /// Files whose content hashes back to what apply read
    pub restored: Vec<PathBuf>,
    /// Files edited while rewritten; reverted as far as possible but not
    /// byte-identical to what apply read
    pub drifted: Vec<PathBuf>,
    pub failures: Vec<RevertError>,
}

impl RevertReport {
    pub fn is_clean(&self) -> bool {
        self.drifted.is_empty() && self.failures.is_empty()
    }
}

/// Atomic file write: tempfile + fsync + rename.
///
/// The tempfile lives next to the target so the rename stays on one
/// filesystem, and inherits the target's permissions.
pub(crate) fn atomic_write(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let parent = path.parent().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "Path has no parent directory",
        )
    })?;

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(content)?;
    temp.as_file().sync_all()?;

    if let Ok(meta) = fs::metadata(path) {
        fs::set_permissions(temp.path(), meta.permissions())?;
    }

    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

fn read(path: &Path) -> Result<Vec<u8>, RewriteError> {
    fs::read(path).map_err(|source| RewriteError::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn write(path: &Path, content: &[u8]) -> Result<(), RewriteError> {
    atomic_write(path, content).map_err(|source| RewriteError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// Bookkeeping for one file the guard rewrote.
#[derive(Debug)]
struct AppliedFile {
    /// Index into `log.files()`
    index: usize,
    /// Entries consumed on apply; revert only replays these
    matched: usize,
    /// xxh3 of the content apply read, which revert aims to give back
    baseline: u64,
    /// Set when a positional revert of the written content would not give the
    /// original back (a replacement-shaped line precedes its original).
    ambiguous: Option<Snapshot>,
}

#[derive(Debug)]
struct Snapshot {
    original: Vec<u8>,
    /// xxh3 of the content written on apply
    written: u64,
}

/// Rewrite one file forward.
fn apply_file(index: usize, changes: &FileChanges) -> Result<AppliedFile, RewriteError> {
    let content = read(&changes.path)?;
    let result = substitute(&content, &changes.entries, Direction::Apply);

    if result.matched < changes.entries.len() {
        tracing::warn!(
            file = %changes.path.display(),
            matched = result.matched,
            expected = changes.entries.len(),
            "file changed since the change log was built"
        );
    }

    let round_trip = substitute(
        &result.content,
        &changes.entries[..result.matched],
        Direction::Revert,
    );
    let ambiguous = (round_trip.content != content).then(|| {
        tracing::debug!(file = %changes.path.display(), "positional revert is ambiguous, keeping snapshot");
        Snapshot {
            written: xxh3_64(&result.content),
            original: content.clone(),
        }
    });

    if result.content != content {
        write(&changes.path, &result.content)?;
    }

    tracing::debug!(file = %changes.path.display(), matched = result.matched, "rewrote file");
    Ok(AppliedFile {
        index,
        matched: result.matched,
        baseline: xxh3_64(&content),
        ambiguous,
    })
}

enum RevertOutcome {
    Restored,
    Drifted,
}

/// Revert the entries one file consumed on apply.
fn revert_file(changes: &FileChanges, applied: &AppliedFile) -> Result<RevertOutcome, RewriteError> {
    let entries = &changes.entries[..applied.matched];
    let content = read(&changes.path)?;

    let reverted = match &applied.ambiguous {
        // Untouched since apply: the snapshot is exactly what we replaced.
        Some(snapshot) if xxh3_64(&content) == snapshot.written => snapshot.original.clone(),
        _ => {
            let result = substitute(&content, entries, Direction::Revert);
            if result.matched < entries.len() {
                tracing::warn!(
                    file = %changes.path.display(),
                    matched = result.matched,
                    expected = entries.len(),
                    "rewritten lines missing during revert; leaving remainder untouched"
                );
            }
            result.content
        }
    };
    if reverted != content {
        write(&changes.path, &reverted)?;
    }

    if xxh3_64(&reverted) != applied.baseline {
        return Ok(RevertOutcome::Drifted);
    }

    if applied.baseline != changes.fingerprint {
        return Ok(RevertOutcome::Restored);
    }
    // Content is back to what the builder saw; give the mtime back too so
    // incremental builds do not treat the file as touched.
    if let Some(modified) = changes.modified {
        if let Err(err) = filetime::set_file_mtime(&changes.path, modified) {
            tracing::debug!(file = %changes.path.display(), error = %err, "could not restore mtime");
        }
    }
    Ok(RevertOutcome::Restored)
}

/// Holds a change log in its applied state. Reverts on [`finish`](Self::finish) or drop.
#[must_use = "dropping the guard reverts the rewrite immediately"]
#[derive(Debug)]
pub struct RewriteGuard<'a> {
    log: &'a ChangeLog,
    /// In apply order
    applied: Vec<AppliedFile>,
    finished: bool,
}

impl<'a> RewriteGuard<'a> {
    /// Rewrite every file in `log`, in order.
    ///
    /// Stops at the first failure and reverts what was already rewritten.
    pub fn apply(log: &'a ChangeLog) -> Result<Self, ApplyError> {
        let mut guard = Self {
            log,
            applied: Vec::with_capacity(log.len()),
            finished: false,
        };

        tracing::info!(
            files = log.len(),
            entries = log.entry_count(),
            "applying rewrite"
        );

        for (index, changes) in log.files().iter().enumerate() {
            match apply_file(index, changes) {
                Ok(applied) => guard.applied.push(applied),
                Err(source) => {
                    tracing::error!(error = %source, "rewrite failed, reverting applied files");
                    let report = guard.revert_all();
                    return Err(ApplyError {
                        source,
                        revert_failures: report.failures,
                    });
                }
            }
        }

        Ok(guard)
    }

    /// The change log this guard applied.
    pub fn changes(&self) -> &'a ChangeLog {
        self.log
    }

    /// Revert every applied file and report the outcome.
    pub fn finish(mut self) -> RevertReport {
        self.revert_all()
    }

    fn revert_all(&mut self) -> RevertReport {
        self.finished = true;
        let mut report = RevertReport::default();

        for applied in &self.applied {
            let changes = &self.log.files()[applied.index];
            match revert_file(changes, applied) {
                Ok(RevertOutcome::Restored) => report.restored.push(changes.path.clone()),
                Ok(RevertOutcome::Drifted) => report.drifted.push(changes.path.clone()),
                Err(err) => {
                    tracing::error!(error = %err, "revert failed");
                    report.failures.push(err.into());
                }
            }
        }
        self.applied.clear();

        tracing::info!(
            restored = report.restored.len(),
            drifted = report.drifted.len(),
            failed = report.failures.len(),
            "reverted rewrite"
        );
        report
    }
}

impl Drop for RewriteGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.revert_all();
        }
    }
}

/// Run `work` while every file in `log` is rewritten, then revert.
///
/// Revert runs whether `work` returns `Ok`, `Err`, or panics. A work error
/// takes precedence over revert failures, which are attached to it.
pub fn with_rewritten_files<T, E, F>(log: &ChangeLog, work: F) -> Result<T, ScopeError<E>>
where
    F: FnOnce(&ChangeLog) -> Result<T, E>,
{
    let guard = RewriteGuard::apply(log)?;
    let outcome = work(guard.changes());
    let report = guard.finish();

    match outcome {
        Ok(value) if report.failures.is_empty() => Ok(value),
        Ok(_) => Err(ScopeError::Revert {
            failures: report.failures,
        }),
        Err(error) => Err(ScopeError::Work {
            error,
            revert_failures: report.failures,
        }),
    }
}

/// Before/after text of one file, for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePreview {
    pub path: PathBuf,
    pub before: String,
    pub after: String,
}

/// Compute what applying `log` would produce, without writing anything.
pub fn preview(log: &ChangeLog) -> Result<Vec<FilePreview>, RewriteError> {
    log.files()
        .iter()
        .map(|changes| {
            let content = read(&changes.path)?;
            let result = substitute(&content, &changes.entries, Direction::Apply);
            Ok(FilePreview {
                path: changes.path.clone(),
                before: String::from_utf8_lossy(&content).into_owned(),
                after: String::from_utf8_lossy(&result.content).into_owned(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changelog::scan;
    use crate::rule::{LiteralRule, QuoteIncludeRule};

    fn entries(content: &[u8]) -> Vec<ChangeEntry> {
        scan(content, &LiteralRule::new("a", "b"))
    }

    #[test]
    fn test_substitute_positional_round_trip() {
        let before = b"a\nx\na\ny\n";
        let log = entries(before);

        let applied = substitute(before, &log, Direction::Apply);
        assert_eq!(applied.content, b"b\nx\nb\ny\n");
        assert_eq!(applied.matched, 2);

        let reverted = substitute(&applied.content, &log, Direction::Revert);
        assert_eq!(reverted.content, before);
        assert_eq!(reverted.matched, 2);
    }

    #[test]
    fn test_substitute_passes_non_matching_lines_through() {
        let log = entries(b"a\n");
        let result = substitute(b"x\ny\na\nz", &log, Direction::Apply);
        assert_eq!(result.content, b"x\ny\nb\nz");
    }

    #[test]
    fn test_substitute_never_matches_out_of_order() {
        let log = vec![
            ChangeEntry {
                original: "a\n".into(),
                replacement: "A\n".into(),
            },
            ChangeEntry {
                original: "c\n".into(),
                replacement: "C\n".into(),
            },
        ];
        let result = substitute(b"C\nA\n", &log, Direction::Revert);
        assert_eq!(result.content, b"C\na\n");
        assert_eq!(result.matched, 1);
    }

    #[test]
    fn test_substitute_cursor_stalls_on_missing_entry() {
        let log = vec![
            ChangeEntry {
                original: "a\n".into(),
                replacement: "A\n".into(),
            },
            ChangeEntry {
                original: "c\n".into(),
                replacement: "C\n".into(),
            },
        ];
        // "A" was removed externally: the cursor never advances, so "C" stays.
        let result = substitute(b"x\nC\n", &log, Direction::Revert);
        assert_eq!(result.content, b"x\nC\n");
        assert_eq!(result.matched, 0);
    }

    #[test]
    fn test_scope_scenario_include() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("foo.hpp");
        fs::write(&file, "  #include \"bar.hpp\"\n").unwrap();

        let log = ChangeLog::build([&file], &QuoteIncludeRule).unwrap();
        let seen = with_rewritten_files(&log, |_| {
            fs::read_to_string(&file).map_err(|e| e.to_string())
        })
        .unwrap();

        assert_eq!(seen, "  #include <bar.hpp>\n");
        assert_eq!(fs::read_to_string(&file).unwrap(), "  #include \"bar.hpp\"\n");
    }

    #[test]
    fn test_ambiguous_file_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("mixed.hpp");
        let before = "#include <a.h>\n#include \"a.h\"\n";
        fs::write(&file, before).unwrap();

        let log = ChangeLog::build([&file], &QuoteIncludeRule).unwrap();
        let entries = &log.files()[0].entries;
        let naive = substitute(
            &substitute(before.as_bytes(), entries, Direction::Apply).content,
            entries,
            Direction::Revert,
        );
        assert_ne!(naive.content, before.as_bytes());

        let report = RewriteGuard::apply(&log).unwrap().finish();
        assert!(report.is_clean());
        assert_eq!(fs::read_to_string(&file).unwrap(), before);
    }

    #[test]
    fn test_ambiguous_file_edited_in_scope_reverts_positionally() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("mixed.hpp");
        let before = "#include <a.h>\n#include \"a.h\"\n";
        fs::write(&file, before).unwrap();

        let log = ChangeLog::build([&file], &QuoteIncludeRule).unwrap();
        let guard = RewriteGuard::apply(&log).unwrap();
        assert_eq!(
            fs::read_to_string(&file).unwrap(),
            "#include <a.h>\n#include <a.h>\n"
        );
        fs::write(&file, "#include <a.h>\n#include <a.h>\nint x;\n").unwrap();
        let report = guard.finish();

        assert!(report.failures.is_empty());
        assert_eq!(report.drifted, vec![file.clone()]);
        // The stale snapshot is not written; the first matching line is reverted.
        assert_eq!(
            fs::read_to_string(&file).unwrap(),
            "#include \"a.h\"\n#include <a.h>\nint x;\n"
        );
    }

    #[test]
    fn test_edit_before_apply_restores_apply_time_content() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.txt");
        fs::write(&file, "a\nx\na\n").unwrap();
        let old = filetime::FileTime::from_unix_time(1_000_000, 0);
        filetime::set_file_mtime(&file, old).unwrap();

        let log = ChangeLog::build([&file], &LiteralRule::new("a", "b")).unwrap();
        fs::write(&file, "x\na\n").unwrap();
        let guard = RewriteGuard::apply(&log).unwrap();
        assert_eq!(fs::read_to_string(&file).unwrap(), "x\nb\n");
        let report = guard.finish();

        assert!(report.is_clean());
        assert_eq!(report.restored, vec![file.clone()]);
        assert_eq!(fs::read_to_string(&file).unwrap(), "x\na\n");
        // Build-time mtime belongs to different content.
        let meta = fs::metadata(&file).unwrap();
        assert_ne!(filetime::FileTime::from_last_modification_time(&meta), old);
    }

    #[test]
    fn test_guard_reverts_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.txt");
        fs::write(&file, "a\n").unwrap();

        let log = ChangeLog::build([&file], &LiteralRule::new("a", "b")).unwrap();
        {
            let _guard = RewriteGuard::apply(&log).unwrap();
            assert_eq!(fs::read_to_string(&file).unwrap(), "b\n");
        }
        assert_eq!(fs::read_to_string(&file).unwrap(), "a\n");
    }

    #[test]
    fn test_revert_restores_mtime() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.txt");
        fs::write(&file, "a\n").unwrap();
        let old = filetime::FileTime::from_unix_time(1_000_000, 0);
        filetime::set_file_mtime(&file, old).unwrap();

        let log = ChangeLog::build([&file], &LiteralRule::new("a", "b")).unwrap();
        let report = RewriteGuard::apply(&log).unwrap().finish();

        assert!(report.is_clean());
        assert_eq!(report.restored, vec![file.clone()]);
        let meta = fs::metadata(&file).unwrap();
        assert_eq!(filetime::FileTime::from_last_modification_time(&meta), old);
    }

    #[test]
    fn test_revert_reports_drift() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.txt");
        fs::write(&file, "a\nx\n").unwrap();

        let log = ChangeLog::build([&file], &LiteralRule::new("a", "b")).unwrap();
        let guard = RewriteGuard::apply(&log).unwrap();
        fs::write(&file, "b\nx\nextra\n").unwrap();
        let report = guard.finish();

        assert!(report.failures.is_empty());
        assert_eq!(report.drifted, vec![file.clone()]);
        assert_eq!(fs::read_to_string(&file).unwrap(), "a\nx\nextra\n");
    }

    #[test]
    #[cfg(unix)]
    fn test_atomic_write_keeps_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("script.sh");
        fs::write(&file, "old").unwrap();
        fs::set_permissions(&file, fs::Permissions::from_mode(0o755)).unwrap();

        atomic_write(&file, b"new").unwrap();

        assert_eq!(fs::read_to_string(&file).unwrap(), "new");
        let mode = fs::metadata(&file).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o755);
    }

    #[test]
    fn test_preview_does_not_write() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("foo.hpp");
        fs::write(&file, "#include \"bar.hpp\"\nint x;\n").unwrap();

        let log = ChangeLog::build([&file], &QuoteIncludeRule).unwrap();
        let previews = preview(&log).unwrap();

        assert_eq!(previews.len(), 1);
        assert_eq!(previews[0].after, "#include <bar.hpp>\nint x;\n");
        assert_eq!(
            fs::read_to_string(&file).unwrap(),
            "#include \"bar.hpp\"\nint x;\n"
        );
    }
}
