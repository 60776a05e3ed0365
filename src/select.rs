//! Candidate file selection.
//!
//! Walks a set of roots and yields every file whose extension is in the
//! filter, sorted and de-duplicated so that re-running over an untouched
//! tree yields the same list (and therefore the same change log).

use crate::safety::{GuardError, ProjectGuard};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

/// A directory to search, optionally limited in depth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRoot {
    pub path: PathBuf,
    /// Maximum walk depth below `path` (`None` = unlimited).
    pub max_depth: Option<usize>,
}

impl SearchRoot {
    pub fn recursive(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            max_depth: None,
        }
    }

    pub fn with_depth(path: impl Into<PathBuf>, max_depth: usize) -> Self {
        Self {
            path: path.into(),
            max_depth: Some(max_depth),
        }
    }
}

#[derive(Error, Debug)]
pub enum SelectionError {
    #[error("Failed to walk {root}: {source}")]
    Walk {
        root: PathBuf,
        source: walkdir::Error,
    },

    #[error(transparent)]
    Guard(#[from] GuardError),
}

/// Produces the ordered set of candidate files for rewriting.
#[derive(Debug, Clone)]
pub struct FileSelector {
    roots: Vec<SearchRoot>,
    extensions: Vec<String>,
    guard: Option<ProjectGuard>,
}

impl FileSelector {
    pub fn new<I, S>(roots: Vec<SearchRoot>, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            roots,
            extensions: extensions
                .into_iter()
                .map(|ext| ext.into().trim_start_matches('.').to_string())
                .collect(),
            guard: None,
        }
    }

    /// Reject any selected file that resolves outside the guard's project and
    /// skip files under its excluded directories.
    pub fn with_guard(mut self, guard: ProjectGuard) -> Self {
        self.guard = Some(guard);
        self
    }

    fn matches_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|want| want == ext))
    }

    /// Enumerate matching files across all roots.
    ///
    /// Roots that do not exist are skipped; optional build trees are often absent.
    pub fn select(&self) -> Result<Vec<PathBuf>, SelectionError> {
        let mut files = BTreeSet::new();

        for root in &self.roots {
            if !root.path.exists() {
                tracing::debug!(root = %root.path.display(), "search root missing, skipping");
                continue;
            }

            let mut walker = WalkDir::new(&root.path).follow_links(false);
            if let Some(depth) = root.max_depth {
                walker = walker.max_depth(depth);
            }

            for entry in walker {
                let entry = entry.map_err(|source| SelectionError::Walk {
                    root: root.path.clone(),
                    source,
                })?;
                // is_file follows symlinks, so dangling links are skipped too
                if !entry.path().is_file() || !self.matches_extension(entry.path()) {
                    continue;
                }

                let path = match &self.guard {
                    Some(guard) => match guard.validate_path(entry.path()) {
                        Ok(path) => path,
                        Err(GuardError::Excluded { path, .. }) => {
                            tracing::debug!(file = %path.display(), "excluded from selection");
                            continue;
                        }
                        Err(err) => return Err(err.into()),
                    },
                    None => entry.path().to_path_buf(),
                };
                files.insert(path);
            }
        }

        tracing::debug!(count = files.len(), "selected candidate files");
        Ok(files.into_iter().collect())
    }
}
