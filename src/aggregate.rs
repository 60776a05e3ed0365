//! Include aggregation.
//!
//! Collects every `#include` directive from the project sources into a single
//! header that the generator is pointed at. Runs while includes are in their
//! rewritten (angle-bracket) form.

use crate::rewrite::atomic_write;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AggregateError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write aggregate header {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Distinct include directives found in `files`, sorted.
///
/// Sorting keeps the aggregate independent of filesystem enumeration order.
pub fn collect_includes<I, P>(files: I) -> Result<BTreeSet<String>, AggregateError>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    let mut includes = BTreeSet::new();
    for path in files {
        let path = path.as_ref();
        let content = fs::read(path).map_err(|source| AggregateError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let content = String::from_utf8_lossy(&content);
        includes.extend(
            content
                .lines()
                .filter(|line| line.starts_with("#include"))
                .map(|line| line.trim().to_string()),
        );
    }
    Ok(includes)
}

/// Write the aggregate header for `files` to `output`, returning its path.
pub fn write_aggregate<I, P>(files: I, output: &Path) -> Result<PathBuf, AggregateError>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    let includes = collect_includes(files)?;

    let mut content = String::new();
    for include in &includes {
        content.push_str(include);
        content.push('\n');
    }

    atomic_write(output, content.as_bytes()).map_err(|source| AggregateError::Write {
        path: output.to_path_buf(),
        source,
    })?;

    tracing::info!(
        output = %output.display(),
        includes = includes.len(),
        "wrote aggregate header"
    );
    Ok(output.to_path_buf())
}
