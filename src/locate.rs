//! Generator executable lookup.

use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

/// File name of the generator binary.
pub const GENERATOR_NAME: &str = "binder";

#[derive(Error, Debug)]
pub enum LocateError {
    #[error("Configured generator executable does not exist: {0}")]
    Missing(PathBuf),

    #[error("No 'binder' executable found under {0}; build the generator first or set generator.executable")]
    NotFound(PathBuf),
}

/// Resolve the generator binary.
///
/// An explicit path wins. Otherwise `search_dir` is walked for a file named
/// `binder` whose parent directory is `bin` (the layout of the generator's
/// own build tree, `build/<llvm>/<config>/bin/binder`). The first hit in
/// sorted order is returned.
pub fn locate_generator(
    explicit: Option<&Path>,
    search_dir: &Path,
) -> Result<PathBuf, LocateError> {
    if let Some(path) = explicit {
        return if path.is_file() {
            Ok(path.to_path_buf())
        } else {
            Err(LocateError::Missing(path.to_path_buf()))
        };
    }

    let found = WalkDir::new(search_dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .find(|entry| {
            let path = entry.path();
            path.file_name().and_then(|n| n.to_str()) == Some(GENERATOR_NAME)
                && path
                    .parent()
                    .and_then(|p| p.file_name())
                    .and_then(|n| n.to_str())
                    == Some("bin")
        });

    match found {
        Some(entry) => {
            tracing::debug!(path = %entry.path().display(), "located generator");
            Ok(entry.into_path())
        }
        None => Err(LocateError::NotFound(search_dir.to_path_buf())),
    }
}
