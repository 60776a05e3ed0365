use std::path::{Path, PathBuf};
use thiserror::Error;

/// Project boundary checks so in-place rewriting never touches files outside
/// the project being bound.
#[derive(Debug, Clone)]
pub struct ProjectGuard {
    /// Canonical path to the project root
    project_root: PathBuf,
    /// Canonical paths that must never be rewritten even inside the project
    excluded_paths: Vec<PathBuf>,
}

#[derive(Error, Debug)]
pub enum GuardError {
    #[error("Path is outside project: {path} (project: {project})")]
    OutsideProject { path: PathBuf, project: PathBuf },

    #[error("Path is in excluded directory: {path} (excluded: {excluded})")]
    Excluded { path: PathBuf, excluded: PathBuf },

    #[error("Failed to canonicalize {path}: {source}")]
    Canonicalize {
        path: PathBuf,
        source: std::io::Error,
    },
}

fn canonicalize(path: &Path) -> Result<PathBuf, GuardError> {
    path.canonicalize().map_err(|source| GuardError::Canonicalize {
        path: path.to_path_buf(),
        source,
    })
}

impl ProjectGuard {
    /// Create a guard rooted at `project_root`.
    ///
    /// The root is canonicalized so symlinked checkouts compare correctly.
    pub fn new(project_root: impl AsRef<Path>) -> Result<Self, GuardError> {
        Ok(Self {
            project_root: canonicalize(project_root.as_ref())?,
            excluded_paths: Vec::new(),
        })
    }

    /// Exclude a directory (e.g. the generator checkout or its output) from
    /// rewriting. Directories that do not exist yet are ignored.
    pub fn exclude(mut self, path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_root.join(path)
        };
        if let Ok(canonical) = absolute.canonicalize() {
            self.excluded_paths.push(canonical);
        }
        self
    }

    /// Check that `path` may be rewritten, returning its canonical form.
    pub fn validate_path(&self, path: impl AsRef<Path>) -> Result<PathBuf, GuardError> {
        let path = path.as_ref();
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_root.join(path)
        };

        let canonical = canonicalize(&absolute)?;

        if !canonical.starts_with(&self.project_root) {
            return Err(GuardError::OutsideProject {
                path: canonical,
                project: self.project_root.clone(),
            });
        }

        if let Some(excluded) = self
            .excluded_paths
            .iter()
            .find(|excluded| canonical.starts_with(excluded))
        {
            return Err(GuardError::Excluded {
                path: canonical,
                excluded: excluded.clone(),
            });
        }

        Ok(canonical)
    }

    /// Get the project root.
    pub fn project_root(&self) -> &Path {
        &self.project_root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_validate_path_inside_project() {
        let temp_dir = tempfile::tempdir().unwrap();
        let project = temp_dir.path();
        let guard = ProjectGuard::new(project).unwrap();

        let file = project.join("src/graph.hpp");
        fs::create_dir_all(file.parent().unwrap()).unwrap();
        fs::write(&file, b"").unwrap();

        assert!(guard.validate_path(&file).is_ok());
        assert!(guard.validate_path("src/graph.hpp").is_ok());
    }

    #[test]
    fn test_validate_path_outside_project() {
        let temp_dir = tempfile::tempdir().unwrap();
        let project = temp_dir.path().join("project");
        fs::create_dir_all(&project).unwrap();
        let guard = ProjectGuard::new(&project).unwrap();

        let outside = temp_dir.path().join("outside.hpp");
        fs::write(&outside, b"").unwrap();

        let result = guard.validate_path(&outside);
        assert!(matches!(result, Err(GuardError::OutsideProject { .. })));
    }

    #[test]
    fn test_validate_path_excluded() {
        let temp_dir = tempfile::tempdir().unwrap();
        let project = temp_dir.path();
        let binder = project.join("binder/source");
        fs::create_dir_all(&binder).unwrap();
        let file = binder.join("binder.hpp");
        fs::write(&file, b"").unwrap();

        let guard = ProjectGuard::new(project).unwrap().exclude("binder");

        let result = guard.validate_path(&file);
        assert!(matches!(result, Err(GuardError::Excluded { .. })));
    }

    #[test]
    #[cfg(unix)]
    fn test_validate_symlink_escape() {
        use std::os::unix::fs::symlink;

        let temp_dir = tempfile::tempdir().unwrap();
        let project = temp_dir.path().join("project");
        fs::create_dir_all(&project).unwrap();

        let outside = temp_dir.path().join("outside.hpp");
        fs::write(&outside, b"").unwrap();

        let link = project.join("escape.hpp");
        symlink(&outside, &link).unwrap();

        let guard = ProjectGuard::new(&project).unwrap();
        let result = guard.validate_path(&link);

        assert!(matches!(result, Err(GuardError::OutsideProject { .. })));
    }
}
