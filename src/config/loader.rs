use crate::config::schema::{BinderConfig, ValidationError};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Default config file name looked up at the project root.
pub const CONFIG_FILE_NAME: &str = "binder-prep.toml";

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Toml {
        path: Option<PathBuf>,
        source: toml_edit::de::Error,
    },
    Validation {
        path: Option<PathBuf>,
        source: ValidationError,
    },
}

impl ConfigError {
    fn with_path(self, path: &Path) -> Self {
        let path = path.to_path_buf();
        match self {
            ConfigError::Io { .. } => self,
            ConfigError::Toml { path: None, source } => ConfigError::Toml {
                path: Some(path),
                source,
            },
            ConfigError::Validation { path: None, source } => ConfigError::Validation {
                path: Some(path),
                source,
            },
            other => other,
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "failed to read config from {}: {}", path.display(), source)
            }
            ConfigError::Toml { path, source } => match path {
                Some(path) => write!(
                    f,
                    "failed to parse config TOML ({}): {}",
                    path.display(),
                    source
                ),
                None => write!(f, "failed to parse config TOML: {}", source),
            },
            ConfigError::Validation { path, source } => match path {
                Some(path) => write!(f, "invalid config ({}): {}", path.display(), source),
                None => write!(f, "invalid config: {}", source),
            },
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Toml { source, .. } => Some(source),
            ConfigError::Validation { source, .. } => Some(source),
        }
    }
}

pub fn load_from_str(input: &str) -> Result<BinderConfig, ConfigError> {
    let config: BinderConfig = toml_edit::de::from_str(input)
        .map_err(|source| ConfigError::Toml { path: None, source })?;
    config
        .validate()
        .map_err(|source| ConfigError::Validation { path: None, source })?;
    Ok(config)
}

/// Load a config file. A relative `project.root` is taken relative to the
/// directory holding the file.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<BinderConfig, ConfigError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut config = load_from_str(&contents).map_err(|error| error.with_path(path))?;

    if config.project.root.is_relative() {
        if let Some(parent) = path.parent() {
            config.project.root = parent.join(&config.project.root);
        }
    }
    Ok(config)
}

/// Load `<project>/binder-prep.toml` if present, otherwise defaults rooted at `project`.
pub fn load_for_project(project: impl AsRef<Path>) -> Result<BinderConfig, ConfigError> {
    let project = project.as_ref();
    let candidate = project.join(CONFIG_FILE_NAME);
    if candidate.is_file() {
        return load_from_path(candidate);
    }

    let mut config = BinderConfig::default();
    config.project.root = project.to_path_buf();
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_from_str_overrides_defaults() {
        let config = load_from_str(
            r#"
[project]
source_dir = "lib"
extensions = ["hpp"]

[generator]
namespace = "handlegraph"
defines = []
verbose = false
"#,
        )
        .unwrap();

        assert_eq!(config.project.source_dir, PathBuf::from("lib"));
        assert_eq!(config.project.include_dir, PathBuf::from("include"));
        assert_eq!(config.project.extensions, vec!["hpp".to_string()]);
        assert_eq!(config.generator.namespace, "handlegraph");
        assert_eq!(config.generator.root_module, "bdsg");
        assert!(config.generator.defines.is_empty());
        assert!(!config.generator.verbose);
    }

    #[test]
    fn test_load_from_str_empty_is_default() {
        assert_eq!(load_from_str("").unwrap(), BinderConfig::default());
    }

    #[test]
    fn test_load_from_str_rejects_bad_toml() {
        let err = load_from_str("[project\n").unwrap_err();
        assert!(matches!(err, ConfigError::Toml { path: None, .. }));
    }

    #[test]
    fn test_load_from_path_attaches_path_and_resolves_root() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);

        fs::write(&path, "[generator]\nstd = \"\"\n").unwrap();
        let err = load_from_path(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Validation { path: Some(ref p), .. } if p == &path));

        fs::write(&path, "[project]\nroot = \"lib\"\n").unwrap();
        let config = load_from_path(&path).unwrap();
        assert_eq!(config.project.root, dir.path().join("lib"));
    }

    #[test]
    fn test_load_for_project_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_for_project(dir.path()).unwrap();
        assert_eq!(config.project.root, dir.path());
        assert_eq!(config.aggregate.output, "all_cmake_includes.hpp");
    }
}
