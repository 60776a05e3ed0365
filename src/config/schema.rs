use crate::select::SearchRoot;
use serde::Deserialize;
use std::fmt;
use std::path::{Component, Path, PathBuf};

#[derive(Debug, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct BinderConfig {
    #[serde(default)]
    pub project: ProjectConfig,
    #[serde(default)]
    pub aggregate: AggregateConfig,
    #[serde(default)]
    pub generator: GeneratorConfig,
}

/// Where the project lives and which files get their includes rewritten.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct ProjectConfig {
    #[serde(default = "default_root")]
    pub root: PathBuf,
    #[serde(default = "default_source_dir")]
    pub source_dir: PathBuf,
    #[serde(default = "default_include_dir")]
    pub include_dir: PathBuf,
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    /// Additional trees to rewrite, e.g. vendored dependencies under `build/`.
    #[serde(default = "default_extra_roots")]
    pub extra_roots: Vec<RootConfig>,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct RootConfig {
    pub path: PathBuf,
    #[serde(default)]
    pub max_depth: Option<usize>,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct AggregateConfig {
    /// File name, written at the project root
    #[serde(default = "default_aggregate_output")]
    pub output: String,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct GeneratorConfig {
    /// Explicit generator binary; searched for under `search_dir` when unset.
    #[serde(default)]
    pub executable: Option<PathBuf>,
    #[serde(default = "default_search_dir")]
    pub search_dir: PathBuf,
    #[serde(default = "default_module")]
    pub root_module: String,
    #[serde(default = "default_module")]
    pub namespace: String,
    #[serde(default = "default_prefix")]
    pub prefix: PathBuf,
    #[serde(default = "default_config_file")]
    pub config_file: Option<PathBuf>,
    #[serde(default = "default_std")]
    pub std: String,
    /// Dependency build tree scanned for `*/src/*/include` directories.
    #[serde(default = "default_build_dir")]
    pub build_dir: PathBuf,
    #[serde(default)]
    pub include_dirs: Vec<PathBuf>,
    #[serde(default = "default_defines")]
    pub defines: Vec<String>,
    #[serde(default = "default_verbose")]
    pub verbose: bool,
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_source_dir() -> PathBuf {
    PathBuf::from("src")
}

fn default_include_dir() -> PathBuf {
    PathBuf::from("include")
}

fn default_extensions() -> Vec<String> {
    ["hpp", "cpp", "h", "cc", "c"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_extra_roots() -> Vec<RootConfig> {
    // build/<dep>/src/<dep>/<file>
    vec![RootConfig {
        path: default_build_dir(),
        max_depth: Some(4),
    }]
}

fn default_aggregate_output() -> String {
    "all_cmake_includes.hpp".to_string()
}

fn default_search_dir() -> PathBuf {
    PathBuf::from("binder")
}

fn default_module() -> String {
    "bdsg".to_string()
}

fn default_prefix() -> PathBuf {
    PathBuf::from("cmake_bindings")
}

fn default_config_file() -> Option<PathBuf> {
    Some(PathBuf::from("config.cfg"))
}

fn default_std() -> String {
    "c++14".to_string()
}

fn default_build_dir() -> PathBuf {
    PathBuf::from("build")
}

fn default_defines() -> Vec<String> {
    vec!["NDEBUG".to_string()]
}

fn default_verbose() -> bool {
    true
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            source_dir: default_source_dir(),
            include_dir: default_include_dir(),
            extensions: default_extensions(),
            extra_roots: default_extra_roots(),
        }
    }
}

impl Default for AggregateConfig {
    fn default() -> Self {
        Self {
            output: default_aggregate_output(),
        }
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            executable: None,
            search_dir: default_search_dir(),
            root_module: default_module(),
            namespace: default_module(),
            prefix: default_prefix(),
            config_file: default_config_file(),
            std: default_std(),
            build_dir: default_build_dir(),
            include_dirs: Vec::new(),
            defines: default_defines(),
            verbose: default_verbose(),
        }
    }
}

/// Relative, and made only of normal components (no `.`, `..`, or root).
pub(crate) fn is_plain_relative(path: &Path) -> bool {
    path.components()
        .all(|component| matches!(component, Component::Normal(_)))
        && path.components().next().is_some()
}

impl BinderConfig {
    /// Resolve `path` against the project root unless it is already absolute.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project.root.join(path)
        }
    }

    pub fn source_dir(&self) -> PathBuf {
        self.resolve(&self.project.source_dir)
    }

    pub fn include_dir(&self) -> PathBuf {
        self.resolve(&self.project.include_dir)
    }

    pub fn aggregate_path(&self) -> PathBuf {
        self.project.root.join(&self.aggregate.output)
    }

    /// Every tree whose quoted includes are rewritten.
    pub fn rewrite_roots(&self) -> Vec<SearchRoot> {
        let mut roots = vec![
            SearchRoot::recursive(self.source_dir()),
            SearchRoot::recursive(self.include_dir()),
        ];
        roots.extend(self.project.extra_roots.iter().map(|root| SearchRoot {
            path: self.resolve(&root.path),
            max_depth: root.max_depth,
        }));
        roots
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();

        if self.project.extensions.is_empty() {
            issues.push(ValidationIssue::MissingField {
                field: "project.extensions",
            });
        }
        if self
            .project
            .extensions
            .iter()
            .any(|ext| ext.trim_start_matches('.').trim().is_empty())
        {
            issues.push(ValidationIssue::Invalid {
                field: "project.extensions",
                message: "extensions must not be empty strings".to_string(),
            });
        }
        for root in &self.project.extra_roots {
            if root.max_depth == Some(0) {
                issues.push(ValidationIssue::Invalid {
                    field: "project.extra_roots",
                    message: format!("max_depth for {} must be at least 1", root.path.display()),
                });
            }
        }

        let output = self.aggregate.output.trim();
        if output.is_empty() {
            issues.push(ValidationIssue::MissingField {
                field: "aggregate.output",
            });
        } else if Path::new(output).components().count() != 1 {
            issues.push(ValidationIssue::Invalid {
                field: "aggregate.output",
                message: format!("'{output}' must be a plain file name"),
            });
        }

        for (field, value) in [
            ("generator.root_module", &self.generator.root_module),
            ("generator.namespace", &self.generator.namespace),
            ("generator.std", &self.generator.std),
        ] {
            if value.trim().is_empty() {
                issues.push(ValidationIssue::MissingField { field });
            }
        }
        let prefix = &self.generator.prefix;
        if prefix.as_os_str().is_empty() {
            issues.push(ValidationIssue::MissingField {
                field: "generator.prefix",
            });
        } else if !is_plain_relative(prefix) {
            // The prefix is wiped before every run.
            issues.push(ValidationIssue::Invalid {
                field: "generator.prefix",
                message: format!(
                    "'{}' must be a relative path below the project root",
                    prefix.display()
                ),
            });
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }
}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, issue) in self.issues.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone)]
pub enum ValidationIssue {
    MissingField {
        field: &'static str,
    },
    Invalid {
        field: &'static str,
        message: String,
    },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::MissingField { field } => {
                write!(f, "missing required field '{field}'")
            }
            ValidationIssue::Invalid { field, message } => {
                write!(f, "invalid '{field}': {message}")
            }
        }
    }
}
