//! End-to-end binding generation.
//!
//! check output prefix -> locate generator -> select files -> build change log
//! -> rewrite { aggregate includes -> run generator } -> revert

use crate::aggregate::{write_aggregate, AggregateError};
use crate::changelog::{ChangeLog, ReadError};
use crate::config::schema::is_plain_relative;
use crate::config::BinderConfig;
use crate::generator::{GeneratorCommand, GeneratorError};
use crate::locate::{locate_generator, LocateError};
use crate::rewrite::{with_rewritten_files, ScopeError};
use crate::rule::QuoteIncludeRule;
use crate::safety::{GuardError, ProjectGuard};
use crate::select::{FileSelector, SearchRoot, SelectionError};
use std::path::PathBuf;
use thiserror::Error;

/// Failure of a stage running inside the rewritten scope.
#[derive(Error, Debug)]
pub enum StageError {
    #[error(transparent)]
    Selection(#[from] SelectionError),

    #[error(transparent)]
    Aggregate(#[from] AggregateError),

    #[error(transparent)]
    Generator(#[from] GeneratorError),
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Guard(#[from] GuardError),

    #[error(transparent)]
    Selection(#[from] SelectionError),

    #[error(transparent)]
    Read(#[from] ReadError),

    #[error(transparent)]
    Locate(#[from] LocateError),

    #[error(transparent)]
    Generator(#[from] GeneratorError),

    #[error("Output prefix {prefix} must be a relative path below the project root")]
    PrefixOutsideProject { prefix: PathBuf },

    #[error("Output prefix {prefix} overlaps rewritten tree {root}")]
    PrefixOverlap { prefix: PathBuf, root: PathBuf },

    #[error(transparent)]
    Scope(#[from] ScopeError<StageError>),
}

/// What a successful run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateReport {
    pub generator: PathBuf,
    pub aggregate: PathBuf,
    pub prefix_dir: PathBuf,
    pub rewritten_files: usize,
    pub rewritten_lines: usize,
}

#[derive(Debug, Clone)]
pub struct Pipeline {
    config: BinderConfig,
}

impl Pipeline {
    pub fn new(config: BinderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BinderConfig {
        &self.config
    }

    fn guard(&self) -> Result<ProjectGuard, GuardError> {
        Ok(ProjectGuard::new(&self.config.project.root)?
            .exclude(&self.config.generator.search_dir)
            .exclude(&self.config.generator.prefix))
    }

    fn selector(&self, roots: Vec<SearchRoot>) -> Result<FileSelector, GuardError> {
        Ok(FileSelector::new(roots, self.config.project.extensions.iter().cloned())
            .with_guard(self.guard()?))
    }

    /// The generator wipes its prefix, so it must not contain or sit inside
    /// any tree whose files are rewritten.
    fn check_prefix(&self) -> Result<PathBuf, PipelineError> {
        let prefix = &self.config.generator.prefix;
        if !is_plain_relative(prefix) {
            return Err(PipelineError::PrefixOutsideProject {
                prefix: prefix.clone(),
            });
        }

        let resolved = self.config.resolve(prefix);
        for root in self.config.rewrite_roots() {
            if resolved.starts_with(&root.path) || root.path.starts_with(&resolved) {
                return Err(PipelineError::PrefixOverlap {
                    prefix: resolved,
                    root: root.path,
                });
            }
        }
        Ok(resolved)
    }

    /// Files whose quoted includes are candidates for rewriting.
    pub fn select(&self) -> Result<Vec<PathBuf>, PipelineError> {
        Ok(self.selector(self.config.rewrite_roots())?.select()?)
    }

    /// Build the change log without touching any file.
    pub fn plan(&self) -> Result<ChangeLog, PipelineError> {
        let files = self.select()?;
        Ok(ChangeLog::build(&files, &QuoteIncludeRule)?)
    }

    /// Assemble the generator command for this host.
    pub fn command(&self) -> Result<GeneratorCommand, PipelineError> {
        let generator = &self.config.generator;
        let explicit = generator
            .executable
            .as_ref()
            .map(|exe| self.config.resolve(exe));
        let program = locate_generator(
            explicit.as_deref(),
            &self.config.resolve(&generator.search_dir),
        )?;
        Ok(GeneratorCommand::for_host(
            &self.config,
            program,
            &self.config.aggregate_path(),
        )?)
    }

    /// Generate bindings. Every rewritten file is restored before this returns.
    pub fn run(&self) -> Result<GenerateReport, PipelineError> {
        // Everything that can fail without side effects happens before rewriting.
        self.check_prefix()?;
        let command = self.command()?;
        let log = self.plan()?;
        let aggregate_sources =
            self.selector(vec![SearchRoot::recursive(self.config.source_dir())])?;
        let aggregate_path = self.config.aggregate_path();

        tracing::info!(
            files = log.len(),
            lines = log.entry_count(),
            "rewriting quoted includes"
        );

        let aggregate = with_rewritten_files(&log, |_| -> Result<PathBuf, StageError> {
            let sources = aggregate_sources.select()?;
            let aggregate = write_aggregate(&sources, &aggregate_path)?;
            command.run()?;
            Ok(aggregate)
        })?;

        Ok(GenerateReport {
            generator: command.program.clone(),
            aggregate,
            prefix_dir: command.prefix_dir.clone(),
            rewritten_files: log.len(),
            rewritten_lines: log.entry_count(),
        })
    }
}
