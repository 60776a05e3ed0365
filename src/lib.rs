//! Binder Prep: reversible include rewriting for binding generation
//!
//! Drives a C++ binding generator over a project whose headers use quoted
//! includes. The generator resolves headers uniformly only through angle
//! brackets, so for the duration of the run every `#include "x"` in the
//! project is rewritten to `#include <x>` in place, and restored afterwards.
//!
//! # Architecture
//!
//! - [`FileSelector`] enumerates candidate files.
//! - [`ChangeLog::build`] scans them with a [`RewriteRule`] and records
//!   `(original, replacement)` line pairs per file, in scan order.
//! - [`with_rewritten_files`] applies the log, runs the protected work, and
//!   reverts on every exit path (error, panic, or success).
//! - [`Pipeline`] wires selection, aggregation and the generator together.
//!
//! # Guarantees
//!
//! - Revert is byte-identical when nothing else touches the files
//! - Atomic file writes (tempfile + fsync + rename)
//! - Files outside the project root are never rewritten
//! - Files without matching lines are never opened for writing
//!
//! # Example
//!
//! ```no_run
//! use binder_prep::{with_rewritten_files, ChangeLog, QuoteIncludeRule};
//! use std::path::PathBuf;
//!
//! let files = vec![PathBuf::from("src/graph.cpp")];
//! let log = ChangeLog::build(&files, &QuoteIncludeRule).expect("readable sources");
//!
//! let result = with_rewritten_files(&log, |_| -> Result<(), std::io::Error> {
//!     // run tooling that needs angle-bracket includes
//!     Ok(())
//! });
//! if let Err(e) = result {
//!     eprintln!("scope failed: {}", e);
//! }
//! ```

pub mod aggregate;
pub mod changelog;
pub mod config;
pub mod generator;
pub mod locate;
pub mod pipeline;
pub mod rewrite;
pub mod rule;
pub mod safety;
pub mod select;

// Re-exports
pub use aggregate::{collect_includes, write_aggregate, AggregateError};
pub use changelog::{ChangeEntry, ChangeLog, FileChanges, ReadError};
pub use config::{load_for_project, load_from_path, load_from_str, BinderConfig, ConfigError};
pub use generator::{GeneratorCommand, GeneratorError};
pub use locate::{locate_generator, LocateError};
pub use pipeline::{GenerateReport, Pipeline, PipelineError, StageError};
pub use rewrite::{
    preview, substitute, with_rewritten_files, ApplyError, Direction, FilePreview, RevertError,
    RevertReport, RewriteError, RewriteGuard, ScopeError, Substitution,
};
pub use rule::{LiteralRule, QuoteIncludeRule, RewriteRule};
pub use safety::{GuardError, ProjectGuard};
pub use select::{FileSelector, SearchRoot, SelectionError};
