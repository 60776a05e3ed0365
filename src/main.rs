use anyhow::{Context, Result};
use binder_prep::config::{load_for_project, load_from_path, BinderConfig};
use binder_prep::{preview, Pipeline, PipelineError, ScopeError};
use clap::{ArgAction, Parser, Subcommand};
use colored::Colorize;
use similar::{ChangeTag, TextDiff};
use std::env;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "binder-prep")]
#[command(
    about = "Generate C++ bindings with temporarily normalized includes",
    long_about = None
)]
#[command(version)]
struct Cli {
    /// Path to project root (defaults to the current directory)
    #[arg(short, long, global = true)]
    project: Option<PathBuf>,

    /// Config file (defaults to <project>/binder-prep.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rewrite includes, aggregate them, run the generator, then restore sources
    Generate,

    /// Show which include lines would be rewritten, without modifying files
    Plan {
        /// Show unified diff of the rewrite
        #[arg(short, long)]
        diff: bool,

        /// Print the change log as JSON
        #[arg(long, conflicts_with = "diff")]
        json: bool,
    },

    /// Print the generator command line without running it
    Command,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = resolve_config(cli.project, cli.config)?;
    let pipeline = Pipeline::new(config);

    match cli.command {
        Commands::Generate => cmd_generate(&pipeline),
        Commands::Plan { diff, json } => cmd_plan(&pipeline, diff, json),
        Commands::Command => cmd_command(&pipeline),
    }
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "binder_prep=info",
        1 => "binder_prep=debug",
        _ => "binder_prep=trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Resolve the configuration
///
/// Priority order:
/// 1. Explicit --config flag
/// 2. BINDER_PREP_CONFIG environment variable
/// 3. <project>/binder-prep.toml
/// 4. Built-in defaults rooted at the project
///
/// An explicit --project always overrides the config's project root.
fn resolve_config(project: Option<PathBuf>, config: Option<PathBuf>) -> Result<BinderConfig> {
    let project = project
        .map(|path| {
            path.canonicalize()
                .with_context(|| format!("project root {} not found", path.display()))
        })
        .transpose()?;

    let config_path = config.or_else(|| {
        let env_path = env::var_os("BINDER_PREP_CONFIG").map(PathBuf::from)?;
        if env_path.is_file() {
            return Some(env_path);
        }
        eprintln!(
            "{}",
            format!(
                "Warning: BINDER_PREP_CONFIG is set but file doesn't exist: {}",
                env_path.display()
            )
            .yellow()
        );
        None
    });

    let mut config = match (config_path, &project) {
        (Some(path), _) => load_from_path(&path)?,
        (None, Some(project)) => load_for_project(project)?,
        (None, None) => load_for_project(env::current_dir()?)?,
    };

    if let Some(project) = project {
        config.project.root = project;
    }
    Ok(config)
}

/// Helper: Show unified diff between original and rewritten content
fn display_diff(file: &Path, original: &str, modified: &str) {
    println!(
        "\n{}",
        format!("--- {} (original)", file.display()).dimmed()
    );
    println!("{}", format!("+++ {} (rewritten)", file.display()).dimmed());

    let diff = TextDiff::from_lines(original, modified);

    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => format!("-{}", change).red(),
            ChangeTag::Insert => format!("+{}", change).green(),
            ChangeTag::Equal => format!(" {}", change).normal(),
        };
        print!("{}", sign);
    }
}

fn cmd_generate(pipeline: &Pipeline) -> Result<()> {
    let config = pipeline.config();
    println!("Project: {}", config.project.root.display());
    println!("Namespace: {}", config.generator.namespace);
    println!();

    match pipeline.run() {
        Ok(report) => {
            println!(
                "{} Rewrote {} include(s) in {} file(s)",
                "✓".green(),
                report.rewritten_lines,
                report.rewritten_files
            );
            println!("{} Aggregate: {}", "✓".green(), report.aggregate.display());
            println!("{} Bindings: {}", "✓".green(), report.prefix_dir.display());
            println!("{} Sources restored", "✓".green());
            Ok(())
        }
        Err(err) => {
            if let PipelineError::Scope(scope) = &err {
                report_unrestored(scope);
            }
            Err(err.into())
        }
    }
}

fn report_unrestored<E>(scope: &ScopeError<E>) {
    let failures = scope.revert_failures();
    if failures.is_empty() {
        eprintln!("{} Sources restored", "⊙".yellow());
        return;
    }

    eprintln!(
        "{} {} file(s) could not be restored:",
        "✗".red(),
        failures.len()
    );
    for failure in failures {
        eprintln!("  - {}", failure.source.path().display());
        eprintln!("    {}", failure.source.to_string().dimmed());
    }
    eprintln!(
        "  {}",
        "Restore these files from version control before rerunning.".red()
    );
}

fn cmd_plan(pipeline: &Pipeline, show_diff: bool, json: bool) -> Result<()> {
    let log = pipeline.plan()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&log)?);
        return Ok(());
    }

    println!("Project: {}", pipeline.config().project.root.display());
    println!();

    if log.is_empty() {
        println!("{}", "No quoted includes to rewrite".yellow());
        return Ok(());
    }

    if show_diff {
        for file in preview(&log)? {
            display_diff(&file.path, &file.before, &file.after);
        }
    } else {
        for file in log.files() {
            println!("{}", file.path.display());
            for entry in &file.entries {
                println!(
                    "  {} {} {}",
                    entry.original.trim_end().red(),
                    "→".dimmed(),
                    entry.replacement.trim_end().green()
                );
            }
        }
    }

    println!();
    println!("{}", "Summary:".bold());
    println!("  {} file(s)", format!("{}", log.len()).green());
    println!("  {} include(s)", format!("{}", log.entry_count()).green());
    Ok(())
}

fn cmd_command(pipeline: &Pipeline) -> Result<()> {
    let command = pipeline.command()?;
    println!("{}", command);
    Ok(())
}
