//! Generator command assembly and invocation.

use crate::config::BinderConfig;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum GeneratorError {
    #[error("Failed to prepare output directory {path}: {source}")]
    Prepare {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to launch {program}: {source}")]
    Spawn {
        program: PathBuf,
        source: std::io::Error,
    },

    #[error("Generator exited with {status}")]
    Failed { status: ExitStatus },

    #[error("Failed to query {tool}: {reason}")]
    Probe { tool: &'static str, reason: String },
}

/// Include directories of dependencies built under `build_dir`.
///
/// Dependencies are laid out as `<build_dir>/<name>/src/<name>/`, with headers
/// in either `include/` or `src/include/`.
pub fn dependency_include_dirs(build_dir: &Path) -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = WalkDir::new(build_dir)
        .min_depth(3)
        .max_depth(3)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_dir())
        .filter(|entry| {
            entry
                .path()
                .parent()
                .and_then(|p| p.file_name())
                .is_some_and(|name| name == "src")
        })
        .flat_map(|entry| {
            let checkout = entry.into_path();
            [checkout.join("include"), checkout.join("src/include")]
        })
        .filter(|dir| dir.is_dir())
        .collect();
    dirs.sort();
    dirs
}

fn probe(tool: &'static str, args: &[&str]) -> Result<String, GeneratorError> {
    let output = Command::new(tool)
        .args(args)
        .output()
        .map_err(|e| GeneratorError::Probe {
            tool,
            reason: e.to_string(),
        })?;
    if !output.status.success() {
        return Err(GeneratorError::Probe {
            tool,
            reason: format!("exited with {}", output.status),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Extra compiler flags the host needs to find its C++ standard library.
///
/// On macOS the STL and SDK live under Xcode rather than `/usr/include`;
/// elsewhere nothing is needed.
pub fn host_system_flags() -> Result<Vec<String>, GeneratorError> {
    if !cfg!(target_os = "macos") {
        return Ok(Vec::new());
    }

    let developer_dir = probe("xcode-select", &["-p"])?;
    let stl = Path::new(&developer_dir).join("usr/include/c++/v1");
    let sdk = probe("xcrun", &["-sdk", "macosx", "--show-sdk-path"])?;

    Ok(vec![
        format!("-isystem{}", stl.display()),
        format!("-isysroot{sdk}"),
        // libomp from macports or homebrew
        "-I/opt/local/include/libomp".to_string(),
        "-I/usr/local/include".to_string(),
    ])
}

/// A fully assembled generator invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratorCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Output directory, wiped before each run
    pub prefix_dir: PathBuf,
    pub working_dir: PathBuf,
}

impl GeneratorCommand {
    /// Assemble the command line from `config`.
    ///
    /// `system_flags` are inserted after the project include directory;
    /// see [`host_system_flags`].
    pub fn new(
        config: &BinderConfig,
        program: impl Into<PathBuf>,
        aggregate: &Path,
        system_flags: Vec<String>,
    ) -> Self {
        let generator = &config.generator;
        let prefix_dir = config.resolve(&generator.prefix);

        let mut args = vec![
            "--root-module".to_string(),
            generator.root_module.clone(),
            "--prefix".to_string(),
            format!("{}/", prefix_dir.display()),
            "--bind".to_string(),
            generator.namespace.clone(),
        ];
        if let Some(config_file) = generator
            .config_file
            .as_ref()
            .filter(|p| !p.as_os_str().is_empty())
        {
            args.push("--config".to_string());
            args.push(config.resolve(config_file).display().to_string());
        }
        args.push(aggregate.display().to_string());
        args.push("--".to_string());
        args.push(format!("-std={}", generator.std));
        args.push(format!("-I{}", config.include_dir().display()));
        args.extend(system_flags);

        let dependency_dirs = dependency_include_dirs(&config.resolve(&generator.build_dir));
        let extra_dirs = generator.include_dirs.iter().map(|dir| config.resolve(dir));
        args.extend(
            dependency_dirs
                .into_iter()
                .chain(extra_dirs)
                .map(|dir| format!("-I{}", dir.display())),
        );
        args.extend(generator.defines.iter().map(|define| format!("-D{define}")));
        if generator.verbose {
            args.push("-v".to_string());
        }

        Self {
            program: program.into(),
            args,
            prefix_dir,
            working_dir: config.project.root.clone(),
        }
    }

    /// Assemble the command with the current host's system flags.
    pub fn for_host(
        config: &BinderConfig,
        program: impl Into<PathBuf>,
        aggregate: &Path,
    ) -> Result<Self, GeneratorError> {
        Ok(Self::new(config, program, aggregate, host_system_flags()?))
    }

    /// Recreate the output directory and run the generator to completion.
    pub fn run(&self) -> Result<(), GeneratorError> {
        match fs::remove_dir_all(&self.prefix_dir) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(GeneratorError::Prepare {
                    path: self.prefix_dir.clone(),
                    source,
                })
            }
        }
        fs::create_dir_all(&self.prefix_dir).map_err(|source| GeneratorError::Prepare {
            path: self.prefix_dir.clone(),
            source,
        })?;

        tracing::info!(command = %self, "running generator");
        let status = Command::new(&self.program)
            .args(&self.args)
            .current_dir(&self.working_dir)
            .status()
            .map_err(|source| GeneratorError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !status.success() {
            return Err(GeneratorError::Failed { status });
        }
        Ok(())
    }
}

impl fmt::Display for GeneratorCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}
