//! Integration tests for the CLI
//!
//! Tests the command-line interface for plan and command, and that
//! planning never modifies the project.

use std::fs;
use std::process::{Command, Output};
use tempfile::TempDir;

const SOURCE: &str = "#include \"bdsg/graph.hpp\"\nint x;\n";

/// Helper to create a test project with one quoted include
fn setup_test_project() -> TempDir {
    let dir = TempDir::new().unwrap();

    fs::create_dir_all(dir.path().join("src")).unwrap();
    fs::create_dir_all(dir.path().join("include/bdsg")).unwrap();
    fs::write(dir.path().join("src/graph.cpp"), SOURCE).unwrap();
    fs::write(
        dir.path().join("include/bdsg/graph.hpp"),
        "#pragma once\n#include <string>\n",
    )
    .unwrap();

    dir
}

fn run(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_binder-prep"))
        .args(args)
        .env_remove("BINDER_PREP_CONFIG")
        .env_remove("RUST_LOG")
        .output()
        .unwrap()
}

#[test]
fn test_plan_help() {
    let output = run(&["plan", "--help"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Show which include lines would be rewritten"));
}

#[test]
fn test_plan_lists_rewrites_without_modifying() {
    let project = setup_test_project();

    let output = run(&["plan", "--project", project.path().to_str().unwrap()]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Project:"));
    assert!(stdout.contains("graph.cpp"));
    assert!(stdout.contains("#include <bdsg/graph.hpp>"));
    assert!(stdout.contains("Summary:"));
    assert_eq!(
        fs::read_to_string(project.path().join("src/graph.cpp")).unwrap(),
        SOURCE
    );
}

#[test]
fn test_plan_json() {
    let project = setup_test_project();

    let output = run(&[
        "plan",
        "--json",
        "--project",
        project.path().to_str().unwrap(),
    ]);

    assert!(output.status.success());
    let log: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let files = log["files"].as_array().unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(
        files[0]["entries"][0]["replacement"],
        "#include <bdsg/graph.hpp>\n"
    );
}

#[test]
fn test_plan_uses_project_config() {
    let project = setup_test_project();
    fs::write(
        project.path().join("binder-prep.toml"),
        "[project]\nextensions = [\"hpp\"]\n",
    )
    .unwrap();

    let output = run(&["plan", "--project", project.path().to_str().unwrap()]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("No quoted includes to rewrite"));
}

#[test]
fn test_invalid_config_fails() {
    let project = setup_test_project();
    let config = project.path().join("bad.toml");
    fs::write(&config, "[aggregate]\noutput = \"\"\n").unwrap();

    let output = run(&[
        "plan",
        "--project",
        project.path().to_str().unwrap(),
        "--config",
        config.to_str().unwrap(),
    ]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("aggregate.output"));
}

#[test]
fn test_command_without_generator_fails() {
    let project = setup_test_project();

    let output = run(&["command", "--project", project.path().to_str().unwrap()]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("No 'binder' executable found"));
}

#[test]
#[cfg(not(target_os = "macos"))]
fn test_command_prints_generator_invocation() {
    let project = setup_test_project();
    let bin = project.path().join("binder/build/llvm/release/bin");
    fs::create_dir_all(&bin).unwrap();
    fs::write(bin.join("binder"), "").unwrap();

    let output = run(&["command", "--project", project.path().to_str().unwrap()]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("--root-module bdsg"));
    assert!(stdout.contains("--bind bdsg"));
    assert!(stdout.contains("all_cmake_includes.hpp -- -std=c++14"));
    assert!(stdout.trim_end().ends_with("-DNDEBUG -v"));
}

#[test]
fn test_plan_diff_keeps_context_lines() {
    let project = setup_test_project();

    let output = run(&[
        "plan",
        "--diff",
        "--project",
        project.path().to_str().unwrap(),
    ]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("-#include \"bdsg/graph.hpp\""));
    assert!(stdout.contains("+#include <bdsg/graph.hpp>"));
    assert!(stdout.contains(" int x;"));
}
