//! CLI command implementations
//!
//! Each command returns `CliResult<ExitCode>`; the entry point in `mod.rs`
//! is responsible for printing errors and exiting. Runner errors carry
//! actionable messages already (missing installation vs. timeout vs. dirty
//! run directory), so the commands mostly translate them into `CliError`s.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::command::OptionValue;
use crate::config;
use crate::report::Verdict;
use crate::requirements::{self, SemanticVersion};
use crate::runner::{self, RunOptions, Runner};

use super::{CliError, CliResult, ExitCode};

/// Report which tool version is installed, optionally enforcing an exact or
/// minimum version.
pub fn status(
    storage_dir: &Path,
    expect_version: Option<String>,
    minimum_version: Option<String>,
) -> CliResult<ExitCode> {
    let exe = installed_executable(storage_dir)?;
    let installed = requirements::query_version(&exe).map_err(fail)?;
    println!("{} ({})", installed, exe.display());

    if let Some(expected) = expect_version {
        let expected = parse_version(&expected)?;
        if installed != expected {
            return Err(CliError::failure(format!(
                "expected version {expected}, found {installed}"
            )));
        }
    }
    if let Some(minimum) = minimum_version {
        let minimum = parse_version(&minimum)?;
        if installed < minimum {
            return Err(CliError::failure(format!(
                "installed version {installed} is older than required {minimum}"
            )));
        }
    }
    Ok(ExitCode::SUCCESS)
}

/// Verify a requirements selection file against the installed tool's
/// catalogue.
pub fn check(storage_dir: &Path, requirements: &Path) -> CliResult<ExitCode> {
    let exe = installed_executable(storage_dir)?;
    let provided = config::load_toml(requirements).map_err(fail)?;
    let available = config::tool_requirements(&exe).map_err(fail)?;
    config::check_requirements(&provided, &available).map_err(fail)?;
    println!("requirements selection is supported by the installed tool");
    Ok(ExitCode::SUCCESS)
}

/// Execute a conformance run and print a per-suite verdict summary.
pub fn run_conformance(
    storage_dir: &Path,
    config_file: &Path,
    requirements: &Path,
    run_dir: &Path,
    timeout: Option<u64>,
    tool_options: &[String],
) -> CliResult<ExitCode> {
    let runner =
        Runner::from_storage_dir(&absolute(storage_dir)?, absolute(run_dir)?).map_err(fail)?;

    let mut options = RunOptions::new(absolute(config_file)?, absolute(requirements)?);
    if let Some(secs) = timeout {
        options = options.timeout(Duration::from_secs(secs));
    }
    for raw in tool_options {
        let (name, value) = parse_tool_option(raw);
        options = options.option(name, value);
    }

    let result = runner.run(&options).map_err(fail)?;

    for suite in &result.suites {
        println!(
            "{}: {} passed, {} failed, {} skipped ({} cases)",
            suite.name,
            suite.passed(),
            suite.failed(),
            suite.skipped(),
            suite.len()
        );
        for case in suite.cases() {
            if case.verdict == Verdict::Failed {
                match &case.detail {
                    Some(detail) => println!("  FAILED {}: {}", case.name, first_line(detail)),
                    None => println!("  FAILED {}", case.name),
                }
            }
        }
    }

    let failed = result.count(Verdict::Failed);
    if result.exit_code != 0 {
        Err(CliError::with_code(
            format!("tool exited with code {}", result.exit_code),
            result.exit_code,
        ))
    } else if failed > 0 {
        Err(CliError::failure(format!("{failed} case(s) failed")))
    } else {
        println!("{} case(s) passed", result.count(Verdict::Passed));
        Ok(ExitCode::SUCCESS)
    }
}

/// Forward the given arguments to the installed tool and mirror its exit
/// code.
pub fn exec(storage_dir: &Path, args: &[String]) -> CliResult<ExitCode> {
    let exe = installed_executable(storage_dir)?;
    let status = std::process::Command::new(&exe)
        .args(args)
        .current_dir(exe.parent().unwrap_or_else(|| Path::new(".")))
        .status()
        .map_err(|e| CliError::failure(format!("failed to launch {}: {e}", exe.display())))?;
    Ok(ExitCode(status.code().unwrap_or(-1)))
}

fn installed_executable(storage_dir: &Path) -> CliResult<PathBuf> {
    let exe = runner::discover_executable(storage_dir).map_err(|_| {
        CliError::failure(format!(
            "no tool installed under {} (install it first)",
            storage_dir.display()
        ))
    })?;
    // The tool resolves its resources relative to itself, so it is always
    // launched with its own directory as cwd; that needs an absolute path.
    absolute(&exe)
}

fn parse_version(raw: &str) -> CliResult<SemanticVersion> {
    SemanticVersion::parse(raw)
        .ok_or_else(|| CliError::failure(format!("{raw:?} is not a semantic version")))
}

/// `NAME=VALUE` becomes a scalar option, a bare `NAME` a switch.
fn parse_tool_option(raw: &str) -> (String, OptionValue) {
    match raw.split_once('=') {
        Some((name, value)) => (name.to_string(), OptionValue::Scalar(value.to_string())),
        None => (raw.to_string(), OptionValue::Switch(true)),
    }
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or_default()
}

fn absolute(path: &Path) -> CliResult<PathBuf> {
    std::path::absolute(path)
        .map_err(|e| CliError::failure(format!("cannot resolve {}: {e}", path.display())))
}

fn fail(error: impl std::fmt::Display) -> CliError {
    CliError::failure(error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_options_split_on_the_first_equals() {
        let (name, value) = parse_tool_option("device_epr=urn:uuid:1234=5678");
        assert_eq!(name, "device_epr");
        assert_eq!(value, OptionValue::Scalar("urn:uuid:1234=5678".into()));
    }

    #[test]
    fn bare_tool_options_become_switches() {
        let (name, value) = parse_tool_option("verbose");
        assert_eq!(name, "verbose");
        assert_eq!(value, OptionValue::Switch(true));
    }
}
