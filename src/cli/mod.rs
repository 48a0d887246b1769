//! CLI for the conformance-test harness
//!
//! ## Commands
//!
//! - `status` - Report the installed tool version
//! - `check <file>` - Verify a requirements selection against the tool
//! - `run` - Execute a conformance run and summarize the verdicts
//! - `exec [ARGS]...` - Invoke the installed tool directly
//!
//! ## Design
//!
//! The CLI uses clap for argument parsing with derive macros.
//! Command functions return `CliResult<T>` instead of calling
//! `process::exit`. Only the top-level `run()` function handles errors and
//! exits. Installation of the tool itself (download, archive extraction) is
//! handled elsewhere; this front end only drives an existing installation.

// Enforce explicit error handling - no panicking in production code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod commands;

use std::fmt;
use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

// ============================================================================
// CLI Error handling
// ============================================================================

/// Exit code for CLI operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCode(pub i32);

impl ExitCode {
    pub const SUCCESS: ExitCode = ExitCode(0);
    pub const FAILURE: ExitCode = ExitCode(1);
}

/// Error type for CLI operations.
///
/// Contains a user-facing message and an exit code. The CLI entry point
/// catches these errors, prints the message, and exits with the code.
#[derive(Debug)]
pub struct CliError {
    /// User-facing error message (already formatted for display)
    pub message: String,
    /// Exit code to return to the shell
    pub exit_code: ExitCode,
}

impl CliError {
    /// Create a new CLI error with a message and exit code.
    pub fn new(message: impl Into<String>, exit_code: ExitCode) -> Self {
        Self {
            message: message.into(),
            exit_code,
        }
    }

    /// Create a failure error (exit code 1).
    pub fn failure(message: impl Into<String>) -> Self {
        Self::new(message, ExitCode::FAILURE)
    }

    /// Create an error with a custom exit code.
    pub fn with_code(message: impl Into<String>, code: i32) -> Self {
        Self::new(message, ExitCode(code))
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

/// Result type for CLI operations.
pub type CliResult<T> = Result<T, CliError>;

const VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// Clap CLI definition
// ============================================================================

/// Harness for the SDCcc conformance test tool
#[derive(Parser, Debug)]
#[command(name = "sdccc-harness")]
#[command(version = VERSION)]
#[command(about = "Run the SDCcc conformance test tool and interpret its reports", long_about = None)]
pub struct Cli {
    /// Directory holding the installed tool executable
    #[arg(long, global = true, value_name = "DIR", default_value = ".")]
    pub storage_dir: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Report the installed tool version
    Status {
        /// Fail unless exactly this version is installed
        #[arg(long, value_name = "VERSION")]
        expect_version: Option<String>,
        /// Fail unless at least this version is installed
        #[arg(long, value_name = "VERSION")]
        minimum_version: Option<String>,
    },

    /// Verify a requirements selection against the installed tool
    Check {
        /// Requirements selection file (TOML)
        #[arg(value_name = "FILE")]
        requirements: PathBuf,
    },

    /// Execute a conformance run and summarize the verdicts
    Run {
        /// Tool configuration file (TOML)
        #[arg(long, value_name = "FILE")]
        config: PathBuf,
        /// Requirements selection file (TOML)
        #[arg(long, value_name = "FILE")]
        requirements: PathBuf,
        /// Directory for the test-run report (created, must be empty)
        #[arg(long, value_name = "DIR")]
        run_dir: PathBuf,
        /// Abort the run after this many seconds
        #[arg(long, value_name = "SECONDS")]
        timeout: Option<u64>,
        /// Extra tool option as NAME=VALUE (repeatable; bare NAME for a flag)
        #[arg(long = "tool-option", value_name = "NAME=VALUE")]
        tool_options: Vec<String>,
    },

    /// Invoke the installed tool directly, forwarding all arguments
    Exec {
        /// Arguments forwarded verbatim to the tool
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
}

// ============================================================================
// CLI entry point
// ============================================================================

/// Main CLI entry point.
///
/// This is the only place where `process::exit` is called. All command
/// implementations return `CliResult` and errors are handled here.
pub fn run() {
    let cli = Cli::parse();

    match execute(cli) {
        Ok(exit_code) => {
            if exit_code.0 != 0 {
                process::exit(exit_code.0);
            }
        }
        Err(e) => {
            if !e.message.is_empty() {
                eprintln!("{}", e.message);
            }
            process::exit(e.exit_code.0);
        }
    }
}

/// Execute the CLI command and return result.
fn execute(cli: Cli) -> CliResult<ExitCode> {
    match cli.command {
        Command::Status {
            expect_version,
            minimum_version,
        } => commands::status(&cli.storage_dir, expect_version, minimum_version),
        Command::Check { requirements } => commands::check(&cli.storage_dir, &requirements),
        Command::Run {
            config,
            requirements,
            run_dir,
            timeout,
            tool_options,
        } => commands::run_conformance(
            &cli.storage_dir,
            &config,
            &requirements,
            &run_dir,
            timeout,
            &tool_options,
        ),
        Command::Exec { args } => commands::exec(&cli.storage_dir, &args),
    }
}
