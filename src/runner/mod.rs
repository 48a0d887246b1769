//! Managed execution of the conformance tool
//!
//! Two runners share one contract: spawn the tool with a prepared argument
//! vector, capture both output streams completely, enforce an optional
//! timeout with a terminate-then-kill escalation, and parse whatever report
//! the run left behind.
//!
//! - [`blocking::Runner`] occupies the calling thread for the whole run and
//!   drains the output pipes on auxiliary threads.
//! - [`nonblocking::AsyncRunner`] suspends cooperatively on a tokio runtime
//!   and guarantees the child is killed when the awaited run is cancelled.
//!
//! Both runners resolve the tool's working directory to the executable's own
//! parent directory (the tool loads its resources relative to itself) unless
//! the caller overrides it, and both parse the report directory best-effort
//! even after a non-zero exit: verdicts live in the report, the exit code
//! only says whether the tool ran.

pub mod blocking;
pub mod nonblocking;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::command::{OptionValue, build_command};
use crate::report::{TestSuite, Verdict, parse_report_dir};

pub use blocking::Runner;
pub use nonblocking::AsyncRunner;

/// Grace period between SIGTERM and SIGKILL when a run has to be stopped.
pub(crate) const TERM_GRACE: Duration = Duration::from_secs(2);

/// Errors raised while supervising a conformance run.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("no conformance executable found at {}", .path.display())]
    ExecutableNotFound { path: PathBuf },

    #[error("{reason}: {}", .path.display())]
    InvalidPath { path: PathBuf, reason: &'static str },

    #[error("test run directory {} is not empty", .path.display())]
    RunDirectoryNotEmpty { path: PathBuf },

    #[error("conformance run exceeded its timeout of {timeout:?}")]
    TimeoutExceeded {
        timeout: Duration,
        /// Output captured up to the moment the child was terminated.
        stdout: String,
        stderr: String,
    },

    #[error("failed to launch {}: {source}", .program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("i/o failure while supervising the tool process: {0}")]
    Io(#[from] io::Error),
}

/// Per-run inputs. The executable and the test-run directory belong to the
/// runner itself; everything here varies between invocations.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Tool configuration file, forwarded as `--config`. Must be absolute.
    pub config: PathBuf,
    /// Requirements selection file, forwarded as `--testconfig`. Must be
    /// absolute.
    pub requirements: PathBuf,
    /// Overall run timeout. `None` waits indefinitely.
    pub timeout: Option<Duration>,
    /// Additional pass-through options, emitted before the standard ones in
    /// the order given.
    pub extra: Vec<(String, OptionValue)>,
    /// Working directory override. Defaults to the executable's directory.
    pub working_dir: Option<PathBuf>,
}

impl RunOptions {
    pub fn new(config: impl Into<PathBuf>, requirements: impl Into<PathBuf>) -> Self {
        Self {
            config: config.into(),
            requirements: requirements.into(),
            timeout: None,
            extra: Vec::new(),
            working_dir: None,
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn option(mut self, name: impl Into<String>, value: OptionValue) -> Self {
        self.extra.push((name.into(), value));
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

/// Everything one invocation produced.
#[derive(Debug)]
pub struct RunResult {
    /// Child exit code; `-1` when the process was terminated by a signal.
    /// Zero means "the tool ran", not "all checks passed".
    pub exit_code: i32,
    /// Suites parsed from the report directory, empty when the tool exited
    /// before writing a report.
    pub suites: Vec<TestSuite>,
    pub stdout: String,
    pub stderr: String,
}

impl RunResult {
    /// Look up a suite by name.
    pub fn suite(&self, name: &str) -> Option<&TestSuite> {
        self.suites.iter().find(|s| s.name == name)
    }

    /// Total number of cases with the given verdict across all suites.
    pub fn count(&self, verdict: Verdict) -> usize {
        self.suites.iter().map(|s| s.count(verdict)).sum()
    }
}

/// Locate the tool executable in a storage directory.
///
/// The distribution unpacks to exactly one `*.exe` at the top level; zero or
/// several candidates means the directory does not hold a usable
/// installation.
pub fn discover_executable(storage_dir: &Path) -> Result<PathBuf, RunnerError> {
    let entries = fs::read_dir(storage_dir).map_err(|_| RunnerError::ExecutableNotFound {
        path: storage_dir.to_path_buf(),
    })?;
    let mut candidates: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("exe"))
        })
        .collect();
    match candidates.len() {
        1 => Ok(candidates.remove(0)),
        _ => Err(RunnerError::ExecutableNotFound {
            path: storage_dir.to_path_buf(),
        }),
    }
}

/// Shared constructor validation for both runners.
pub(crate) fn validate(exe: &Path, test_run_dir: &Path) -> Result<(), RunnerError> {
    if !exe.is_absolute() {
        return Err(RunnerError::InvalidPath {
            path: exe.to_path_buf(),
            reason: "path to executable must be absolute",
        });
    }
    if !exe.is_file() {
        return Err(RunnerError::ExecutableNotFound {
            path: exe.to_path_buf(),
        });
    }
    if !test_run_dir.is_absolute() {
        return Err(RunnerError::InvalidPath {
            path: test_run_dir.to_path_buf(),
            reason: "path to test run directory must be absolute",
        });
    }
    Ok(())
}

/// Validate per-run inputs and produce the tool's argument vector.
///
/// Creates the test-run directory if missing; an existing non-empty one is
/// rejected so two runs cannot interleave their reports.
pub(crate) fn prepare_command(
    test_run_dir: &Path,
    options: &RunOptions,
) -> Result<Vec<String>, RunnerError> {
    for (path, reason) in [
        (&options.config, "path to config file must be absolute"),
        (
            &options.requirements,
            "path to requirements file must be absolute",
        ),
    ] {
        if !path.is_absolute() {
            return Err(RunnerError::InvalidPath {
                path: path.clone(),
                reason,
            });
        }
    }

    fs::create_dir_all(test_run_dir)?;
    if fs::read_dir(test_run_dir)?.next().is_some() {
        return Err(RunnerError::RunDirectoryNotEmpty {
            path: test_run_dir.to_path_buf(),
        });
    }

    let mut named = options.extra.clone();
    named.push((
        "no_subdirectories".into(),
        OptionValue::Scalar("true".into()),
    ));
    named.push((
        "test_run_directory".into(),
        OptionValue::Scalar(test_run_dir.display().to_string()),
    ));
    named.push((
        "config".into(),
        OptionValue::Scalar(options.config.display().to_string()),
    ));
    named.push((
        "testconfig".into(),
        OptionValue::Scalar(options.requirements.display().to_string()),
    ));
    Ok(build_command(&[], &named))
}

/// Raw outcome of one supervised process, before report parsing.
#[derive(Debug)]
pub(crate) struct Capture {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Assemble the final result: whatever report the run produced is parsed
/// best-effort, regardless of the exit code.
pub(crate) fn finish(capture: Capture, test_run_dir: &Path) -> RunResult {
    RunResult {
        exit_code: capture.exit_code,
        suites: parse_report_dir(test_run_dir),
        stdout: capture.stdout,
        stderr: capture.stderr,
    }
}

/// Working directory for a run: caller override or the tool's own directory.
pub(crate) fn working_dir<'a>(exe: &'a Path, options: &'a RunOptions) -> &'a Path {
    options
        .working_dir
        .as_deref()
        .unwrap_or_else(|| exe.parent().unwrap_or_else(|| Path::new(".")))
}
