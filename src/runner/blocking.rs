//! Thread-blocking runner
//!
//! Occupies the calling thread until the tool exits or the timeout elapses.
//! The only internal parallelism is one auxiliary thread per output pipe, so
//! a child that floods stdout cannot deadlock against a full pipe buffer
//! while we wait on it; both threads are joined before the call returns.

use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, warn};
use wait_timeout::ChildExt;

use crate::config::{self, ConfigError};
use crate::requirements::{self, RequirementsError, SemanticVersion, VersionCheck};

use super::{
    Capture, RunOptions, RunResult, RunnerError, TERM_GRACE, discover_executable, finish,
    prepare_command, validate, working_dir,
};

/// Synchronous runner for the conformance tool.
#[derive(Debug, Clone)]
pub struct Runner {
    exe: PathBuf,
    test_run_dir: PathBuf,
}

impl Runner {
    /// Create a runner for an executable and a test-run directory. Both
    /// paths must be absolute, and the executable must exist.
    pub fn new(
        exe: impl Into<PathBuf>,
        test_run_dir: impl Into<PathBuf>,
    ) -> Result<Self, RunnerError> {
        let exe = exe.into();
        let test_run_dir = test_run_dir.into();
        validate(&exe, &test_run_dir)?;
        Ok(Self { exe, test_run_dir })
    }

    /// Create a runner by locating the executable inside a storage
    /// directory.
    pub fn from_storage_dir(
        storage_dir: &Path,
        test_run_dir: impl Into<PathBuf>,
    ) -> Result<Self, RunnerError> {
        let exe = discover_executable(storage_dir)?;
        Self::new(exe, test_run_dir)
    }

    pub fn executable(&self) -> &Path {
        &self.exe
    }

    pub fn test_run_dir(&self) -> &Path {
        &self.test_run_dir
    }

    /// Execute a conformance run to completion.
    ///
    /// Blocks until the tool exits, then parses the report directory
    /// best-effort whatever the exit code was. A timeout terminates the
    /// child (TERM, grace period, KILL) and fails with
    /// [`RunnerError::TimeoutExceeded`] carrying the output captured so far.
    pub fn run(&self, options: &RunOptions) -> Result<RunResult, RunnerError> {
        let args = prepare_command(&self.test_run_dir, options)?;
        debug!(program = %self.exe.display(), ?args, "starting conformance run");
        let capture = capture_output(
            &self.exe,
            &args,
            working_dir(&self.exe, options),
            options.timeout,
        )?;
        debug!(exit_code = capture.exit_code, "conformance run finished");
        Ok(finish(capture, &self.test_run_dir))
    }

    /// Version reported by the installed executable.
    pub fn version(&self) -> Result<SemanticVersion, RequirementsError> {
        requirements::query_version(&self.exe)
    }

    /// Compare the installed version against a minimum requirement.
    pub fn check_version(
        &self,
        minimum: &SemanticVersion,
    ) -> Result<VersionCheck, RequirementsError> {
        requirements::check_version(&self.exe, minimum)
    }

    /// Default configuration shipped with the tool.
    pub fn config(&self) -> Result<toml::Table, ConfigError> {
        config::tool_config(&self.exe)
    }

    /// Requirements catalogue shipped with the tool.
    pub fn requirements(&self) -> Result<toml::Table, ConfigError> {
        config::tool_requirements(&self.exe)
    }

    /// Test parameters shipped with the tool.
    pub fn test_parameters(&self) -> Result<toml::Table, ConfigError> {
        config::tool_test_parameters(&self.exe)
    }

    /// Verify a user-provided requirements selection against the tool's
    /// catalogue.
    pub fn check_requirements(&self, path: &Path) -> Result<(), ConfigError> {
        let provided = config::load_toml(path)?;
        let available = config::tool_requirements(&self.exe)?;
        config::check_requirements(&provided, &available)
    }
}

/// Spawn a child, drain its pipes on auxiliary threads, wait with an
/// optional timeout. Shared with the version query.
pub(crate) fn capture_output(
    program: &Path,
    args: &[String],
    cwd: &Path,
    timeout: Option<Duration>,
) -> Result<Capture, RunnerError> {
    if !program.is_file() {
        return Err(RunnerError::ExecutableNotFound {
            path: program.to_path_buf(),
        });
    }

    let mut child = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => RunnerError::ExecutableNotFound {
                path: program.to_path_buf(),
            },
            _ => RunnerError::Spawn {
                program: program.to_path_buf(),
                source,
            },
        })?;

    let stdout_handle = child.stdout.take().map(|s| drain(s, "stdout"));
    let stderr_handle = child.stderr.take().map(|s| drain(s, "stderr"));

    let status = match timeout {
        Some(limit) => match child.wait_timeout(limit)? {
            Some(status) => status,
            None => {
                stop(&mut child)?;
                return Err(RunnerError::TimeoutExceeded {
                    timeout: limit,
                    stdout: join_drain(stdout_handle),
                    stderr: join_drain(stderr_handle),
                });
            }
        },
        None => child.wait()?,
    };

    Ok(Capture {
        exit_code: status.code().unwrap_or(-1),
        stdout: join_drain(stdout_handle),
        stderr: join_drain(stderr_handle),
    })
}

/// Read one pipe to EOF, echoing lines into the log as they arrive.
fn drain(stream: impl Read + Send + 'static, label: &'static str) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut text = String::new();
        for line in BufReader::new(stream).lines() {
            match line {
                Ok(line) => {
                    debug!(target: "sdccc", "{label}: {line}");
                    text.push_str(&line);
                    text.push('\n');
                }
                Err(_) => break,
            }
        }
        text
    })
}

fn join_drain(handle: Option<JoinHandle<String>>) -> String {
    match handle {
        Some(handle) => handle.join().unwrap_or_else(|_| {
            warn!("output drain thread panicked");
            String::new()
        }),
        None => String::new(),
    }
}

/// TERM, wait out the grace period, KILL if the child is still alive.
fn stop(child: &mut Child) -> io::Result<()> {
    terminate(child);
    if child.wait_timeout(TERM_GRACE)?.is_none() {
        child.kill()?;
        child.wait()?;
    }
    Ok(())
}

#[cfg(unix)]
fn terminate(child: &Child) {
    // SAFETY: delivers a signal to the child's pid; no memory is involved.
    unsafe {
        libc::kill(child.id() as libc::pid_t, libc::SIGTERM);
    }
}

#[cfg(not(unix))]
fn terminate(_child: &Child) {}
