//! Cooperative (tokio) runner
//!
//! Same contract as [`super::blocking::Runner`], but the caller suspends
//! instead of blocking: the run suspends at process start, pipe reads,
//! process exit and timeout expiry, and nothing but the child handle crosses
//! those suspension points.
//!
//! The child is spawned with `kill_on_drop`, so a caller that cancels or
//! abandons the awaited run cannot leak the process: the kill lands before
//! the cancellation finishes unwinding. The grace period cannot be awaited
//! during drop, so cancellation escalates straight to KILL; the
//! TERM-grace-KILL ladder applies on the timeout path, where the run is
//! still being polled.

use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tracing::{debug, warn};

use crate::config::{self, ConfigError};
use crate::requirements::{self, RequirementsError, SemanticVersion, VersionCheck};

use super::{
    Capture, RunOptions, RunResult, RunnerError, TERM_GRACE, discover_executable, finish,
    prepare_command, validate, working_dir,
};

/// Asynchronous runner for the conformance tool.
#[derive(Debug, Clone)]
pub struct AsyncRunner {
    exe: PathBuf,
    test_run_dir: PathBuf,
}

impl AsyncRunner {
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

    /// Execute a conformance run without blocking the calling thread.
    ///
    /// Identical contract to the blocking runner: full output capture,
    /// timeout with TERM-grace-KILL escalation, best-effort report parsing
    /// for any exit code.
    pub async fn run(&self, options: &RunOptions) -> Result<RunResult, RunnerError> {
        let args = prepare_command(&self.test_run_dir, options)?;
        debug!(program = %self.exe.display(), ?args, "starting conformance run");
        let capture = capture_output(
            &self.exe,
            &args,
            working_dir(&self.exe, options),
            options.timeout,
        )
        .await?;
        debug!(exit_code = capture.exit_code, "conformance run finished");
        Ok(finish(capture, &self.test_run_dir))
    }

    /// Version reported by the installed executable.
    pub async fn version(&self) -> Result<SemanticVersion, RequirementsError> {
        let capture = capture_output(
            &self.exe,
            &["--version".to_string()],
            self.exe.parent().unwrap_or_else(|| Path::new(".")),
            Some(requirements::VERSION_QUERY_TIMEOUT),
        )
        .await
        .map_err(requirements::query_error)?;
        requirements::version_from_capture(&capture)
    }

    /// Compare the installed version against a minimum requirement.
    pub async fn check_version(
        &self,
        minimum: &SemanticVersion,
    ) -> Result<VersionCheck, RequirementsError> {
        Ok(VersionCheck::evaluate(self.version().await?, minimum))
    }

    /// Default configuration shipped with the tool.
    pub fn config(&self) -> Result<toml::Table, ConfigError> {
        config::tool_config(&self.exe)
    }

    /// Requirements catalogue shipped with the tool.
    pub fn requirements(&self) -> Result<toml::Table, ConfigError> {
        config::tool_requirements(&self.exe)
    }

    /// Verify a user-provided requirements selection against the tool's
    /// catalogue.
    pub fn check_requirements(&self, path: &Path) -> Result<(), ConfigError> {
        let provided = config::load_toml(path)?;
        let available = config::tool_requirements(&self.exe)?;
        config::check_requirements(&provided, &available)
    }
}

/// Spawn a child and drive it to completion, draining both pipes in the same
/// select loop that waits for exit.
pub(crate) async fn capture_output(
    program: &Path,
    args: &[String],
    cwd: &Path,
    limit: Option<Duration>,
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
        .kill_on_drop(true)
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

    let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
        return Err(RunnerError::Io(io::Error::other(
            "failed to capture tool output pipes",
        )));
    };

    let mut out = Vec::new();
    let mut err = Vec::new();

    let status = match limit {
        Some(limit) => {
            let waited = tokio::time::timeout(
                limit,
                drain_and_wait(&mut child, stdout, stderr, &mut out, &mut err),
            )
            .await;
            match waited {
                Ok(status) => status?,
                Err(_elapsed) => {
                    stop(&mut child).await;
                    return Err(RunnerError::TimeoutExceeded {
                        timeout: limit,
                        stdout: String::from_utf8_lossy(&out).into_owned(),
                        stderr: String::from_utf8_lossy(&err).into_owned(),
                    });
                }
            }
        }
        None => drain_and_wait(&mut child, stdout, stderr, &mut out, &mut err).await?,
    };

    Ok(Capture {
        exit_code: status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&out).into_owned(),
        stderr: String::from_utf8_lossy(&err).into_owned(),
    })
}

/// Read both pipes to EOF concurrently, then reap the child. Draining and
/// waiting never happen sequentially, so a large report log cannot wedge the
/// child against a full pipe buffer.
async fn drain_and_wait(
    child: &mut Child,
    mut stdout: ChildStdout,
    mut stderr: ChildStderr,
    out: &mut Vec<u8>,
    err: &mut Vec<u8>,
) -> io::Result<ExitStatus> {
    let mut obuf = [0u8; 8192];
    let mut ebuf = [0u8; 8192];
    let mut out_done = false;
    let mut err_done = false;

    while !(out_done && err_done) {
        tokio::select! {
            read = stdout.read(&mut obuf), if !out_done => match read? {
                0 => out_done = true,
                n => out.extend_from_slice(&obuf[..n]),
            },
            read = stderr.read(&mut ebuf), if !err_done => match read? {
                0 => err_done = true,
                n => err.extend_from_slice(&ebuf[..n]),
            },
        }
    }

    child.wait().await
}

/// TERM, wait out the grace period, KILL if the child is still alive.
async fn stop(child: &mut Child) {
    terminate(child);
    if tokio::time::timeout(TERM_GRACE, child.wait()).await.is_err() {
        if let Err(error) = child.kill().await {
            warn!(%error, "failed to kill timed-out conformance process");
        }
    }
}

#[cfg(unix)]
fn terminate(child: &Child) {
    if let Some(pid) = child.id() {
        // SAFETY: delivers a signal to the child's pid; no memory is involved.
        unsafe {
            libc::kill(pid as libc::pid_t, libc::SIGTERM);
        }
    }
}

#[cfg(not(unix))]
fn terminate(_child: &Child) {}
