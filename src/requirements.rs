//! Installed-version checking
//!
//! The harness refuses to drive tool releases older than what it was
//! written against, so callers typically ask "which version is installed,
//! and does it satisfy my minimum?" before starting a run. The version
//! query is a fast diagnostic call (`<exe> --version` printing a single
//! semantic-version line) and runs under its own short timeout rather than
//! a test-run timeout.

use std::cmp::Ordering;
use std::path::Path;
use std::time::Duration;

use thiserror::Error;

use crate::runner::{Capture, RunnerError, blocking};

/// Upper bound for the `--version` diagnostic call.
pub const VERSION_QUERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors raised while establishing the installed version.
#[derive(Debug, Error)]
pub enum RequirementsError {
    #[error("no conformance executable installed at {} (install it first)", .path.display())]
    NotInstalled { path: std::path::PathBuf },

    #[error("reported version {raw:?} is not a semantic version")]
    VersionParse { raw: String },

    #[error("version query exited with code {code}: {stderr}")]
    QueryFailed { code: i32, stderr: String },

    #[error("version query failed: {0}")]
    Query(#[source] RunnerError),
}

/// `major.minor.patch` version as reported by the tool.
///
/// Missing minor/patch components default to zero; pre-release and build
/// suffixes are ignored for comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SemanticVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl SemanticVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse a version string such as `2.3.1`, `2.3`, `3` or `2.3.1-rc1`.
    pub fn parse(version_str: &str) -> Option<Self> {
        let core = version_str
            .trim()
            .trim_start_matches('v')
            .split(['-', '+'])
            .next()?;
        let parts: Vec<&str> = core.split('.').collect();

        match parts.len() {
            1 => Some(Self::new(parts[0].parse().ok()?, 0, 0)),
            2 => Some(Self::new(
                parts[0].parse().ok()?,
                parts[1].parse().ok()?,
                0,
            )),
            3 => Some(Self::new(
                parts[0].parse().ok()?,
                parts[1].parse().ok()?,
                parts[2].parse().ok()?,
            )),
            _ => None,
        }
    }
}

impl PartialOrd for SemanticVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SemanticVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.major.cmp(&other.major) {
            Ordering::Equal => match self.minor.cmp(&other.minor) {
                Ordering::Equal => self.patch.cmp(&other.patch),
                other => other,
            },
            other => other,
        }
    }
}

impl std::fmt::Display for SemanticVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Outcome of a minimum-version check.
#[derive(Debug, Clone, Copy)]
pub struct VersionCheck {
    pub installed: SemanticVersion,
    pub meets_minimum: bool,
}

impl VersionCheck {
    pub(crate) fn evaluate(installed: SemanticVersion, minimum: &SemanticVersion) -> Self {
        Self {
            installed,
            meets_minimum: installed >= *minimum,
        }
    }
}

/// Ask the installed executable for its version.
pub fn query_version(exe: &Path) -> Result<SemanticVersion, RequirementsError> {
    if !exe.is_file() {
        return Err(RequirementsError::NotInstalled {
            path: exe.to_path_buf(),
        });
    }
    let capture = blocking::capture_output(
        exe,
        &["--version".to_string()],
        exe.parent().unwrap_or_else(|| Path::new(".")),
        Some(VERSION_QUERY_TIMEOUT),
    )
    .map_err(query_error)?;
    version_from_capture(&capture)
}

/// Query the installed version and compare it against `minimum`.
pub fn check_version(
    exe: &Path,
    minimum: &SemanticVersion,
) -> Result<VersionCheck, RequirementsError> {
    Ok(VersionCheck::evaluate(query_version(exe)?, minimum))
}

/// True when a tool is installed in `storage_dir` and reports exactly
/// `version`. Any failure along the way (no executable, unparseable
/// output) counts as "not installed".
pub fn is_installed(storage_dir: &Path, version: &str) -> bool {
    let Some(expected) = SemanticVersion::parse(version) else {
        return false;
    };
    let Ok(exe) = crate::runner::discover_executable(storage_dir) else {
        return false;
    };
    query_version(&exe).map(|v| v == expected).unwrap_or(false)
}

pub(crate) fn query_error(error: RunnerError) -> RequirementsError {
    match error {
        RunnerError::ExecutableNotFound { path } => RequirementsError::NotInstalled { path },
        other => RequirementsError::Query(other),
    }
}

pub(crate) fn version_from_capture(
    capture: &Capture,
) -> Result<SemanticVersion, RequirementsError> {
    if capture.exit_code != 0 {
        return Err(RequirementsError::QueryFailed {
            code: capture.exit_code,
            stderr: capture.stderr.trim().to_string(),
        });
    }
    let raw = capture.stdout.lines().next().unwrap_or("").trim();
    SemanticVersion::parse(raw).ok_or_else(|| RequirementsError::VersionParse {
        raw: raw.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_and_partial_versions() {
        assert_eq!(
            SemanticVersion::parse("2.3.1"),
            Some(SemanticVersion::new(2, 3, 1))
        );
        assert_eq!(
            SemanticVersion::parse("3.5"),
            Some(SemanticVersion::new(3, 5, 0))
        );
        assert_eq!(
            SemanticVersion::parse("1"),
            Some(SemanticVersion::new(1, 0, 0))
        );
    }

    #[test]
    fn ignores_prefixes_and_suffixes() {
        assert_eq!(
            SemanticVersion::parse("v9.0.0"),
            Some(SemanticVersion::new(9, 0, 0))
        );
        assert_eq!(
            SemanticVersion::parse("2.3.1-rc.1"),
            Some(SemanticVersion::new(2, 3, 1))
        );
        assert_eq!(
            SemanticVersion::parse("2.3.1+build7"),
            Some(SemanticVersion::new(2, 3, 1))
        );
    }

    #[test]
    fn rejects_garbage() {
        assert!(SemanticVersion::parse("invalid").is_none());
        assert!(SemanticVersion::parse("1.2.3.4").is_none());
        assert!(SemanticVersion::parse("a.b.c").is_none());
        assert!(SemanticVersion::parse("").is_none());
    }

    #[test]
    fn orders_component_wise() {
        let v1 = SemanticVersion::new(1, 0, 0);
        let v2 = SemanticVersion::new(2, 0, 0);
        let v2_1 = SemanticVersion::new(2, 1, 0);
        let v2_1_5 = SemanticVersion::new(2, 1, 5);
        assert!(v1 < v2);
        assert!(v2 < v2_1);
        assert!(v2_1 < v2_1_5);
    }

    #[test]
    fn minimum_check_is_a_plain_ordering() {
        let installed = SemanticVersion::new(2, 3, 1);
        assert!(VersionCheck::evaluate(installed, &SemanticVersion::new(2, 0, 0)).meets_minimum);
        assert!(VersionCheck::evaluate(installed, &SemanticVersion::new(2, 3, 1)).meets_minimum);
        assert!(!VersionCheck::evaluate(installed, &SemanticVersion::new(3, 0, 0)).meets_minimum);
    }

    #[test]
    fn capture_with_nonzero_exit_is_a_query_failure() {
        let capture = Capture {
            exit_code: 2,
            stdout: String::new(),
            stderr: "boom".into(),
        };
        assert!(matches!(
            version_from_capture(&capture),
            Err(RequirementsError::QueryFailed { code: 2, .. })
        ));
    }

    #[test]
    fn capture_with_unparseable_output_is_a_parse_error() {
        let capture = Capture {
            exit_code: 0,
            stdout: "not a version\n".into(),
            stderr: String::new(),
        };
        assert!(matches!(
            version_from_capture(&capture),
            Err(RequirementsError::VersionParse { .. })
        ));
    }

    #[test]
    fn capture_takes_the_first_stdout_line() {
        let capture = Capture {
            exit_code: 0,
            stdout: "2.3.1\nextra noise\n".into(),
            stderr: String::new(),
        };
        assert_eq!(
            version_from_capture(&capture).unwrap(),
            SemanticVersion::new(2, 3, 1)
        );
    }
}
