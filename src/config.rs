//! Configuration documents shipped with the tool
//!
//! The tool distribution carries three TOML documents in a `configuration/`
//! directory next to the executable: the run configuration
//! (`config.toml`), the requirements catalogue
//! (`test_configuration.toml`, one `[STANDARD]` table of requirement-id
//! flags per supported standard) and the test parameters
//! (`test_parameter.toml`). This module loads them and verifies that a
//! user-provided requirements selection only enables what the installed
//! tool release actually supports.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

const CONFIGURATION_DIR: &str = "configuration";
const CONFIG_FILE: &str = "config.toml";
const REQUIREMENTS_FILE: &str = "test_configuration.toml";
const TEST_PARAMETER_FILE: &str = "test_parameter.toml";

/// Errors raised while loading or cross-checking configuration documents.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} is not valid TOML: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("unsupported standard {standard:?}; the tool provides {available:?}")]
    UnknownStandard {
        standard: String,
        available: Vec<String>,
    },

    #[error("requirement id {standard}.{id} not found or not enabled in the tool catalogue")]
    UnknownRequirement { standard: String, id: String },

    #[error("standard {standard:?} must be a table of requirement flags")]
    InvalidCatalogue { standard: String },
}

/// Load one TOML document.
pub fn load_toml(path: &Path) -> Result<toml::Table, ConfigError> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    text.parse().map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn tool_document(exe: &Path, file: &str) -> Result<toml::Table, ConfigError> {
    let dir = exe.parent().unwrap_or_else(|| Path::new("."));
    load_toml(&dir.join(CONFIGURATION_DIR).join(file))
}

/// Default run configuration shipped next to the executable.
pub fn tool_config(exe: &Path) -> Result<toml::Table, ConfigError> {
    tool_document(exe, CONFIG_FILE)
}

/// Requirements catalogue shipped next to the executable.
pub fn tool_requirements(exe: &Path) -> Result<toml::Table, ConfigError> {
    tool_document(exe, REQUIREMENTS_FILE)
}

/// Test parameters shipped next to the executable.
pub fn tool_test_parameters(exe: &Path) -> Result<toml::Table, ConfigError> {
    tool_document(exe, TEST_PARAMETER_FILE)
}

/// Verify that every requirement enabled in `provided` exists and is enabled
/// in the tool's `available` catalogue.
///
/// A requirement the user disables is not looked up, but the standard name
/// itself must always be known to the tool.
pub fn check_requirements(
    provided: &toml::Table,
    available: &toml::Table,
) -> Result<(), ConfigError> {
    for (standard, requirements) in provided {
        let Some(toml::Value::Table(supported)) = available.get(standard) else {
            return Err(ConfigError::UnknownStandard {
                standard: standard.clone(),
                available: available.keys().cloned().collect(),
            });
        };
        let toml::Value::Table(requirements) = requirements else {
            return Err(ConfigError::InvalidCatalogue {
                standard: standard.clone(),
            });
        };
        for (id, enabled) in requirements {
            if !matches!(enabled, toml::Value::Boolean(true)) {
                continue;
            }
            if !matches!(supported.get(id), Some(toml::Value::Boolean(true))) {
                return Err(ConfigError::UnknownRequirement {
                    standard: standard.clone(),
                    id: id.clone(),
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(text: &str) -> toml::Table {
        text.parse().unwrap()
    }

    #[test]
    fn accepts_a_subset_of_the_catalogue() {
        let provided = table("[BICEPS]\nR0021 = true");
        let available = table("[BICEPS]\nR0021 = true\nR0023 = true");
        assert!(check_requirements(&provided, &available).is_ok());
    }

    #[test]
    fn rejects_an_unknown_standard_even_when_all_its_ids_are_disabled() {
        let provided = table("[MDPWS]\nR0008 = false");
        let available = table("[BICEPS]\nR0021 = true");
        assert!(matches!(
            check_requirements(&provided, &available),
            Err(ConfigError::UnknownStandard { standard, .. }) if standard == "MDPWS"
        ));
    }

    #[test]
    fn rejects_an_enabled_id_the_tool_does_not_know() {
        let provided = table("[BICEPS]\nR9999 = true");
        let available = table("[BICEPS]\nR0021 = true");
        assert!(matches!(
            check_requirements(&provided, &available),
            Err(ConfigError::UnknownRequirement { id, .. }) if id == "R9999"
        ));
    }

    #[test]
    fn rejects_an_enabled_id_the_tool_has_disabled() {
        let provided = table("[BICEPS]\nR0100 = true");
        let available = table("[BICEPS]\nR0100 = false");
        assert!(matches!(
            check_requirements(&provided, &available),
            Err(ConfigError::UnknownRequirement { .. })
        ));
    }

    #[test]
    fn ignores_ids_the_user_disabled() {
        let provided = table("[BICEPS]\nR9999 = false\nR0021 = true");
        let available = table("[BICEPS]\nR0021 = true");
        assert!(check_requirements(&provided, &available).is_ok());
    }

    #[test]
    fn loads_tool_documents_relative_to_the_executable() {
        let dir = tempfile::tempdir().unwrap();
        let exe = dir.path().join("sdccc-1.0.0.exe");
        fs::write(&exe, "").unwrap();
        let conf_dir = dir.path().join("configuration");
        fs::create_dir(&conf_dir).unwrap();
        fs::write(conf_dir.join("config.toml"), "[SDCcc]\nCIMode = false\n").unwrap();

        let config = tool_config(&exe).unwrap();
        assert!(config.contains_key("SDCcc"));

        assert!(matches!(
            tool_requirements(&exe),
            Err(ConfigError::Io { .. })
        ));
    }

    #[test]
    fn parse_errors_name_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        fs::write(&path, "not [valid").unwrap();
        let err = load_toml(&path).unwrap_err();
        assert!(err.to_string().contains("broken.toml"));
    }
}
