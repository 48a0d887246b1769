//! Argument-vector construction for the conformance tool's CLI
//!
//! The tool accepts GNU-style named options (`--config /path/to/config.toml`)
//! after any positional tokens. Callers describe options as
//! [`OptionValue`] variants; [`build_command`] turns them into a flat token
//! vector without ever touching a process.
//!
//! ## Emission rules
//!
//! - positional tokens come first, verbatim, in order
//! - `Switch(true)` emits the bare flag, `Switch(false)` emits nothing
//! - `Scalar` emits the flag followed by the value
//! - `Sequence` emits the flag once per element, in element order
//! - `Absent` emits nothing
//!
//! Options read from configuration files arrive as `toml::Value` and are
//! converted through `OptionValue::try_from`, which rejects value shapes the
//! tool's CLI cannot express (tables, datetimes, nested arrays). That
//! rejection is a caller bug and happens before any process is spawned.

use thiserror::Error;

/// Errors raised while assembling a command line.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("unsupported option value type: {type_name}")]
    UnsupportedValueType { type_name: &'static str },
}

/// Value of a single named option, as the tool's CLI understands it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionValue {
    /// Presence/absence flag. `Switch(false)` is suppressed entirely rather
    /// than emitted with an empty value.
    Switch(bool),
    /// Single value following the flag token.
    Scalar(String),
    /// Flag repeated once per element.
    Sequence(Vec<String>),
    /// Option omitted from the command line.
    Absent,
}

impl OptionValue {
    /// Convenience constructor for path-like and numeric scalars.
    pub fn scalar(value: impl ToString) -> Self {
        OptionValue::Scalar(value.to_string())
    }
}

impl TryFrom<&toml::Value> for OptionValue {
    type Error = CommandError;

    fn try_from(value: &toml::Value) -> Result<Self, Self::Error> {
        match value {
            toml::Value::Boolean(b) => Ok(OptionValue::Switch(*b)),
            toml::Value::String(s) => Ok(OptionValue::Scalar(s.clone())),
            toml::Value::Integer(i) => Ok(OptionValue::Scalar(i.to_string())),
            toml::Value::Float(f) => Ok(OptionValue::Scalar(f.to_string())),
            toml::Value::Array(items) => {
                let mut elements = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        toml::Value::String(s) => elements.push(s.clone()),
                        toml::Value::Integer(i) => elements.push(i.to_string()),
                        toml::Value::Float(f) => elements.push(f.to_string()),
                        other => {
                            return Err(CommandError::UnsupportedValueType {
                                type_name: other.type_str(),
                            });
                        }
                    }
                }
                Ok(OptionValue::Sequence(elements))
            }
            other => Err(CommandError::UnsupportedValueType {
                type_name: other.type_str(),
            }),
        }
    }
}

/// Build the flat argument vector for one tool invocation.
///
/// Pure function: positional tokens are copied through, named options are
/// expanded per the emission rules above. The program path itself is not
/// part of the result.
pub fn build_command(positional: &[String], options: &[(String, OptionValue)]) -> Vec<String> {
    let mut command: Vec<String> = positional.to_vec();
    for (name, value) in options {
        match value {
            OptionValue::Switch(true) => command.push(format!("--{name}")),
            OptionValue::Switch(false) | OptionValue::Absent => {}
            OptionValue::Scalar(v) => {
                command.push(format!("--{name}"));
                command.push(v.clone());
            }
            OptionValue::Sequence(vs) => {
                for v in vs {
                    command.push(format!("--{name}"));
                    command.push(v.clone());
                }
            }
        }
    }
    command
}
