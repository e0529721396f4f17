// Parameter Sources
// Caller-supplied job parameter inputs, each decoded into a partial raw mapping

use crate::error::ParameterError;
use crate::model::{expand_file_reference, read_document, FILE_PREFIX};

use indexmap::IndexMap;
use std::path::PathBuf;

/// Untyped parameter values keyed by name, in the order they were supplied
pub type RawParameterMap = IndexMap<String, serde_json::Value>;

/// One job parameter input
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterSource {
    /// `Name=Value` text; the value is kept as a string until type checking
    InlineText { name: String, value: String },
    /// JSON object text such as `{"Frames": 10}`
    InlineStructured(String),
    /// JSON or YAML document holding a mapping of names to values
    FileReference(PathBuf),
}

impl ParameterSource {
    /// Classify a command-line argument.
    ///
    /// `file://PATH` is a file reference, text starting with `{` is inline JSON,
    /// anything else must be `Name=Value` split at the first `=`.
    pub fn parse(arg: &str) -> Result<Self, ParameterError> {
        if arg.starts_with(FILE_PREFIX) {
            return Ok(ParameterSource::FileReference(expand_file_reference(arg)));
        }

        if arg.trim_start().starts_with('{') {
            return Ok(ParameterSource::InlineStructured(arg.to_string()));
        }

        match arg.split_once('=') {
            Some((name, value)) if !name.trim().is_empty() => Ok(ParameterSource::InlineText {
                name: name.trim().to_string(),
                value: value.to_string(),
            }),
            Some(_) => Err(ParameterError::invalid_source(format!(
                "Job parameter '{}' has an empty name; expected Name=Value",
                arg
            ))),
            None => Err(ParameterError::invalid_source(format!(
                "Job parameter '{}' must be Name=Value, inline JSON, or file://PATH",
                arg
            ))),
        }
    }

    /// Decode this source into a partial mapping
    pub fn into_partial(self) -> Result<RawParameterMap, ParameterError> {
        match self {
            ParameterSource::InlineText { name, value } => {
                let mut partial = RawParameterMap::new();
                partial.insert(name, serde_json::Value::String(value));
                Ok(partial)
            }
            ParameterSource::InlineStructured(text) => {
                let value: serde_json::Value = serde_json::from_str(&text).map_err(|e| {
                    ParameterError::invalid_source(format!(
                        "Job parameter '{}' is not valid JSON: {}",
                        text, e
                    ))
                })?;
                into_mapping(value).ok_or_else(|| {
                    ParameterError::invalid_source(format!(
                        "Job parameter '{}' should contain a dictionary mapping parameter names to values.",
                        text
                    ))
                })
            }
            ParameterSource::FileReference(path) => {
                let value: serde_json::Value = read_document(&path)
                    .map_err(|e| ParameterError::invalid_source(e.message))?;
                into_mapping(value).ok_or_else(|| {
                    ParameterError::invalid_source(format!(
                        "Job parameter file '{}' should contain a dictionary mapping parameter names to values.",
                        path.display()
                    ))
                })
            }
        }
    }
}

fn into_mapping(value: serde_json::Value) -> Option<RawParameterMap> {
    match value {
        serde_json::Value::Object(map) => Some(map.into_iter().collect()),
        _ => None,
    }
}
