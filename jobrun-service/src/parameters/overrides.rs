// Task Parameter Overrides
// Parses caller-supplied task parameter sets and single-task pins

use super::sources::RawParameterMap;
use crate::error::ParameterError;
use crate::model::{expand_file_reference, read_document, FILE_PREFIX};

/// Parse `--task-params` occurrences into an ordered list of raw parameter sets.
///
/// Each occurrence is either a list of `Name=Value` pairs forming one set, inline
/// JSON (an object or a list of objects), or a single `file://` reference to a JSON
/// or YAML document holding the same. All problems are collected into one error.
pub fn parse_task_parameter_sets(
    occurrences: &[Vec<String>],
) -> Result<Vec<RawParameterMap>, ParameterError> {
    let mut sets = Vec::new();
    let mut errors = Vec::new();

    for occurrence in occurrences {
        match parse_occurrence(occurrence) {
            Ok(parsed) => sets.extend(parsed),
            Err(e) => errors.push(e),
        }
    }

    if !errors.is_empty() {
        let listing = errors
            .iter()
            .map(|e| format!("- {}", e))
            .collect::<Vec<_>>()
            .join("\n");
        return Err(ParameterError::invalid_source(format!(
            "Found the following errors collecting Task parameters:\n{}",
            listing
        )));
    }

    Ok(sets)
}

/// Parse `--task Name=Value` pins into one raw parameter set
pub fn parse_task_pin(pairs: &[String]) -> Result<RawParameterMap, ParameterError> {
    parse_pairs(pairs)
}

fn parse_occurrence(occurrence: &[String]) -> Result<Vec<RawParameterMap>, String> {
    if let [single] = occurrence {
        let trimmed = single.trim_start();
        if single.starts_with(FILE_PREFIX) {
            let path = expand_file_reference(single);
            let value: serde_json::Value = read_document(&path).map_err(|e| e.message)?;
            return sets_from_value(value).ok_or_else(|| {
                format!(
                    "'{}' should contain a dictionary or a list of dictionaries",
                    path.display()
                )
            });
        }
        if trimmed.starts_with('{') || trimmed.starts_with('[') {
            let value: serde_json::Value = serde_json::from_str(single)
                .map_err(|e| format!("'{}' is not valid JSON: {}", single, e))?;
            return sets_from_value(value).ok_or_else(|| {
                format!(
                    "'{}' should contain a dictionary or a list of dictionaries",
                    single
                )
            });
        }
    }

    parse_pairs(occurrence)
        .map(|set| vec![set])
        .map_err(|e| e.to_string())
}

fn parse_pairs(pairs: &[String]) -> Result<RawParameterMap, ParameterError> {
    let mut set = RawParameterMap::new();

    for pair in pairs {
        let (name, value) = pair
            .split_once('=')
            .filter(|(name, _)| !name.trim().is_empty())
            .ok_or_else(|| {
                ParameterError::invalid_source(format!(
                    "Task parameter '{}' must be Name=Value",
                    pair
                ))
            })?;

        let name = name.trim().to_string();
        if set.contains_key(&name) {
            return Err(ParameterError::invalid_source(format!(
                "Task parameter '{}' was given more than once",
                name
            )));
        }
        set.insert(name, serde_json::Value::String(value.to_string()));
    }

    Ok(set)
}

fn sets_from_value(value: serde_json::Value) -> Option<Vec<RawParameterMap>> {
    match value {
        serde_json::Value::Object(map) => Some(vec![map.into_iter().collect()]),
        serde_json::Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                serde_json::Value::Object(map) => Some(map.into_iter().collect()),
                _ => None,
            })
            .collect(),
        _ => None,
    }
}
