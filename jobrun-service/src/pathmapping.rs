// Path Mapping Rules
// Parses path mapping rule documents; the rules themselves are passed through to tasks

use crate::error::{ServiceError, ServiceResult};
use crate::model::{expand_file_reference, read_document, FILE_PREFIX};

use serde::{Deserialize, Serialize};

/// Version tag every path mapping document must carry
pub const PATH_MAPPING_VERSION: &str = "pathmapping-1.0";

/// Path syntax of a rule's source path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PathFormat {
    Posix,
    Windows,
}

/// One source-to-destination path prefix rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathMappingRule {
    pub source_path_format: PathFormat,
    pub source_path: String,
    pub destination_path: String,
}

/// Parse rules from inline JSON or a `file://` JSON/YAML document
pub fn parse_path_mapping_rules(arg: &str) -> ServiceResult<Vec<PathMappingRule>> {
    let document: serde_json::Value = if arg.starts_with(FILE_PREFIX) {
        let path = expand_file_reference(arg);
        read_document(&path).map_err(|e| ServiceError::usage(e.message))?
    } else {
        serde_json::from_str(arg).map_err(|e| {
            ServiceError::usage(format!("Path mapping rules are not valid JSON: {}", e))
        })?
    };

    let version = document.get("version").and_then(|v| v.as_str());
    if version != Some(PATH_MAPPING_VERSION) {
        return Err(ServiceError::usage(format!(
            "Path mapping rules must have a 'version' value of '{}'",
            PATH_MAPPING_VERSION
        )));
    }

    let rules = document
        .get("path_mapping_rules")
        .filter(|rules| rules.is_array())
        .ok_or_else(|| {
            ServiceError::usage("Path mapping rules must contain a list named 'path_mapping_rules'")
        })?;

    let rules: Vec<PathMappingRule> = serde_json::from_value(rules.clone())
        .map_err(|e| ServiceError::usage(format!("Path mapping rules are malformed: {}", e)))?;

    tracing::debug!(count = rules.len(), "loaded path mapping rules");
    Ok(rules)
}

/// Serialize rules into the document form handed to tasks
pub fn rules_document(rules: &[PathMappingRule]) -> serde_json::Value {
    serde_json::json!({
        "version": PATH_MAPPING_VERSION,
        "path_mapping_rules": rules,
    })
}
