// Document Loader
// Reads JSON/YAML documents (templates, parameter files, path mapping rules) from disk

use super::template::{JobTemplate, SPECIFICATION_VERSION};
use crate::error::{ServiceError, ServiceResult};

use serde::de::DeserializeOwned;
use std::fmt;
use std::path::{Path, PathBuf};

/// Prefix marking a command-line argument as a file reference
pub const FILE_PREFIX: &str = "file://";

/// Serialization format of a document, decided by file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentType {
    Json,
    Yaml,
}

impl DocumentType {
    pub fn from_path(path: &Path) -> Result<Self, DocumentError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);

        match extension.as_deref() {
            Some("json") => Ok(DocumentType::Json),
            Some("yaml") | Some("yml") => Ok(DocumentType::Yaml),
            _ => Err(DocumentError::new(
                DocumentErrorKind::UnsupportedType,
                format!("'{}' is not JSON or YAML.", path.display()),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentErrorKind {
    NotFound,
    NotAFile,
    UnsupportedType,
    Unreadable,
    Malformed,
}

/// Error reading or decoding a document
#[derive(Debug, Clone)]
pub struct DocumentError {
    pub message: String,
    pub kind: DocumentErrorKind,
}

impl DocumentError {
    fn new(kind: DocumentErrorKind, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind,
        }
    }
}

impl fmt::Display for DocumentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for DocumentError {}

/// Strip a `file://` prefix and expand a leading `~` to the home directory
pub fn expand_file_reference(reference: &str) -> PathBuf {
    let raw = reference.strip_prefix(FILE_PREFIX).unwrap_or(reference);

    if raw == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    } else if let Some(rest) = raw.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }

    PathBuf::from(raw)
}

/// Decode document text of a known type
pub fn parse_document<T: DeserializeOwned>(
    text: &str,
    doc_type: DocumentType,
) -> Result<T, String> {
    match doc_type {
        DocumentType::Json => serde_json::from_str(text).map_err(|e| e.to_string()),
        DocumentType::Yaml => serde_yaml::from_str(text).map_err(|e| e.to_string()),
    }
}

/// Read and decode a JSON or YAML file
pub fn read_document<T: DeserializeOwned>(path: &Path) -> Result<T, DocumentError> {
    if !path.exists() {
        return Err(DocumentError::new(
            DocumentErrorKind::NotFound,
            format!("'{}' does not exist.", path.display()),
        ));
    }
    if !path.is_file() {
        return Err(DocumentError::new(
            DocumentErrorKind::NotAFile,
            format!("'{}' is not a file.", path.display()),
        ));
    }

    let doc_type = DocumentType::from_path(path)?;

    let text = std::fs::read_to_string(path).map_err(|e| {
        DocumentError::new(
            DocumentErrorKind::Unreadable,
            format!("Could not open '{}': {}", path.display(), e),
        )
    })?;

    parse_document(&text, doc_type).map_err(|e| {
        DocumentError::new(
            DocumentErrorKind::Malformed,
            format!("'{}' is formatted incorrectly: {}", path.display(), e),
        )
    })
}

/// Find the template inside a bundle directory: the first top-level
/// `*template.json|yaml|yml` file, in name order
fn find_template_in_directory(dir: &Path) -> ServiceResult<PathBuf> {
    let mut candidates: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file())
        .filter(|path| {
            let stem_matches = path
                .file_stem()
                .and_then(|s| s.to_str())
                .map(|s| s.ends_with("template"))
                .unwrap_or(false);
            stem_matches && DocumentType::from_path(path).is_ok()
        })
        .collect();
    candidates.sort();

    candidates.into_iter().next().ok_or_else(|| {
        ServiceError::template(format!(
            "Couldn't find 'template.json' or 'template.yaml' in the folder '{}'.",
            dir.display()
        ))
    })
}

/// Read a job template from a file or a bundle directory
pub fn read_job_template(path: &Path) -> ServiceResult<JobTemplate> {
    let file = if path.is_dir() {
        find_template_in_directory(path)?
    } else {
        path.to_path_buf()
    };

    tracing::debug!(path = %file.display(), "reading job template");

    let template: JobTemplate =
        read_document(&file).map_err(|e| ServiceError::template(e.message))?;

    if template.specification_version != SPECIFICATION_VERSION {
        return Err(ServiceError::template(format!(
            "'{}' uses unsupported specificationVersion '{}' (expected '{}')",
            file.display(),
            template.specification_version,
            SPECIFICATION_VERSION
        )));
    }

    Ok(template)
}
