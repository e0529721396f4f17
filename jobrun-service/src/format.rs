// Format Strings
// Resolves `{{ Name.Path }}` references in template text against a symbol table

use crate::model::ParameterValue;

use indexmap::IndexMap;
use std::fmt;

/// Error produced when a format string cannot be resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatError {
    pub message: String,
}

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for FormatError {}

/// Values visible to format strings, keyed by their dotted name
#[derive(Debug, Clone, Default)]
pub struct Symbols {
    values: IndexMap<String, String>,
}

impl Symbols {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    /// Expose parameters as `{prefix}.Param.X` and `{prefix}.RawParam.X`.
    ///
    /// An empty prefix gives the job-level `Param.X` / `RawParam.X` names.
    pub fn with_parameters<'a>(
        mut self,
        prefix: &str,
        parameters: impl IntoIterator<Item = (&'a String, &'a ParameterValue)>,
    ) -> Self {
        let prefix = if prefix.is_empty() {
            String::new()
        } else {
            format!("{}.", prefix)
        };
        for (name, value) in parameters {
            let text = value.as_string();
            self.values
                .insert(format!("{}Param.{}", prefix, name), text.clone());
            self.values.insert(format!("{}RawParam.{}", prefix, name), text);
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Substitute every `{{ ... }}` reference in `text`
    pub fn resolve(&self, text: &str) -> Result<String, FormatError> {
        let mut output = String::with_capacity(text.len());
        let mut rest = text;

        while let Some(start) = rest.find("{{") {
            output.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let end = after.find("}}").ok_or_else(|| FormatError {
                message: format!("unterminated '{{{{' in '{}'", text),
            })?;

            let name = after[..end].trim();
            match self.values.get(name) {
                Some(value) => output.push_str(value),
                None => {
                    return Err(FormatError {
                        message: format!("unresolved reference '{{{{{}}}}}' in '{}'", name, text),
                    })
                }
            }
            rest = &after[end + 2..];
        }

        output.push_str(rest);
        Ok(output)
    }
}
