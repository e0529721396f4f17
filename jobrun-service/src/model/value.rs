// Parameter Values
// Declared parameter types and the typed values bound to them

use indexmap::IndexMap;
use serde::{Deserialize, Serialize, Serializer};

use std::fmt;

/// Resolved job parameter values, in declaration order
pub type ParameterValueMap = IndexMap<String, ParameterValue>;

/// Declared type of a job or task parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ParameterType {
    String,
    Int,
    Float,
    Path,
}

impl fmt::Display for ParameterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ParameterType::String => "STRING",
            ParameterType::Int => "INT",
            ParameterType::Float => "FLOAT",
            ParameterType::Path => "PATH",
        };
        f.write_str(name)
    }
}

/// A concrete, type-checked parameter value
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterValue {
    String(String),
    Int(i64),
    Float(f64),
    /// Opaque path text; no filesystem checks happen at this layer
    Path(String),
}

impl ParameterValue {
    pub fn param_type(&self) -> ParameterType {
        match self {
            ParameterValue::String(_) => ParameterType::String,
            ParameterValue::Int(_) => ParameterType::Int,
            ParameterValue::Float(_) => ParameterType::Float,
            ParameterValue::Path(_) => ParameterType::Path,
        }
    }

    /// Text form used in format strings and reports
    pub fn as_string(&self) -> String {
        self.to_string()
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParameterValue::Int(n) => Some(*n as f64),
            ParameterValue::Float(n) => Some(*n),
            _ => None,
        }
    }

    /// Coerce a raw JSON/YAML value into the given type.
    ///
    /// Numeric types accept numbers or numeric text. STRING and PATH accept text and
    /// the text form of numbers. Booleans, nulls, lists and maps never coerce.
    pub fn coerce(param_type: ParameterType, raw: &serde_json::Value) -> Option<Self> {
        use serde_json::Value as Raw;

        match (param_type, raw) {
            (ParameterType::Int, Raw::Number(n)) => n.as_i64().map(ParameterValue::Int),
            (ParameterType::Int, Raw::String(s)) => {
                s.trim().parse::<i64>().ok().map(ParameterValue::Int)
            }
            (ParameterType::Float, Raw::Number(n)) => n.as_f64().map(ParameterValue::Float),
            (ParameterType::Float, Raw::String(s)) => s
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
                .map(ParameterValue::Float),
            (ParameterType::String, Raw::String(s)) => Some(ParameterValue::String(s.clone())),
            (ParameterType::String, Raw::Number(n)) => Some(ParameterValue::String(n.to_string())),
            (ParameterType::Path, Raw::String(s)) => Some(ParameterValue::Path(s.clone())),
            (ParameterType::Path, Raw::Number(n)) => Some(ParameterValue::Path(n.to_string())),
            _ => None,
        }
    }
}

/// Render a raw value the way an operator typed it, for error messages
pub fn render_raw(raw: &serde_json::Value) -> String {
    match raw {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterValue::String(s) | ParameterValue::Path(s) => f.write_str(s),
            ParameterValue::Int(n) => write!(f, "{}", n),
            ParameterValue::Float(n) => write!(f, "{}", n),
        }
    }
}

impl Serialize for ParameterValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ParameterValue::String(s) | ParameterValue::Path(s) => serializer.serialize_str(s),
            ParameterValue::Int(n) => serializer.serialize_i64(*n),
            ParameterValue::Float(n) => serializer.serialize_f64(*n),
        }
    }
}

impl From<&str> for ParameterValue {
    fn from(s: &str) -> Self {
        ParameterValue::String(s.to_string())
    }
}

impl From<i64> for ParameterValue {
    fn from(n: i64) -> Self {
        ParameterValue::Int(n)
    }
}

impl From<f64> for ParameterValue {
    fn from(n: f64) -> Self {
        ParameterValue::Float(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_coerce_int() {
        assert_eq!(
            ParameterValue::coerce(ParameterType::Int, &json!(5)),
            Some(ParameterValue::Int(5))
        );
        assert_eq!(
            ParameterValue::coerce(ParameterType::Int, &json!(" 12 ")),
            Some(ParameterValue::Int(12))
        );
        assert_eq!(ParameterValue::coerce(ParameterType::Int, &json!("1.5")), None);
        assert_eq!(ParameterValue::coerce(ParameterType::Int, &json!(2.5)), None);
        assert_eq!(ParameterValue::coerce(ParameterType::Int, &json!(true)), None);
    }

    #[test]
    fn test_coerce_float() {
        assert_eq!(
            ParameterValue::coerce(ParameterType::Float, &json!("2.5")),
            Some(ParameterValue::Float(2.5))
        );
        assert_eq!(
            ParameterValue::coerce(ParameterType::Float, &json!(3)),
            Some(ParameterValue::Float(3.0))
        );
        assert_eq!(ParameterValue::coerce(ParameterType::Float, &json!("NaN")), None);
        assert_eq!(ParameterValue::coerce(ParameterType::Float, &json!("abc")), None);
    }

    #[test]
    fn test_coerce_text_types() {
        assert_eq!(
            ParameterValue::coerce(ParameterType::String, &json!(42)),
            Some(ParameterValue::String("42".to_string()))
        );
        assert_eq!(
            ParameterValue::coerce(ParameterType::Path, &json!("/tmp/out")),
            Some(ParameterValue::Path("/tmp/out".to_string()))
        );
        assert_eq!(ParameterValue::coerce(ParameterType::String, &json!(["a"])), None);
    }

    #[test]
    fn test_display_and_serialize() {
        assert_eq!(ParameterValue::Int(7).to_string(), "7");
        assert_eq!(ParameterValue::Float(1.5).to_string(), "1.5");
        assert_eq!(
            serde_json::to_string(&ParameterValue::Path("a/b".to_string())).unwrap(),
            "\"a/b\""
        );
        assert_eq!(serde_json::to_string(&ParameterValue::Int(3)).unwrap(), "3");
    }
}
