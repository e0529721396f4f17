// Parameter Resolver
// Merges job parameter sources and checks them against their definitions

use super::sources::{ParameterSource, RawParameterMap};
use crate::error::ParameterError;
use crate::model::{render_raw, ParameterDefinition, ParameterType, ParameterValue, ParameterValueMap};

/// Resolves job parameters from an ordered list of sources
pub struct ParameterResolver;

impl ParameterResolver {
    /// Merge `sources` key by key (later sources win), fill in defaults, and type-check
    /// every value against `definitions`. The result follows declaration order.
    pub fn resolve(
        definitions: &[ParameterDefinition],
        sources: Vec<ParameterSource>,
    ) -> Result<ParameterValueMap, ParameterError> {
        let merged = Self::merge(sources)?;

        if let Some(name) = merged
            .keys()
            .find(|name| !definitions.iter().any(|d| &d.name == *name))
        {
            return Err(ParameterError::Unknown { name: name.clone() });
        }

        let mut values = ParameterValueMap::new();
        for definition in definitions {
            let raw = merged
                .get(&definition.name)
                .or(definition.default.as_ref())
                .ok_or_else(|| ParameterError::Missing {
                    name: definition.name.clone(),
                })?;

            let value = Self::check_value(definition, raw)?;
            values.insert(definition.name.clone(), value);
        }

        tracing::debug!(count = values.len(), "resolved job parameters");
        Ok(values)
    }

    /// Classify raw command-line arguments, then resolve them
    pub fn resolve_args(
        definitions: &[ParameterDefinition],
        args: &[String],
    ) -> Result<ParameterValueMap, ParameterError> {
        let sources = args
            .iter()
            .map(|arg| ParameterSource::parse(arg))
            .collect::<Result<Vec<_>, _>>()?;
        Self::resolve(definitions, sources)
    }

    fn merge(sources: Vec<ParameterSource>) -> Result<RawParameterMap, ParameterError> {
        let mut merged = RawParameterMap::new();
        for source in sources {
            merged.extend(source.into_partial()?);
        }
        Ok(merged)
    }

    /// Coerce a raw value to the declared type and enforce its constraints
    pub fn check_value(
        definition: &ParameterDefinition,
        raw: &serde_json::Value,
    ) -> Result<ParameterValue, ParameterError> {
        let value = ParameterValue::coerce(definition.param_type, raw).ok_or_else(|| {
            ParameterError::TypeMismatch {
                name: definition.name.clone(),
                expected: definition.param_type,
                value: render_raw(raw),
            }
        })?;

        if let Some(allowed) = &definition.allowed_values {
            let permitted = allowed
                .iter()
                .filter_map(|a| ParameterValue::coerce(definition.param_type, a))
                .any(|a| a == value);
            if !permitted {
                return Err(ParameterError::NotAllowed {
                    name: definition.name.clone(),
                    value: value.to_string(),
                    allowed: allowed.iter().map(render_raw).collect::<Vec<_>>().join(", "),
                });
            }
        }

        match definition.param_type {
            ParameterType::Int | ParameterType::Float => Self::check_range(definition, &value)?,
            ParameterType::String | ParameterType::Path => Self::check_length(definition, &value)?,
        }

        Ok(value)
    }

    fn check_range(
        definition: &ParameterDefinition,
        value: &ParameterValue,
    ) -> Result<(), ParameterError> {
        let Some(number) = value.as_f64() else {
            return Ok(());
        };
        let bound = |raw: &Option<serde_json::Value>| {
            raw.as_ref()
                .and_then(|r| ParameterValue::coerce(ParameterType::Float, r))
                .and_then(|v| v.as_f64())
        };

        if let Some(min) = bound(&definition.min_value) {
            if number < min {
                return Err(Self::violation(
                    definition,
                    value,
                    format!("is less than the minimum value {}", min),
                ));
            }
        }
        if let Some(max) = bound(&definition.max_value) {
            if number > max {
                return Err(Self::violation(
                    definition,
                    value,
                    format!("is greater than the maximum value {}", max),
                ));
            }
        }
        Ok(())
    }

    fn check_length(
        definition: &ParameterDefinition,
        value: &ParameterValue,
    ) -> Result<(), ParameterError> {
        let length = value.as_string().chars().count();

        if let Some(min) = definition.min_length {
            if length < min {
                return Err(Self::violation(
                    definition,
                    value,
                    format!("is shorter than the minimum length {}", min),
                ));
            }
        }
        if let Some(max) = definition.max_length {
            if length > max {
                return Err(Self::violation(
                    definition,
                    value,
                    format!("is longer than the maximum length {}", max),
                ));
            }
        }
        Ok(())
    }

    fn violation(
        definition: &ParameterDefinition,
        value: &ParameterValue,
        constraint: String,
    ) -> ParameterError {
        ParameterError::ConstraintViolation {
            name: definition.name.clone(),
            value: value.to_string(),
            constraint,
        }
    }
}
