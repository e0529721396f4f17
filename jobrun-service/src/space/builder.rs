// Task Space Builder
// Expands a step's parameter space into its ordered task parameter sets

use super::range::IntRangeExpr;
use super::selection::TaskSelection;
use super::TaskParameterSet;
use crate::error::ParameterError;
use crate::format::Symbols;
use crate::model::{
    render_raw, ParameterType, ParameterValue, ParameterValueMap, StepDefinition,
    TaskParameterDefinition, TaskParameterRange,
};
use crate::parameters::RawParameterMap;

use std::collections::HashSet;

/// Values one task parameter may take
#[derive(Debug, Clone)]
enum Domain {
    Listed(Vec<ParameterValue>),
    Range(IntRangeExpr),
}

impl Domain {
    /// `None` when the domain has more values than a `u64` can count
    fn len(&self) -> Option<u64> {
        match self {
            Domain::Listed(values) => u64::try_from(values.len()).ok(),
            Domain::Range(range) => range.len(),
        }
    }

    fn get(&self, index: u64) -> Option<ParameterValue> {
        match self {
            Domain::Listed(values) => usize::try_from(index)
                .ok()
                .and_then(|index| values.get(index))
                .cloned(),
            Domain::Range(range) => range.nth(index).map(ParameterValue::Int),
        }
    }
}

/// Builds task parameter sets for a step
pub struct TaskSpaceBuilder;

impl TaskSpaceBuilder {
    /// Produce the task sequence for `step` under `selection`.
    ///
    /// The cross-product varies the first-declared parameter slowest. The same inputs
    /// always give the same sequence, so truncation selects a stable prefix.
    pub fn build(
        step: &StepDefinition,
        job_parameters: &ParameterValueMap,
        selection: &TaskSelection,
    ) -> Result<Vec<TaskParameterSet>, ParameterError> {
        let definitions = step.task_parameters();
        Self::check_declarations(step, definitions)?;

        if definitions.is_empty() {
            return Ok(Self::single_empty_task(step, selection));
        }

        let tasks = match selection {
            TaskSelection::CrossProduct { maximum_tasks } => {
                let domains = Self::domains(step, job_parameters)?;
                Self::cross_product(step, definitions, &domains, *maximum_tasks)?
            }
            TaskSelection::ExplicitSets(sets) => sets
                .iter()
                .enumerate()
                .map(|(index, raw)| Self::bind_set(step, definitions, raw, Some(index)))
                .collect::<Result<Vec<_>, _>>()?,
            TaskSelection::SinglePin(raw) => vec![Self::bind_set(step, definitions, raw, None)?],
        };

        tracing::debug!(step = %step.name, tasks = tasks.len(), "expanded task space");
        Ok(tasks)
    }

    /// Size of the full cross-product, without expanding it
    pub fn count(
        step: &StepDefinition,
        job_parameters: &ParameterValueMap,
    ) -> Result<u64, ParameterError> {
        let definitions = step.task_parameters();
        Self::check_declarations(step, definitions)?;

        let domains = Self::domains(step, job_parameters)?;
        Self::total(&domains)
            .ok_or_else(|| ParameterError::task_space(&step.name, "task space is too large to count"))
    }

    fn total(domains: &[Domain]) -> Option<u64> {
        domains
            .iter()
            .try_fold(1u64, |total, domain| total.checked_mul(domain.len()?))
    }

    fn check_declarations(
        step: &StepDefinition,
        definitions: &[TaskParameterDefinition],
    ) -> Result<(), ParameterError> {
        let mut seen = HashSet::new();
        for definition in definitions {
            if !seen.insert(definition.name.as_str()) {
                return Err(ParameterError::task_space(
                    &step.name,
                    format!("task parameter '{}' is declared more than once", definition.name),
                ));
            }
        }
        Ok(())
    }

    fn single_empty_task(step: &StepDefinition, selection: &TaskSelection) -> Vec<TaskParameterSet> {
        match selection {
            TaskSelection::CrossProduct {
                maximum_tasks: Some(0),
            } => Vec::new(),
            TaskSelection::CrossProduct { .. } => vec![TaskParameterSet::new()],
            _ => {
                tracing::warn!(
                    step = %step.name,
                    "step has no parameter space; ignoring task parameter overrides"
                );
                vec![TaskParameterSet::new()]
            }
        }
    }

    fn domains(
        step: &StepDefinition,
        job_parameters: &ParameterValueMap,
    ) -> Result<Vec<Domain>, ParameterError> {
        let symbols = Symbols::new().with_parameters("", job_parameters);

        step.task_parameters()
            .iter()
            .map(|definition| {
                let domain = Self::domain(step, definition, &symbols)?;
                match domain.len() {
                    Some(0) => Err(ParameterError::task_space(
                        &step.name,
                        format!("task parameter '{}' has an empty range", definition.name),
                    )),
                    Some(_) => Ok(domain),
                    None => Err(ParameterError::task_space(
                        &step.name,
                        format!("task parameter '{}' has too many values", definition.name),
                    )),
                }
            })
            .collect()
    }

    fn domain(
        step: &StepDefinition,
        definition: &TaskParameterDefinition,
        symbols: &Symbols,
    ) -> Result<Domain, ParameterError> {
        let fail = |message: String| ParameterError::task_space(&step.name, message);

        match &definition.range {
            TaskParameterRange::Expression(expr) => {
                if definition.param_type != ParameterType::Int {
                    return Err(fail(format!(
                        "task parameter '{}' of type {} needs a list of values, not a range expression",
                        definition.name, definition.param_type
                    )));
                }
                let resolved = symbols.resolve(expr).map_err(|e| {
                    fail(format!("task parameter '{}': {}", definition.name, e))
                })?;
                IntRangeExpr::parse(&resolved)
                    .map(Domain::Range)
                    .map_err(|e| fail(format!("task parameter '{}': {}", definition.name, e)))
            }
            TaskParameterRange::Values(values) => values
                .iter()
                .map(|raw| {
                    let raw = match raw {
                        serde_json::Value::String(text) => {
                            let resolved = symbols.resolve(text).map_err(|e| {
                                fail(format!("task parameter '{}': {}", definition.name, e))
                            })?;
                            serde_json::Value::String(resolved)
                        }
                        other => other.clone(),
                    };
                    ParameterValue::coerce(definition.param_type, &raw).ok_or_else(|| {
                        fail(format!(
                            "task parameter '{}' expects values of type {}, got '{}'",
                            definition.name,
                            definition.param_type,
                            render_raw(&raw)
                        ))
                    })
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Domain::Listed),
        }
    }

    /// Enumerate the cross-product like an odometer, stopping at `limit`.
    /// Values are looked up by index, so only the selected prefix is materialized.
    fn cross_product(
        step: &StepDefinition,
        definitions: &[TaskParameterDefinition],
        domains: &[Domain],
        limit: Option<usize>,
    ) -> Result<Vec<TaskParameterSet>, ParameterError> {
        let too_large = || ParameterError::task_space(&step.name, "task space is too large");
        let limit = limit.map(|limit| u64::try_from(limit).unwrap_or(u64::MAX));
        let wanted = match (Self::total(domains), limit) {
            (Some(total), Some(limit)) => total.min(limit),
            (Some(total), None) => total,
            (None, Some(limit)) => limit,
            (None, None) => return Err(too_large()),
        };
        let wanted = usize::try_from(wanted).map_err(|_| too_large())?;

        let lengths = domains
            .iter()
            .map(|domain| domain.len().ok_or_else(too_large))
            .collect::<Result<Vec<_>, _>>()?;
        let mut indices = vec![0u64; domains.len()];
        let mut tasks = Vec::new();

        while tasks.len() < wanted {
            let mut set = TaskParameterSet::new();
            for ((definition, domain), index) in definitions.iter().zip(domains).zip(&indices) {
                let value = domain.get(*index).ok_or_else(|| {
                    ParameterError::task_space(
                        &step.name,
                        format!("task parameter '{}' has no value at index {}", definition.name, index),
                    )
                })?;
                set.insert(definition.name.clone(), value);
            }
            tasks.push(set);

            for position in (0..indices.len()).rev() {
                indices[position] += 1;
                if indices[position] < lengths[position] {
                    break;
                }
                indices[position] = 0;
            }
        }

        Ok(tasks)
    }

    /// Bind a caller-supplied raw set to the step's declared parameters
    fn bind_set(
        step: &StepDefinition,
        definitions: &[TaskParameterDefinition],
        raw: &RawParameterMap,
        index: Option<usize>,
    ) -> Result<TaskParameterSet, ParameterError> {
        let label = match index {
            Some(index) => format!("task parameter set {}", index),
            None => "task".to_string(),
        };

        for name in raw.keys() {
            if !definitions.iter().any(|d| &d.name == name) {
                tracing::warn!(
                    step = %step.name,
                    parameter = %name,
                    "ignoring value for undeclared task parameter"
                );
            }
        }

        let mut set = TaskParameterSet::new();
        for definition in definitions {
            let value = raw.get(&definition.name).ok_or_else(|| {
                ParameterError::task_space(
                    &step.name,
                    format!("{} is missing a value for '{}'", label, definition.name),
                )
            })?;
            let typed = ParameterValue::coerce(definition.param_type, value).ok_or_else(|| {
                ParameterError::task_space(
                    &step.name,
                    format!(
                        "{}: parameter '{}' expects a value of type {}, got '{}'",
                        label,
                        definition.name,
                        definition.param_type,
                        render_raw(value)
                    ),
                )
            })?;
            set.insert(definition.name.clone(), typed);
        }
        Ok(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn render_step() -> StepDefinition {
        serde_json::from_value(json!({
            "name": "Render",
            "parameterSpace": {
                "taskParameterDefinitions": [
                    {"name": "Frame", "type": "INT", "range": [1, 2, 3]},
                    {"name": "Camera", "type": "STRING", "range": ["Left", "Right"]}
                ]
            },
            "script": {"actions": {"onRun": {"command": "render"}}}
        }))
        .unwrap()
    }

    fn pairs(tasks: &[TaskParameterSet]) -> Vec<String> {
        tasks.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn test_cross_product_order() {
        let tasks =
            TaskSpaceBuilder::build(&render_step(), &ParameterValueMap::new(), &TaskSelection::FULL)
                .unwrap();

        assert_eq!(
            pairs(&tasks),
            vec![
                "Frame=1, Camera=Left",
                "Frame=1, Camera=Right",
                "Frame=2, Camera=Left",
                "Frame=2, Camera=Right",
                "Frame=3, Camera=Left",
                "Frame=3, Camera=Right",
            ]
        );
    }

    #[test]
    fn test_maximum_tasks_is_prefix() {
        let step = render_step();
        let params = ParameterValueMap::new();
        let full = TaskSpaceBuilder::build(&step, &params, &TaskSelection::FULL).unwrap();

        for k in [0usize, 2, 6, 100] {
            let truncated = TaskSpaceBuilder::build(
                &step,
                &params,
                &TaskSelection::CrossProduct {
                    maximum_tasks: Some(k),
                },
            )
            .unwrap();
            assert_eq!(truncated.len(), k.min(full.len()));
            assert_eq!(truncated[..], full[..truncated.len()]);
        }
    }

    #[test]
    fn test_explicit_sets_used_verbatim() {
        let sets: Vec<RawParameterMap> = vec![
            [("Frame".to_string(), json!(42)), ("Camera".to_string(), json!("Top"))]
                .into_iter()
                .collect(),
            [
                ("Camera".to_string(), json!("Left")),
                ("Frame".to_string(), json!("7")),
                ("Extra".to_string(), json!(true)),
            ]
            .into_iter()
            .collect(),
        ];

        let tasks = TaskSpaceBuilder::build(
            &render_step(),
            &ParameterValueMap::new(),
            &TaskSelection::ExplicitSets(sets),
        )
        .unwrap();
        assert_eq!(pairs(&tasks), vec!["Frame=42, Camera=Top", "Frame=7, Camera=Left"]);
    }

    #[test]
    fn test_explicit_set_missing_parameter_fails() {
        let sets: Vec<RawParameterMap> =
            vec![[("Frame".to_string(), json!(1))].into_iter().collect()];

        let err = TaskSpaceBuilder::build(
            &render_step(),
            &ParameterValueMap::new(),
            &TaskSelection::ExplicitSets(sets),
        )
        .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("Render"));
        assert!(message.contains("task parameter set 0"));
        assert!(message.contains("'Camera'"));
    }

    #[test]
    fn test_single_pin_type_checked() {
        let pin: RawParameterMap = [
            ("Frame".to_string(), json!("two")),
            ("Camera".to_string(), json!("Left")),
        ]
        .into_iter()
        .collect();

        let err = TaskSpaceBuilder::build(
            &render_step(),
            &ParameterValueMap::new(),
            &TaskSelection::SinglePin(pin),
        )
        .unwrap_err();
        assert!(err.to_string().contains("expects a value of type INT"));
    }

    #[test]
    fn test_range_expression_uses_job_parameters() {
        let step: StepDefinition = serde_json::from_value(json!({
            "name": "Frames",
            "parameterSpace": {
                "taskParameterDefinitions": [
                    {"name": "Frame", "type": "INT", "range": "1-{{Param.N}}"}
                ]
            },
            "script": {"actions": {"onRun": {"command": "echo"}}}
        }))
        .unwrap();
        let mut params = ParameterValueMap::new();
        params.insert("N".to_string(), ParameterValue::Int(4));

        let tasks = TaskSpaceBuilder::build(&step, &params, &TaskSelection::FULL).unwrap();
        assert_eq!(tasks.len(), 4);
        assert_eq!(TaskSpaceBuilder::count(&step, &params).unwrap(), 4);
    }

    #[test]
    fn test_step_without_parameter_space_has_one_task() {
        let step: StepDefinition = serde_json::from_value(json!({
            "name": "Setup",
            "script": {"actions": {"onRun": {"command": "true"}}}
        }))
        .unwrap();
        let params = ParameterValueMap::new();

        let tasks = TaskSpaceBuilder::build(&step, &params, &TaskSelection::FULL).unwrap();
        assert_eq!(tasks.len(), 1);
        assert!(tasks[0].is_empty());

        let pin: RawParameterMap = [("Frame".to_string(), json!(1))].into_iter().collect();
        let tasks = TaskSpaceBuilder::build(&step, &params, &TaskSelection::SinglePin(pin)).unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(TaskSpaceBuilder::count(&step, &params).unwrap(), 1);
    }

    #[test]
    fn test_invalid_declarations() {
        let duplicate: StepDefinition = serde_json::from_value(json!({
            "name": "Dup",
            "parameterSpace": {
                "taskParameterDefinitions": [
                    {"name": "X", "type": "INT", "range": [1]},
                    {"name": "X", "type": "INT", "range": [2]}
                ]
            },
            "script": {"actions": {"onRun": {"command": "true"}}}
        }))
        .unwrap();
        assert!(TaskSpaceBuilder::count(&duplicate, &ParameterValueMap::new()).is_err());

        let empty: StepDefinition = serde_json::from_value(json!({
            "name": "Empty",
            "parameterSpace": {
                "taskParameterDefinitions": [
                    {"name": "X", "type": "STRING", "range": []}
                ]
            },
            "script": {"actions": {"onRun": {"command": "true"}}}
        }))
        .unwrap();
        let err =
            TaskSpaceBuilder::build(&empty, &ParameterValueMap::new(), &TaskSelection::FULL)
                .unwrap_err();
        assert!(err.to_string().contains("empty range"));
    }

    fn frames_step(range: &str) -> StepDefinition {
        serde_json::from_value(json!({
            "name": "Frames",
            "parameterSpace": {
                "taskParameterDefinitions": [
                    {"name": "Frame", "type": "INT", "range": range},
                    {"name": "Camera", "type": "STRING", "range": ["Left"]}
                ]
            },
            "script": {"actions": {"onRun": {"command": "echo"}}}
        }))
        .unwrap()
    }

    #[test]
    fn test_truncated_huge_range_takes_prefix() {
        let step = frames_step("1-2000000000");
        let params = ParameterValueMap::new();

        let tasks = TaskSpaceBuilder::build(
            &step,
            &params,
            &TaskSelection::CrossProduct {
                maximum_tasks: Some(2),
            },
        )
        .unwrap();
        assert_eq!(pairs(&tasks), vec!["Frame=1, Camera=Left", "Frame=2, Camera=Left"]);
        assert_eq!(TaskSpaceBuilder::count(&step, &params).unwrap(), 2_000_000_000);
    }

    #[test]
    fn test_oversized_task_space_is_an_error() {
        let step = frames_step("0-9223372036854775807,0-9223372036854775807");
        let params = ParameterValueMap::new();

        let err = TaskSpaceBuilder::count(&step, &params).unwrap_err();
        assert!(err.to_string().contains("too many values"));

        let err = TaskSpaceBuilder::build(&step, &params, &TaskSelection::FULL).unwrap_err();
        assert!(err.to_string().contains("too many values"));

        let wide: StepDefinition = serde_json::from_value(json!({
            "name": "Wide",
            "parameterSpace": {
                "taskParameterDefinitions": [
                    {"name": "A", "type": "INT", "range": "0-4294967296"},
                    {"name": "B", "type": "INT", "range": "0-4294967296"}
                ]
            },
            "script": {"actions": {"onRun": {"command": "echo"}}}
        }))
        .unwrap();
        let err = TaskSpaceBuilder::count(&wide, &params).unwrap_err();
        assert!(err.to_string().contains("too large to count"));

        let err = TaskSpaceBuilder::build(&wide, &params, &TaskSelection::FULL).unwrap_err();
        assert!(err.to_string().contains("too large"));

        let tasks = TaskSpaceBuilder::build(
            &wide,
            &params,
            &TaskSelection::CrossProduct {
                maximum_tasks: Some(2),
            },
        )
        .unwrap();
        assert_eq!(pairs(&tasks), vec!["A=0, B=0", "A=0, B=1"]);
    }

    #[test]
    fn test_build_is_deterministic() {
        let step = render_step();
        let params = ParameterValueMap::new();
        let first = TaskSpaceBuilder::build(&step, &params, &TaskSelection::FULL).unwrap();
        let second = TaskSpaceBuilder::build(&step, &params, &TaskSelection::FULL).unwrap();
        assert_eq!(first, second);
    }
}
