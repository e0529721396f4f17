// Job Template Models
// Serde representation of job templates, steps, parameter spaces and environments

use super::value::ParameterType;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// The only template revision this engine understands
pub const SPECIFICATION_VERSION: &str = "jobtemplate-2023-09";

/// A decoded job template, before job parameters are applied
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobTemplate {
    pub specification_version: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub parameter_definitions: Vec<ParameterDefinition>,
    pub steps: Vec<StepDefinition>,
    #[serde(default)]
    pub job_environments: Vec<EnvironmentDefinition>,
}

/// A job-level parameter declaration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ParameterType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_values: Option<Vec<serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_value: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_value: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
}

impl ParameterDefinition {
    /// Create a bare definition with no default or constraints
    pub fn new(name: impl Into<String>, param_type: ParameterType) -> Self {
        Self {
            name: name.into(),
            param_type,
            default: None,
            allowed_values: None,
            description: None,
            min_value: None,
            max_value: None,
            min_length: None,
            max_length: None,
        }
    }

    pub fn with_default(mut self, default: serde_json::Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_allowed_values(mut self, values: Vec<serde_json::Value>) -> Self {
        self.allowed_values = Some(values);
        self
    }
}

/// A step within a job
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameter_space: Option<StepParameterSpace>,
    pub script: StepScript,
    #[serde(default)]
    pub dependencies: Vec<StepDependency>,
    #[serde(default)]
    pub step_environments: Vec<EnvironmentDefinition>,
}

impl StepDefinition {
    /// Names of the steps this step depends on, in declaration order
    pub fn dependency_names(&self) -> impl Iterator<Item = &str> {
        self.dependencies.iter().map(|d| d.depends_on.as_str())
    }

    /// Declared task parameters (empty when the step has no parameter space)
    pub fn task_parameters(&self) -> &[TaskParameterDefinition] {
        self.parameter_space
            .as_ref()
            .map(|space| space.task_parameter_definitions.as_slice())
            .unwrap_or(&[])
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepDependency {
    pub depends_on: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepParameterSpace {
    pub task_parameter_definitions: Vec<TaskParameterDefinition>,
}

/// A task parameter and its domain
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskParameterDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ParameterType,
    pub range: TaskParameterRange,
}

/// Domain of a task parameter: an explicit value list, or an integer range expression
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TaskParameterRange {
    Values(Vec<serde_json::Value>),
    Expression(String),
}

/// The opaque command payload of a step
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepScript {
    pub actions: StepActions,
    #[serde(default)]
    pub embedded_files: Vec<EmbeddedFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepActions {
    pub on_run: Action,
}

/// A command to run, with format-string arguments
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Timeout in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

impl Action {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            timeout: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EmbeddedFileType {
    Text,
}

/// A file materialized into the session working directory before an action runs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddedFile {
    pub name: String,
    #[serde(rename = "type")]
    pub file_type: EmbeddedFileType,
    pub data: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default)]
    pub runnable: bool,
}

/// Setup/teardown context shared by the steps of a session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<EnvironmentScript>,
    #[serde(default)]
    pub variables: IndexMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentScript {
    pub actions: EnvironmentActions,
    #[serde(default)]
    pub embedded_files: Vec<EmbeddedFile>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentActions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_enter: Option<Action>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_exit: Option<Action>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEMPLATE: &str = r#"
specificationVersion: jobtemplate-2023-09
name: render-{{Param.Scene}}
parameterDefinitions:
  - name: Scene
    type: STRING
    default: intro
  - name: Frames
    type: INT
    minValue: 1
jobEnvironments:
  - name: Licence
    variables:
      LICENSE_SERVER: "127.0.0.1"
steps:
  - name: Render
    parameterSpace:
      taskParameterDefinitions:
        - name: Frame
          type: INT
          range: "1-{{Param.Frames}}"
        - name: Camera
          type: STRING
          range: [Left, Right]
    script:
      actions:
        onRun:
          command: echo
          args: ["{{Task.Param.Frame}}", "{{Task.Param.Camera}}"]
  - name: Encode
    dependencies:
      - dependsOn: Render
    script:
      actions:
        onRun:
          command: echo
          timeout: 30
"#;

    #[test]
    fn test_deserialize_template() {
        let template: JobTemplate = serde_yaml::from_str(TEMPLATE).unwrap();

        assert_eq!(template.specification_version, SPECIFICATION_VERSION);
        assert_eq!(template.parameter_definitions.len(), 2);
        assert_eq!(template.parameter_definitions[1].param_type, ParameterType::Int);
        assert_eq!(template.job_environments[0].variables["LICENSE_SERVER"], "127.0.0.1");

        let render = &template.steps[0];
        let params = render.task_parameters();
        assert_eq!(params.len(), 2);
        assert!(matches!(params[0].range, TaskParameterRange::Expression(_)));
        assert!(matches!(params[1].range, TaskParameterRange::Values(ref v) if v.len() == 2));

        let encode = &template.steps[1];
        assert!(encode.task_parameters().is_empty());
        assert_eq!(encode.dependency_names().collect::<Vec<_>>(), vec!["Render"]);
        assert_eq!(encode.script.actions.on_run.timeout, Some(30));
    }
}
