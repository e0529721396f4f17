// Job Instantiation
// Binds resolved job parameter values to a decoded template

use super::template::{EnvironmentDefinition, JobTemplate, ParameterDefinition, StepDefinition};
use super::value::ParameterValueMap;
use crate::error::{ServiceError, ServiceResult};
use crate::format::Symbols;

/// A job template with its parameters resolved
#[derive(Debug, Clone)]
pub struct Job {
    /// Job name with `{{Param.X}}` references substituted
    pub name: String,
    pub description: Option<String>,
    pub parameter_definitions: Vec<ParameterDefinition>,
    pub parameters: ParameterValueMap,
    pub steps: Vec<StepDefinition>,
    pub job_environments: Vec<EnvironmentDefinition>,
}

impl Job {
    /// Instantiate a job from its template and already-resolved parameter values
    pub fn from_template(template: JobTemplate, parameters: ParameterValueMap) -> ServiceResult<Self> {
        let symbols = Symbols::new().with_parameters("", &parameters);
        let name = symbols.resolve(&template.name).map_err(|e| {
            ServiceError::template(format!("Could not generate Job name: {}", e))
        })?;

        Ok(Self {
            name,
            description: template.description,
            parameter_definitions: template.parameter_definitions,
            parameters,
            steps: template.steps,
            job_environments: template.job_environments,
        })
    }

    /// Look up a step by name
    pub fn step(&self, name: &str) -> Option<&StepDefinition> {
        self.steps.iter().find(|s| s.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ParameterValue;

    fn template(name: &str) -> JobTemplate {
        serde_json::from_value(serde_json::json!({
            "specificationVersion": "jobtemplate-2023-09",
            "name": name,
            "steps": [
                {"name": "A", "script": {"actions": {"onRun": {"command": "true"}}}}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn test_job_name_uses_parameters() {
        let mut params = ParameterValueMap::new();
        params.insert("Title".to_string(), ParameterValue::from("nightly"));

        let job = Job::from_template(template("{{Param.Title}} build"), params).unwrap();
        assert_eq!(job.name, "nightly build");
        assert!(job.step("A").is_some());
        assert!(job.step("B").is_none());
    }

    #[test]
    fn test_job_name_with_unknown_reference_fails() {
        let err = Job::from_template(template("{{Param.Nope}}"), ParameterValueMap::new())
            .unwrap_err();
        assert!(matches!(err, ServiceError::Template(_)));
    }
}
