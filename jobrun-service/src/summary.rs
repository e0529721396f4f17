// Job Summaries
// Plain-data descriptions of a job and its steps, without running anything

use crate::error::{ServiceError, ServiceResult};
use crate::model::{EnvironmentDefinition, Job, ParameterType, StepDefinition};
use crate::space::TaskSpaceBuilder;

use serde::Serialize;

/// Parent name recorded for job-level environments
pub const ROOT_ENVIRONMENT_PARENT: &str = "root";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterSummary {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub param_type: ParameterType,
    /// Resolved value; task parameters have none
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnvironmentSummary {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// `root` for job environments, otherwise the owning step
    pub parent: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DependencySummary {
    pub step_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepSummary {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub parameter_definitions: Vec<ParameterSummary>,
    pub total_tasks: u64,
    pub environments: Vec<EnvironmentSummary>,
    pub dependencies: Vec<DependencySummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobSummary {
    pub name: String,
    pub parameters: Vec<ParameterSummary>,
    pub total_steps: usize,
    pub total_tasks: u64,
    /// Job environments plus every step's environments
    pub total_environments: usize,
    pub root_environments: Vec<EnvironmentSummary>,
    pub steps: Vec<StepSummary>,
}

/// Summarize a whole job
pub fn summarize_job(job: &Job) -> ServiceResult<JobSummary> {
    let steps = job
        .steps
        .iter()
        .map(|step| step_summary(job, step))
        .collect::<ServiceResult<Vec<_>>>()?;

    let parameters = job
        .parameter_definitions
        .iter()
        .map(|definition| ParameterSummary {
            name: definition.name.clone(),
            description: definition.description.clone(),
            param_type: definition.param_type,
            value: job.parameters.get(&definition.name).map(|v| v.as_string()),
        })
        .collect();

    let root_environments: Vec<EnvironmentSummary> = job
        .job_environments
        .iter()
        .map(|env| environment_summary(env, ROOT_ENVIRONMENT_PARENT))
        .collect();

    let step_environments: usize = steps.iter().map(|s| s.environments.len()).sum();

    Ok(JobSummary {
        name: job.name.clone(),
        parameters,
        total_steps: steps.len(),
        total_tasks: steps
            .iter()
            .fold(0u64, |total, s| total.saturating_add(s.total_tasks)),
        total_environments: root_environments.len() + step_environments,
        root_environments,
        steps,
    })
}

/// Summarize one step of a job
pub fn summarize_step(job: &Job, step_name: &str) -> ServiceResult<StepSummary> {
    let step = job.step(step_name).ok_or_else(|| {
        ServiceError::usage(format!(
            "Step '{}' does not exist in Job '{}'.",
            step_name, job.name
        ))
    })?;
    step_summary(job, step)
}

fn step_summary(job: &Job, step: &StepDefinition) -> ServiceResult<StepSummary> {
    let total_tasks = TaskSpaceBuilder::count(step, &job.parameters)?;

    Ok(StepSummary {
        name: step.name.clone(),
        description: step.description.clone(),
        parameter_definitions: step
            .task_parameters()
            .iter()
            .map(|definition| ParameterSummary {
                name: definition.name.clone(),
                description: None,
                param_type: definition.param_type,
                value: None,
            })
            .collect(),
        total_tasks,
        environments: step
            .step_environments
            .iter()
            .map(|env| environment_summary(env, &step.name))
            .collect(),
        dependencies: step
            .dependency_names()
            .map(|name| DependencySummary {
                step_name: name.to_string(),
            })
            .collect(),
    })
}

fn environment_summary(environment: &EnvironmentDefinition, parent: &str) -> EnvironmentSummary {
    EnvironmentSummary {
        name: environment.name.clone(),
        description: environment.description.clone(),
        parent: parent.to_string(),
    }
}
