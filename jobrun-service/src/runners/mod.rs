// Runners Module
// The execution backend seam and its local process implementation

pub mod shell;

pub use shell::ShellRunner;

use crate::execution::result::ActionStatus;
use crate::model::{EnvironmentDefinition, ParameterValueMap, StepDefinition};
use crate::pathmapping::PathMappingRule;
use crate::space::TaskParameterSet;

use indexmap::IndexMap;
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Everything a backend needs to know about the running session
#[derive(Debug, Clone, Copy)]
pub struct SessionContext<'a> {
    pub session_id: &'a str,
    /// Session working directory, owned by the orchestrator
    pub working_dir: &'a Path,
    pub job_parameters: &'a ParameterValueMap,
    pub path_mapping_rules: &'a [PathMappingRule],
    /// Variables exported by the environments entered so far
    pub env: &'a IndexMap<String, String>,
}

/// One task to run
#[derive(Debug, Clone, Copy)]
pub struct TaskRequest<'a> {
    pub step: &'a StepDefinition,
    pub task_index: usize,
    pub parameters: &'a TaskParameterSet,
}

/// Terminal outcome of an action
#[derive(Debug, Clone, PartialEq)]
pub struct ActionOutcome {
    pub status: ActionStatus,
    pub duration: Duration,
    pub exit_code: Option<i32>,
    pub message: Option<String>,
}

impl ActionOutcome {
    pub fn succeeded(duration: Duration) -> Self {
        Self {
            status: ActionStatus::Succeeded,
            duration,
            exit_code: Some(0),
            message: None,
        }
    }

    pub fn failed(duration: Duration, message: impl Into<String>) -> Self {
        Self {
            status: ActionStatus::Failed,
            duration,
            exit_code: None,
            message: Some(message.into()),
        }
    }

    pub fn cancelled(duration: Duration) -> Self {
        Self {
            status: ActionStatus::Cancelled,
            duration,
            exit_code: None,
            message: Some("cancelled".to_string()),
        }
    }

    pub fn with_exit_code(mut self, exit_code: Option<i32>) -> Self {
        self.exit_code = exit_code;
        self
    }
}

/// Runs environment hooks and tasks for a session
#[async_trait::async_trait]
pub trait ExecutionBackend: Send + Sync {
    /// Run an environment's enter hook
    async fn enter_environment(
        &self,
        session: &SessionContext<'_>,
        environment: &EnvironmentDefinition,
        cancel: &CancellationToken,
    ) -> ActionOutcome;

    /// Run an environment's exit hook
    async fn exit_environment(
        &self,
        session: &SessionContext<'_>,
        environment: &EnvironmentDefinition,
        cancel: &CancellationToken,
    ) -> ActionOutcome;

    /// Run one task to a terminal status
    async fn run_task(
        &self,
        session: &SessionContext<'_>,
        task: &TaskRequest<'_>,
        cancel: &CancellationToken,
    ) -> ActionOutcome;
}
