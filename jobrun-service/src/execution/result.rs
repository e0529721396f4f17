// Session Results
// Per-task records, per-step outcomes and the aggregate session result

use crate::error::ServiceError;
use crate::space::TaskParameterSet;

use serde::{Serialize, Serializer};
use std::path::PathBuf;
use std::time::Duration;

/// Terminal status of one action (task run or environment hook)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    Succeeded,
    Failed,
    Cancelled,
}

impl ActionStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, ActionStatus::Succeeded)
    }
}

/// Overall status of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Succeeded,
    Failed,
}

/// Status of one step within a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Succeeded,
    Failed,
    Cancelled,
    /// Never started because an earlier step failed or the session was cancelled
    NotStarted,
}

fn serialize_secs<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64())
}

/// Outcome of a single task
#[derive(Debug, Clone, Serialize)]
pub struct TaskRecord {
    /// Position in the step's task sequence
    pub index: usize,
    pub parameters: TaskParameterSet,
    pub status: ActionStatus,
    #[serde(serialize_with = "serialize_secs")]
    pub duration: Duration,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Outcome of a step
#[derive(Debug, Clone, Serialize)]
pub struct StepOutcome {
    pub step_name: String,
    /// Tasks planned for this step
    pub total_tasks: usize,
    /// Records of the tasks that were submitted, in submission order
    pub tasks: Vec<TaskRecord>,
    pub status: StepStatus,
}

impl StepOutcome {
    pub fn not_started(step_name: impl Into<String>, total_tasks: usize) -> Self {
        Self {
            step_name: step_name.into(),
            total_tasks,
            tasks: Vec::new(),
            status: StepStatus::NotStarted,
        }
    }

    /// Tasks that completed successfully
    pub fn tasks_run(&self) -> usize {
        self.tasks
            .iter()
            .filter(|t| t.status == ActionStatus::Succeeded)
            .count()
    }
}

/// Aggregate outcome of a session
#[derive(Debug, Clone, Serialize)]
pub struct SessionResult {
    pub job_name: String,
    /// The step the caller asked for
    pub step_name: String,
    /// Steps that started, in execution order
    pub steps_executed: Vec<String>,
    pub status: SessionStatus,
    pub cancelled: bool,
    pub message: String,
    pub tasks_run: usize,
    #[serde(serialize_with = "serialize_secs")]
    pub duration: Duration,
    pub steps: Vec<StepOutcome>,
    /// Kept session working directory, when preservation was requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,
}

impl SessionResult {
    pub fn is_success(&self) -> bool {
        self.status == SessionStatus::Succeeded
    }

    pub fn step(&self, name: &str) -> Option<&StepOutcome> {
        self.steps.iter().find(|s| s.step_name == name)
    }

    /// The error to report for an unsuccessful session
    pub fn error(&self) -> Option<ServiceError> {
        if self.is_success() {
            None
        } else if self.cancelled {
            Some(ServiceError::Cancelled(self.message.clone()))
        } else {
            Some(ServiceError::Execution(self.message.clone()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(index: usize, status: ActionStatus) -> TaskRecord {
        TaskRecord {
            index,
            parameters: TaskParameterSet::new(),
            status,
            duration: Duration::from_millis(1500),
            exit_code: None,
            message: None,
        }
    }

    #[test]
    fn test_tasks_run_counts_only_successes() {
        let outcome = StepOutcome {
            step_name: "Render".to_string(),
            total_tasks: 4,
            tasks: vec![
                record(0, ActionStatus::Succeeded),
                record(1, ActionStatus::Failed),
                record(2, ActionStatus::Cancelled),
            ],
            status: StepStatus::Failed,
        };
        assert_eq!(outcome.tasks_run(), 1);
        assert_eq!(StepOutcome::not_started("Later", 3).tasks_run(), 0);
    }

    #[test]
    fn test_serialize_record() {
        let value = serde_json::to_value(record(0, ActionStatus::Succeeded)).unwrap();
        assert_eq!(value["status"], "succeeded");
        assert_eq!(value["duration"], 1.5);
        assert!(value.get("exit_code").is_none());
        assert_eq!(
            serde_json::to_value(StepStatus::NotStarted).unwrap(),
            "not_started"
        );
    }
}
