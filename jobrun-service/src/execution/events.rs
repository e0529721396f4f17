// Execution Events
// Progress reporting and event types for session execution

use super::result::{ActionStatus, StepStatus};
use crate::space::TaskParameterSet;

use std::time::Duration;
use tokio::sync::mpsc;

/// Sender for execution progress events
pub type ProgressSender = mpsc::UnboundedSender<ExecutionEvent>;

/// Receiver for execution progress events
pub type ProgressReceiver = mpsc::UnboundedReceiver<ExecutionEvent>;

/// Create a new progress channel
pub fn progress_channel() -> (ProgressSender, ProgressReceiver) {
    mpsc::unbounded_channel()
}

/// Which environment hook is running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvironmentPhase {
    Enter,
    Exit,
}

/// Which action produced a line of output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionSource {
    Task { step_name: String, task_index: usize },
    Environment { name: String, phase: EnvironmentPhase },
}

/// Events emitted during session execution
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    /// Session started; the working directory exists
    SessionStarted {
        job_name: String,
        session_id: String,
        working_dir: String,
        total_steps: usize,
    },

    /// Session finished and cleanup completed
    SessionCompleted {
        job_name: String,
        success: bool,
        cancelled: bool,
        tasks_run: usize,
        duration: Duration,
    },

    /// Environment hook started
    EnvironmentStarted {
        name: String,
        phase: EnvironmentPhase,
    },

    /// Environment hook completed
    EnvironmentCompleted {
        name: String,
        phase: EnvironmentPhase,
        status: ActionStatus,
        duration: Duration,
    },

    /// Step execution started
    StepStarted { step_name: String, total_tasks: usize },

    /// Step execution completed
    StepCompleted {
        step_name: String,
        status: StepStatus,
        duration: Duration,
    },

    /// Step was never started
    StepSkipped { step_name: String, reason: String },

    /// Task execution started
    TaskStarted {
        step_name: String,
        task_index: usize,
        parameters: TaskParameterSet,
    },

    /// Action output (stdout/stderr)
    ActionOutput {
        source: ActionSource,
        output: String,
        is_error: bool,
    },

    /// Task execution completed
    TaskCompleted {
        step_name: String,
        task_index: usize,
        status: ActionStatus,
        duration: Duration,
        exit_code: Option<i32>,
    },

    /// Log message (info, warning, error)
    Log { level: LogLevel, message: String },
}

/// Log level for log events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Warning,
    Error,
}

impl ExecutionEvent {
    /// Create a session started event
    pub fn session_started(
        job_name: impl Into<String>,
        session_id: impl Into<String>,
        working_dir: impl Into<String>,
        total_steps: usize,
    ) -> Self {
        Self::SessionStarted {
            job_name: job_name.into(),
            session_id: session_id.into(),
            working_dir: working_dir.into(),
            total_steps,
        }
    }

    /// Create a session completed event
    pub fn session_completed(
        job_name: impl Into<String>,
        success: bool,
        cancelled: bool,
        tasks_run: usize,
        duration: Duration,
    ) -> Self {
        Self::SessionCompleted {
            job_name: job_name.into(),
            success,
            cancelled,
            tasks_run,
            duration,
        }
    }

    pub fn environment_started(name: impl Into<String>, phase: EnvironmentPhase) -> Self {
        Self::EnvironmentStarted {
            name: name.into(),
            phase,
        }
    }

    pub fn environment_completed(
        name: impl Into<String>,
        phase: EnvironmentPhase,
        status: ActionStatus,
        duration: Duration,
    ) -> Self {
        Self::EnvironmentCompleted {
            name: name.into(),
            phase,
            status,
            duration,
        }
    }

    /// Create a step started event
    pub fn step_started(step_name: impl Into<String>, total_tasks: usize) -> Self {
        Self::StepStarted {
            step_name: step_name.into(),
            total_tasks,
        }
    }

    /// Create a step completed event
    pub fn step_completed(
        step_name: impl Into<String>,
        status: StepStatus,
        duration: Duration,
    ) -> Self {
        Self::StepCompleted {
            step_name: step_name.into(),
            status,
            duration,
        }
    }

    /// Create a step skipped event
    pub fn step_skipped(step_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::StepSkipped {
            step_name: step_name.into(),
            reason: reason.into(),
        }
    }

    /// Create a task started event
    pub fn task_started(
        step_name: impl Into<String>,
        task_index: usize,
        parameters: TaskParameterSet,
    ) -> Self {
        Self::TaskStarted {
            step_name: step_name.into(),
            task_index,
            parameters,
        }
    }

    /// Create an action output event
    pub fn action_output(source: ActionSource, output: impl Into<String>, is_error: bool) -> Self {
        Self::ActionOutput {
            source,
            output: output.into(),
            is_error,
        }
    }

    /// Create a task completed event
    pub fn task_completed(
        step_name: impl Into<String>,
        task_index: usize,
        status: ActionStatus,
        duration: Duration,
        exit_code: Option<i32>,
    ) -> Self {
        Self::TaskCompleted {
            step_name: step_name.into(),
            task_index,
            status,
            duration,
            exit_code,
        }
    }

    /// Create a warning log event
    pub fn warning(message: impl Into<String>) -> Self {
        Self::Log {
            level: LogLevel::Warning,
            message: message.into(),
        }
    }

    /// Create an error log event
    pub fn error(message: impl Into<String>) -> Self {
        Self::Log {
            level: LogLevel::Error,
            message: message.into(),
        }
    }
}

/// Helper trait for sending events, ignoring errors (fire-and-forget)
pub trait EventSender {
    fn send_event(&self, event: ExecutionEvent);
}

impl EventSender for ProgressSender {
    fn send_event(&self, event: ExecutionEvent) {
        let _ = self.send(event);
    }
}

impl EventSender for Option<ProgressSender> {
    fn send_event(&self, event: ExecutionEvent) {
        if let Some(sender) = self {
            let _ = sender.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_progress_channel() {
        let (tx, mut rx) = progress_channel();

        tx.send_event(ExecutionEvent::session_started("job", "local-session", "/tmp/x", 2));
        tx.send_event(ExecutionEvent::step_started("Render", 6));

        let event1 = rx.recv().await.unwrap();
        assert!(matches!(event1, ExecutionEvent::SessionStarted { .. }));

        let event2 = rx.recv().await.unwrap();
        assert!(matches!(
            event2,
            ExecutionEvent::StepStarted { total_tasks: 6, .. }
        ));
    }

    #[test]
    fn test_event_construction() {
        let event = ExecutionEvent::task_completed(
            "Render",
            3,
            ActionStatus::Failed,
            Duration::from_secs(30),
            Some(2),
        );

        if let ExecutionEvent::TaskCompleted {
            step_name,
            task_index,
            status,
            duration,
            exit_code,
        } = event
        {
            assert_eq!(step_name, "Render");
            assert_eq!(task_index, 3);
            assert_eq!(status, ActionStatus::Failed);
            assert_eq!(duration, Duration::from_secs(30));
            assert_eq!(exit_code, Some(2));
        } else {
            panic!("wrong event type");
        }
    }

    #[test]
    fn test_optional_sender() {
        let sender: Option<ProgressSender> = None;
        // Should not panic
        sender.send_event(ExecutionEvent::warning("test"));
    }
}
