// Execution Engine Module
// Dependency ordering, session orchestration and progress reporting

pub mod events;
pub mod graph;
pub mod result;
pub mod session;

// Re-export key types
pub use events::{
    progress_channel, ActionSource, EnvironmentPhase, EventSender, ExecutionEvent, LogLevel,
    ProgressReceiver, ProgressSender,
};
pub use graph::{DependencyError, DependencyErrorKind, DependencyGraph};
pub use result::{
    ActionStatus, SessionResult, SessionStatus, StepOutcome, StepStatus, TaskRecord,
};
pub use session::{
    PlannedStep, SessionConfig, SessionOrchestrator, SessionPlan, TaskSelector,
};
