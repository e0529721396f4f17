// Job Run Service Library
// Parameter-space resolution and dependency-ordered local execution of job templates

pub mod error;
pub mod execution;
pub mod format;
pub mod model;
pub mod parameters;
pub mod pathmapping;
pub mod runners;
pub mod space;
pub mod summary;

// Re-export commonly used types
pub use error::{ParameterError, ServiceError, ServiceResult};

// Re-export model types
pub use model::{
    read_job_template, EnvironmentDefinition, Job, JobTemplate, ParameterDefinition,
    ParameterType, ParameterValue, ParameterValueMap, StepDefinition,
};

// Re-export parameter and task space types
pub use parameters::{
    parse_task_parameter_sets, parse_task_pin, ParameterResolver, ParameterSource,
    RawParameterMap,
};
pub use space::{SelectionFlags, TaskParameterSet, TaskSelection, TaskSpaceBuilder};

// Re-export execution types
pub use execution::{
    progress_channel, DependencyError, DependencyGraph, ExecutionEvent, ProgressReceiver,
    ProgressSender, SessionConfig, SessionOrchestrator, SessionPlan, SessionResult,
    TaskSelector,
};

// Re-export runner types
pub use runners::{ExecutionBackend, ShellRunner};

pub use pathmapping::{parse_path_mapping_rules, PathMappingRule};
pub use summary::{summarize_job, summarize_step, JobSummary, StepSummary};
