// Service Error Types
// Error taxonomy shared by parameter resolution, task expansion, dependency ordering and sessions

use crate::execution::graph::DependencyError;
use crate::model::ParameterType;

use thiserror::Error;

/// Result alias used across the service crate
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Top-level error for every operation exposed by the service
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Conflicting or invalid caller flags, detected before any resolution work
    #[error("usage error: {0}")]
    Usage(String),

    /// Missing, unknown or badly typed parameter values
    #[error(transparent)]
    Parameter(#[from] ParameterError),

    /// Unresolved dependency names or cycles
    #[error(transparent)]
    Dependency(#[from] DependencyError),

    /// The job template could not be read or instantiated
    #[error("template error: {0}")]
    Template(String),

    /// A task or environment action reported failure
    #[error("execution error: {0}")]
    Execution(String),

    /// The session was aborted by an external interrupt
    #[error("session cancelled: {0}")]
    Cancelled(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServiceError {
    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage(message.into())
    }

    pub fn template(message: impl Into<String>) -> Self {
        Self::Template(message.into())
    }
}

/// Errors raised while resolving job parameters or building task parameter sets
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParameterError {
    #[error("missing parameter '{name}': no value was supplied and it has no default")]
    Missing { name: String },

    #[error("unknown parameter '{name}'")]
    Unknown { name: String },

    #[error("parameter '{name}' expects a value of type {expected}, got '{value}'")]
    TypeMismatch {
        name: String,
        expected: ParameterType,
        value: String,
    },

    #[error("parameter '{name}' value '{value}' is not one of the allowed values [{allowed}]")]
    NotAllowed {
        name: String,
        value: String,
        allowed: String,
    },

    #[error("parameter '{name}' value '{value}' {constraint}")]
    ConstraintViolation {
        name: String,
        value: String,
        constraint: String,
    },

    /// A parameter source (key-value text, inline JSON, or file) could not be read
    #[error("{0}")]
    InvalidSource(String),

    /// A step's task parameter space could not be expanded
    #[error("step '{step}': {message}")]
    TaskSpace { step: String, message: String },
}

impl ParameterError {
    pub fn invalid_source(message: impl Into<String>) -> Self {
        Self::InvalidSource(message.into())
    }

    pub fn task_space(step: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TaskSpace {
            step: step.into(),
            message: message.into(),
        }
    }
}
