// Task Selection
// The caller's choice of which tasks of the target step to run

use crate::error::{ServiceError, ServiceResult};
use crate::parameters::{parse_task_parameter_sets, parse_task_pin, RawParameterMap};

/// How the task space of a step is chosen
#[derive(Debug, Clone, PartialEq)]
pub enum TaskSelection {
    /// Full cross-product of the declared domains, optionally truncated
    CrossProduct { maximum_tasks: Option<usize> },
    /// A literal list of parameter sets, used verbatim
    ExplicitSets(Vec<RawParameterMap>),
    /// Exactly one task with one fixed value per parameter
    SinglePin(RawParameterMap),
}

impl TaskSelection {
    /// Every task of the step
    pub const FULL: TaskSelection = TaskSelection::CrossProduct {
        maximum_tasks: None,
    };

    /// Validate the selection flags and parse the chosen one.
    ///
    /// The three flags are mutually exclusive; any combination is rejected before
    /// the override arguments are even parsed.
    pub fn from_flags(flags: SelectionFlags<'_>) -> ServiceResult<Self> {
        let mut given = Vec::new();
        if !flags.task_params.is_empty() {
            given.push("--task-params");
        }
        if !flags.task_pin.is_empty() {
            given.push("--task");
        }
        if flags.maximum_tasks.is_some() {
            given.push("--maximum-tasks");
        }

        if given.len() > 1 {
            return Err(ServiceError::usage(format!(
                "{} cannot be used together; choose one way to select tasks",
                given.join(" and ")
            )));
        }

        if !flags.task_params.is_empty() {
            let sets = parse_task_parameter_sets(flags.task_params)?;
            return Ok(TaskSelection::ExplicitSets(sets));
        }
        if !flags.task_pin.is_empty() {
            return Ok(TaskSelection::SinglePin(parse_task_pin(flags.task_pin)?));
        }
        Ok(TaskSelection::CrossProduct {
            maximum_tasks: flags.maximum_tasks,
        })
    }
}

impl Default for TaskSelection {
    fn default() -> Self {
        Self::FULL
    }
}

/// Raw task selection flags as given on the command line
#[derive(Debug, Clone, Copy, Default)]
pub struct SelectionFlags<'a> {
    /// One entry per `--task-params` occurrence
    pub task_params: &'a [Vec<String>],
    /// `--task Name=Value` pairs
    pub task_pin: &'a [String],
    pub maximum_tasks: Option<usize>,
}
