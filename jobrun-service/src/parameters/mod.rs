// Parameters
// Job parameter resolution and task parameter override parsing

pub mod overrides;
pub mod resolver;
pub mod sources;

pub use overrides::{parse_task_parameter_sets, parse_task_pin};
pub use resolver::ParameterResolver;
pub use sources::{ParameterSource, RawParameterMap};
