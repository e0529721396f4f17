// Template Model
// Job template types, document loading and job instantiation

pub mod job;
pub mod loader;
pub mod template;
pub mod value;

pub use job::Job;
pub use loader::{
    expand_file_reference, parse_document, read_document, read_job_template, DocumentError,
    DocumentErrorKind, DocumentType, FILE_PREFIX,
};
pub use template::*;
pub use value::{render_raw, ParameterType, ParameterValue, ParameterValueMap};
