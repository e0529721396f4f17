// Shared arguments and helpers for the `run` and `summary` commands

pub mod run;
pub mod summary;

use std::path::PathBuf;

use clap::{Args, ValueEnum};
use color_eyre::Result;
use serde::Serialize;

use jobrun_service::{read_job_template, Job, ParameterResolver};

/// How results are printed
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    HumanReadable,
    Json,
    Yaml,
}

/// Template location and job parameter arguments
#[derive(Args, Debug)]
pub struct TemplateArgs {
    /// Path to a job template file or a bundle directory containing one
    pub path: PathBuf,

    /// Job parameter: Name=Value, inline JSON, or file://<path> (can be repeated)
    #[arg(long = "job-param", short = 'p', value_name = "PARAM")]
    pub job_params: Vec<String>,

    /// Output format for the result
    #[arg(long, value_enum, default_value_t = OutputFormat::HumanReadable)]
    pub output: OutputFormat,
}

/// Read the template and bind job parameters to it
pub fn load_job(args: &TemplateArgs) -> Result<Job> {
    let template = read_job_template(&args.path)?;
    let parameters = ParameterResolver::resolve_args(&template.parameter_definitions, &args.job_params)?;
    tracing::debug!(template = %args.path.display(), "loaded job template");
    Ok(Job::from_template(template, parameters)?)
}

/// Print a serializable value in the requested format; human output is delegated
pub fn emit<T: Serialize>(format: OutputFormat, value: &T, human: impl FnOnce(&T)) -> Result<()> {
    match format {
        OutputFormat::HumanReadable => human(value),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(value)?),
    }
    Ok(())
}
