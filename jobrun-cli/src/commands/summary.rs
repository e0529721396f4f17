use super::{emit, load_job, TemplateArgs};
use crate::output;

use clap::Args;
use color_eyre::Result;

use jobrun_service::{summarize_job, summarize_step};

/// Describe a job template's steps, tasks and environments without running it
#[derive(Args, Debug)]
pub struct SummaryArgs {
    #[command(flatten)]
    pub template: TemplateArgs,

    /// Describe only the step with this name
    #[arg(long, value_name = "STEP_NAME")]
    pub step: Option<String>,
}

pub fn execute(args: SummaryArgs) -> Result<()> {
    let job = load_job(&args.template)?;

    match &args.step {
        Some(step_name) => {
            let summary = summarize_step(&job, step_name)?;
            emit(args.template.output, &summary, |s| {
                output::step_summary(&job.name, s)
            })
        }
        None => {
            let summary = summarize_job(&job)?;
            emit(args.template.output, &summary, output::job_summary)
        }
    }
}
