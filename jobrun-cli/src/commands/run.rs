use super::{emit, load_job, TemplateArgs};
use crate::output;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{ArgAction, ArgMatches, Args};
use color_eyre::Result;
use tokio_util::sync::CancellationToken;

use jobrun_service::execution::events::{ActionSource, EnvironmentPhase, LogLevel};
use jobrun_service::execution::{ActionStatus, StepStatus};
use jobrun_service::{
    parse_path_mapping_rules, progress_channel, DependencyGraph, ExecutionEvent,
    ProgressReceiver, SelectionFlags, SessionConfig, SessionOrchestrator, SessionPlan,
    ShellRunner, TaskSelection, TaskSelector,
};

/// Run a step of a job template in a local session
#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub template: TemplateArgs,

    /// Name of the step to run
    #[arg(long, value_name = "STEP_NAME")]
    pub step: String,

    /// One task's parameters: Name=Value pairs, inline JSON, or file://<path> (can be repeated)
    #[arg(long = "task-params", value_name = "PARAMS", num_args = 1.., action = ArgAction::Append)]
    pub task_params: Vec<String>,

    /// `--task-params` values split back into one set per occurrence
    #[arg(skip)]
    pub task_param_sets: Vec<Vec<String>>,

    /// Run a single task with this parameter value, Name=Value (can be repeated)
    #[arg(long = "task", value_name = "NAME=VALUE")]
    pub task_pin: Vec<String>,

    /// Run at most this many tasks of the step
    #[arg(long, value_name = "N")]
    pub maximum_tasks: Option<usize>,

    /// Also run the steps the target depends on, in dependency order
    #[arg(long)]
    pub run_dependencies: bool,

    /// Path mapping rules as inline JSON or file://<path>
    #[arg(long, value_name = "RULES")]
    pub path_mapping_rules: Option<String>,

    /// Keep the session working directory after the run
    #[arg(long)]
    pub preserve_working_dir: bool,

    /// Directory the session working directory is created in
    #[arg(long, value_name = "DIR")]
    pub working_dir_root: Option<PathBuf>,

    /// Number of tasks to run at once
    #[arg(long, value_name = "N", default_value_t = 1, value_parser = clap::value_parser!(u64).range(1..))]
    pub workers: u64,

    /// Seconds a cancelled action gets to exit before it is abandoned
    #[arg(long, value_name = "SECS", default_value_t = 10)]
    pub grace_period: u64,
}

impl RunArgs {
    /// Regroup the flattened `--task-params` values by occurrence
    pub fn group_task_params(&mut self, matches: &ArgMatches) {
        let mut values = std::mem::take(&mut self.task_params).into_iter();
        self.task_param_sets = matches
            .get_occurrences::<String>("task_params")
            .map(|occurrences| {
                occurrences
                    .map(|occurrence| values.by_ref().take(occurrence.count()).collect())
                    .collect()
            })
            .unwrap_or_default();
    }
}

pub async fn execute(args: RunArgs) -> Result<()> {
    // Flag conflicts are reported before the template is read
    let selection = TaskSelection::from_flags(SelectionFlags {
        task_params: &args.task_param_sets,
        task_pin: &args.task_pin,
        maximum_tasks: args.maximum_tasks,
    })?;

    let job = load_job(&args.template)?;
    let graph = DependencyGraph::from_job(&job)?;
    let order = graph.resolve_order(&args.step, args.run_dependencies)?;

    if !args.run_dependencies {
        let dependencies: Vec<&str> = order
            .first()
            .map(|step| step.dependency_names().collect())
            .unwrap_or_default();
        if !dependencies.is_empty() {
            output::warning(&format!(
                "Step '{}' depends on {}; use --run-dependencies to run them first",
                args.step,
                dependencies.join(", ")
            ));
        }
    }

    let rules = match &args.path_mapping_rules {
        Some(arg) => parse_path_mapping_rules(arg)?,
        None => Vec::new(),
    };

    let selector = TaskSelector::new(&args.step, selection);
    let plan = SessionPlan::prepare(&job, order, &selector)?;

    output::status(
        "Running",
        &format!(
            "job '{}': {} step(s), {} task(s)",
            job.name,
            plan.steps.len(),
            plan.total_tasks()
        ),
    );

    let grace_period = Duration::from_secs(args.grace_period);
    let config = SessionConfig {
        max_workers: args.workers as usize,
        cancel_grace_period: grace_period,
        preserve_working_dir: args.preserve_working_dir,
        working_dir_root: args.working_dir_root.clone(),
        ..Default::default()
    };

    let (tx, rx) = progress_channel();
    let runner = ShellRunner::new()
        .with_progress(tx.clone())
        .with_grace_period(grace_period);
    let orchestrator = SessionOrchestrator::new(Arc::new(runner))
        .with_config(config)
        .with_progress(tx);

    let structured = args.template.output != super::OutputFormat::HumanReadable;
    let printer = tokio::spawn(print_events(rx, structured));

    let cancel = CancellationToken::new();
    let watcher = tokio::spawn(cancel_on_signal(cancel.clone()));

    let result = orchestrator.run(&plan, &rules, cancel).await;
    watcher.abort();
    // Dropping the orchestrator closes the progress channel
    drop(orchestrator);
    printer.await?;

    let result = result?;
    emit(args.template.output, &result, output::session_result)?;

    if let Some(err) = result.error() {
        output::error(&err.to_string());
        std::process::exit(1);
    }

    Ok(())
}

/// Cancel the session on Ctrl-C or SIGTERM
async fn cancel_on_signal(cancel: CancellationToken) {
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "could not install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = terminate => {}
    }

    output::warning("Interrupt received, cancelling the session");
    cancel.cancel();
}

fn source_label(source: &ActionSource) -> String {
    match source {
        ActionSource::Task {
            step_name,
            task_index,
        } => format!("{}[{}]", step_name, task_index),
        ActionSource::Environment { name, phase } => match phase {
            EnvironmentPhase::Enter => format!("{}(enter)", name),
            EnvironmentPhase::Exit => format!("{}(exit)", name),
        },
    }
}

async fn print_events(mut rx: ProgressReceiver, structured: bool) {
    while let Some(event) = rx.recv().await {
        match &event {
            ExecutionEvent::SessionStarted {
                job_name,
                session_id,
                working_dir,
                total_steps,
            } => {
                output::header(&format!(
                    "Session '{}' for job '{}' ({} steps)",
                    session_id, job_name, total_steps
                ));
                output::dim(&format!("  working directory: {}", working_dir));
            }

            ExecutionEvent::SessionCompleted {
                success,
                cancelled,
                duration,
                ..
            } => {
                if *success {
                    output::success(&format!(
                        "Session completed in {:.2}s",
                        duration.as_secs_f64()
                    ));
                } else if *cancelled {
                    output::failure(&format!(
                        "Session cancelled after {:.2}s",
                        duration.as_secs_f64()
                    ));
                } else {
                    output::failure(&format!(
                        "Session failed after {:.2}s",
                        duration.as_secs_f64()
                    ));
                }
            }

            ExecutionEvent::EnvironmentStarted { name, phase } => {
                let verb = match phase {
                    EnvironmentPhase::Enter => "Entering",
                    EnvironmentPhase::Exit => "Exiting",
                };
                output::event(&format!("{} environment '{}'", verb, name));
            }

            ExecutionEvent::EnvironmentCompleted {
                name,
                status,
                duration,
                ..
            } => {
                let line = format!(
                    "  Environment '{}' {:?} ({:.2}s)",
                    name,
                    status,
                    duration.as_secs_f64()
                );
                if status.is_success() {
                    output::dim_success(&line);
                } else {
                    output::dim_failure(&line);
                }
            }

            ExecutionEvent::StepStarted {
                step_name,
                total_tasks,
            } => {
                output::event(&format!("Step '{}' ({} tasks)", step_name, total_tasks));
            }

            ExecutionEvent::StepCompleted {
                step_name,
                status,
                duration,
            } => {
                let line = format!(
                    "  Step '{}' {:?} ({:.2}s)",
                    step_name,
                    status,
                    duration.as_secs_f64()
                );
                if *status == StepStatus::Succeeded {
                    output::dim_success(&line);
                } else {
                    output::dim_failure(&line);
                }
            }

            ExecutionEvent::StepSkipped { step_name, reason } => {
                output::warning(&format!("Step '{}' not started: {}", step_name, reason));
            }

            ExecutionEvent::TaskStarted {
                step_name,
                task_index,
                parameters,
            } => {
                if parameters.is_empty() {
                    output::event(&format!("  Task {}[{}]", step_name, task_index));
                } else {
                    output::event(&format!(
                        "  Task {}[{}]: {}",
                        step_name, task_index, parameters
                    ));
                }
            }

            ExecutionEvent::ActionOutput {
                source,
                output: text,
                is_error,
            } => {
                let label = source_label(source);
                for line in text.lines() {
                    output::action_output(&label, line, *is_error, structured);
                }
            }

            ExecutionEvent::TaskCompleted {
                step_name,
                task_index,
                status,
                duration,
                exit_code,
            } => {
                let exit_info = match exit_code {
                    Some(code) if *code != 0 => format!(" (exit code: {})", code),
                    _ => String::new(),
                };
                let line = format!(
                    "  Task {}[{}] {:?} ({:.2}s){}",
                    step_name,
                    task_index,
                    status,
                    duration.as_secs_f64(),
                    exit_info
                );
                if *status == ActionStatus::Succeeded {
                    output::dim_success(&line);
                } else {
                    output::dim_failure(&line);
                }
            }

            ExecutionEvent::Log { level, message } => match level {
                LogLevel::Error => output::error(message),
                LogLevel::Warning => output::warning(message),
            },
        }
    }
}
