// Output formatting helpers for CLI commands

use chrono::Local;
use jobrun_service::summary::{EnvironmentSummary, JobSummary, ParameterSummary, StepSummary};
use jobrun_service::SessionResult;

fn timestamp() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S%.3f").to_string()
}

/// Print a status message: "  Status message"
pub fn status(action: &str, message: &str) {
    eprintln!("\x1b[1;36m{:>12}\x1b[0m {}", action, message);
}

/// Print a success message with checkmark
pub fn success(message: &str) {
    eprintln!("\x1b[1;32m  \u{2713}\x1b[0m {}", message);
}

/// Print a failure message with X
pub fn failure(message: &str) {
    eprintln!("\x1b[1;31m  \u{2717}\x1b[0m {}", message);
}

/// Print a warning message
pub fn warning(message: &str) {
    eprintln!("\x1b[33m  !\x1b[0m {}", message);
}

/// Print an error message
pub fn error(message: &str) {
    eprintln!("\x1b[1;31merror:\x1b[0m {}", message);
}

/// Print a dim/muted message
pub fn dim(message: &str) {
    eprintln!("\x1b[2m{}\x1b[0m", message);
}

/// Print a dim success message
pub fn dim_success(message: &str) {
    eprintln!("\x1b[32m{}\x1b[0m", message);
}

/// Print a dim failure message
pub fn dim_failure(message: &str) {
    eprintln!("\x1b[31m{}\x1b[0m", message);
}

/// Print a timestamped progress line
pub fn event(message: &str) {
    eprintln!("\x1b[2m{}\x1b[0m {}", timestamp(), message);
}

/// Print a line of action output; stdout is kept free for structured results
pub fn action_output(label: &str, line: &str, is_error: bool, structured: bool) {
    if is_error {
        eprintln!("\x1b[31m{} {} | {}\x1b[0m", timestamp(), label, line);
    } else if structured {
        eprintln!("{} {} | {}", timestamp(), label, line);
    } else {
        println!("{} {} | {}", timestamp(), label, line);
    }
}

/// Print a header line
pub fn header(message: &str) {
    eprintln!("\x1b[1m==> {}\x1b[0m", message);
}

fn parameter_line(parameter: &ParameterSummary) -> String {
    match &parameter.value {
        Some(value) => format!("{} ({}): {}", parameter.name, parameter.param_type, value),
        None => format!("{} ({})", parameter.name, parameter.param_type),
    }
}

fn environment_line(environment: &EnvironmentSummary) -> String {
    let mut line = format!("{} (from '{}')", environment.name, environment.parent);
    if let Some(description) = &environment.description {
        line.push_str(&format!("\n\t{}", description));
    }
    line
}

/// Human-readable summary of a whole job
pub fn job_summary(summary: &JobSummary) {
    println!("\n--- Summary for '{}' ---", summary.name);

    if !summary.parameters.is_empty() {
        println!("\nParameters:");
        for parameter in &summary.parameters {
            println!("\t- {}", parameter_line(parameter));
        }
    }

    println!();
    println!("Total steps: {}", summary.total_steps);
    println!("Total tasks: {}", summary.total_tasks);
    println!("Total environments: {}", summary.total_environments);

    println!("\n--- Steps in '{}' ---\n", summary.name);
    for (index, step) in summary.steps.iter().enumerate() {
        println!("{}. '{}'", index + 1, step.name);
        if !step.parameter_definitions.is_empty() {
            println!("\t{} Task parameter(s)", step.parameter_definitions.len());
        }
        println!("\t{} total Tasks", step.total_tasks);
        if !step.environments.is_empty() {
            println!("\t{} environments", step.environments.len());
        }
        if !step.dependencies.is_empty() {
            println!("\t{} dependencies", step.dependencies.len());
        }
        println!();
    }

    if summary.total_environments > 0 {
        println!("--- Environments in '{}' ---", summary.name);
        let step_environments = summary.steps.iter().flat_map(|s| &s.environments);
        for environment in summary.root_environments.iter().chain(step_environments) {
            println!("- {}", environment_line(environment));
        }
    }
}

/// Human-readable summary of one step
pub fn step_summary(job_name: &str, summary: &StepSummary) {
    println!(
        "\n--- Summary for Step '{}' in Job '{}' ---\n",
        summary.name, job_name
    );
    println!("Total tasks: {}", summary.total_tasks);
    println!("Total task parameters: {}", summary.parameter_definitions.len());
    println!("Total environments: {}", summary.environments.len());

    if !summary.dependencies.is_empty() {
        println!("\nDependencies ({}):", summary.dependencies.len());
        for dependency in &summary.dependencies {
            println!("- '{}'", dependency.step_name);
        }
    }
    if !summary.parameter_definitions.is_empty() {
        println!("\nParameters:");
        for parameter in &summary.parameter_definitions {
            println!("- {}", parameter_line(parameter));
        }
    }
    if !summary.environments.is_empty() {
        println!("\nEnvironments:");
        for environment in &summary.environments {
            println!("- {}", environment_line(environment));
        }
    }
}

/// Human-readable session result
pub fn session_result(result: &SessionResult) {
    println!("\n--- Results of local session ---\n");
    println!("{}", result.message);
    println!("Job: {}", result.job_name);
    println!("Step: {}", result.step_name);
    println!("Duration: {:.3} seconds", result.duration.as_secs_f64());
    println!("Tasks run: {}", result.tasks_run);
    if !result.steps_executed.is_empty() {
        println!("Steps run: {}", result.steps_executed.join(", "));
    }
    if let Some(dir) = &result.working_dir {
        println!("Working directory: {}", dir.display());
    }
}
