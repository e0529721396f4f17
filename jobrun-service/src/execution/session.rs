// Session Orchestrator
// Runs the planned steps of a job inside one local session

use crate::error::ServiceResult;
use crate::execution::events::{EnvironmentPhase, EventSender, ExecutionEvent, ProgressSender};
use crate::execution::result::{
    ActionStatus, SessionResult, SessionStatus, StepOutcome, StepStatus, TaskRecord,
};
use crate::format::Symbols;
use crate::model::{EnvironmentDefinition, Job, StepDefinition};
use crate::pathmapping::PathMappingRule;
use crate::runners::{ExecutionBackend, SessionContext, TaskRequest};
use crate::space::{TaskParameterSet, TaskSelection, TaskSpaceBuilder};

use futures::StreamExt;
use indexmap::IndexMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

pub const SESSION_SUCCEEDED: &str = "Session ended successfully";
pub const SESSION_FAILED: &str = "Session ended with errors; see Task logs for details";
pub const SESSION_CANCELLED: &str = "Session was cancelled before it completed";

/// Configuration for session execution
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Maximum tasks of one step running at once
    pub max_workers: usize,
    /// Time in-flight tasks get to stop after cancellation
    pub cancel_grace_period: Duration,
    /// Keep the session working directory after the run
    pub preserve_working_dir: bool,
    /// Parent of the session working directory (system temp dir when unset)
    pub working_dir_root: Option<PathBuf>,
    pub session_id: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_workers: 1,
            cancel_grace_period: Duration::from_secs(10),
            preserve_working_dir: false,
            working_dir_root: None,
            session_id: "local-session".to_string(),
        }
    }
}

/// Applies the caller's task selection to the target step only
#[derive(Debug, Clone)]
pub struct TaskSelector {
    target: String,
    selection: TaskSelection,
    full: TaskSelection,
}

impl TaskSelector {
    pub fn new(target: impl Into<String>, selection: TaskSelection) -> Self {
        Self {
            target: target.into(),
            selection,
            full: TaskSelection::FULL,
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Dependencies always run their full cross-product
    pub fn selection_for(&self, step_name: &str) -> &TaskSelection {
        if step_name == self.target {
            &self.selection
        } else {
            &self.full
        }
    }
}

/// A step with its expanded task sequence
#[derive(Debug, Clone)]
pub struct PlannedStep<'a> {
    pub step: &'a StepDefinition,
    pub tasks: Vec<TaskParameterSet>,
}

/// Everything a session will run, expanded before any resource is acquired
#[derive(Debug, Clone)]
pub struct SessionPlan<'a> {
    pub job: &'a Job,
    pub target: String,
    pub steps: Vec<PlannedStep<'a>>,
    /// Entered in order, exited in reverse
    pub environments: Vec<&'a EnvironmentDefinition>,
}

impl<'a> SessionPlan<'a> {
    /// Expand every step's tasks up front.
    ///
    /// Job environments are always part of the session. Step environments are added
    /// only when the session runs a single step.
    pub fn prepare(
        job: &'a Job,
        step_order: Vec<&'a StepDefinition>,
        selector: &TaskSelector,
    ) -> ServiceResult<Self> {
        let mut steps = Vec::with_capacity(step_order.len());
        for &step in &step_order {
            let tasks =
                TaskSpaceBuilder::build(step, &job.parameters, selector.selection_for(&step.name))?;
            steps.push(PlannedStep { step, tasks });
        }

        let mut environments: Vec<&EnvironmentDefinition> = job.job_environments.iter().collect();
        if let [only] = step_order.as_slice() {
            environments.extend(only.step_environments.iter());
        }

        Ok(Self {
            job,
            target: selector.target().to_string(),
            steps,
            environments,
        })
    }

    pub fn total_tasks(&self) -> usize {
        self.steps.iter().map(|s| s.tasks.len()).sum()
    }
}

/// Drives a session plan through an execution backend
pub struct SessionOrchestrator {
    backend: Arc<dyn ExecutionBackend>,
    config: SessionConfig,
    event_tx: Option<ProgressSender>,
}

impl SessionOrchestrator {
    /// Create a new orchestrator for a backend
    pub fn new(backend: Arc<dyn ExecutionBackend>) -> Self {
        Self {
            backend,
            config: SessionConfig::default(),
            event_tx: None,
        }
    }

    /// Set session configuration
    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Set progress event sender
    pub fn with_progress(mut self, tx: ProgressSender) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Run the plan to completion, failure or cancellation.
    ///
    /// Only acquiring the working directory can fail; task and environment failures
    /// and cancellation are reported in the returned result after cleanup.
    pub async fn run(
        &self,
        plan: &SessionPlan<'_>,
        path_mapping_rules: &[PathMappingRule],
        cancel: CancellationToken,
    ) -> ServiceResult<SessionResult> {
        let start = Instant::now();
        let working_dir = self.acquire_working_dir()?;
        let dir = working_dir.path().to_path_buf();

        tracing::info!(
            job = %plan.job.name,
            working_dir = %dir.display(),
            steps = plan.steps.len(),
            "starting session"
        );
        self.event_tx.send_event(ExecutionEvent::session_started(
            &plan.job.name,
            &self.config.session_id,
            dir.display().to_string(),
            plan.steps.len(),
        ));

        let job_symbols = Symbols::new().with_parameters("", &plan.job.parameters);
        let mut env_vars: IndexMap<String, String> = IndexMap::new();
        let mut entered: Vec<&EnvironmentDefinition> = Vec::new();
        let mut environment_failed = false;

        for environment in plan.environments.iter().copied() {
            if cancel.is_cancelled() {
                break;
            }

            let mut next_vars = env_vars.clone();
            for (name, value) in &environment.variables {
                match job_symbols.resolve(value) {
                    Ok(value) => {
                        next_vars.insert(name.clone(), value);
                    }
                    Err(e) => {
                        self.event_tx.send_event(ExecutionEvent::error(format!(
                            "Environment '{}' variable '{}': {}",
                            environment.name, name, e
                        )));
                        environment_failed = true;
                        break;
                    }
                }
            }
            if environment_failed {
                break;
            }

            let context = self.context(plan, &dir, path_mapping_rules, &next_vars);
            let status = self
                .environment_action(&context, environment, EnvironmentPhase::Enter, &cancel)
                .await;

            match status {
                ActionStatus::Succeeded => {
                    entered.push(environment);
                    env_vars = next_vars;
                }
                ActionStatus::Cancelled => break,
                ActionStatus::Failed => {
                    environment_failed = true;
                    break;
                }
            }
        }

        let mut steps = Vec::with_capacity(plan.steps.len());
        let mut halted = environment_failed || cancel.is_cancelled();

        for planned in &plan.steps {
            if halted {
                self.event_tx.send_event(ExecutionEvent::step_skipped(
                    &planned.step.name,
                    "an earlier action failed or the session was cancelled",
                ));
                steps.push(StepOutcome::not_started(
                    &planned.step.name,
                    planned.tasks.len(),
                ));
                continue;
            }

            let context = self.context(plan, &dir, path_mapping_rules, &env_vars);
            let outcome = self.run_step(&context, planned, &cancel).await;
            halted = outcome.status != StepStatus::Succeeded;
            steps.push(outcome);
        }

        // Exit hooks run even after cancellation
        let exit_cancel = CancellationToken::new();
        let context = self.context(plan, &dir, path_mapping_rules, &env_vars);
        for environment in entered.iter().rev() {
            let status = self
                .environment_action(&context, environment, EnvironmentPhase::Exit, &exit_cancel)
                .await;
            if status != ActionStatus::Succeeded {
                environment_failed = true;
            }
        }

        let kept_dir = if self.config.preserve_working_dir {
            let path = working_dir.keep();
            tracing::info!(working_dir = %path.display(), "preserving session working directory");
            Some(path)
        } else {
            if let Err(e) = working_dir.close() {
                tracing::warn!(error = %e, "failed to remove session working directory");
            }
            None
        };

        let cancelled = cancel.is_cancelled();
        let tasks_run: usize = steps.iter().map(StepOutcome::tasks_run).sum();
        let steps_failed = steps
            .iter()
            .any(|s| !matches!(s.status, StepStatus::Succeeded | StepStatus::NotStarted));
        let success = !cancelled && !environment_failed && !steps_failed;

        let (status, message) = if success {
            (SessionStatus::Succeeded, SESSION_SUCCEEDED)
        } else if cancelled {
            (SessionStatus::Failed, SESSION_CANCELLED)
        } else {
            (SessionStatus::Failed, SESSION_FAILED)
        };

        let duration = start.elapsed();
        self.event_tx.send_event(ExecutionEvent::session_completed(
            &plan.job.name,
            success,
            cancelled,
            tasks_run,
            duration,
        ));
        tracing::info!(success, cancelled, tasks_run, "session finished");

        Ok(SessionResult {
            job_name: plan.job.name.clone(),
            step_name: plan.target.clone(),
            steps_executed: steps
                .iter()
                .filter(|s| s.status != StepStatus::NotStarted)
                .map(|s| s.step_name.clone())
                .collect(),
            status,
            cancelled,
            message: message.to_string(),
            tasks_run,
            duration,
            steps,
            working_dir: kept_dir,
        })
    }

    fn acquire_working_dir(&self) -> ServiceResult<tempfile::TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("jobrun-session-");

        let dir = match &self.config.working_dir_root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                builder.tempdir_in(root)?
            }
            None => builder.tempdir()?,
        };
        Ok(dir)
    }

    fn context<'a>(
        &'a self,
        plan: &'a SessionPlan<'_>,
        working_dir: &'a Path,
        path_mapping_rules: &'a [PathMappingRule],
        env: &'a IndexMap<String, String>,
    ) -> SessionContext<'a> {
        SessionContext {
            session_id: &self.config.session_id,
            working_dir,
            job_parameters: &plan.job.parameters,
            path_mapping_rules,
            env,
        }
    }

    async fn environment_action(
        &self,
        context: &SessionContext<'_>,
        environment: &EnvironmentDefinition,
        phase: EnvironmentPhase,
        cancel: &CancellationToken,
    ) -> ActionStatus {
        self.event_tx
            .send_event(ExecutionEvent::environment_started(&environment.name, phase));

        let outcome = match phase {
            EnvironmentPhase::Enter => {
                self.backend
                    .enter_environment(context, environment, cancel)
                    .await
            }
            EnvironmentPhase::Exit => {
                self.backend
                    .exit_environment(context, environment, cancel)
                    .await
            }
        };

        if let Some(message) = outcome.message.as_ref().filter(|_| !outcome.status.is_success()) {
            self.event_tx.send_event(ExecutionEvent::error(format!(
                "Environment '{}': {}",
                environment.name, message
            )));
        }
        self.event_tx.send_event(ExecutionEvent::environment_completed(
            &environment.name,
            phase,
            outcome.status,
            outcome.duration,
        ));
        outcome.status
    }

    /// Run one step's tasks with bounded concurrency, recording them in submission order.
    /// The first failure stops submission and cancels the step's in-flight tasks.
    async fn run_step(
        &self,
        context: &SessionContext<'_>,
        planned: &PlannedStep<'_>,
        cancel: &CancellationToken,
    ) -> StepOutcome {
        let step = planned.step;
        let step_start = Instant::now();
        self.event_tx
            .send_event(ExecutionEvent::step_started(&step.name, planned.tasks.len()));

        let step_cancel = cancel.child_token();
        let backend = self.backend.as_ref();
        let events = &self.event_tx;
        let token = &step_cancel;

        let mut results = futures::stream::iter(planned.tasks.iter().enumerate())
            .map(move |(index, parameters)| async move {
                if token.is_cancelled() {
                    return None;
                }
                events.send_event(ExecutionEvent::task_started(
                    &step.name,
                    index,
                    parameters.clone(),
                ));

                let request = TaskRequest {
                    step,
                    task_index: index,
                    parameters,
                };
                let outcome = backend.run_task(context, &request, token).await;

                events.send_event(ExecutionEvent::task_completed(
                    &step.name,
                    index,
                    outcome.status,
                    outcome.duration,
                    outcome.exit_code,
                ));
                Some(TaskRecord {
                    index,
                    parameters: parameters.clone(),
                    status: outcome.status,
                    duration: outcome.duration,
                    exit_code: outcome.exit_code,
                    message: outcome.message,
                })
            })
            .buffered(self.config.max_workers.max(1));

        // Once the step is cancelled, in-flight tasks get the grace period to report
        let mut deadline: Option<tokio::time::Instant> = None;
        let mut records = Vec::with_capacity(planned.tasks.len());
        loop {
            let next = tokio::select! {
                next = results.next() => next,
                _ = step_cancel.cancelled(), if deadline.is_none() => {
                    deadline = Some(tokio::time::Instant::now() + self.config.cancel_grace_period);
                    continue;
                }
                _ = tokio::time::sleep_until(deadline.unwrap_or_else(tokio::time::Instant::now)),
                    if deadline.is_some() => {
                    tracing::warn!(
                        step = %step.name,
                        "abandoning tasks that did not stop within the grace period"
                    );
                    self.event_tx.send_event(ExecutionEvent::warning(format!(
                        "Step '{}': abandoned tasks that did not stop within {:?}",
                        step.name, self.config.cancel_grace_period
                    )));
                    break;
                }
            };
            let Some(record) = next else {
                break;
            };
            let Some(record) = record else {
                continue;
            };
            if record.status == ActionStatus::Failed {
                tracing::warn!(step = %step.name, task = record.index, "task failed");
                step_cancel.cancel();
            }
            records.push(record);
        }
        drop(results);

        let status = if records.iter().any(|r| r.status == ActionStatus::Failed) {
            StepStatus::Failed
        } else if records.len() < planned.tasks.len()
            || records.iter().any(|r| r.status == ActionStatus::Cancelled)
        {
            StepStatus::Cancelled
        } else {
            StepStatus::Succeeded
        };

        self.event_tx.send_event(ExecutionEvent::step_completed(
            &step.name,
            status,
            step_start.elapsed(),
        ));

        StepOutcome {
            step_name: step.name.clone(),
            total_tasks: planned.tasks.len(),
            tasks: records,
            status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use crate::execution::graph::DependencyGraph;
    use crate::model::{JobTemplate, ParameterValueMap};
    use crate::parameters::RawParameterMap;
    use crate::runners::ActionOutcome;
    use serde_json::json;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Records every call and fails or cancels where told to
    #[derive(Default)]
    struct ScriptedBackend {
        calls: Mutex<Vec<String>>,
        env_seen: Mutex<Vec<IndexMap<String, String>>>,
        dirs_seen: Mutex<Vec<PathBuf>>,
        failing_tasks: HashSet<(String, usize)>,
        failing_enters: HashSet<String>,
        cancel_at: Option<(String, usize, CancellationToken)>,
        /// Tasks that keep running for 30s whatever their token says
        stuck_tasks: HashSet<(String, usize)>,
        /// Task i of every step sleeps `(delay_steps - i) * 20ms`
        delay_steps: usize,
    }

    impl ScriptedBackend {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl ExecutionBackend for ScriptedBackend {
        async fn enter_environment(
            &self,
            session: &SessionContext<'_>,
            environment: &EnvironmentDefinition,
            _cancel: &CancellationToken,
        ) -> ActionOutcome {
            self.calls
                .lock()
                .unwrap()
                .push(format!("enter:{}", environment.name));
            self.dirs_seen
                .lock()
                .unwrap()
                .push(session.working_dir.to_path_buf());
            if self.failing_enters.contains(&environment.name) {
                ActionOutcome::failed(Duration::ZERO, "enter failed")
            } else {
                ActionOutcome::succeeded(Duration::ZERO)
            }
        }

        async fn exit_environment(
            &self,
            _session: &SessionContext<'_>,
            environment: &EnvironmentDefinition,
            cancel: &CancellationToken,
        ) -> ActionOutcome {
            assert!(!cancel.is_cancelled());
            self.calls
                .lock()
                .unwrap()
                .push(format!("exit:{}", environment.name));
            ActionOutcome::succeeded(Duration::ZERO)
        }

        async fn run_task(
            &self,
            session: &SessionContext<'_>,
            task: &TaskRequest<'_>,
            cancel: &CancellationToken,
        ) -> ActionOutcome {
            let key = (task.step.name.clone(), task.task_index);
            self.calls
                .lock()
                .unwrap()
                .push(format!("task:{}:{}", key.0, key.1));
            self.env_seen.lock().unwrap().push(session.env.clone());
            self.dirs_seen
                .lock()
                .unwrap()
                .push(session.working_dir.to_path_buf());

            if self.delay_steps > task.task_index {
                let millis = (self.delay_steps - task.task_index) as u64 * 20;
                tokio::time::sleep(Duration::from_millis(millis)).await;
            }

            if self.stuck_tasks.contains(&key) {
                tokio::time::sleep(Duration::from_secs(30)).await;
            }

            if let Some((step, index, trigger)) = &self.cancel_at {
                if *step == key.0 && *index == key.1 {
                    trigger.cancel();
                }
            }
            if cancel.is_cancelled() {
                return ActionOutcome::cancelled(Duration::ZERO);
            }
            if self.failing_tasks.contains(&key) {
                ActionOutcome::failed(Duration::from_millis(5), "boom").with_exit_code(Some(1))
            } else {
                ActionOutcome::succeeded(Duration::from_millis(5))
            }
        }
    }

    fn job() -> Job {
        let template: JobTemplate = serde_json::from_value(json!({
            "specificationVersion": "jobtemplate-2023-09",
            "name": "session-test",
            "parameterDefinitions": [
                {"name": "Quality", "type": "STRING", "default": "high"}
            ],
            "jobEnvironments": [
                {"name": "Outer", "variables": {"QUALITY": "{{Param.Quality}}"}},
                {"name": "Inner", "variables": {"INNER": "1"}}
            ],
            "steps": [
                {
                    "name": "A",
                    "parameterSpace": {"taskParameterDefinitions": [
                        {"name": "N", "type": "INT", "range": "1-3"}
                    ]},
                    "script": {"actions": {"onRun": {"command": "true"}}}
                },
                {
                    "name": "B",
                    "parameterSpace": {"taskParameterDefinitions": [
                        {"name": "Frame", "type": "INT", "range": [1, 2, 3]},
                        {"name": "Camera", "type": "STRING", "range": ["Left", "Right"]}
                    ]},
                    "script": {"actions": {"onRun": {"command": "true"}}},
                    "dependencies": [{"dependsOn": "A"}]
                }
            ]
        }))
        .unwrap();

        let mut params = ParameterValueMap::new();
        params.insert("Quality".to_string(), "high".into());
        Job::from_template(template, params).unwrap()
    }

    fn plan<'a>(job: &'a Job, target: &str, selection: TaskSelection) -> SessionPlan<'a> {
        let graph = DependencyGraph::from_job(job).unwrap();
        let order = graph.resolve_order(target, true).unwrap();
        SessionPlan::prepare(job, order, &TaskSelector::new(target, selection)).unwrap()
    }

    #[test]
    fn test_prepare_applies_selection_to_target_only() {
        let job = job();
        let plan = plan(
            &job,
            "B",
            TaskSelection::CrossProduct {
                maximum_tasks: Some(2),
            },
        );

        assert_eq!(plan.steps.len(), 2);
        assert_eq!(plan.steps[0].tasks.len(), 3);
        assert_eq!(plan.steps[1].tasks.len(), 2);
        assert_eq!(plan.total_tasks(), 5);
        assert_eq!(plan.environments.len(), 2);
    }

    #[test]
    fn test_prepare_explicit_sets() {
        let job = job();
        let sets: Vec<RawParameterMap> = vec![
            [("Frame".to_string(), json!(9)), ("Camera".to_string(), json!("Top"))]
                .into_iter()
                .collect(),
            [("Frame".to_string(), json!(8)), ("Camera".to_string(), json!("Side"))]
                .into_iter()
                .collect(),
        ];
        let plan = plan(&job, "B", TaskSelection::ExplicitSets(sets));

        let tasks: Vec<String> = plan.steps[1].tasks.iter().map(|t| t.to_string()).collect();
        assert_eq!(tasks, vec!["Frame=9, Camera=Top", "Frame=8, Camera=Side"]);
    }

    #[tokio::test]
    async fn test_successful_session_enters_and_exits_in_reverse() {
        let job = job();
        let plan = plan(&job, "B", TaskSelection::FULL);
        let backend = Arc::new(ScriptedBackend::default());
        let orchestrator = SessionOrchestrator::new(backend.clone());

        let result = orchestrator
            .run(&plan, &[], CancellationToken::new())
            .await
            .unwrap();

        assert!(result.is_success());
        assert_eq!(result.message, SESSION_SUCCEEDED);
        assert_eq!(result.tasks_run, 9);
        assert_eq!(result.steps_executed, vec!["A", "B"]);
        assert!(result.error().is_none());

        let calls = backend.calls();
        assert_eq!(&calls[..2], &["enter:Outer", "enter:Inner"]);
        assert_eq!(&calls[calls.len() - 2..], &["exit:Inner", "exit:Outer"]);

        let env = backend.env_seen.lock().unwrap()[0].clone();
        assert_eq!(env.get("QUALITY").map(String::as_str), Some("high"));
        assert_eq!(env.get("INNER").map(String::as_str), Some("1"));
    }

    #[tokio::test]
    async fn test_failing_dependency_stops_target() {
        let job = job();
        let plan = plan(&job, "B", TaskSelection::FULL);
        let backend = Arc::new(ScriptedBackend {
            failing_tasks: [("A".to_string(), 0)].into_iter().collect(),
            ..Default::default()
        });
        let orchestrator = SessionOrchestrator::new(backend.clone());

        let result = orchestrator
            .run(&plan, &[], CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.status, SessionStatus::Failed);
        assert_eq!(result.message, SESSION_FAILED);
        assert_eq!(result.step("B").unwrap().tasks_run(), 0);
        assert_eq!(result.step("B").unwrap().status, StepStatus::NotStarted);
        assert_eq!(result.step("A").unwrap().status, StepStatus::Failed);
        assert_eq!(result.tasks_run, 0);
        assert!(matches!(result.error(), Some(ServiceError::Execution(_))));

        let calls = backend.calls();
        assert!(!calls.iter().any(|c| c.starts_with("task:A:1")));
        assert!(!calls.iter().any(|c| c.starts_with("task:B")));
        assert_eq!(calls.last().map(String::as_str), Some("exit:Outer"));
    }

    #[tokio::test]
    async fn test_failed_task_aborts_rest_of_step() {
        let job = job();
        let plan = plan(&job, "A", TaskSelection::FULL);
        let backend = Arc::new(ScriptedBackend {
            failing_tasks: [("A".to_string(), 1)].into_iter().collect(),
            ..Default::default()
        });

        let result = SessionOrchestrator::new(backend.clone())
            .run(&plan, &[], CancellationToken::new())
            .await
            .unwrap();

        let step = result.step("A").unwrap();
        assert_eq!(step.total_tasks, 3);
        assert_eq!(step.tasks.len(), 2);
        assert_eq!(step.tasks[1].exit_code, Some(1));
        assert!(!backend.calls().contains(&"task:A:2".to_string()));
    }

    #[tokio::test]
    async fn test_cancellation_reports_failed_and_exits_environments() {
        let job = job();
        let plan = plan(&job, "B", TaskSelection::FULL);
        let cancel = CancellationToken::new();
        let backend = Arc::new(ScriptedBackend {
            cancel_at: Some(("A".to_string(), 1, cancel.clone())),
            ..Default::default()
        });

        let result = SessionOrchestrator::new(backend.clone())
            .run(&plan, &[], cancel)
            .await
            .unwrap();

        assert!(result.cancelled);
        assert_eq!(result.status, SessionStatus::Failed);
        assert_eq!(result.message, SESSION_CANCELLED);
        assert_eq!(result.tasks_run, 1);
        assert_eq!(result.step("A").unwrap().status, StepStatus::Cancelled);
        assert_eq!(result.step("B").unwrap().status, StepStatus::NotStarted);
        assert!(matches!(result.error(), Some(ServiceError::Cancelled(_))));

        let calls = backend.calls();
        assert_eq!(&calls[calls.len() - 2..], &["exit:Inner", "exit:Outer"]);
    }

    #[tokio::test]
    async fn test_unresponsive_task_abandoned_after_grace_period() {
        let job = job();
        let plan = plan(&job, "B", TaskSelection::FULL);
        let cancel = CancellationToken::new();
        let backend = Arc::new(ScriptedBackend {
            stuck_tasks: [("A".to_string(), 0)].into_iter().collect(),
            cancel_at: Some(("A".to_string(), 1, cancel.clone())),
            ..Default::default()
        });
        let orchestrator = SessionOrchestrator::new(backend.clone()).with_config(SessionConfig {
            max_workers: 2,
            cancel_grace_period: Duration::from_millis(100),
            ..Default::default()
        });

        let started = Instant::now();
        let result = orchestrator.run(&plan, &[], cancel).await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(5));

        assert!(result.cancelled);
        assert_eq!(result.message, SESSION_CANCELLED);
        assert_eq!(result.tasks_run, 0);
        let step = result.step("A").unwrap();
        assert_eq!(step.status, StepStatus::Cancelled);
        assert!(step.tasks.is_empty());
        assert_eq!(result.step("B").unwrap().status, StepStatus::NotStarted);

        let calls = backend.calls();
        assert!(calls.contains(&"task:A:1".to_string()));
        assert!(!calls.contains(&"task:A:2".to_string()));
        assert_eq!(&calls[calls.len() - 2..], &["exit:Inner", "exit:Outer"]);
    }

    #[tokio::test]
    async fn test_environment_enter_failure_skips_steps() {
        let job = job();
        let plan = plan(&job, "A", TaskSelection::FULL);
        let backend = Arc::new(ScriptedBackend {
            failing_enters: ["Inner".to_string()].into_iter().collect(),
            ..Default::default()
        });

        let result = SessionOrchestrator::new(backend.clone())
            .run(&plan, &[], CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.status, SessionStatus::Failed);
        assert_eq!(result.tasks_run, 0);
        assert!(result.steps_executed.is_empty());
        assert_eq!(
            backend.calls(),
            vec!["enter:Outer", "enter:Inner", "exit:Outer"]
        );
    }

    #[tokio::test]
    async fn test_working_directory_removed_unless_preserved() {
        let job = job();
        let plan = plan(&job, "A", TaskSelection::FULL);

        let backend = Arc::new(ScriptedBackend::default());
        let result = SessionOrchestrator::new(backend.clone())
            .run(&plan, &[], CancellationToken::new())
            .await
            .unwrap();
        let used = backend.dirs_seen.lock().unwrap()[0].clone();
        assert!(result.working_dir.is_none());
        assert!(!used.exists());

        let root = tempfile::tempdir().unwrap();
        let backend = Arc::new(ScriptedBackend::default());
        let result = SessionOrchestrator::new(backend.clone())
            .with_config(SessionConfig {
                preserve_working_dir: true,
                working_dir_root: Some(root.path().to_path_buf()),
                ..Default::default()
            })
            .run(&plan, &[], CancellationToken::new())
            .await
            .unwrap();
        let kept = result.working_dir.clone().unwrap();
        assert!(kept.exists());
        assert!(kept.starts_with(root.path()));
    }

    #[tokio::test]
    async fn test_concurrent_tasks_recorded_in_submission_order() {
        let job = job();
        let plan = plan(&job, "B", TaskSelection::FULL);
        let backend = Arc::new(ScriptedBackend {
            delay_steps: 6,
            ..Default::default()
        });

        let result = SessionOrchestrator::new(backend)
            .with_config(SessionConfig {
                max_workers: 3,
                ..Default::default()
            })
            .run(&plan, &[], CancellationToken::new())
            .await
            .unwrap();

        let indices: Vec<usize> = result.step("B").unwrap().tasks.iter().map(|t| t.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4, 5]);
        assert!(result.is_success());
    }

    #[tokio::test]
    async fn test_progress_events_are_streamed() {
        let job = job();
        let plan = plan(&job, "A", TaskSelection::FULL);
        let (tx, mut rx) = crate::execution::events::progress_channel();

        SessionOrchestrator::new(Arc::new(ScriptedBackend::default()))
            .with_progress(tx)
            .run(&plan, &[], CancellationToken::new())
            .await
            .unwrap();

        let mut started = 0;
        let mut completed_session = false;
        while let Ok(event) = rx.try_recv() {
            match event {
                ExecutionEvent::TaskStarted { .. } => started += 1,
                ExecutionEvent::SessionCompleted { success, .. } => completed_session = success,
                _ => {}
            }
        }
        assert_eq!(started, 3);
        assert!(completed_session);
    }
}
