// Shell Runner
// Runs environment hooks and task actions as local processes

use super::{ActionOutcome, ExecutionBackend, SessionContext, TaskRequest};
use crate::execution::events::{
    ActionSource, EnvironmentPhase, EventSender, ExecutionEvent, ProgressSender,
};
use crate::format::Symbols;
use crate::model::{Action, EmbeddedFile, EnvironmentDefinition};
use crate::pathmapping::rules_document;

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Time a cancelled or timed-out process gets to exit after being killed
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(10);

/// Directory under the session working directory holding per-action files
const ACTION_FILES_DIR: &str = "action-files";

/// How a running process stopped
enum Ending {
    Exited(std::io::Result<ExitStatus>),
    Cancelled,
    TimedOut(Duration),
}

/// Local process backend
pub struct ShellRunner {
    event_tx: Option<ProgressSender>,
    grace_period: Duration,
}

impl ShellRunner {
    /// Create a new shell runner
    pub fn new() -> Self {
        Self {
            event_tx: None,
            grace_period: DEFAULT_GRACE_PERIOD,
        }
    }

    /// Stream action output lines to a progress channel
    pub fn with_progress(mut self, tx: ProgressSender) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// Create the action's file directory and the symbols shared by every action
    async fn prepare(
        &self,
        session: &SessionContext<'_>,
        label: &str,
    ) -> Result<(PathBuf, Symbols), String> {
        let dir = session.working_dir.join(ACTION_FILES_DIR).join(label);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| format!("Could not create '{}': {}", dir.display(), e))?;

        let mut symbols = Symbols::new().with_parameters("", session.job_parameters);
        symbols.insert(
            "Session.WorkingDirectory",
            session.working_dir.display().to_string(),
        );
        symbols.insert(
            "Session.HasPathMappingRules",
            (!session.path_mapping_rules.is_empty()).to_string(),
        );

        if !session.path_mapping_rules.is_empty() {
            let rules_file = dir.join("path-mapping-rules.json");
            let document = rules_document(session.path_mapping_rules).to_string();
            tokio::fs::write(&rules_file, document)
                .await
                .map_err(|e| format!("Could not write '{}': {}", rules_file.display(), e))?;
            symbols.insert(
                "Session.PathMappingRulesFile",
                rules_file.display().to_string(),
            );
        }

        Ok((dir, symbols))
    }

    /// Run an environment hook, if the environment declares one
    async fn run_environment_action(
        &self,
        session: &SessionContext<'_>,
        environment: &EnvironmentDefinition,
        phase: EnvironmentPhase,
        cancel: &CancellationToken,
    ) -> ActionOutcome {
        let Some(script) = &environment.script else {
            return ActionOutcome::succeeded(Duration::ZERO);
        };
        let action = match phase {
            EnvironmentPhase::Enter => script.actions.on_enter.as_ref(),
            EnvironmentPhase::Exit => script.actions.on_exit.as_ref(),
        };
        let Some(action) = action else {
            return ActionOutcome::succeeded(Duration::ZERO);
        };

        let suffix = match phase {
            EnvironmentPhase::Enter => "enter",
            EnvironmentPhase::Exit => "exit",
        };
        let label = format!("env-{}-{}", sanitize(&environment.name), suffix);

        let symbols = match self.prepare(session, &label).await {
            Ok((dir, mut symbols)) => {
                if let Err(e) =
                    write_embedded_files(&dir, &script.embedded_files, "Env.File", &mut symbols)
                        .await
                {
                    return ActionOutcome::failed(Duration::ZERO, e);
                }
                symbols
            }
            Err(e) => return ActionOutcome::failed(Duration::ZERO, e),
        };

        let source = ActionSource::Environment {
            name: environment.name.clone(),
            phase,
        };
        self.run_action(session, action, &symbols, source, cancel)
            .await
    }

    /// Run one action to completion, cancellation or timeout
    async fn run_action(
        &self,
        session: &SessionContext<'_>,
        action: &Action,
        symbols: &Symbols,
        source: ActionSource,
        cancel: &CancellationToken,
    ) -> ActionOutcome {
        let start = Instant::now();

        if cancel.is_cancelled() {
            return ActionOutcome::cancelled(Duration::ZERO);
        }

        let command = match symbols.resolve(&action.command) {
            Ok(command) => command,
            Err(e) => {
                return ActionOutcome::failed(
                    start.elapsed(),
                    format!("Could not resolve command: {}", e),
                )
            }
        };
        let args = match action
            .args
            .iter()
            .map(|arg| symbols.resolve(arg))
            .collect::<Result<Vec<_>, _>>()
        {
            Ok(args) => args,
            Err(e) => {
                return ActionOutcome::failed(
                    start.elapsed(),
                    format!("Could not resolve arguments: {}", e),
                )
            }
        };

        tracing::debug!(command = %command, args = ?args, "spawning action process");

        let mut cmd = Command::new(&command);
        cmd.args(&args);
        cmd.current_dir(session.working_dir);
        cmd.envs(session.env.iter());
        cmd.kill_on_drop(true);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                return ActionOutcome::failed(
                    start.elapsed(),
                    format!("Failed to spawn process '{}': {}", command, e),
                )
            }
        };

        let mut readers = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            readers.push(self.forward_lines(stdout, source.clone(), false));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(self.forward_lines(stderr, source, true));
        }

        let limit = action.timeout.map(Duration::from_secs);
        let deadline = async move {
            match limit {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending::<()>().await,
            }
        };

        let ending = tokio::select! {
            status = child.wait() => Ending::Exited(status),
            _ = cancel.cancelled() => Ending::Cancelled,
            _ = deadline => Ending::TimedOut(limit.unwrap_or_default()),
        };

        let outcome = match ending {
            Ending::Exited(Ok(status)) if status.success() => {
                ActionOutcome::succeeded(start.elapsed())
            }
            Ending::Exited(Ok(status)) => {
                let message = match status.code() {
                    Some(code) => format!("Process exited with code {}", code),
                    None => "Process was terminated by a signal".to_string(),
                };
                ActionOutcome::failed(start.elapsed(), message).with_exit_code(status.code())
            }
            Ending::Exited(Err(e)) => ActionOutcome::failed(
                start.elapsed(),
                format!("Failed to wait for process '{}': {}", command, e),
            ),
            Ending::Cancelled => {
                self.terminate(&mut child).await;
                ActionOutcome::cancelled(start.elapsed())
            }
            Ending::TimedOut(limit) => {
                self.terminate(&mut child).await;
                ActionOutcome::failed(
                    start.elapsed(),
                    format!("Process timed out after {} seconds", limit.as_secs()),
                )
            }
        };

        for reader in readers {
            let _ = tokio::time::timeout(self.grace_period, reader).await;
        }

        outcome
    }

    /// Kill the process and wait up to the grace period for it to exit
    async fn terminate(&self, child: &mut Child) {
        if let Err(e) = child.start_kill() {
            tracing::warn!(error = %e, "failed to kill action process");
        }
        if tokio::time::timeout(self.grace_period, child.wait())
            .await
            .is_err()
        {
            tracing::warn!(
                grace_period = ?self.grace_period,
                "action process did not exit within the grace period"
            );
        }
    }

    /// Forward each output line as an event
    fn forward_lines<R>(&self, reader: R, source: ActionSource, is_error: bool) -> JoinHandle<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let tx = self.event_tx.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(reader).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                tx.send_event(ExecutionEvent::action_output(source.clone(), line, is_error));
            }
        })
    }
}

impl Default for ShellRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ExecutionBackend for ShellRunner {
    async fn enter_environment(
        &self,
        session: &SessionContext<'_>,
        environment: &EnvironmentDefinition,
        cancel: &CancellationToken,
    ) -> ActionOutcome {
        self.run_environment_action(session, environment, EnvironmentPhase::Enter, cancel)
            .await
    }

    async fn exit_environment(
        &self,
        session: &SessionContext<'_>,
        environment: &EnvironmentDefinition,
        cancel: &CancellationToken,
    ) -> ActionOutcome {
        self.run_environment_action(session, environment, EnvironmentPhase::Exit, cancel)
            .await
    }

    async fn run_task(
        &self,
        session: &SessionContext<'_>,
        task: &TaskRequest<'_>,
        cancel: &CancellationToken,
    ) -> ActionOutcome {
        let label = format!("{}-task-{}", sanitize(&task.step.name), task.task_index);

        let symbols = match self.prepare(session, &label).await {
            Ok((dir, symbols)) => {
                let mut symbols = symbols.with_parameters("Task", task.parameters);
                if let Err(e) = write_embedded_files(
                    &dir,
                    &task.step.script.embedded_files,
                    "Task.File",
                    &mut symbols,
                )
                .await
                {
                    return ActionOutcome::failed(Duration::ZERO, e);
                }
                symbols
            }
            Err(e) => return ActionOutcome::failed(Duration::ZERO, e),
        };

        let source = ActionSource::Task {
            step_name: task.step.name.clone(),
            task_index: task.task_index,
        };
        self.run_action(session, &task.step.script.actions.on_run, &symbols, source, cancel)
            .await
    }
}

/// Write embedded files into `dir`, exposing each as `{prefix}.{name}`
async fn write_embedded_files(
    dir: &Path,
    files: &[EmbeddedFile],
    prefix: &str,
    symbols: &mut Symbols,
) -> Result<(), String> {
    let mut paths = Vec::with_capacity(files.len());
    for file in files {
        let filename = file.filename.clone().unwrap_or_else(|| file.name.clone());
        let path = dir.join(filename);
        symbols.insert(format!("{}.{}", prefix, file.name), path.display().to_string());
        paths.push(path);
    }

    for (file, path) in files.iter().zip(&paths) {
        let data = symbols
            .resolve(&file.data)
            .map_err(|e| format!("Could not resolve embedded file '{}': {}", file.name, e))?;
        tokio::fs::write(path, data)
            .await
            .map_err(|e| format!("Could not write '{}': {}", path.display(), e))?;
        if file.runnable {
            make_runnable(path)
                .map_err(|e| format!("Could not make '{}' runnable: {}", path.display(), e))?;
        }
    }

    Ok(())
}

#[cfg(unix)]
fn make_runnable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn make_runnable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

/// Make a name safe to use as a directory name.
/// Other bytes become `_xx` escapes, so distinct names never share a directory.
fn sanitize(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for byte in name.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' {
            out.push(char::from(byte));
        } else {
            out.push_str(&format!("_{:02x}", byte));
        }
    }
    out
}
