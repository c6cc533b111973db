//! Executes queued commands through the configured command script.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use recovery::{CommandStatus, ComponentState, ExecutionCommand, RecoveryManager, StatusCommand};
use tokio::process::Command;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::queue::{CommandReport, ComponentStatusReport, InMemoryActionQueue};

/// Argument passed to the command script for a status check.
pub const STATUS_ARG: &str = "STATUS";

/// Captured output is cut to this many bytes.
const MAX_OUTPUT_BYTES: usize = 16 * 1024;

#[derive(Debug)]
struct ScriptOutcome {
    exit_code: Option<i32>,
    stdout: String,
    stderr: String,
}

impl ScriptOutcome {
    fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }
}

pub struct CommandRunner {
    queue: Arc<InMemoryActionQueue>,
    recovery: Arc<Mutex<RecoveryManager>>,
    script: PathBuf,
    timeout: Duration,
}

impl CommandRunner {
    pub fn new(
        queue: Arc<InMemoryActionQueue>,
        recovery: Arc<Mutex<RecoveryManager>>,
        script: impl Into<PathBuf>,
        timeout: Duration,
    ) -> Self {
        Self {
            queue,
            recovery,
            script: script.into(),
            timeout,
        }
    }

    /// Drain the queue until cancelled.
    pub async fn run(self, cancel: CancellationToken) {
        info!(script = %self.script.display(), "Command runner started");
        loop {
            self.drain().await;
            tokio::select! {
                () = cancel.cancelled() => break,
                () = self.queue.wait_for_work() => {}
            }
        }
        info!("Command runner stopped");
    }

    /// Run everything currently queued, execution commands first.
    pub async fn drain(&self) {
        while let Some(command) = self.queue.next_execution() {
            self.execute(command).await;
        }
        while let Some(command) = self.queue.next_status() {
            self.check_status(command).await;
        }
    }

    async fn execute(&self, command: ExecutionCommand) {
        let mut args = vec![
            command.role.clone(),
            command.role_command.as_str().to_string(),
        ];
        if let Some(custom) = command.role_command.custom_command() {
            args.push(custom.to_string());
        }

        info!(
            role = %command.role,
            role_command = %command.role_command,
            task_id = ?command.task_id,
            command_type = command.command_type.as_str(),
            "Executing command"
        );

        self.recovery.lock().await.start_execution_command();
        let outcome = self.invoke(&args).await;
        self.recovery.lock().await.stop_execution_command();

        let status = if outcome.succeeded() {
            CommandStatus::Completed
        } else {
            CommandStatus::Failed
        };
        if status == CommandStatus::Failed {
            warn!(
                role = %command.role,
                role_command = %command.role_command,
                exit_code = ?outcome.exit_code,
                "Command failed"
            );
        }

        let mut report = CommandReport::for_command(&command, status);
        report.exit_code = outcome.exit_code;
        report.stdout = outcome.stdout;
        report.stderr = outcome.stderr;
        self.queue.report_command(report);
    }

    async fn check_status(&self, command: StatusCommand) {
        let args = [command.component_name.clone(), STATUS_ARG.to_string()];
        let outcome = self.invoke(&args).await;
        let status = if outcome.succeeded() {
            ComponentState::LIVE
        } else {
            ComponentState::DEAD
        };
        debug!(component = %command.component_name, %status, "Status check finished");

        self.queue.report_component_status(ComponentStatusReport {
            component_name: command.component_name,
            service_name: command.service_name,
            cluster_name: command.cluster_name,
            status,
        });
    }

    async fn invoke(&self, args: &[String]) -> ScriptOutcome {
        let mut command = Command::new(&self.script);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(Ok(output)) => ScriptOutcome {
                exit_code: output.status.code(),
                stdout: truncate(&output.stdout),
                stderr: truncate(&output.stderr),
            },
            Ok(Err(e)) => {
                warn!(script = %self.script.display(), error = %e, "Failed to spawn command script");
                ScriptOutcome {
                    exit_code: None,
                    stdout: String::new(),
                    stderr: e.to_string(),
                }
            }
            Err(_) => {
                warn!(script = %self.script.display(), timeout_secs = self.timeout.as_secs(), "Command script timed out");
                ScriptOutcome {
                    exit_code: None,
                    stdout: String::new(),
                    stderr: format!("timed out after {}s", self.timeout.as_secs()),
                }
            }
        }
    }
}

fn truncate(bytes: &[u8]) -> String {
    let end = bytes.len().min(MAX_OUTPUT_BYTES);
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}
