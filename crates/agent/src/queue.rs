//! Action queue between the controller and the command runner.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use recovery::{CommandStatus, ComponentState, ExecutionCommand, RoleCommand, StatusCommand};
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tracing::debug;

/// Outcome of one execution command, sent back in the next heartbeat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster_name: Option<String>,
    pub role: String,
    pub role_command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_command: Option<String>,
    pub status: CommandStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
}

impl CommandReport {
    pub fn for_command(command: &ExecutionCommand, status: CommandStatus) -> Self {
        Self {
            task_id: command.task_id,
            cluster_name: command.cluster_name.clone(),
            role: command.role.clone(),
            role_command: command.role_command.as_str().to_string(),
            custom_command: command.role_command.custom_command().map(str::to_string),
            status,
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    pub fn role_command(&self) -> RoleCommand {
        RoleCommand::parse(&self.role_command, self.custom_command.as_deref())
    }
}

/// Observed state of one component after a status check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentStatusReport {
    pub component_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster_name: Option<String>,
    pub status: ComponentState,
}

/// Reports collected since the last heartbeat.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueReports {
    pub reports: Vec<CommandReport>,
    pub component_status: Vec<ComponentStatusReport>,
}

impl QueueReports {
    pub fn is_empty(&self) -> bool {
        self.reports.is_empty() && self.component_status.is_empty()
    }

    pub fn append(&mut self, mut other: QueueReports) {
        self.reports.append(&mut other.reports);
        self.component_status.append(&mut other.component_status);
    }
}

/// What the controller needs from the queue.
pub trait ActionQueue: Send + Sync {
    fn put(&self, command: ExecutionCommand);

    fn put_status(&self, command: StatusCommand);

    /// Nothing queued or running, status checks included.
    fn is_idle(&self) -> bool;

    /// Execution commands queued or running.
    fn tasks_in_progress_or_pending(&self) -> bool;

    /// Drop all queued work. Running commands still report.
    fn reset(&self);

    fn take_reports(&self) -> QueueReports;
}

#[derive(Debug, Default)]
struct QueueState {
    commands: VecDeque<ExecutionCommand>,
    status_commands: VecDeque<StatusCommand>,
    running_commands: usize,
    running_status: usize,
    reports: QueueReports,
}

/// In-process FIFO queue drained by [`crate::runner::CommandRunner`].
#[derive(Debug, Default)]
pub struct InMemoryActionQueue {
    state: Mutex<QueueState>,
    work: Notify,
}

impl InMemoryActionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take the next execution command and mark it running.
    pub fn next_execution(&self) -> Option<ExecutionCommand> {
        let mut state = self.state();
        let command = state.commands.pop_front()?;
        state.running_commands += 1;
        Some(command)
    }

    /// Take the next status command and mark it running.
    pub fn next_status(&self) -> Option<StatusCommand> {
        let mut state = self.state();
        let command = state.status_commands.pop_front()?;
        state.running_status += 1;
        Some(command)
    }

    pub fn report_command(&self, report: CommandReport) {
        let mut state = self.state();
        state.running_commands = state.running_commands.saturating_sub(1);
        state.reports.reports.push(report);
    }

    pub fn report_component_status(&self, report: ComponentStatusReport) {
        let mut state = self.state();
        state.running_status = state.running_status.saturating_sub(1);
        state.reports.component_status.push(report);
    }

    /// Wait until work is put on the queue.
    pub async fn wait_for_work(&self) {
        self.work.notified().await;
    }

    pub fn pending_commands(&self) -> usize {
        self.state().commands.len()
    }

    pub fn pending_status_commands(&self) -> usize {
        self.state().status_commands.len()
    }
}

impl ActionQueue for InMemoryActionQueue {
    fn put(&self, command: ExecutionCommand) {
        debug!(role = %command.role, role_command = %command.role_command, task_id = ?command.task_id, "Queued command");
        self.state().commands.push_back(command);
        self.work.notify_one();
    }

    fn put_status(&self, command: StatusCommand) {
        let mut state = self.state();
        // one pending check per component is enough
        state
            .status_commands
            .retain(|queued| queued.component_name != command.component_name);
        state.status_commands.push_back(command);
        drop(state);
        self.work.notify_one();
    }

    fn is_idle(&self) -> bool {
        let state = self.state();
        state.commands.is_empty()
            && state.status_commands.is_empty()
            && state.running_commands == 0
            && state.running_status == 0
    }

    fn tasks_in_progress_or_pending(&self) -> bool {
        let state = self.state();
        !state.commands.is_empty() || state.running_commands > 0
    }

    fn reset(&self) {
        let mut state = self.state();
        let dropped = state.commands.len() + state.status_commands.len();
        state.commands.clear();
        state.status_commands.clear();
        if dropped > 0 {
            debug!(dropped, "Action queue reset");
        }
    }

    fn take_reports(&self) -> QueueReports {
        std::mem::take(&mut self.state().reports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start(role: &str) -> ExecutionCommand {
        let mut command = ExecutionCommand::new(role, RoleCommand::Start);
        command.task_id = Some(9);
        command
    }

    #[test]
    fn test_put_and_drain_in_order() {
        let queue = InMemoryActionQueue::new();
        assert!(queue.is_idle());

        queue.put(start("DATANODE"));
        queue.put(start("NAMENODE"));
        assert!(!queue.is_idle());
        assert!(queue.tasks_in_progress_or_pending());

        assert_eq!(queue.next_execution().unwrap().role, "DATANODE");
        assert_eq!(queue.next_execution().unwrap().role, "NAMENODE");
        assert!(queue.next_execution().is_none());

        // still running until reported
        assert!(queue.tasks_in_progress_or_pending());
        queue.report_command(CommandReport::for_command(&start("DATANODE"), CommandStatus::Completed));
        queue.report_command(CommandReport::for_command(&start("NAMENODE"), CommandStatus::Failed));
        assert!(queue.is_idle());

        let reports = queue.take_reports();
        assert_eq!(reports.reports.len(), 2);
        assert!(queue.take_reports().is_empty());
    }

    #[test]
    fn test_status_commands_deduplicated() {
        let queue = InMemoryActionQueue::new();
        queue.put_status(StatusCommand::new("DATANODE"));
        queue.put_status(StatusCommand::new("NAMENODE"));
        queue.put_status(StatusCommand::new("DATANODE"));
        assert_eq!(queue.pending_status_commands(), 2);

        // status work keeps the queue busy but does not block recovery
        assert!(!queue.is_idle());
        assert!(!queue.tasks_in_progress_or_pending());

        assert_eq!(queue.next_status().unwrap().component_name, "NAMENODE");
    }

    #[test]
    fn test_reset_drops_pending_work() {
        let queue = InMemoryActionQueue::new();
        queue.put(start("DATANODE"));
        queue.put_status(StatusCommand::new("DATANODE"));
        queue.reset();
        assert!(queue.is_idle());
        assert_eq!(queue.pending_commands(), 0);
    }

    #[test]
    fn test_report_wire_shape() {
        let report = CommandReport::for_command(
            &ExecutionCommand::new("NODEMANAGER", RoleCommand::restart()),
            CommandStatus::Completed,
        );
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["roleCommand"], "CUSTOM_COMMAND");
        assert_eq!(value["customCommand"], "RESTART");
        assert_eq!(value["status"], "COMPLETED");
        assert!(report.role_command().is_restart());
    }

    #[tokio::test]
    async fn test_wait_for_work_wakes_on_put() {
        let queue = std::sync::Arc::new(InMemoryActionQueue::new());
        // a put before anyone waits leaves a permit behind
        queue.put(start("DATANODE"));
        tokio::time::timeout(std::time::Duration::from_secs(1), queue.wait_for_work())
            .await
            .unwrap();
    }
}
