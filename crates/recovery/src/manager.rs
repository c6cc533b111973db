//! The recovery decision engine.
//!
//! [`RecoveryManager`] is plain synchronous state. Callers that share it
//! across tasks wrap it in a mutex; every mutation goes through `&mut self`
//! so an attempt check and its commit cannot interleave.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::command::{
    CommandStatus, CommandType, ExecutionCommand, RoleCommand, StatusCommand,
};
use crate::config::{ConfigUpdate, RecoveryConfig, RecoveryConfigError};
use crate::report::{ComponentReport, RecoveryReport};
use crate::state::{ComponentState, ComponentStatus};
use crate::window::{ActionCounter, Denial};

/// Cached commands older than this are not replayed.
pub const DEFAULT_STALE_INTERVAL_SECS: i64 = 600;

/// Remediation picked for a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    Install,
    Start,
    Stop,
    Restart,
}

impl RecoveryAction {
    fn role_command(self) -> RoleCommand {
        match self {
            Self::Install => RoleCommand::Install,
            Self::Start => RoleCommand::Start,
            Self::Stop => RoleCommand::Stop,
            Self::Restart => RoleCommand::restart(),
        }
    }
}

#[derive(Debug, Clone)]
struct StoredCommand {
    command: ExecutionCommand,
    stored_at: i64,
}

pub struct RecoveryManager {
    config: RecoveryConfig,
    clock: Arc<dyn Clock>,
    actions: BTreeMap<String, ActionCounter>,
    statuses: BTreeMap<String, ComponentStatus>,
    stored_commands: BTreeMap<(String, CommandType), StoredCommand>,
    stale_interval_secs: i64,
    last_task_id: i64,
    latest_recovery_timestamp: i64,
    paused: bool,
    active_commands: u32,
}

impl fmt::Debug for RecoveryManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecoveryManager")
            .field("config", &self.config)
            .field("actions", &self.actions)
            .field("statuses", &self.statuses)
            .field("stored_commands", &self.stored_commands.len())
            .field("paused", &self.paused)
            .field("active_commands", &self.active_commands)
            .finish_non_exhaustive()
    }
}

impl RecoveryManager {
    /// A manager with recovery disabled until a config arrives.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let last_task_id = clock.now();
        Self {
            config: RecoveryConfig::default(),
            clock,
            actions: BTreeMap::new(),
            statuses: BTreeMap::new(),
            stored_commands: BTreeMap::new(),
            stale_interval_secs: DEFAULT_STALE_INTERVAL_SECS,
            last_task_id,
            latest_recovery_timestamp: crate::config::NO_RECOVERY_TIMESTAMP,
            paused: false,
            active_commands: 0,
        }
    }

    /// A manager starting from `update`. Invalid settings leave recovery disabled.
    #[must_use]
    pub fn with_config(clock: Arc<dyn Clock>, update: ConfigUpdate) -> Self {
        let mut manager = Self::new(clock);
        // rejected settings are already logged and leave the disabled default
        let _ = manager.update_config(update);
        manager
    }

    #[must_use]
    pub fn with_stale_interval(mut self, secs: i64) -> Self {
        self.stale_interval_secs = secs;
        self
    }

    // -------------------------------------------------------------------------
    // Configuration
    // -------------------------------------------------------------------------

    /// Replace the recovery policy.
    ///
    /// On invalid input recovery is disabled and the error returned. A
    /// changed lifetime cap clears every lifetime counter; a newer
    /// `recovery_timestamp` drops all attempt history and cached commands.
    pub fn update_config(&mut self, update: ConfigUpdate) -> Result<(), RecoveryConfigError> {
        let config = match RecoveryConfig::try_from(update) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %e, "Recovery disabled");
                self.config = RecoveryConfig::default();
                return Err(e);
            }
        };

        if config.max_lifetime_count != self.config.max_lifetime_count {
            for counter in self.actions.values_mut() {
                counter.reset_lifetime();
            }
        }

        if config.recovery_timestamp > self.latest_recovery_timestamp {
            if !self.actions.is_empty() || !self.stored_commands.is_empty() {
                info!(
                    recovery_timestamp = config.recovery_timestamp,
                    "Recovery config reissued, clearing attempt history"
                );
            }
            self.actions.clear();
            self.stored_commands.clear();
            self.latest_recovery_timestamp = config.recovery_timestamp;
        }

        if config.recovery_enabled {
            info!(
                mode = %config.recovery_type(),
                max_count = config.max_count,
                window_in_minutes = config.window_in_minutes,
                retry_gap = config.retry_gap,
                max_lifetime_count = config.max_lifetime_count,
                components = ?config.enabled_components,
                "Auto recovery is enabled"
            );
        } else {
            debug!("Auto recovery is disabled");
        }

        self.config = config;
        Ok(())
    }

    /// Apply the `recoveryConfig` block of a server response.
    pub fn update_configuration_from_registration(
        &mut self,
        response: Option<&serde_json::Value>,
    ) -> Result<(), RecoveryConfigError> {
        self.update_config(ConfigUpdate::from_registration(response))
    }

    pub fn config(&self) -> &RecoveryConfig {
        &self.config
    }

    pub fn enabled(&self) -> bool {
        self.config.recovery_enabled
    }

    pub fn configured_for_recovery(&self, component: &str) -> bool {
        self.config.configured_for_recovery(component)
    }

    // -------------------------------------------------------------------------
    // Component state
    // -------------------------------------------------------------------------

    pub fn get_current_status(&self, component: &str) -> Option<&ComponentState> {
        self.statuses.get(component).map(|s| &s.current)
    }

    pub fn get_desired_status(&self, component: &str) -> Option<&ComponentState> {
        self.statuses.get(component).map(|s| &s.desired)
    }

    pub fn update_current_status(&mut self, component: &str, state: ComponentState) {
        let status = self.statuses.entry(component.to_string()).or_default();
        if status.current != state {
            info!(component, current = %state, "Current status changed");
        }
        status.current = state;
    }

    pub fn update_desired_status(&mut self, component: &str, state: ComponentState) {
        let status = self.statuses.entry(component.to_string()).or_default();
        if status.desired != state {
            info!(component, desired = %state, "Desired status changed");
        }
        status.desired = state;
    }

    pub fn update_config_staleness(&mut self, component: &str, stale: bool) {
        self.statuses
            .entry(component.to_string())
            .or_default()
            .stale_config = stale;
    }

    /// Apply a live status report. A dead report never hides an install failure.
    pub fn handle_status_change(&mut self, component: &str, state: ComponentState) {
        if !self.configured_for_recovery(component) {
            return;
        }

        if state == ComponentState::LIVE
            || self.get_current_status(component) != Some(&ComponentState::InstallFailed)
        {
            self.update_current_status(component, state);
        }
    }

    // -------------------------------------------------------------------------
    // Decisions
    // -------------------------------------------------------------------------

    fn planned_action(&self, status: &ComponentStatus) -> Option<RecoveryAction> {
        use ComponentState::{Init, InstallFailed, Installed, Started};

        let config = &self.config;
        match (&status.current, &status.desired) {
            (Installed, Started) => Some(RecoveryAction::Start),
            (InstallFailed, Installed | Started) if !config.auto_start_only => {
                Some(RecoveryAction::Install)
            }
            _ if !config.is_full() => None,
            (Init, Installed | Started) => Some(RecoveryAction::Install),
            (Started, Installed) => Some(RecoveryAction::Stop),
            (Installed, Installed) if status.stale_config => Some(RecoveryAction::Install),
            (Started, Started) if status.stale_config => Some(RecoveryAction::Restart),
            _ => None,
        }
    }

    /// Whether `component` is enabled for recovery and its state needs fixing.
    pub fn requires_recovery(&self, component: &str) -> bool {
        if !self.configured_for_recovery(component) {
            return false;
        }
        self.statuses
            .get(component)
            .and_then(|status| self.planned_action(status))
            .is_some()
    }

    /// Whether an attempt for `component` would be granted now. Never mutates.
    pub fn may_execute(&self, component: &str) -> bool {
        if component.trim().is_empty() || !self.configured_for_recovery(component) {
            return false;
        }
        let now = self.clock.now();
        let limits = self.config.limits();
        match self.actions.get(component) {
            Some(counter) => counter.check(now, &limits).is_ok(),
            None => ActionCounter::default().check(now, &limits).is_ok(),
        }
    }

    /// Record an attempt for `component` if the sliding window allows it.
    pub fn execute(&mut self, component: &str) -> bool {
        if component.trim().is_empty() || !self.configured_for_recovery(component) {
            return false;
        }
        let now = self.clock.now();
        let limits = self.config.limits();
        let counter = self.actions.entry(component.to_string()).or_default();

        let Err(denial) = counter.attempt(now, &limits) else {
            return true;
        };

        let first = counter.note_denial(denial);
        let (count, lifetime_count) = (counter.count, counter.lifetime_count);
        let reason = match denial {
            Denial::LifetimeCapReached => "lifetime attempt limit reached",
            Denial::WindowCapReached => "attempt limit for the current window reached",
            Denial::RetryGapNotMet => "retry gap has not passed since the last attempt",
        };
        if first {
            warn!(
                component,
                count,
                lifetime_count,
                "Skipping recovery: {reason}; further skips are logged at debug"
            );
        } else {
            debug!(component, count, lifetime_count, "Skipping recovery: {reason}");
        }
        false
    }

    /// Commands to run now to bring components to their desired state.
    ///
    /// An attempt is only recorded for components a command could actually
    /// be built for.
    pub fn get_recovery_commands(&mut self) -> Vec<ExecutionCommand> {
        if !self.enabled() {
            return Vec::new();
        }

        let due: Vec<(String, RecoveryAction)> = self
            .statuses
            .iter()
            .filter(|(name, _)| self.configured_for_recovery(name))
            .filter_map(|(name, status)| {
                self.planned_action(status)
                    .map(|action| (name.clone(), action))
            })
            .collect();

        let mut commands = Vec::new();
        for (component, action) in due {
            if !self.may_execute(&component) {
                continue;
            }
            let Some(command) = self.synthesize(&component, action.role_command()) else {
                debug!(component = %component, ?action, "No command available for recovery");
                continue;
            };
            if self.execute(&component) {
                info!(
                    component = %component,
                    role_command = %command.role_command,
                    task_id = ?command.task_id,
                    "Created recovery command"
                );
                commands.push(command);
            }
        }
        commands
    }

    // -------------------------------------------------------------------------
    // Stored commands
    // -------------------------------------------------------------------------

    /// Cache the replayable payload of a status command and record the
    /// state the server wants.
    pub fn store_or_update_command(&mut self, command: &StatusCommand) {
        let component = command.component_name.as_str();
        if component.trim().is_empty() {
            return;
        }

        if let Some(desired) = &command.desired_state {
            self.update_desired_status(component, desired.clone());
        }
        self.update_config_staleness(component, command.has_stale_configs);

        if let Some(details) = command.replayable_command() {
            let stored_at = self.clock.now();
            debug!(component, stored_at, "Stored execution command for recovery");
            self.stored_commands.insert(
                (component.to_string(), details.command_type),
                StoredCommand {
                    command: details.clone(),
                    stored_at,
                },
            );
        }
    }

    pub fn command_exists(&self, component: &str, command_type: CommandType) -> bool {
        self.stored_commands
            .contains_key(&(component.to_string(), command_type))
    }

    /// Drop every cached command of `component`.
    pub fn remove_command(&mut self, component: &str) -> bool {
        let before = self.stored_commands.len();
        self.stored_commands.retain(|(name, _), _| name != component);
        self.stored_commands.len() != before
    }

    pub fn get_install_command(&mut self, component: &str) -> Option<ExecutionCommand> {
        self.synthesize(component, RoleCommand::Install)
    }

    pub fn get_start_command(&mut self, component: &str) -> Option<ExecutionCommand> {
        self.synthesize(component, RoleCommand::Start)
    }

    pub fn get_stop_command(&mut self, component: &str) -> Option<ExecutionCommand> {
        self.synthesize(component, RoleCommand::Stop)
    }

    pub fn get_restart_command(&mut self, component: &str) -> Option<ExecutionCommand> {
        self.synthesize(component, RoleCommand::restart())
    }

    fn synthesize(&mut self, component: &str, role_command: RoleCommand) -> Option<ExecutionCommand> {
        if self.paused {
            info!("Recovery is paused, tasks waiting in pipeline for this host");
            return None;
        }
        if self.has_active_command() {
            info!("Recovery is paused, an execution command is running");
            return None;
        }
        if !self.enabled() {
            debug!(component, "Recovery is not enabled, no command computed");
            return None;
        }

        let now = self.clock.now();
        let (key, stored) = self
            .stored_commands
            .iter()
            .find(|((name, _), _)| name == component)?;
        if now - stored.stored_at >= self.stale_interval_secs {
            debug!(
                component,
                stored_at = stored.stored_at,
                "Cached command is stale, dropping it"
            );
            let key = key.clone();
            self.stored_commands.remove(&key);
            return None;
        }

        let mut command = stored.command.clone();
        let task_id = self.get_unique_task_id();
        command.command_type = CommandType::AutoExecutionCommand;
        command.role = component.to_string();
        command.task_id = Some(task_id);
        command.command_id = Some(task_id.to_string());
        command.set_role_command(role_command);
        Some(command)
    }

    pub fn get_unique_task_id(&mut self) -> i64 {
        self.last_task_id += 1;
        self.last_task_id
    }

    // -------------------------------------------------------------------------
    // Server command feedback
    // -------------------------------------------------------------------------

    pub fn process_status_commands(&mut self, commands: &[StatusCommand]) {
        for command in commands {
            self.store_or_update_command(command);
        }
    }

    /// Track the desired state implied by commands the server issued.
    pub fn process_execution_commands(&mut self, commands: &[ExecutionCommand]) {
        if !self.enabled() {
            return;
        }

        for command in commands {
            if command.command_type != CommandType::ExecutionCommand
                || !self.configured_for_recovery(&command.role)
            {
                continue;
            }
            let desired = match &command.role_command {
                RoleCommand::Install | RoleCommand::Stop => ComponentState::DEAD,
                RoleCommand::Start => ComponentState::LIVE,
                restart if restart.is_restart() => ComponentState::LIVE,
                _ => continue,
            };
            self.update_desired_status(&command.role, desired);
        }
    }

    /// Track the state a finished command left the component in.
    pub fn process_execution_command_result(
        &mut self,
        role: &str,
        role_command: &RoleCommand,
        status: CommandStatus,
    ) {
        if !self.configured_for_recovery(role) {
            return;
        }

        let current = match (status, role_command) {
            (CommandStatus::Completed, RoleCommand::Start) => ComponentState::LIVE,
            (CommandStatus::Completed, RoleCommand::Stop | RoleCommand::Install) => {
                ComponentState::DEAD
            }
            (CommandStatus::Completed, restart) if restart.is_restart() => ComponentState::LIVE,
            (CommandStatus::Failed, RoleCommand::Install) => ComponentState::InstallFailed,
            _ => return,
        };
        info!(component = role, %role_command, ?status, current = %current, "Command finished");
        self.update_current_status(role, current);
    }

    // -------------------------------------------------------------------------
    // Pausing
    // -------------------------------------------------------------------------

    /// Suspend synthesis while the server has tasks queued for this host.
    pub fn set_paused(&mut self, paused: bool) {
        if self.paused != paused {
            info!(paused, "Recovery pause state changed");
        }
        self.paused = paused;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn start_execution_command(&mut self) {
        self.active_commands += 1;
    }

    pub fn stop_execution_command(&mut self) {
        self.active_commands = self.active_commands.saturating_sub(1);
    }

    pub fn has_active_command(&self) -> bool {
        self.active_commands > 0
    }

    // -------------------------------------------------------------------------
    // Introspection
    // -------------------------------------------------------------------------

    /// Summary of attempt counters for operators. Never mutates.
    pub fn get_recovery_status(&self) -> RecoveryReport {
        if !self.enabled() {
            return RecoveryReport::disabled();
        }

        let now = self.clock.now();
        let limits = self.config.limits();
        let reports = self
            .actions
            .iter()
            .map(|(name, counter)| ComponentReport {
                name: name.clone(),
                num_attempts: counter.lifetime_count,
                limit_reached: counter.limit_reached(now, &limits),
            })
            .collect();
        RecoveryReport::from_components(reports)
    }

    pub fn get_actions_copy(&self) -> BTreeMap<String, ActionCounter> {
        self.actions.clone()
    }

    /// True when more than a window has passed since the last attempt.
    pub fn is_action_info_stale(&self, component: &str) -> bool {
        let window_secs = self.config.limits().window_secs;
        self.actions
            .get(component)
            .is_some_and(|counter| counter.is_stale(self.clock.now(), window_secs))
    }

    /// Forget the attempt history of one component.
    pub fn reset_attempts(&mut self, component: &str) -> bool {
        self.actions.remove(component).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn manager(clock: &ManualClock) -> RecoveryManager {
        RecoveryManager::new(Arc::new(clock.clone()))
    }

    fn full(components: &str) -> ConfigUpdate {
        ConfigUpdate {
            max_count: 12,
            window_in_minutes: 5,
            retry_gap: 1,
            max_lifetime_count: 15,
            recovery_enabled: true,
            enabled_components: components.to_string(),
            ..ConfigUpdate::default()
        }
    }

    #[test]
    fn test_defaults_disable_recovery() {
        let clock = ManualClock::new(1000);
        let mut rm = manager(&clock);

        assert!(!rm.enabled());
        assert!(rm.get_install_command("NODEMANAGER").is_none());
        assert!(rm.get_start_command("NODEMANAGER").is_none());

        rm.update_current_status("NODEMANAGER", ComponentState::Installed);
        rm.update_desired_status("NODEMANAGER", ComponentState::Started);
        assert!(!rm.requires_recovery("NODEMANAGER"));
        assert!(!rm.execute("NODEMANAGER"));
        assert!(rm.get_actions_copy().is_empty());
    }

    #[test]
    fn test_requires_recovery_full_mode() {
        let clock = ManualClock::new(1000);
        let mut rm = manager(&clock);
        rm.update_config(full("NODEMANAGER")).unwrap();

        let mut check = |current: &str, desired: &str| {
            rm.update_current_status("NODEMANAGER", current.into());
            rm.update_desired_status("NODEMANAGER", desired.into());
            rm.requires_recovery("NODEMANAGER")
        };

        assert!(!check("INSTALLED", "INSTALLED"));
        assert!(check("INSTALLED", "STARTED"));
        assert!(check("STARTED", "INSTALLED"));
        assert!(!check("STARTED", "STARTED"));
        assert!(!check("INSTALLED", "XYS"));
        assert!(!check("INSTALLED", ""));
        assert!(check("INIT", "INSTALLED"));
        assert!(check("INIT", "STARTED"));
        assert!(check("INSTALL_FAILED", "STARTED"));
    }

    #[test]
    fn test_requires_recovery_auto_start_only() {
        let clock = ManualClock::new(1000);
        let mut rm = manager(&clock);
        rm.update_config(ConfigUpdate {
            auto_start_only: true,
            ..full("")
        })
        .unwrap();

        rm.update_current_status("NODEMANAGER", ComponentState::Init);
        rm.update_desired_status("NODEMANAGER", ComponentState::Installed);
        assert!(!rm.requires_recovery("NODEMANAGER"));

        rm.update_desired_status("NODEMANAGER", "START".into());
        assert!(!rm.requires_recovery("NODEMANAGER"));

        rm.update_current_status("NODEMANAGER", ComponentState::Started);
        rm.update_desired_status("NODEMANAGER", ComponentState::Installed);
        assert!(!rm.requires_recovery("NODEMANAGER"));

        rm.update_current_status("NODEMANAGER", ComponentState::Installed);
        rm.update_desired_status("NODEMANAGER", ComponentState::Started);
        assert!(rm.requires_recovery("NODEMANAGER"));
    }

    #[test]
    fn test_requires_recovery_respects_component_list() {
        let clock = ManualClock::new(1000);
        let mut rm = manager(&clock);
        rm.update_config(full("NODEMANAGER")).unwrap();

        for component in ["NODEMANAGER", "DATANODE"] {
            rm.update_current_status(component, ComponentState::Installed);
            rm.update_desired_status(component, ComponentState::Started);
        }
        assert!(rm.requires_recovery("NODEMANAGER"));
        assert!(!rm.requires_recovery("DATANODE"));
    }

    #[test]
    fn test_install_failed_needs_install_start_or_full() {
        let clock = ManualClock::new(1000);
        let mut rm = manager(&clock);
        rm.update_config(ConfigUpdate {
            auto_install_start: true,
            ..full("")
        })
        .unwrap();

        rm.update_current_status("NODEMANAGER", ComponentState::InstallFailed);
        rm.update_desired_status("NODEMANAGER", ComponentState::Installed);
        assert!(rm.requires_recovery("NODEMANAGER"));

        // no STOP outside FULL mode
        rm.update_current_status("NODEMANAGER", ComponentState::Started);
        assert!(!rm.requires_recovery("NODEMANAGER"));
    }

    #[test]
    fn test_handle_status_change_keeps_install_failed() {
        let clock = ManualClock::new(1000);
        let mut rm = manager(&clock);
        rm.update_config(full("")).unwrap();

        rm.update_current_status("HBASE_MASTER", ComponentState::InstallFailed);
        rm.handle_status_change("HBASE_MASTER", ComponentState::DEAD);
        assert_eq!(
            rm.get_current_status("HBASE_MASTER"),
            Some(&ComponentState::InstallFailed)
        );

        rm.handle_status_change("HBASE_MASTER", ComponentState::LIVE);
        assert_eq!(
            rm.get_current_status("HBASE_MASTER"),
            Some(&ComponentState::Started)
        );
    }

    #[test]
    fn test_may_execute_is_read_only() {
        let clock = ManualClock::new(1000);
        let mut rm = manager(&clock);
        rm.update_config(full("")).unwrap();

        for _ in 0..5 {
            assert!(rm.may_execute("NODEMANAGER"));
        }
        assert!(rm.get_actions_copy().is_empty());
        assert!(!rm.may_execute(" "));
        assert!(!rm.execute(""));
    }

    #[test]
    fn test_command_count() {
        let clock = ManualClock::new(1000);
        let mut rm = manager(&clock);

        assert!(!rm.has_active_command());
        rm.start_execution_command();
        assert!(rm.has_active_command());
        rm.start_execution_command();
        rm.stop_execution_command();
        assert!(rm.has_active_command());
        rm.stop_execution_command();
        assert!(!rm.has_active_command());
        rm.stop_execution_command();
        assert!(!rm.has_active_command());
    }

    #[test]
    fn test_invalid_config_disables_recovery() {
        let clock = ManualClock::new(1000);
        let mut rm = manager(&clock);
        rm.update_config(full("")).unwrap();
        assert!(rm.enabled());

        let err = rm
            .update_config(ConfigUpdate {
                max_count: 0,
                ..full("")
            })
            .unwrap_err();
        assert_eq!(err, RecoveryConfigError::MaxCount(0));
        assert!(!rm.enabled());
    }

    #[test]
    fn test_lifetime_cap_change_clears_lifetime_counts() {
        let clock = ManualClock::new(1000);
        let mut rm = manager(&clock);
        rm.update_config(full("")).unwrap();
        assert!(rm.execute("DATANODE"));
        assert_eq!(rm.get_actions_copy()["DATANODE"].lifetime_count, 1);

        rm.update_config(full("")).unwrap();
        assert_eq!(rm.get_actions_copy()["DATANODE"].lifetime_count, 1);

        rm.update_config(ConfigUpdate {
            max_lifetime_count: 20,
            ..full("")
        })
        .unwrap();
        assert_eq!(rm.get_actions_copy()["DATANODE"].lifetime_count, 0);
    }

    #[test]
    fn test_newer_recovery_timestamp_resets_history() {
        let clock = ManualClock::new(1000);
        let mut rm = manager(&clock);
        rm.update_config(ConfigUpdate {
            recovery_timestamp: 5,
            ..full("")
        })
        .unwrap();
        assert!(rm.execute("DATANODE"));

        // same timestamp re-sent with every heartbeat
        rm.update_config(ConfigUpdate {
            recovery_timestamp: 5,
            ..full("")
        })
        .unwrap();
        assert!(rm.get_actions_copy().contains_key("DATANODE"));

        rm.update_config(ConfigUpdate {
            recovery_timestamp: 6,
            ..full("")
        })
        .unwrap();
        assert!(rm.get_actions_copy().is_empty());
    }

    #[test]
    fn test_reset_attempts() {
        let clock = ManualClock::new(1000);
        let mut rm = manager(&clock);
        rm.update_config(full("")).unwrap();
        assert!(rm.execute("DATANODE"));

        assert!(rm.reset_attempts("DATANODE"));
        assert!(!rm.reset_attempts("DATANODE"));
        assert!(rm.get_actions_copy().is_empty());
    }

    #[test]
    fn test_process_execution_command_result() {
        let clock = ManualClock::new(1000);
        let mut rm = manager(&clock);
        rm.update_config(full("NODEMANAGER")).unwrap();

        rm.process_execution_command_result(
            "NODEMANAGER",
            &RoleCommand::Install,
            CommandStatus::Failed,
        );
        assert_eq!(
            rm.get_current_status("NODEMANAGER"),
            Some(&ComponentState::InstallFailed)
        );

        rm.process_execution_command_result(
            "NODEMANAGER",
            &RoleCommand::Install,
            CommandStatus::Completed,
        );
        assert_eq!(
            rm.get_current_status("NODEMANAGER"),
            Some(&ComponentState::Installed)
        );

        rm.process_execution_command_result(
            "NODEMANAGER",
            &RoleCommand::restart(),
            CommandStatus::Completed,
        );
        assert_eq!(
            rm.get_current_status("NODEMANAGER"),
            Some(&ComponentState::Started)
        );

        // not in the enabled list
        rm.process_execution_command_result("DATANODE", &RoleCommand::Start, CommandStatus::Completed);
        assert_eq!(rm.get_current_status("DATANODE"), None);
    }
}
