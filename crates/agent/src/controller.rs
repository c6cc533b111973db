//! Registration and heartbeat protocol with the management server.
//!
//! A session registers, then heartbeats until the server asks for a new
//! registration, the agent must restart, or the agent is shut down:
//!
//! ```text
//! UNREGISTERED -> REGISTERING -> REGISTERED -> HEARTBEATING
//!                     ^                             |
//!                     +----- registrationCommand ---+
//! ```
//!
//! A `responseId` that does not follow the last one means the server and
//! agent disagree about what was delivered; the agent exits with
//! [`AGENT_AUTO_RESTART_EXIT_CODE`] and relies on its supervisor.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use recovery::{ExecutionCommand, RecoveryManager, StatusCommand};
use serde_json::Value;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::AgentConfig;
use crate::error::ControllerError;
use crate::exit::{ProcessExit, AGENT_AUTO_RESTART_EXIT_CODE};
use crate::live_status::ComponentCatalog;
use crate::protocol::{
    decode_each, ComponentsResponse, HeartbeatRequest, HeartbeatResponse, RegistrationResponse,
};
use crate::queue::{ActionQueue, QueueReports};
use crate::register::RegistrationBuilder;
use crate::transport::Transport;

/// `responseId` before the first registration.
const INITIAL_RESPONSE_ID: i64 = -1;

type RegistrationListener = Box<dyn Fn(&RegistrationResponse) + Send + Sync>;

/// How a heartbeat loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatOutcome {
    /// The server asked for a new registration.
    Reregister,
    /// The agent asked its supervisor for a restart.
    Restart,
    /// Shutdown was requested.
    Stopped,
}

/// Everything the controller talks to.
pub struct Collaborators {
    pub transport: Arc<dyn Transport>,
    pub queue: Arc<dyn ActionQueue>,
    pub register: Box<dyn RegistrationBuilder>,
    pub exit: Box<dyn ProcessExit>,
    pub recovery: Arc<Mutex<RecoveryManager>>,
}

pub struct Controller {
    config: AgentConfig,
    hostname: String,
    transport: Arc<dyn Transport>,
    queue: Arc<dyn ActionQueue>,
    register: Box<dyn RegistrationBuilder>,
    exit: Box<dyn ProcessExit>,
    recovery: Arc<Mutex<RecoveryManager>>,
    cancel: CancellationToken,
    catalog: ComponentCatalog,
    listeners: Vec<RegistrationListener>,
    /// Reports drained from the queue but not yet delivered.
    pending_reports: QueueReports,
    response_id: i64,
    is_registered: bool,
    repeat_registration: bool,
    has_mapped_components: bool,
}

impl Controller {
    pub fn new(
        config: AgentConfig,
        hostname: impl Into<String>,
        parts: Collaborators,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            hostname: hostname.into(),
            transport: parts.transport,
            queue: parts.queue,
            register: parts.register,
            exit: parts.exit,
            recovery: parts.recovery,
            cancel,
            catalog: ComponentCatalog::default(),
            listeners: Vec::new(),
            pending_reports: QueueReports::default(),
            response_id: INITIAL_RESPONSE_ID,
            is_registered: false,
            repeat_registration: false,
            has_mapped_components: true,
        }
    }

    /// Called with every accepted registration response.
    pub fn add_registration_listener<F>(&mut self, listener: F)
    where
        F: Fn(&RegistrationResponse) + Send + Sync + 'static,
    {
        self.listeners.push(Box::new(listener));
    }

    pub fn is_registered(&self) -> bool {
        self.is_registered
    }

    pub fn repeat_registration(&self) -> bool {
        self.repeat_registration
    }

    pub fn has_mapped_components(&self) -> bool {
        self.has_mapped_components
    }

    pub fn response_id(&self) -> i64 {
        self.response_id
    }

    pub fn catalog(&self) -> &ComponentCatalog {
        &self.catalog
    }

    /// Run sessions until one ends without a re-registration request.
    ///
    /// Returns an error only for failures retrying cannot fix.
    pub async fn run(&mut self) -> Result<(), ControllerError> {
        loop {
            self.repeat_registration = false;
            self.register_and_heartbeat().await?;
            if !self.repeat_registration || self.cancel.is_cancelled() {
                info!("Controller stopped");
                return Ok(());
            }
            info!("Registering with the server again");
        }
    }

    /// One session: register, notify listeners, heartbeat.
    pub async fn register_and_heartbeat(&mut self) -> Result<(), ControllerError> {
        self.queue.reset();

        let Some(response) = self.register_with_server().await? else {
            return Ok(());
        };
        if !self.is_registered {
            return Ok(());
        }

        for listener in &self.listeners {
            listener(&response);
        }

        match self.heartbeat_with_server().await? {
            HeartbeatOutcome::Reregister => self.repeat_registration = true,
            HeartbeatOutcome::Restart | HeartbeatOutcome::Stopped => {}
        }
        Ok(())
    }

    /// Register, retrying transient failures with a randomized backoff.
    ///
    /// Returns the server's response, accepted or rejected, or `None` when
    /// shut down first. TLS failures stop the agent.
    pub async fn register_with_server(
        &mut self,
    ) -> Result<Option<RegistrationResponse>, ControllerError> {
        let url = self.config.register_url(&self.hostname);
        let mut attempt: u32 = 0;
        self.is_registered = false;

        while !self.cancel.is_cancelled() {
            attempt += 1;
            let request = self.register.build();
            let body = serde_json::to_value(&request).map_err(ControllerError::Encode)?;
            info!(url = %url, attempt, response_id = self.response_id, "Registering with the server");

            let value = match self.transport.send(&url, Some(&body)).await {
                Ok(value) => value,
                Err(e) if e.is_fatal() => {
                    error!(error = %e, "Registration failed, not retrying");
                    self.repeat_registration = false;
                    return Err(e.into());
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Unable to connect to the server, retrying");
                    self.reconnect_backoff().await;
                    continue;
                }
            };

            let response: RegistrationResponse = match serde_json::from_value(value.clone()) {
                Ok(response) => response,
                Err(e) => {
                    warn!(attempt, error = %e, "Unexpected registration response, retrying");
                    self.reconnect_backoff().await;
                    continue;
                }
            };

            self.catalog.clear();

            if !response.is_success() {
                error!(
                    exitstatus = ?response.exitstatus,
                    log = response.log.as_deref().unwrap_or_default(),
                    "Registration rejected by the server"
                );
                self.repeat_registration = false;
                return Ok(Some(response));
            }

            if let Some(id) = response.response_id {
                self.response_id = id;
            }
            self.is_registered = true;
            info!(response_id = self.response_id, "Registered with the server");

            if response.recovery_config.is_some() {
                // rejected settings leave recovery disabled and are logged
                let _ = self
                    .recovery
                    .lock()
                    .await
                    .update_configuration_from_registration(Some(&value));
            }

            match &response.status_commands {
                Some(commands) => {
                    self.has_mapped_components = true;
                    let commands: Vec<StatusCommand> = decode_each("status", commands);
                    self.add_to_status_queue(commands).await;
                }
                None => self.has_mapped_components = false,
            }

            return Ok(Some(response));
        }

        Ok(None)
    }

    /// Heartbeat until the session ends.
    ///
    /// Transport failures are retried without bound and without advancing
    /// `responseId`.
    pub async fn heartbeat_with_server(&mut self) -> Result<HeartbeatOutcome, ControllerError> {
        let url = self.config.heartbeat_url(&self.hostname);
        let mut failures: u32 = 0;

        while !self.cancel.is_cancelled() {
            let request = self.build_heartbeat().await;
            let body = serde_json::to_value(&request).map_err(ControllerError::Encode)?;
            debug!(response_id = self.response_id, "Sending heartbeat");

            let (response, value) = match self.exchange(&url, &body).await {
                Ok(exchanged) => exchanged,
                Err(e) => {
                    failures += 1;
                    warn!(failures, error = %e, "Heartbeat failed, retrying");
                    self.pause(self.idle_interval()).await;
                    continue;
                }
            };

            let expected = self.response_id + 1;
            if response.response_id != Some(expected) {
                error!(
                    expected,
                    received = ?response.response_id,
                    "Heartbeat responseId out of sequence, restarting agent"
                );
                self.restart_agent();
                return Ok(HeartbeatOutcome::Restart);
            }
            self.response_id = expected;

            if failures > 0 {
                info!(failures, "Heartbeat connection restored");
                failures = 0;
            }

            if !response.is_success() {
                warn!(
                    exitstatus = ?response.exitstatus,
                    log = response.log.as_deref().unwrap_or_default(),
                    "Server reported a heartbeat failure"
                );
                self.pause(self.idle_interval()).await;
                continue;
            }
            self.pending_reports = QueueReports::default();

            if response.registration_requested() {
                info!("Server requested registration");
                self.repeat_registration = true;
                self.is_registered = false;
                return Ok(HeartbeatOutcome::Reregister);
            }

            if response.restart_requested() {
                info!("Server requested an agent restart");
                self.restart_agent();
                return Ok(HeartbeatOutcome::Restart);
            }

            self.apply_heartbeat_response(&response, &value).await;

            let interval = if self.queue.is_idle() {
                self.idle_interval()
            } else {
                Duration::from_secs(self.config.heartbeat.minimum_interval_secs)
            };
            self.pause(interval).await;
        }

        Ok(HeartbeatOutcome::Stopped)
    }

    async fn exchange(
        &self,
        url: &str,
        body: &Value,
    ) -> Result<(HeartbeatResponse, Value), ControllerError> {
        let value = self.transport.send(url, Some(body)).await?;
        let response = serde_json::from_value(value.clone()).map_err(ControllerError::Decode)?;
        Ok((response, value))
    }

    async fn build_heartbeat(&mut self) -> HeartbeatRequest {
        self.collect_reports().await;

        let mut request = HeartbeatRequest::new(self.response_id, &self.hostname);
        request.reports.clone_from(&self.pending_reports.reports);
        request
            .component_status
            .clone_from(&self.pending_reports.component_status);

        let recovery = self.recovery.lock().await;
        if recovery.enabled() {
            request.recovery_report = Some(recovery.get_recovery_status());
            request.recovery_timestamp = recovery.config().recovery_timestamp;
        }
        request
    }

    /// Move finished work from the queue into the next heartbeat.
    async fn collect_reports(&mut self) {
        let drained = self.queue.take_reports();
        if !drained.is_empty() {
            self.apply_reports(&drained).await;
            self.pending_reports.append(drained);
        }
    }

    /// Feed finished work back into the recovery manager.
    async fn apply_reports(&self, reports: &QueueReports) {
        let mut recovery = self.recovery.lock().await;
        for report in &reports.reports {
            recovery.process_execution_command_result(
                &report.role,
                &report.role_command(),
                report.status,
            );
        }
        for status in &reports.component_status {
            recovery.handle_status_change(&status.component_name, status.status.clone());
        }
    }

    async fn apply_heartbeat_response(&mut self, response: &HeartbeatResponse, value: &Value) {
        {
            let mut recovery = self.recovery.lock().await;
            if response.recovery_config.is_some() {
                let _ = recovery.update_configuration_from_registration(Some(value));
            }
            if let Some(pending) = response.has_pending_tasks {
                recovery.set_paused(pending);
            }
        }

        self.has_mapped_components = response.mapped_components();

        if let Some(commands) = &response.execution_commands {
            let commands: Vec<ExecutionCommand> = decode_each("execution", commands);
            self.recovery
                .lock()
                .await
                .process_execution_commands(&commands);
            self.add_to_queue(commands).await;
        }

        if let Some(commands) = &response.status_commands {
            let commands: Vec<StatusCommand> = decode_each("status", commands);
            self.add_to_status_queue(commands).await;
        }

        if !self.queue.tasks_in_progress_or_pending() {
            // work finished during the exchange must be seen before deciding
            self.collect_reports().await;
            let commands = self.recovery.lock().await.get_recovery_commands();
            if !commands.is_empty() {
                info!(count = commands.len(), "Queueing recovery commands");
                for command in commands {
                    self.queue.put(command);
                }
            }
        }
    }

    /// Queue server execution commands.
    pub async fn add_to_queue(&mut self, commands: Vec<ExecutionCommand>) {
        let Some(first) = commands.first() else {
            debug!("No execution commands from the server");
            return;
        };
        if self.catalog.is_empty() {
            if let Some(cluster) = first.cluster_name.clone() {
                self.update_components(&cluster).await;
            }
        }
        info!(count = commands.len(), "Queueing execution commands");
        for command in commands {
            self.queue.put(command);
        }
    }

    /// Queue server status commands and record them for recovery.
    pub async fn add_to_status_queue(&mut self, commands: Vec<StatusCommand>) {
        let Some(first) = commands.first() else {
            debug!("No status commands from the server");
            return;
        };
        if self.catalog.is_empty() {
            if let Some(cluster) = first.cluster_name.clone() {
                self.update_components(&cluster).await;
            }
        }
        self.recovery
            .lock()
            .await
            .process_status_commands(&commands);
        for command in commands {
            self.queue.put_status(command);
        }
    }

    /// Rebuild the component catalog for `cluster`. Failures keep it empty.
    pub async fn update_components(&mut self, cluster: &str) {
        let url = format!("{}{cluster}", self.config.components_url());
        info!(url = %url, "Fetching component catalog");

        let response = match self.transport.send(&url, None).await {
            Ok(value) => serde_json::from_value::<ComponentsResponse>(value),
            Err(e) => {
                warn!(cluster, error = %e, "Unable to fetch component catalog");
                return;
            }
        };
        match response {
            Ok(response) => {
                self.catalog = ComponentCatalog::from_response(&response);
                debug!(
                    services = ?self.catalog.services(),
                    "Component catalog updated"
                );
            }
            Err(e) => warn!(cluster, error = %e, "Malformed component catalog"),
        }
    }

    /// Exit so the supervisor can start a fresh agent.
    pub fn restart_agent(&mut self) {
        self.repeat_registration = false;
        self.exit.exit(AGENT_AUTO_RESTART_EXIT_CODE);
    }

    fn idle_interval(&self) -> Duration {
        Duration::from_secs(self.config.heartbeat.idle_interval_secs)
    }

    async fn reconnect_backoff(&self) {
        let max = self.config.heartbeat.max_reconnect_retry_delay_secs;
        let delay = rand::thread_rng().gen_range(0..=max);
        debug!(delay_secs = delay, "Waiting before reconnecting");
        self.pause(Duration::from_secs(delay)).await;
    }

    async fn pause(&self, duration: Duration) {
        tokio::select! {
            () = self.cancel.cancelled() => {}
            () = tokio::time::sleep(duration) => {}
        }
    }
}
