//! Host agent.
//!
//! Registers the host with the management server, heartbeats, runs the
//! commands the server sends and, through [`recovery::RecoveryManager`],
//! restarts components that died without being asked to.
//!
//! The [`controller::Controller`] owns the protocol. Everything it talks to
//! sits behind a trait so sessions can be driven deterministically in tests:
//! [`transport::Transport`], [`queue::ActionQueue`],
//! [`register::RegistrationBuilder`] and [`exit::ProcessExit`].

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod controller;
pub mod error;
pub mod exit;
pub mod live_status;
pub mod protocol;
pub mod queue;
pub mod register;
pub mod runner;
pub mod transport;

pub use config::{read_agent_version, AgentConfig, LogFormat};
pub use controller::{Collaborators, Controller, HeartbeatOutcome};
pub use error::{ConfigError, ControllerError, TransportError};
pub use exit::{ExitHelper, ProcessExit, AGENT_AUTO_RESTART_EXIT_CODE};
pub use live_status::{ComponentCatalog, ServiceComponent};
pub use queue::{
    ActionQueue, CommandReport, ComponentStatusReport, InMemoryActionQueue, QueueReports,
};
pub use register::{detect_hostname, HostRegister, RegistrationBuilder};
pub use runner::CommandRunner;
pub use transport::{HttpTransport, Transport};
