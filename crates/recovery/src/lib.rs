//! Agent-side auto-recovery for managed host components.
//!
//! The [`RecoveryManager`] tracks the reported (current) and requested
//! (desired) state of every component on the host, decides whether an
//! autonomous remediation is due, and synthesizes the command to run:
//!
//! - `INSTALLED` -> `STARTED`: START
//! - `STARTED` -> `INSTALLED`: STOP
//! - `INIT` / `INSTALL_FAILED` -> `INSTALLED` or `STARTED`: INSTALL
//! - `STARTED` with stale configuration: CUSTOM_COMMAND `RESTART`
//!
//! Every attempt is gated by a per-component sliding window
//! ([`ActionCounter`]): at most `max_count` attempts per window, a minimum
//! gap between attempts and an absolute lifetime cap.
//!
//! # Usage
//!
//! ```
//! use std::sync::Arc;
//! use recovery::{ComponentState, ConfigUpdate, ManualClock, RecoveryManager};
//!
//! let clock = ManualClock::new(1_000);
//! let mut manager = RecoveryManager::new(Arc::new(clock.clone()));
//! manager
//!     .update_config(ConfigUpdate {
//!         recovery_enabled: true,
//!         ..ConfigUpdate::default()
//!     })
//!     .unwrap();
//!
//! manager.update_current_status("DATANODE", ComponentState::Installed);
//! manager.update_desired_status("DATANODE", ComponentState::Started);
//! assert!(manager.requires_recovery("DATANODE"));
//! ```
//!
//! The manager performs no I/O and never blocks. The clock is injected so the
//! window arithmetic can be driven deterministically.

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod clock;
pub mod command;
pub mod config;
pub mod manager;
pub mod report;
pub mod state;
pub mod window;

pub use clock::{Clock, ManualClock, SystemClock};
pub use command::{
    CommandError, CommandStatus, CommandType, ExecutionCommand, PayloadLevel, RoleCommand,
    StatusCommand, CUSTOM_COMMAND_RESTART,
};
pub use config::{
    ConfigUpdate, RecoveryConfig, RecoveryConfigError, RecoveryType, NO_RECOVERY_TIMESTAMP,
};
pub use manager::{RecoveryAction, RecoveryManager, DEFAULT_STALE_INTERVAL_SECS};
pub use report::{ComponentReport, RecoveryReport, RecoverySummary};
pub use state::{ComponentState, ComponentStatus};
pub use window::{ActionCounter, Denial, WindowLimits};
