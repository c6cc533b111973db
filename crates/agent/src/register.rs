//! Registration payload builder.

use std::path::Path;

use crate::protocol::{HardwareProfile, RegistrationRequest};

const HOSTNAME_FILE: &str = "/proc/sys/kernel/hostname";
const KERNEL_RELEASE_FILE: &str = "/proc/sys/kernel/osrelease";

#[cfg_attr(test, mockall::automock)]
pub trait RegistrationBuilder: Send + Sync {
    fn build(&self) -> RegistrationRequest;
}

/// Describes the local host.
#[derive(Debug, Clone)]
pub struct HostRegister {
    hostname: String,
    current_ping_port: u16,
    agent_version: String,
    prefix: String,
}

impl HostRegister {
    pub fn new(
        hostname: impl Into<String>,
        current_ping_port: u16,
        agent_version: impl Into<String>,
        prefix: &Path,
    ) -> Self {
        Self {
            hostname: hostname.into(),
            current_ping_port,
            agent_version: agent_version.into(),
            prefix: prefix.display().to_string(),
        }
    }

    fn hardware_profile() -> HardwareProfile {
        HardwareProfile {
            os: std::env::consts::OS.to_string(),
            architecture: std::env::consts::ARCH.to_string(),
            processorcount: std::thread::available_parallelism().map_or(1, usize::from),
            kernel: read_trimmed(Path::new(KERNEL_RELEASE_FILE)),
        }
    }
}

impl RegistrationBuilder for HostRegister {
    fn build(&self) -> RegistrationRequest {
        RegistrationRequest {
            hostname: self.hostname.clone(),
            public_hostname: self.hostname.clone(),
            current_ping_port: self.current_ping_port,
            agent_version: self.agent_version.clone(),
            prefix: self.prefix.clone(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            hardware_profile: Self::hardware_profile(),
        }
    }
}

/// Host name from the override, the kernel, or `HOSTNAME`, in that order.
pub fn detect_hostname(configured: Option<&str>) -> String {
    configured
        .map(str::to_string)
        .or_else(|| read_trimmed(Path::new(HOSTNAME_FILE)))
        .or_else(|| std::env::var("HOSTNAME").ok())
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| "localhost".to_string())
        .to_lowercase()
}

fn read_trimmed(path: &Path) -> Option<String> {
    std::fs::read_to_string(path)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
