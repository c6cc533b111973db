//! Process exit seam.

use tracing::warn;

/// Exit code telling the supervising wrapper to start the agent again.
pub const AGENT_AUTO_RESTART_EXIT_CODE: i32 = 77;

#[cfg_attr(test, mockall::automock)]
pub trait ProcessExit: Send + Sync {
    fn exit(&self, code: i32);
}

/// Terminates the current process.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExitHelper;

impl ProcessExit for ExitHelper {
    fn exit(&self, code: i32) {
        warn!(code, "Agent exiting");
        std::process::exit(code);
    }
}
