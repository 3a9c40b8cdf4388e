//! Process termination with graceful → forceful escalation.
//!
//! - [`process`]: pooled children, reaped by their monitor task
//! - [`pid`]: bare pids without a handle (orphan cleanup)

mod pid;
mod process;

pub use pid::{kill_pid, pid_exists};
pub use process::stop_process;
