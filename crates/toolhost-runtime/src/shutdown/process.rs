//! Graceful shutdown of a pooled process with SIGTERM → SIGKILL escalation.
//!
//! The pooled `Child` is owned by its monitor task, so this module never
//! touches it directly: it signals by pid, asks the monitor to force-kill,
//! and observes the exit through the process's exit watch.

use std::io;
use std::time::Duration;

use tokio::time::timeout;
use toolhost_core::ExitInfo;
use tracing::{debug, warn};

use crate::pool::ManagedProcess;

#[cfg(unix)]
use nix::errno::Errno;
#[cfg(unix)]
use nix::sys::signal::{self, Signal};
#[cfg(unix)]
use nix::unistd::Pid;

/// Stop a pooled process, escalating to a forced kill after `grace`.
///
/// # Strategy
/// 1. Send SIGTERM (unix) and wait up to `grace` for the exit
/// 2. If still running, force-kill through the monitor task
/// 3. Wait up to `reap_timeout` for the monitor to reap it
///
/// Returns the observed exit once the process has been reaped.
pub async fn stop_process(
    process: &ManagedProcess,
    grace: Duration,
    reap_timeout: Duration,
) -> io::Result<ExitInfo> {
    if let Some(exit) = process.exit() {
        return Ok(exit);
    }

    if send_terminate(process.pid())? {
        if let Ok(exit) = timeout(grace, process.wait_exit()).await {
            debug!(process_id = %process.id(), pid = process.pid(), "Process exited after SIGTERM");
            return Ok(exit);
        }
        warn!(
            process_id = %process.id(),
            pid = process.pid(),
            grace_ms = u64::try_from(grace.as_millis()).unwrap_or(u64::MAX),
            "Process ignored SIGTERM, escalating to SIGKILL"
        );
    }

    process.force_kill();

    timeout(reap_timeout, process.wait_exit())
        .await
        .map_err(|_| {
            io::Error::new(
                io::ErrorKind::TimedOut,
                format!("process {} was not reaped after kill", process.pid()),
            )
        })
}

/// Send the graceful stop signal. Returns `false` when there is no graceful
/// path and the caller should force-kill right away.
#[cfg(unix)]
fn send_terminate(pid: u32) -> io::Result<bool> {
    let target = i32::try_from(pid)
        .map(Pid::from_raw)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, format!("pid {pid} out of range")))?;

    match signal::kill(target, Signal::SIGTERM) {
        // Already gone: the monitor will publish the exit shortly.
        Ok(()) | Err(Errno::ESRCH) => Ok(true),
        Err(e) => Err(io::Error::other(e)),
    }
}

#[cfg(not(unix))]
#[allow(clippy::unnecessary_wraps)]
const fn send_terminate(_pid: u32) -> io::Result<bool> {
    // No SIGTERM equivalent - terminate immediately
    Ok(false)
}
