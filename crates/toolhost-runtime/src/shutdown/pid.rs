//! Kill processes by PID without reaping (no handle available).

use std::io;

#[cfg(unix)]
use std::time::Duration;
#[cfg(unix)]
use tokio::time::sleep;

#[cfg(unix)]
use nix::errno::Errno;
#[cfg(unix)]
use nix::sys::signal::{self, Signal};
#[cfg(unix)]
use nix::unistd::Pid;

/// Kill a process by PID with SIGTERM → SIGKILL escalation.
///
/// # Strategy
/// 1. Send SIGTERM
/// 2. Poll for up to 2 seconds to verify process exit
/// 3. If still alive, send SIGKILL
/// 4. Poll again for up to 2 seconds to verify exit
///
/// Returns `Ok(())` if the process was killed or was already gone.
pub async fn kill_pid(pid: u32) -> io::Result<()> {
    #[cfg(unix)]
    {
        kill_pid_unix(pid).await
    }

    #[cfg(not(unix))]
    {
        kill_pid_other(pid).await
    }
}

#[cfg(unix)]
fn nix_pid(pid: u32) -> io::Result<Pid> {
    i32::try_from(pid)
        .map(Pid::from_raw)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, format!("pid {pid} out of range")))
}

#[cfg(unix)]
async fn kill_pid_unix(pid: u32) -> io::Result<()> {
    let target = nix_pid(pid)?;

    for sig in [Signal::SIGTERM, Signal::SIGKILL] {
        match signal::kill(target, sig) {
            Ok(()) => {}
            Err(Errno::ESRCH) => return Ok(()),
            Err(e) => return Err(io::Error::other(e)),
        }

        for _ in 0..20 {
            sleep(Duration::from_millis(100)).await;
            if !pid_exists(pid) {
                return Ok(());
            }
        }
    }

    Err(io::Error::new(
        io::ErrorKind::TimedOut,
        format!("process {pid} did not exit after SIGKILL"),
    ))
}

#[cfg(not(unix))]
async fn kill_pid_other(_pid: u32) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "killing by pid is not implemented on this platform",
    ))
}

/// Check if a PID exists (without verifying who owns it).
///
/// Uses `kill` with the null signal, which checks existence without
/// delivering anything.
#[cfg(unix)]
pub fn pid_exists(pid: u32) -> bool {
    let Ok(target) = nix_pid(pid) else {
        return false;
    };
    match signal::kill(target, None) {
        Ok(()) => true,
        Err(Errno::ESRCH) => false, // No such process
        Err(_) => true,             // Process exists but we lack permission
    }
}

#[cfg(not(unix))]
pub fn pid_exists(_pid: u32) -> bool {
    false
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tokio::process::Command;

    #[test]
    fn pid_exists_for_self() {
        assert!(pid_exists(std::process::id()));
    }

    #[test]
    fn pid_exists_false_for_impossible_pid() {
        assert!(!pid_exists(999_999));
    }

    #[tokio::test]
    async fn kill_pid_handles_already_gone() {
        assert!(kill_pid(999_999).await.is_ok());
    }

    #[tokio::test]
    async fn kill_pid_terminates_process() {
        let mut child = Command::new("sleep")
            .arg("60")
            .spawn()
            .expect("failed to spawn sleep");
        let pid = child.id().expect("no PID");

        // kill_pid cannot reap; reap concurrently so the pid disappears.
        let reaper = tokio::spawn(async move { child.wait().await });
        kill_pid(pid).await.expect("kill_pid failed");
        let status = reaper.await.unwrap().unwrap();

        assert!(!status.success());
        assert!(!pid_exists(pid));
    }
}
