//! Background health sweep and the shutdown-time orphan cleanup.

use std::sync::Weak;
use std::time::Duration;

use futures_util::future::join_all;
use sysinfo::{Pid, ProcessStatus, ProcessesToUpdate, System};
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::manager::ProcessPool;
use crate::shutdown::kill_pid;

/// Periodically evict pool entries whose process died on its own.
///
/// Holds only a weak reference so a dropped pool ends the loop.
pub(crate) fn spawn_health_sweep(
    pool: Weak<ProcessPool>,
    period: Duration,
    cancel: CancellationToken,
) {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let Some(pool) = pool.upgrade() else { break };
                    let evicted = pool.sweep_dead().await;
                    if evicted > 0 {
                        debug!(evicted, "Health sweep evicted dead processes");
                    }
                }
            }
        }

        debug!("Health sweep stopped");
    });
}

/// Kill surviving children of this process whose name matches a pattern.
///
/// Best effort: failures are logged and skipped. Returns how many processes
/// were killed.
pub async fn cleanup_orphans(patterns: &[String]) -> usize {
    if patterns.is_empty() {
        return 0;
    }

    let owned = patterns.to_vec();
    let targets = match tokio::task::spawn_blocking(move || find_orphans(&owned)).await {
        Ok(targets) => targets,
        Err(e) => {
            warn!(error = %e, "Orphan scan failed");
            return 0;
        }
    };

    if targets.is_empty() {
        debug!("No orphaned helper processes found");
        return 0;
    }

    info!(count = targets.len(), "Found orphaned helper processes, killing");

    let results = join_all(targets.iter().map(|(pid, _)| kill_pid(*pid))).await;

    let mut killed = 0;
    for ((pid, name), result) in targets.iter().zip(results) {
        match result {
            Ok(()) => {
                debug!(pid, name = %name, "Killed orphaned helper");
                killed += 1;
            }
            Err(e) => warn!(pid, name = %name, error = %e, "Failed to kill orphaned helper"),
        }
    }
    killed
}

/// Live children of the current process whose name contains a pattern.
fn find_orphans(patterns: &[String]) -> Vec<(u32, String)> {
    let me = Pid::from_u32(std::process::id());
    let mut sys = System::new();
    sys.refresh_processes(ProcessesToUpdate::All, true);

    sys.processes()
        .iter()
        .filter(|(_, process)| {
            process.parent() == Some(me) && process.status() != ProcessStatus::Zombie
        })
        .filter_map(|(pid, process)| {
            let name = process.name().to_string_lossy().into_owned();
            patterns
                .iter()
                .any(|p| name.contains(p.as_str()))
                .then(|| (pid.as_u32(), name))
        })
        .collect()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tokio::process::Command;

    #[tokio::test]
    async fn empty_patterns_disable_cleanup() {
        assert_eq!(cleanup_orphans(&[]).await, 0);
    }

    #[tokio::test]
    async fn cleanup_kills_matching_children() {
        let mut child = Command::new("sleep")
            .arg("60")
            .kill_on_drop(true)
            .spawn()
            .expect("failed to spawn sleep");
        let pid = child.id().expect("no PID");
        let reaper = tokio::spawn(async move { child.wait().await });

        let killed = cleanup_orphans(&["sleep".to_string()]).await;
        assert!(killed >= 1);

        let status = reaper.await.unwrap().unwrap();
        assert!(!status.success());
        assert!(!crate::shutdown::pid_exists(pid));
    }
}
