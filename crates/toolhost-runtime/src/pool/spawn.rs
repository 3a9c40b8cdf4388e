//! Spawning a helper and monitoring it until it exits.

use std::process::Stdio;
use std::sync::Arc;

use tokio::process::{Child, Command};
use tokio::sync::{Notify, mpsc, oneshot, watch};
use tokio::time::timeout;
use toolhost_core::{ExitInfo, LogStream, ProcessChannel, ProcessLogSinkPort, ProcessSpec, StdioMode};
use tracing::{debug, warn};

use super::error::PoolError;
use super::managed::{ExitNotice, ManagedProcess};
use crate::logs::ProcessLogManager;
use crate::stream::spawn_stream_reader;

/// Shared handles every spawn needs.
#[derive(Clone)]
pub(crate) struct SpawnContext {
    pub logs: Arc<ProcessLogManager>,
    pub exits: mpsc::UnboundedSender<ExitNotice>,
}

/// Spawn a process from `spec` and wait for its liveness signal.
///
/// The liveness signal is the monitor task taking ownership of the running
/// child. If it does not arrive within the spec's startup timeout the child
/// is killed and `StartupTimeout` is returned. No pool entry exists yet at
/// this point; the caller decides whether to store the result.
pub(crate) async fn spawn_process(
    spec: &ProcessSpec,
    restart_count: u32,
    ctx: &SpawnContext,
) -> Result<Arc<ManagedProcess>, PoolError> {
    let mut cmd = Command::new(&spec.command);
    cmd.args(&spec.args)
        .envs(&spec.env)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    match spec.stdio {
        StdioMode::Protocol => cmd.stdin(Stdio::piped()),
        StdioMode::Captured => cmd.stdin(Stdio::null()),
    };

    if let Some(dir) = &spec.working_dir {
        cmd.current_dir(dir);
    }

    let mut child = cmd.spawn().map_err(|e| PoolError::SpawnFailed {
        id: spec.id.clone(),
        reason: format!("{}: {e}", spec.command),
    })?;

    let Some(pid) = child.id() else {
        return Err(PoolError::SpawnFailed {
            id: spec.id.clone(),
            reason: "process exited before a pid was assigned".to_string(),
        });
    };

    debug!(
        process_id = %spec.id,
        pid,
        command = %spec.command,
        args = ?spec.args,
        restart_count,
        "Spawned process"
    );

    ctx.logs.init_process(&spec.id);
    let sink: Arc<dyn ProcessLogSinkPort> = ctx.logs.clone();

    if let Some(stderr) = child.stderr.take() {
        spawn_stream_reader(stderr, spec.id.clone(), LogStream::Stderr, Some(Arc::clone(&sink)));
    }

    let channel = match spec.stdio {
        StdioMode::Protocol => match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => {
                Some(Arc::new(ProcessChannel::new(spec.id.clone(), pid, stdin, stdout)))
            }
            _ => None,
        },
        StdioMode::Captured => {
            if let Some(stdout) = child.stdout.take() {
                spawn_stream_reader(stdout, spec.id.clone(), LogStream::Stdout, Some(sink));
            }
            None
        }
    };

    let (exit_tx, exit_rx) = watch::channel(None);
    let (ready_tx, ready_rx) = oneshot::channel();
    let kill = Arc::new(Notify::new());

    tokio::spawn(monitor(
        child,
        spec.id.clone(),
        pid,
        exit_tx,
        Arc::clone(&kill),
        ctx.exits.clone(),
        ready_tx,
    ));

    let process = Arc::new(ManagedProcess::new(
        spec.clone(),
        pid,
        restart_count,
        exit_rx,
        kill,
        channel,
    ));

    match timeout(spec.startup_timeout(), ready_rx).await {
        Ok(Ok(())) => Ok(process),
        Ok(Err(_)) => Err(PoolError::SpawnFailed {
            id: spec.id.clone(),
            reason: "process monitor stopped before the process became ready".to_string(),
        }),
        Err(_) => {
            process.force_kill();
            Err(PoolError::StartupTimeout {
                id: spec.id.clone(),
                timeout_ms: spec.startup_timeout_ms,
            })
        }
    }
}

/// Own the child until it exits, then publish the exit.
///
/// Exits are published twice: on the process's watch (for `wait_exit`
/// callers) and as an `ExitNotice` to the pool supervisor.
async fn monitor(
    mut child: Child,
    id: String,
    pid: u32,
    exit_tx: watch::Sender<Option<ExitInfo>>,
    kill: Arc<Notify>,
    exits: mpsc::UnboundedSender<ExitNotice>,
    ready: oneshot::Sender<()>,
) {
    let _ = ready.send(());

    let status = tokio::select! {
        status = child.wait() => status,
        () = kill.notified() => {
            debug!(process_id = %id, pid, "Force-killing process");
            if let Err(e) = child.start_kill() {
                debug!(process_id = %id, pid, error = %e, "start_kill failed (already exited?)");
            }
            child.wait().await
        }
    };

    let exit = match status {
        Ok(status) => ExitInfo::from_status(&status),
        Err(e) => {
            warn!(process_id = %id, pid, error = %e, "Failed to wait for process");
            ExitInfo::unknown()
        }
    };

    debug!(process_id = %id, pid, exit = %exit, "Process exited");
    exit_tx.send_replace(Some(exit.clone()));
    let _ = exits.send(ExitNotice { id, pid, exit });
}
