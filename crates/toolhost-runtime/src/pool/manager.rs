//! The process pool.
//!
//! Entries are keyed by `ProcessSpec::id`. Every mutation of an id's entry
//! happens while holding that id's async lock, so `get_or_create`,
//! `terminate` and restart handling for one id are serialized. Different ids
//! never contend. Readers (`get`, `list`) use the entry index directly and
//! never wait on an in-flight operation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

use futures_util::future::join_all;
use tokio::sync::{Mutex as AsyncMutex, broadcast, mpsc};
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use toolhost_core::{
    AppEvent, AppEventEmitter, ExitInfo, LogStream, ProcessInfo, ProcessProbe, ProcessSpec,
    ProcessState, ReusePolicy,
};
use tracing::{debug, info, warn};

use super::error::PoolError;
use super::managed::{ExitNotice, ManagedProcess};
use super::spawn::{SpawnContext, spawn_process};
use super::sweep::{cleanup_orphans, spawn_health_sweep};
use super::{PoolConfig, PoolNotice};
use crate::logs::{ProcessLogEntry, ProcessLogManager};
use crate::shutdown::stop_process;

/// Capacity of the pool notice channel
const NOTICE_CHANNEL_CAPACITY: usize = 64;

/// Stderr lines attached to an unexpected-exit error
const STDERR_TAIL_LINES: usize = 5;

/// Pool of supervised helper processes.
pub struct ProcessPool {
    config: PoolConfig,
    emitter: Arc<dyn AppEventEmitter>,
    logs: Arc<ProcessLogManager>,
    /// Per-id operation locks. Never removed; ids come from configuration.
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
    /// Current entry per id. Only written while holding the id's lock.
    entries: RwLock<HashMap<String, Arc<ManagedProcess>>>,
    probe: RwLock<Option<Arc<dyn ProcessProbe>>>,
    notices: broadcast::Sender<PoolNotice>,
    spawn_ctx: SpawnContext,
    shutting_down: AtomicBool,
    cancel: CancellationToken,
}

impl std::fmt::Debug for ProcessPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessPool")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ProcessPool {
    /// Create a pool and start its exit supervisor and health sweep.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config: PoolConfig, emitter: Arc<dyn AppEventEmitter>) -> Arc<Self> {
        let (exit_tx, exit_rx) = mpsc::unbounded_channel();
        let (notices, _) = broadcast::channel(NOTICE_CHANNEL_CAPACITY);
        let logs = Arc::new(ProcessLogManager::new());
        let cancel = CancellationToken::new();

        Arc::new_cyclic(|weak: &Weak<Self>| {
            tokio::spawn(run_exit_supervisor(weak.clone(), exit_rx));
            spawn_health_sweep(weak.clone(), config.health_sweep_interval, cancel.clone());

            Self {
                spawn_ctx: SpawnContext {
                    logs: Arc::clone(&logs),
                    exits: exit_tx,
                },
                config,
                emitter,
                logs,
                locks: Mutex::new(HashMap::new()),
                entries: RwLock::new(HashMap::new()),
                probe: RwLock::new(None),
                notices,
                shutting_down: AtomicBool::new(false),
                cancel,
            }
        })
    }

    pub const fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Install the extra reuse check used with `ReusePolicy::ProtocolPing`.
    pub fn set_probe(&self, probe: Arc<dyn ProcessProbe>) {
        *self.probe.write().unwrap_or_else(PoisonError::into_inner) = Some(probe);
    }

    /// Subscribe to exit/restart notices.
    pub fn subscribe(&self) -> broadcast::Receiver<PoolNotice> {
        self.notices.subscribe()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Return a healthy process for `spec.id`, spawning one if needed.
    ///
    /// A healthy existing entry is returned unchanged. An unhealthy one is
    /// fully terminated before a replacement is spawned. Fresh entries start
    /// with a restart count of 0.
    pub async fn get_or_create(&self, spec: ProcessSpec) -> Result<Arc<ManagedProcess>, PoolError> {
        self.ensure_accepting()?;

        let lock = self.lock_for(&spec.id);
        let _guard = lock.lock().await;

        // Shutdown may have started while we waited.
        self.ensure_accepting()?;

        if let Some(existing) = self.entry(&spec.id) {
            if self.is_healthy(&existing).await {
                debug!(process_id = %spec.id, pid = existing.pid(), "Reusing pooled process");
                return Ok(existing);
            }

            info!(
                process_id = %spec.id,
                pid = existing.pid(),
                state = %existing.state(),
                "Replacing unhealthy process"
            );
            self.stop_entry(&existing).await?;
            self.remove_entry(&spec.id);
        }

        let process = self.spawn_entry(&spec, 0).await?;
        if self.is_shutting_down() {
            info!(
                process_id = %spec.id,
                pid = process.pid(),
                "Pool shut down during spawn, stopping process"
            );
            self.stop_entry(&process).await?;
            return Err(PoolError::ShuttingDown);
        }
        self.set_entry(&spec.id, Arc::clone(&process));
        Ok(process)
    }

    /// Terminate the process for `id`, if any.
    ///
    /// SIGTERM first, forced kill after the grace period. The entry is
    /// removed only once the process has actually exited; if termination
    /// fails the entry stays (in `error`) and the error is returned.
    pub async fn terminate(&self, id: &str) -> Result<(), PoolError> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        let Some(process) = self.entry(id) else {
            return Ok(());
        };

        info!(process_id = %id, pid = process.pid(), "Terminating process");
        let exit = self.stop_entry(&process).await?;
        self.remove_entry(id);

        info!(process_id = %id, pid = process.pid(), exit = %exit, "Process terminated");
        self.emitter
            .emit(AppEvent::process_terminated(id, process.pid(), Some(exit)));
        Ok(())
    }

    /// Stop the health sweep, terminate everything, then run the cleanup sweep.
    ///
    /// After this call `get_or_create` fails with `ShuttingDown`.
    pub async fn shutdown(&self) {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            debug!("Process pool shutdown already in progress");
            return;
        }
        self.cancel.cancel();

        let ids = self.ids();
        info!(count = ids.len(), "Shutting down process pool");

        let results = join_all(ids.iter().map(|id| self.terminate(id))).await;
        for (id, result) in ids.iter().zip(results) {
            if let Err(e) = result {
                warn!(process_id = %id, error = %e, "Failed to terminate process during shutdown");
            }
        }

        if !self.config.cleanup_patterns.is_empty() {
            match timeout(
                self.config.cleanup_timeout,
                cleanup_orphans(&self.config.cleanup_patterns),
            )
            .await
            {
                Ok(0) => {}
                Ok(killed) => info!(killed, "Cleanup sweep killed orphaned processes"),
                Err(_) => warn!(
                    timeout_ms = u64::try_from(self.config.cleanup_timeout.as_millis())
                        .unwrap_or(u64::MAX),
                    "Cleanup sweep timed out"
                ),
            }
        }

        info!("Process pool shut down");
    }

    /// Current entry for `id`, without waiting on in-flight operations.
    pub fn get(&self, id: &str) -> Option<Arc<ManagedProcess>> {
        self.entry(id)
    }

    /// Whether `id` has a live, running process.
    pub fn is_running(&self, id: &str) -> bool {
        self.entry(id).is_some_and(|p| p.is_alive())
    }

    /// Snapshots of every pooled entry, sorted by id.
    pub fn list(&self) -> Vec<ProcessInfo> {
        let mut infos: Vec<ProcessInfo> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|p| p.info())
            .collect();
        infos.sort_by(|a, b| a.id.cmp(&b.id));
        infos
    }

    /// Captured output of `id`.
    pub fn logs(&self, id: &str) -> Vec<ProcessLogEntry> {
        self.logs.get_logs(id)
    }

    pub fn log_manager(&self) -> Arc<ProcessLogManager> {
        Arc::clone(&self.logs)
    }

    /// Evict entries whose process died on its own and has been handled.
    ///
    /// Entries with a pending restart are left alone. Returns the number of
    /// evicted entries.
    pub async fn sweep_dead(&self) -> usize {
        let candidates: Vec<Arc<ManagedProcess>> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|p| is_settled_dead(p))
            .cloned()
            .collect();

        let mut evicted = 0;
        for process in candidates {
            let lock = self.lock_for(process.id());
            let _guard = lock.lock().await;

            // Re-check under the lock: a restart may have replaced it.
            let still_dead = self
                .entry(process.id())
                .is_some_and(|current| current.pid() == process.pid() && is_settled_dead(&current));
            if still_dead {
                debug!(process_id = %process.id(), pid = process.pid(), "Evicting dead process");
                self.remove_entry(process.id());
                evicted += 1;
            }
        }
        evicted
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn ensure_accepting(&self) -> Result<(), PoolError> {
        if self.is_shutting_down() {
            return Err(PoolError::ShuttingDown);
        }
        Ok(())
    }

    fn lock_for(&self, id: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(id.to_string()).or_default())
    }

    fn entry(&self, id: &str) -> Option<Arc<ManagedProcess>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    fn set_entry(&self, id: &str, process: Arc<ManagedProcess>) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.to_string(), process);
    }

    fn remove_entry(&self, id: &str) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
    }

    /// Every id with an entry or an operation lock, so in-flight spawns are
    /// included.
    fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        ids.extend(
            self.entries
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .keys()
                .cloned(),
        );
        ids.sort();
        ids.dedup();
        ids
    }

    fn probe(&self) -> Option<Arc<dyn ProcessProbe>> {
        self.probe
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn is_healthy(&self, process: &ManagedProcess) -> bool {
        if !process.is_alive() {
            return false;
        }
        if self.config.reuse_policy == ReusePolicy::ProtocolPing {
            if let (Some(probe), Some(channel)) = (self.probe(), process.channel()) {
                let healthy = probe.probe(process.id(), &channel).await;
                if !healthy {
                    debug!(process_id = %process.id(), "Reuse probe failed");
                }
                return healthy;
            }
        }
        true
    }

    async fn spawn_entry(
        &self,
        spec: &ProcessSpec,
        restart_count: u32,
    ) -> Result<Arc<ManagedProcess>, PoolError> {
        match spawn_process(spec, restart_count, &self.spawn_ctx).await {
            Ok(process) => {
                process.set_state(ProcessState::Running);
                info!(
                    process_id = %spec.id,
                    pid = process.pid(),
                    restart_count,
                    "Process running"
                );
                self.emitter.emit(AppEvent::process_created(
                    &spec.id,
                    process.pid(),
                    restart_count,
                ));
                Ok(process)
            }
            Err(e) => {
                warn!(process_id = %spec.id, error = %e, "Failed to start process");
                self.emitter
                    .emit(AppEvent::process_error(&spec.id, e.to_string()));
                Err(e)
            }
        }
    }

    /// Stop one entry. Caller holds the id's lock.
    async fn stop_entry(&self, process: &ManagedProcess) -> Result<ExitInfo, PoolError> {
        if let Some(exit) = process.exit() {
            return Ok(exit);
        }

        process.set_state(ProcessState::Stopping);
        match stop_process(process, self.config.grace_period, self.config.reap_timeout).await {
            Ok(exit) => {
                process.set_state(ProcessState::Stopped);
                Ok(exit)
            }
            Err(e) => {
                let err = PoolError::TerminateFailed {
                    id: process.id().to_string(),
                    reason: e.to_string(),
                };
                process.fail(err.to_string());
                self.emitter
                    .emit(AppEvent::process_error(process.id(), err.to_string()));
                Err(err)
            }
        }
    }

    /// React to a process exit reported by its monitor.
    async fn handle_exit(&self, notice: ExitNotice) {
        let ExitNotice { id, pid, exit } = notice;

        let lock = self.lock_for(&id);
        let _guard = lock.lock().await;

        let Some(process) = self.entry(&id) else {
            return;
        };
        if process.pid() != pid
            || matches!(
                process.state(),
                ProcessState::Stopping | ProcessState::Stopped
            )
        {
            debug!(process_id = %id, pid, "Ignoring exit of a process no longer pooled");
            return;
        }

        self.emitter
            .emit(AppEvent::process_exited(&id, pid, exit.clone()));

        if exit.success() {
            info!(process_id = %id, pid, "Process exited cleanly");
            process.set_state(ProcessState::Stopped);
            self.notify(PoolNotice::Exited {
                id,
                pid,
                exit,
                will_restart: false,
            });
            return;
        }

        let message = self.exit_message(&id, &exit);
        warn!(process_id = %id, pid, exit = %exit, "Process exited unexpectedly");
        process.fail(message.clone());
        self.emitter.emit(AppEvent::process_error(&id, message));

        let spec = process.spec().clone();
        let budget_left = process.restart_count() < spec.max_restarts;
        let will_restart = spec.auto_restart && budget_left && !self.is_shutting_down();

        self.notify(PoolNotice::Exited {
            id: id.clone(),
            pid,
            exit,
            will_restart,
        });

        if !will_restart {
            if spec.auto_restart && !budget_left {
                warn!(
                    process_id = %id,
                    max_restarts = spec.max_restarts,
                    "Restart limit reached, leaving process in error"
                );
            }
            return;
        }

        let attempt = process.restart_count() + 1;
        info!(
            process_id = %id,
            attempt,
            max_restarts = spec.max_restarts,
            "Restarting process"
        );
        self.emitter
            .emit(AppEvent::process_restarting(&id, attempt, spec.max_restarts));

        sleep(self.config.restart_cooldown).await;
        if self.is_shutting_down() {
            debug!(process_id = %id, "Skipping restart, pool is shutting down");
            return;
        }

        // On failure the dead entry stays in `error`; spawn_entry already
        // emitted the error event.
        match self.spawn_entry(&spec, attempt).await {
            Ok(restarted) => {
                let pid = restarted.pid();
                self.set_entry(&id, restarted);
                self.notify(PoolNotice::Restarted {
                    id,
                    pid,
                    restart_count: attempt,
                });
            }
            Err(e) => process.fail(e.to_string()),
        }
    }

    fn exit_message(&self, id: &str, exit: &ExitInfo) -> String {
        let tail = self.logs.tail(id, LogStream::Stderr, STDERR_TAIL_LINES);
        if tail.is_empty() {
            format!("Process exited unexpectedly ({exit})")
        } else {
            format!(
                "Process exited unexpectedly ({exit}); stderr: {}",
                tail.join(" | ")
            )
        }
    }

    fn notify(&self, notice: PoolNotice) {
        // No subscribers is fine
        let _ = self.notices.send(notice);
    }
}

impl Drop for ProcessPool {
    fn drop(&mut self) {
        self.cancel.cancel();
        let entries = self
            .entries
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        for process in entries.values() {
            if !process.has_exited() {
                process.force_kill();
            }
        }
    }
}

/// Exited and already processed by `handle_exit`.
fn is_settled_dead(process: &ManagedProcess) -> bool {
    process.has_exited()
        && matches!(
            process.state(),
            ProcessState::Stopped | ProcessState::Error
        )
}

/// Forward monitor exit notices into `handle_exit`, one task per notice.
async fn run_exit_supervisor(
    pool: Weak<ProcessPool>,
    mut exits: mpsc::UnboundedReceiver<ExitNotice>,
) {
    while let Some(notice) = exits.recv().await {
        let Some(pool) = pool.upgrade() else {
            break;
        };
        tokio::spawn(async move { pool.handle_exit(notice).await });
    }
    debug!("Exit supervisor stopped");
}
