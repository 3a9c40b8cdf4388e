//! The service orchestrator.
//!
//! Phases start strictly in order and stop strictly in reverse. Concurrent
//! `initialize()` callers are collapsed onto one run through a watch
//! channel carrying its outcome.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use anyhow::{Context, bail};
use futures_util::future::join_all;
use tokio::sync::{Mutex as AsyncMutex, watch};
use toolhost_core::paths::{DirectoryCreationStrategy, ensure_directory};
use toolhost_core::{AppEvent, AppEventEmitter, NoopEmitter, ServiceStatus, ToolProtocol};
use toolhost_mcp::ConnectionManager;
use toolhost_runtime::ProcessPool;
use tracing::{debug, error, info, warn};

use crate::config::OrchestratorConfig;
use crate::error::OrchestratorError;
use crate::phase::{
    CONNECTIONS_PHASE, INFRASTRUCTURE_PHASE, PROCESS_POOL_PHASE, Phase, ServicePhase,
};

type InitOutcome = Option<Result<(), OrchestratorError>>;

enum InitState {
    Idle,
    Running(watch::Receiver<InitOutcome>),
    Ready,
}

/// Resets the init state if the initializing caller is dropped mid-run.
struct InitGuard<'a> {
    state: &'a Mutex<InitState>,
    armed: bool,
}

impl Drop for InitGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            *self.state.lock().unwrap_or_else(PoisonError::into_inner) = InitState::Idle;
        }
    }
}

/// Brings the supervisor's services up and down in order.
pub struct ServiceOrchestrator {
    config: OrchestratorConfig,
    protocol: Arc<dyn ToolProtocol>,
    emitter: Arc<dyn AppEventEmitter>,
    extensions: Vec<Arc<dyn ServicePhase>>,
    init: Mutex<InitState>,
    shutting_down: AtomicBool,
    /// Phases that started successfully, in start order.
    started: AsyncMutex<Vec<Phase>>,
    statuses: RwLock<Vec<ServiceStatus>>,
    pool: RwLock<Option<Arc<ProcessPool>>>,
    connections: RwLock<Option<Arc<ConnectionManager>>>,
}

impl ServiceOrchestrator {
    pub fn builder(config: OrchestratorConfig) -> ServiceOrchestratorBuilder {
        ServiceOrchestratorBuilder::new(config)
    }

    pub const fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Names of every phase in start order.
    pub fn phase_names(&self) -> Vec<String> {
        self.phases().iter().map(|p| p.name().to_string()).collect()
    }

    /// Start every phase.
    ///
    /// Safe to call concurrently and repeatedly: the first caller runs the
    /// startup, concurrent callers wait for and share its outcome, and later
    /// callers return immediately once initialized. A failed run leaves the
    /// orchestrator uninitialized so it can be retried.
    pub async fn initialize(&self) -> Result<(), OrchestratorError> {
        if self.is_shutting_down() {
            return Err(OrchestratorError::ShuttingDown);
        }

        let leader = {
            let mut state = self.init.lock().unwrap_or_else(PoisonError::into_inner);
            match *state {
                InitState::Ready => return Ok(()),
                InitState::Running(ref rx) => Err(rx.clone()),
                InitState::Idle => {
                    let (tx, rx) = watch::channel(None);
                    *state = InitState::Running(rx);
                    Ok(tx)
                }
            }
        };

        match leader {
            Ok(tx) => {
                let mut guard = InitGuard {
                    state: &self.init,
                    armed: true,
                };
                let result = self.run_startup().await;
                guard.armed = false;

                *self.init.lock().unwrap_or_else(PoisonError::into_inner) = if result.is_ok() {
                    InitState::Ready
                } else {
                    InitState::Idle
                };
                tx.send_replace(Some(result.clone()));

                if result.is_ok() {
                    info!("All services ready");
                    self.emitter.emit(AppEvent::services_ready());
                }
                result
            }
            Err(mut rx) => {
                debug!("Initialization already in progress, waiting");
                let outcome = rx
                    .wait_for(Option::is_some)
                    .await
                    .map_err(|_| OrchestratorError::Abandoned)?;
                outcome.clone().unwrap_or(Err(OrchestratorError::Abandoned))
            }
        }
    }

    pub fn is_initialized(&self) -> bool {
        matches!(
            *self.init.lock().unwrap_or_else(PoisonError::into_inner),
            InitState::Ready
        )
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Stop every started phase in reverse order.
    ///
    /// A phase that fails to stop is logged and the rest still stop. Only
    /// the first call does anything; the orchestrator cannot be initialized
    /// again afterwards.
    pub async fn shutdown(&self) {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            debug!("Shutdown already in progress");
            return;
        }

        // Let an in-flight startup settle so its phases get stopped too.
        let pending = match *self.init.lock().unwrap_or_else(PoisonError::into_inner) {
            InitState::Running(ref rx) => Some(rx.clone()),
            _ => None,
        };
        if let Some(mut rx) = pending {
            let _ = rx.wait_for(Option::is_some).await;
        }

        info!("Shutting down services");
        self.stop_started().await;

        *self.init.lock().unwrap_or_else(PoisonError::into_inner) = InitState::Idle;
        self.statuses
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();

        info!("All services stopped");
        self.emitter.emit(AppEvent::services_stopped());
    }

    /// Latest status of one phase.
    pub fn status(&self, name: &str) -> Option<ServiceStatus> {
        self.statuses
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|s| s.name == name)
            .cloned()
    }

    /// Latest status of every phase that has reported, in start order.
    pub fn all_statuses(&self) -> Vec<ServiceStatus> {
        self.statuses
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn process_pool(&self) -> Result<Arc<ProcessPool>, OrchestratorError> {
        self.ensure_initialized()?;
        self.pool
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(OrchestratorError::NotInitialized)
    }

    pub fn connections(&self) -> Result<Arc<ConnectionManager>, OrchestratorError> {
        self.ensure_initialized()?;
        self.connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(OrchestratorError::NotInitialized)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn ensure_initialized(&self) -> Result<(), OrchestratorError> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(OrchestratorError::NotInitialized)
        }
    }

    fn phases(&self) -> Vec<Phase> {
        let mut phases = vec![Phase::Infrastructure, Phase::ProcessPool, Phase::Connections];
        phases.extend(self.extensions.iter().cloned().map(Phase::Extension));
        phases
    }

    fn set_status(&self, status: ServiceStatus) {
        {
            let mut statuses = self
                .statuses
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            match statuses.iter_mut().find(|s| s.name == status.name) {
                Some(existing) => *existing = status.clone(),
                None => statuses.push(status.clone()),
            }
        }
        self.emitter.emit(AppEvent::service_status(status));
    }

    async fn run_startup(&self) -> Result<(), OrchestratorError> {
        if self.has_leftovers().await {
            warn!("Stopping services left by an abandoned startup");
            self.stop_started().await;
        }

        let phases = self.phases();
        info!(phases = ?self.phase_names(), "Initializing services");

        for phase in phases {
            let name = phase.name().to_string();
            self.set_status(ServiceStatus::initializing(&name, "Starting"));
            debug!(phase = %name, "Starting phase");

            if let Err(e) = self.start_phase(&phase).await {
                let err = OrchestratorError::PhaseFailed {
                    phase: name.clone(),
                    message: format!("{e:#}"),
                };
                error!(phase = %name, error = %err, "Service phase failed, rolling back");
                self.set_status(ServiceStatus::error(&name, err.to_string()));
                self.stop_started().await;
                return Err(err);
            }

            self.started.lock().await.push(phase);
            self.set_status(ServiceStatus::ready(&name, "Ready"));
            info!(phase = %name, "Phase ready");
        }
        Ok(())
    }

    async fn has_leftovers(&self) -> bool {
        let holds_services = self
            .pool
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
            || self
                .connections
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .is_some();
        holds_services || !self.started.lock().await.is_empty()
    }

    /// Stop started phases in reverse order.
    ///
    /// A connection manager or pool whose phase never finished starting is
    /// released first, keeping whatever status the failed start reported.
    async fn stop_started(&self) {
        let started = std::mem::take(&mut *self.started.lock().await);
        for orphan in [Phase::Connections, Phase::ProcessPool] {
            if started.iter().any(|p| p.name() == orphan.name()) {
                continue;
            }
            if let Err(e) = self.stop_phase(&orphan).await {
                warn!(phase = %orphan.name(), error = %format!("{e:#}"), "Phase failed to stop");
            }
        }

        for phase in started.iter().rev() {
            let name = phase.name();
            self.set_status(ServiceStatus::stopping(name, "Stopping"));
            match self.stop_phase(phase).await {
                Ok(()) => debug!(phase = %name, "Phase stopped"),
                Err(e) => warn!(phase = %name, error = %format!("{e:#}"), "Phase failed to stop"),
            }
        }
    }

    async fn start_phase(&self, phase: &Phase) -> anyhow::Result<()> {
        match phase {
            Phase::Infrastructure => self.start_infrastructure(),
            Phase::ProcessPool => {
                let pool = ProcessPool::new(self.config.pool_config(), Arc::clone(&self.emitter));
                *self.pool.write().unwrap_or_else(PoisonError::into_inner) = Some(pool);
                Ok(())
            }
            Phase::Connections => self.start_connections().await,
            Phase::Extension(ext) => ext.start().await,
        }
    }

    async fn stop_phase(&self, phase: &Phase) -> anyhow::Result<()> {
        match phase {
            Phase::Infrastructure => Ok(()),
            Phase::ProcessPool => {
                let pool = self.pool.write().unwrap_or_else(PoisonError::into_inner).take();
                if let Some(pool) = pool {
                    pool.shutdown().await;
                }
                Ok(())
            }
            Phase::Connections => {
                let manager = self
                    .connections
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .take();
                if let Some(manager) = manager {
                    manager.shutdown().await;
                }
                Ok(())
            }
            Phase::Extension(ext) => ext.stop().await,
        }
    }

    fn start_infrastructure(&self) -> anyhow::Result<()> {
        let dirs = self
            .config
            .infrastructure_dirs()
            .context("Failed to resolve data directory")?;
        for dir in &dirs {
            ensure_directory(dir, DirectoryCreationStrategy::AutoCreate)
                .with_context(|| format!("Failed to prepare {}", dir.display()))?;
            debug!(path = %dir.display(), "Directory ready");
        }
        info!(count = dirs.len(), "Directories ready");
        Ok(())
    }

    async fn start_connections(&self) -> anyhow::Result<()> {
        let pool = self
            .pool
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .context("Process pool is not running")?;

        let manager = ConnectionManager::new(
            pool,
            Arc::clone(&self.protocol),
            Arc::clone(&self.emitter),
            self.config.connection_settings(),
        );
        *self
            .connections
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&manager));

        let servers: Vec<_> = self.config.enabled_servers().cloned().collect();
        let total = servers.len();
        let results = join_all(servers.into_iter().map(|server| {
            let manager = Arc::clone(&manager);
            async move {
                let id = server.id.clone();
                (id, manager.connect(server).await)
            }
        }))
        .await;

        let mut failures = Vec::new();
        for (id, result) in results {
            if let Err(e) = result {
                warn!(server_id = %id, error = %e, "Server failed to connect");
                failures.push(format!("{id}: {e}"));
            }
        }

        info!(
            connected = total - failures.len(),
            failed = failures.len(),
            "Server connections established"
        );

        if !failures.is_empty() && self.config.settings.effective_require_all_servers() {
            bail!(
                "{} of {total} servers failed to connect: {}",
                failures.len(),
                failures.join("; ")
            );
        }
        Ok(())
    }
}

/// Builder for [`ServiceOrchestrator`].
pub struct ServiceOrchestratorBuilder {
    config: OrchestratorConfig,
    protocol: Option<Arc<dyn ToolProtocol>>,
    emitter: Option<Arc<dyn AppEventEmitter>>,
    extensions: Vec<Arc<dyn ServicePhase>>,
}

impl ServiceOrchestratorBuilder {
    pub fn new(config: OrchestratorConfig) -> Self {
        Self {
            config,
            protocol: None,
            emitter: None,
            extensions: Vec::new(),
        }
    }

    /// Protocol used to talk to connected servers. Required.
    #[must_use]
    pub fn protocol(mut self, protocol: Arc<dyn ToolProtocol>) -> Self {
        self.protocol = Some(protocol);
        self
    }

    /// Event sink for status and lifecycle events. Defaults to a no-op.
    #[must_use]
    pub fn emitter(mut self, emitter: Arc<dyn AppEventEmitter>) -> Self {
        self.emitter = Some(emitter);
        self
    }

    /// Register a phase started after the built-in ones.
    #[must_use]
    pub fn phase(mut self, phase: Arc<dyn ServicePhase>) -> Self {
        self.extensions.push(phase);
        self
    }

    pub fn build(self) -> Result<ServiceOrchestrator, OrchestratorError> {
        self.config.validate()?;
        let protocol = self.protocol.ok_or(OrchestratorError::MissingProtocol)?;

        let mut names: HashSet<&str> = [INFRASTRUCTURE_PHASE, PROCESS_POOL_PHASE, CONNECTIONS_PHASE]
            .into_iter()
            .collect();
        for ext in &self.extensions {
            if !names.insert(ext.name()) {
                return Err(OrchestratorError::DuplicatePhase(ext.name().to_string()));
            }
        }

        Ok(ServiceOrchestrator {
            config: self.config,
            protocol,
            emitter: self
                .emitter
                .unwrap_or_else(|| Arc::new(NoopEmitter) as Arc<dyn AppEventEmitter>),
            extensions: self.extensions,
            init: Mutex::new(InitState::Idle),
            shutting_down: AtomicBool::new(false),
            started: AsyncMutex::new(Vec::new()),
            statuses: RwLock::new(Vec::new()),
            pool: RwLock::new(None),
            connections: RwLock::new(None),
        })
    }
}
