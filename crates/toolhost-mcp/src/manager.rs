//! Server connection lifecycle management.
//!
//! Connects configured servers by obtaining a process from the pool and
//! discovering its tools through the injected `ToolProtocol`. Process loss is
//! picked up two ways: pool exit notices (push) and a liveness check before
//! every request (pull).

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use futures_util::future::join_all;
use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{Mutex as AsyncMutex, RwLock, broadcast};
use tokio::time::timeout;
use toolhost_core::settings::SupervisorSettings;
use toolhost_core::{
    AppEvent, AppEventEmitter, ConnectionInfo, ConnectionState, ProcessChannel, ProcessSpec,
    ProtocolError, ReusePolicy, ServerConfig, Tool, ToolProtocol, ToolResult,
};
use toolhost_runtime::{PoolNotice, ProcessPool};
use tracing::{debug, info, warn};

use crate::connection::ServerConnection;
use crate::error::ConnectionError;
use crate::path::{build_effective_path, resolve_command};
use crate::probe::ProtocolProbe;

/// Resolved connection manager settings.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    /// Bound on tool discovery and tool calls.
    pub request_timeout: Duration,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self::from_settings(&SupervisorSettings::with_defaults())
    }
}

impl ConnectionSettings {
    pub const fn from_settings(settings: &SupervisorSettings) -> Self {
        Self {
            request_timeout: settings.effective_request_timeout(),
        }
    }

    fn request_timeout_ms(&self) -> u64 {
        u64::try_from(self.request_timeout.as_millis()).unwrap_or(u64::MAX)
    }
}

/// Manager for server connections.
///
/// Each server's process lives in the shared `ProcessPool` under the
/// server's id. `connect` and `disconnect` for one server are serialized;
/// tool calls are not, the protocol's channel orders them.
pub struct ConnectionManager {
    pool: Arc<ProcessPool>,
    protocol: Arc<dyn ToolProtocol>,
    emitter: Arc<dyn AppEventEmitter>,
    settings: ConnectionSettings,
    connections: RwLock<HashMap<String, ServerConnection>>,
    /// Per-server connect/disconnect locks.
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
    shutting_down: AtomicBool,
}

impl ConnectionManager {
    /// Create a manager on top of `pool` and start watching its exit notices.
    ///
    /// With `ReusePolicy::ProtocolPing` the pool also gets a probe that pings
    /// through `protocol`.
    pub fn new(
        pool: Arc<ProcessPool>,
        protocol: Arc<dyn ToolProtocol>,
        emitter: Arc<dyn AppEventEmitter>,
        settings: ConnectionSettings,
    ) -> Arc<Self> {
        if pool.config().reuse_policy == ReusePolicy::ProtocolPing {
            pool.set_probe(Arc::new(ProtocolProbe::new(
                Arc::clone(&protocol),
                settings.request_timeout,
            )));
        }

        let notices = pool.subscribe();
        Arc::new_cyclic(|weak: &Weak<Self>| {
            tokio::spawn(watch_pool(weak.clone(), notices));
            Self {
                pool,
                protocol,
                emitter,
                settings,
                connections: RwLock::new(HashMap::new()),
                locks: Mutex::new(HashMap::new()),
                shutting_down: AtomicBool::new(false),
            }
        })
    }

    pub fn pool(&self) -> &Arc<ProcessPool> {
        &self.pool
    }

    /// Connect a server and discover its tools.
    ///
    /// Returns immediately if the server is already connected. On failure
    /// the connection is left in `error`, its process is terminated and the
    /// error is returned.
    pub async fn connect(&self, config: ServerConfig) -> Result<ConnectionInfo, ConnectionError> {
        if self.is_shutting_down() {
            return Err(ConnectionError::ShuttingDown);
        }

        let server_id = config.id.clone();
        let lock = self.lock_for(&server_id);
        let _guard = lock.lock().await;

        if let Some(conn) = self.connections.read().await.get(&server_id) {
            if conn.is_connected() {
                debug!(server_id = %server_id, "Server already connected");
                return Ok(conn.info());
            }
        }

        info!(server_id = %server_id, name = %config.display_name(), "Connecting to server");
        self.connections
            .write()
            .await
            .insert(server_id.clone(), ServerConnection::connecting(config.clone()));

        match self.establish(&config).await {
            Ok(info) => {
                info!(
                    server_id = %server_id,
                    pid = info.pid,
                    tool_count = info.tools.len(),
                    "Server connected"
                );
                self.emitter
                    .emit(AppEvent::server_connected(&server_id, info.tools.len()));
                Ok(info)
            }
            Err(e) => {
                warn!(server_id = %server_id, error = %e, "Failed to connect server");
                self.update(&server_id, |conn| conn.mark_error(e.to_string()))
                    .await;
                if let Err(te) = self.pool.terminate(&server_id).await {
                    warn!(server_id = %server_id, error = %te, "Failed to clean up server process");
                }
                self.emitter
                    .emit(AppEvent::server_error(&server_id, e.to_string()));
                Err(e)
            }
        }
    }

    /// Disconnect a server and stop tracking it. Unknown ids are a no-op.
    pub async fn disconnect(&self, server_id: &str) -> Result<(), ConnectionError> {
        let lock = self.lock_for(server_id);
        let _guard = lock.lock().await;

        if !self.connections.read().await.contains_key(server_id) {
            debug!(server_id = %server_id, "Disconnect of unknown server ignored");
            return Ok(());
        }

        if let Err(e) = self.pool.terminate(server_id).await {
            warn!(server_id = %server_id, error = %e, "Failed to stop server process");
            self.update(server_id, |conn| conn.mark_error(e.to_string()))
                .await;
            self.emitter
                .emit(AppEvent::server_error(server_id, e.to_string()));
            return Err(e.into());
        }

        self.connections.write().await.remove(server_id);
        info!(server_id = %server_id, "Server disconnected");
        self.emitter.emit(AppEvent::server_disconnected(server_id));
        Ok(())
    }

    /// Ask a connected server for its tools and refresh the cached list.
    pub async fn discover_tools(&self, server_id: &str) -> Result<Vec<Tool>, ConnectionError> {
        let (pid, channel) = self.live_channel(server_id).await?;

        let tools = match self
            .bounded(
                server_id,
                "discover_tools",
                self.protocol.discover_tools(server_id, &channel),
            )
            .await
        {
            Ok(tools) => tools,
            Err(e) => return Err(self.classify(server_id, pid, e).await),
        };

        self.update(server_id, |conn| {
            if conn.pid == Some(pid) {
                conn.tools.clone_from(&tools);
            }
        })
        .await;
        Ok(tools)
    }

    /// Invoke a tool on a connected server.
    ///
    /// Fails with `NotConnected` if the server is not connected or its
    /// process is no longer running.
    pub async fn call_tool(
        &self,
        server_id: &str,
        tool_name: &str,
        arguments: Value,
    ) -> Result<ToolResult, ConnectionError> {
        let (pid, channel) = self.live_channel(server_id).await?;

        debug!(server_id = %server_id, tool = %tool_name, "Calling tool");
        match self
            .bounded(
                server_id,
                "call_tool",
                self.protocol
                    .call_tool(server_id, &channel, tool_name, arguments),
            )
            .await
        {
            Ok(result) => Ok(result),
            Err(e) => Err(self.classify(server_id, pid, e).await),
        }
    }

    /// Snapshots of every connected server, sorted by id.
    ///
    /// Connections whose process died are moved to `error` first.
    pub async fn list_connected(&self) -> Vec<ConnectionInfo> {
        self.reconcile().await;
        let mut infos: Vec<ConnectionInfo> = self
            .connections
            .read()
            .await
            .values()
            .filter(|c| c.is_connected())
            .map(ServerConnection::info)
            .collect();
        infos.sort_by(|a, b| a.server_id.cmp(&b.server_id));
        infos
    }

    /// Snapshots of every tracked server regardless of state, sorted by id.
    pub async fn list_all(&self) -> Vec<ConnectionInfo> {
        let mut infos: Vec<ConnectionInfo> = self
            .connections
            .read()
            .await
            .values()
            .map(ServerConnection::info)
            .collect();
        infos.sort_by(|a, b| a.server_id.cmp(&b.server_id));
        infos
    }

    pub async fn info(&self, server_id: &str) -> Option<ConnectionInfo> {
        self.connections
            .read()
            .await
            .get(server_id)
            .map(ServerConnection::info)
    }

    /// Cached tools of every connected server.
    pub async fn all_tools(&self) -> Vec<(String, Vec<Tool>)> {
        self.list_connected()
            .await
            .into_iter()
            .map(|info| (info.server_id, info.tools))
            .collect()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Disconnect every server concurrently, then forget all state.
    ///
    /// Individual failures are logged, not returned.
    pub async fn shutdown(&self) {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            return;
        }

        let ids: Vec<String> = self.connections.read().await.keys().cloned().collect();
        info!(count = ids.len(), "Disconnecting all servers");

        let results = join_all(ids.iter().map(|id| self.disconnect(id))).await;
        for (id, result) in ids.iter().zip(results) {
            if let Err(e) = result {
                warn!(server_id = %id, error = %e, "Failed to disconnect server during shutdown");
            }
        }

        self.connections.write().await.clear();
        info!("All servers disconnected");
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn lock_for(&self, server_id: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(server_id.to_string()).or_default())
    }

    async fn update<T>(
        &self,
        server_id: &str,
        f: impl FnOnce(&mut ServerConnection) -> T,
    ) -> Option<T> {
        self.connections.write().await.get_mut(server_id).map(f)
    }

    /// Spawn (or reuse) the process, discover tools and bind the connection.
    ///
    /// A process that dies during discovery is replaced up to `retries`
    /// times; the pool's own restart is picked up by `get_or_create`.
    async fn establish(&self, config: &ServerConfig) -> Result<ConnectionInfo, ConnectionError> {
        config.validate()?;
        let spec = process_spec_for(config)?;

        let mut attempt = 0;
        loop {
            let process = self.pool.get_or_create(spec.clone()).await?;
            let pid = process.pid();
            let channel = process
                .channel()
                .ok_or_else(|| ConnectionError::NotConnected(config.id.clone()))?;

            let discovered = self
                .bounded(
                    &config.id,
                    "discover_tools",
                    self.protocol.discover_tools(&config.id, &channel),
                )
                .await;

            match discovered {
                Ok(tools) => {
                    if let Some(info) = self.bind(&config.id, pid, tools).await {
                        return Ok(info);
                    }
                }
                Err(e) if self.process_alive(&config.id, pid) => return Err(e),
                Err(_) => {}
            }

            if attempt >= config.retries {
                return Err(ConnectionError::ProcessExited(config.id.clone()));
            }
            attempt += 1;
            info!(
                server_id = %config.id,
                pid,
                attempt,
                "Server process exited while connecting, retrying"
            );
        }
    }

    /// Mark the connection `connected` on `pid`, if that process is still alive.
    ///
    /// Checked under the connections write lock: an exit notice for `pid`
    /// is either already visible in the pool or handled after the bind.
    async fn bind(&self, server_id: &str, pid: u32, tools: Vec<Tool>) -> Option<ConnectionInfo> {
        let mut connections = self.connections.write().await;
        if !self.process_alive(server_id, pid) {
            return None;
        }
        connections.get_mut(server_id).map(|conn| {
            conn.mark_connected(pid, tools);
            conn.info()
        })
    }

    fn process_alive(&self, server_id: &str, pid: u32) -> bool {
        self.pool
            .get(server_id)
            .is_some_and(|p| p.pid() == pid && p.is_alive())
    }

    /// Channel of a connected server whose process is still alive.
    async fn live_channel(
        &self,
        server_id: &str,
    ) -> Result<(u32, Arc<ProcessChannel>), ConnectionError> {
        let pid = match self.connections.read().await.get(server_id) {
            Some(conn) if conn.is_connected() => conn.pid,
            _ => return Err(ConnectionError::NotConnected(server_id.to_string())),
        };
        let Some(pid) = pid else {
            return Err(ConnectionError::NotConnected(server_id.to_string()));
        };

        let channel = self
            .pool
            .get(server_id)
            .filter(|p| p.pid() == pid && p.is_alive())
            .and_then(|p| p.channel());

        match channel {
            Some(channel) => Ok((pid, channel)),
            None => {
                self.mark_lost(server_id, pid, "Server process is no longer running")
                    .await;
                Err(ConnectionError::NotConnected(server_id.to_string()))
            }
        }
    }

    /// Run a protocol request under the request timeout.
    async fn bounded<T>(
        &self,
        server_id: &str,
        operation: &'static str,
        request: impl Future<Output = Result<T, ProtocolError>>,
    ) -> Result<T, ConnectionError> {
        match timeout(self.settings.request_timeout, request).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(source)) => Err(ConnectionError::Protocol {
                server_id: server_id.to_string(),
                source,
            }),
            Err(_) => Err(ConnectionError::Timeout {
                server_id: server_id.to_string(),
                operation,
                timeout_ms: self.settings.request_timeout_ms(),
            }),
        }
    }

    /// A closed or broken channel means the server is gone.
    async fn classify(&self, server_id: &str, pid: u32, err: ConnectionError) -> ConnectionError {
        match err {
            ConnectionError::Protocol {
                source: ProtocolError::Closed | ProtocolError::Transport(_),
                ..
            } => {
                self.mark_lost(server_id, pid, "Server closed its channel")
                    .await;
                ConnectionError::NotConnected(server_id.to_string())
            }
            other => other,
        }
    }

    /// Move a connection bound to `pid` from `connected` to `error`.
    async fn mark_lost(&self, server_id: &str, pid: u32, reason: &str) -> bool {
        let lost = self
            .update(server_id, |conn| {
                if conn.is_connected() && conn.pid == Some(pid) {
                    conn.mark_error(reason);
                    true
                } else {
                    false
                }
            })
            .await
            .unwrap_or(false);

        if lost {
            warn!(server_id = %server_id, pid, reason, "Server connection lost");
            self.emitter.emit(AppEvent::server_error(server_id, reason));
        }
        lost
    }

    /// Move connected servers whose process died to `error`.
    async fn reconcile(&self) {
        let bound: Vec<(String, u32)> = self
            .connections
            .read()
            .await
            .values()
            .filter(|c| c.is_connected())
            .filter_map(|c| c.pid.map(|pid| (c.server_id().to_string(), pid)))
            .collect();

        for (server_id, pid) in bound {
            if !self.process_alive(&server_id, pid) {
                self.mark_lost(&server_id, pid, "Server process is no longer running")
                    .await;
            }
        }
    }

    async fn on_pool_notice(self: Arc<Self>, notice: PoolNotice) {
        match notice {
            PoolNotice::Exited {
                id,
                pid,
                exit,
                will_restart,
            } => {
                let reason = format!("Server process exited ({exit})");
                if self.mark_lost(&id, pid, &reason).await && will_restart {
                    info!(server_id = %id, "Waiting for the process to be restarted");
                }
            }
            PoolNotice::Restarted { id, pid, .. } => {
                tokio::spawn(async move { self.resume(&id, pid).await });
            }
        }
    }

    /// Rediscover tools on a restarted process.
    ///
    /// Applies to connections lost to the previous process and to ones still
    /// marked connected on an older pid.
    async fn resume(&self, server_id: &str, pid: u32) {
        if self.is_shutting_down() {
            return;
        }

        let lock = self.lock_for(server_id);
        let _guard = lock.lock().await;

        let stale = self
            .connections
            .read()
            .await
            .get(server_id)
            .is_some_and(|c| {
                c.pid.is_some()
                    && (c.state == ConnectionState::Error
                        || (c.is_connected() && c.pid != Some(pid)))
            });
        if !stale {
            return;
        }

        if !self.process_alive(server_id, pid) {
            return;
        }
        let Some(channel) = self.pool.get(server_id).and_then(|p| p.channel()) else {
            return;
        };

        match self
            .bounded(
                server_id,
                "discover_tools",
                self.protocol.discover_tools(server_id, &channel),
            )
            .await
        {
            Ok(tools) => {
                let tool_count = tools.len();
                self.update(server_id, |conn| conn.mark_connected(pid, tools))
                    .await;
                info!(server_id = %server_id, pid, tool_count, "Server reconnected after restart");
                self.emitter
                    .emit(AppEvent::server_connected(server_id, tool_count));
            }
            Err(e) => {
                warn!(server_id = %server_id, error = %e, "Rediscovery after restart failed");
                self.update(server_id, |conn| conn.mark_error(e.to_string()))
                    .await;
                self.emitter
                    .emit(AppEvent::server_error(server_id, e.to_string()));
            }
        }
    }
}

/// Pool process spec for a server.
///
/// `retries` becomes the restart budget; the child gets the effective PATH
/// unless the config sets one explicitly.
fn process_spec_for(config: &ServerConfig) -> Result<ProcessSpec, ConnectionError> {
    let search_path = build_effective_path(&config.command, config.path_extra.as_deref());
    let program = resolve_command(&config.command, &search_path, config.working_dir.as_deref())
        .ok_or_else(|| ConnectionError::CommandNotFound {
            server_id: config.id.clone(),
            command: config.command.clone(),
        })?;

    let mut spec = ProcessSpec::new(&config.id, program.to_string_lossy())
        .with_args(config.args.iter().cloned())
        .with_startup_timeout(config.timeout());
    spec.env.clone_from(&config.env);
    if !spec.env.contains_key("PATH") {
        spec = spec.with_env("PATH", search_path.to_string_lossy());
    }
    if let Some(dir) = &config.working_dir {
        spec = spec.with_working_dir(dir.clone());
    }
    if config.retries > 0 {
        spec = spec.with_restarts(config.retries);
    }
    Ok(spec)
}

/// Forward pool exit notices to the manager until either side goes away.
async fn watch_pool(manager: Weak<ConnectionManager>, mut notices: broadcast::Receiver<PoolNotice>) {
    loop {
        let notice = match notices.recv().await {
            Ok(notice) => notice,
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Missed pool notices, re-checking connections");
                let Some(manager) = manager.upgrade() else {
                    break;
                };
                manager.reconcile().await;
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        let Some(manager) = manager.upgrade() else {
            break;
        };
        manager.on_pool_notice(notice).await;
    }
    debug!("Pool watcher stopped");
}
