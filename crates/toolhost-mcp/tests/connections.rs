//! Connection manager against real helper processes.
//!
//! `cat` stands in for a server: the test protocol writes a line and reads
//! the echo back.

#![cfg(unix)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use toolhost_core::{
    AppEvent, AppEventEmitter, ConnectionState, ProcessChannel, ProtocolError, ReusePolicy,
    ServerConfig, Tool, ToolProtocol, ToolResult,
};
use toolhost_mcp::{ConnectionError, ConnectionManager, ConnectionSettings};
use toolhost_runtime::shutdown::kill_pid;
use toolhost_runtime::{PoolConfig, ProcessPool};

#[derive(Clone, Default)]
struct RecordingEmitter {
    events: Arc<Mutex<Vec<AppEvent>>>,
}

impl RecordingEmitter {
    fn count(&self, name: &str) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.event_name() == name)
            .count()
    }
}

impl AppEventEmitter for RecordingEmitter {
    fn emit(&self, event: AppEvent) {
        self.events.lock().unwrap().push(event);
    }

    fn clone_box(&self) -> Box<dyn AppEventEmitter> {
        Box::new(self.clone())
    }
}

/// Line protocol over an echoing process.
#[derive(Default)]
struct EchoProtocol {
    discoveries: AtomicUsize,
}

#[async_trait]
impl ToolProtocol for EchoProtocol {
    async fn discover_tools(
        &self,
        _server_id: &str,
        channel: &ProcessChannel,
    ) -> Result<Vec<Tool>, ProtocolError> {
        self.discoveries.fetch_add(1, Ordering::SeqCst);
        let answer = channel.request("tools").await?;
        if answer != "tools" {
            return Err(ProtocolError::Malformed(answer));
        }
        Ok(vec![Tool::new("echo").with_description("Echo the arguments")])
    }

    async fn call_tool(
        &self,
        _server_id: &str,
        channel: &ProcessChannel,
        tool_name: &str,
        arguments: Value,
    ) -> Result<ToolResult, ProtocolError> {
        if tool_name != "echo" {
            return Ok(ToolResult::error(format!("unknown tool {tool_name}")));
        }
        let answer = channel.request(&arguments.to_string()).await?;
        let data = serde_json::from_str(&answer)
            .map_err(|e| ProtocolError::Malformed(e.to_string()))?;
        Ok(ToolResult::success(data))
    }
}

/// Discovery that always fails with a server error.
struct FailingProtocol;

#[async_trait]
impl ToolProtocol for FailingProtocol {
    async fn discover_tools(
        &self,
        _server_id: &str,
        _channel: &ProcessChannel,
    ) -> Result<Vec<Tool>, ProtocolError> {
        Err(ProtocolError::Remote {
            code: -32601,
            message: "method not found".to_string(),
        })
    }

    async fn call_tool(
        &self,
        _server_id: &str,
        _channel: &ProcessChannel,
        _tool_name: &str,
        _arguments: Value,
    ) -> Result<ToolResult, ProtocolError> {
        Err(ProtocolError::Unsupported("call_tool".to_string()))
    }
}

/// Discovery that never answers.
struct SilentProtocol;

#[async_trait]
impl ToolProtocol for SilentProtocol {
    async fn discover_tools(
        &self,
        _server_id: &str,
        _channel: &ProcessChannel,
    ) -> Result<Vec<Tool>, ProtocolError> {
        std::future::pending().await
    }

    async fn call_tool(
        &self,
        _server_id: &str,
        _channel: &ProcessChannel,
        _tool_name: &str,
        _arguments: Value,
    ) -> Result<ToolResult, ProtocolError> {
        std::future::pending().await
    }
}

/// Discovery that takes a while and never touches the channel; calls echo.
struct SlowProtocol {
    echo: EchoProtocol,
}

impl SlowProtocol {
    fn new() -> Self {
        Self {
            echo: EchoProtocol::default(),
        }
    }
}

#[async_trait]
impl ToolProtocol for SlowProtocol {
    async fn discover_tools(
        &self,
        _server_id: &str,
        _channel: &ProcessChannel,
    ) -> Result<Vec<Tool>, ProtocolError> {
        tokio::time::sleep(Duration::from_millis(300)).await;
        Ok(vec![Tool::new("echo")])
    }

    async fn call_tool(
        &self,
        server_id: &str,
        channel: &ProcessChannel,
        tool_name: &str,
        arguments: Value,
    ) -> Result<ToolResult, ProtocolError> {
        self.echo
            .call_tool(server_id, channel, tool_name, arguments)
            .await
    }
}

fn pool_config() -> PoolConfig {
    PoolConfig {
        grace_period: Duration::from_millis(500),
        reap_timeout: Duration::from_secs(5),
        health_sweep_interval: Duration::from_secs(3600),
        restart_cooldown: Duration::from_millis(50),
        cleanup_timeout: Duration::from_secs(2),
        cleanup_patterns: Vec::new(),
        reuse_policy: ReusePolicy::ProcessAlive,
    }
}

fn manager_with(
    protocol: Arc<dyn ToolProtocol>,
    request_timeout: Duration,
) -> (Arc<ConnectionManager>, RecordingEmitter) {
    let emitter = RecordingEmitter::default();
    let pool = ProcessPool::new(pool_config(), Arc::new(emitter.clone()));
    let manager = ConnectionManager::new(
        pool,
        protocol,
        Arc::new(emitter.clone()),
        ConnectionSettings { request_timeout },
    );
    (manager, emitter)
}

fn echo_manager() -> (Arc<ConnectionManager>, RecordingEmitter) {
    manager_with(Arc::new(EchoProtocol::default()), Duration::from_secs(5))
}

fn echo_server() -> ServerConfig {
    ServerConfig::new("echo", "cat")
        .with_name("Echo")
        .with_timeout_ms(5000)
        .with_retries(0)
}

async fn wait_for_state(
    manager: &ConnectionManager,
    server_id: &str,
    state: ConnectionState,
) -> bool {
    for _ in 0..250 {
        if manager
            .info(server_id)
            .await
            .is_some_and(|info| info.state == state)
        {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

#[tokio::test]
async fn connect_discovers_tools() {
    let (manager, emitter) = echo_manager();

    let info = manager.connect(echo_server()).await.unwrap();

    assert_eq!(info.state, ConnectionState::Connected);
    assert_eq!(info.name, "Echo");
    assert_eq!(info.tools.len(), 1);
    assert_eq!(info.tools[0].name, "echo");
    assert!(info.pid.is_some());
    assert_eq!(manager.list_connected().await.len(), 1);
    assert_eq!(emitter.count("server:connected"), 1);

    manager.shutdown().await;
}

#[tokio::test]
async fn connect_is_idempotent() {
    let (manager, emitter) = echo_manager();

    let first = manager.connect(echo_server()).await.unwrap();
    let second = manager.connect(echo_server()).await.unwrap();

    assert_eq!(first.pid, second.pid);
    assert_eq!(emitter.count("server:connected"), 1);
    assert_eq!(manager.pool().list().len(), 1);

    manager.shutdown().await;
}

#[tokio::test]
async fn call_tool_round_trips_arguments() {
    let (manager, _emitter) = echo_manager();
    manager.connect(echo_server()).await.unwrap();

    let result = manager
        .call_tool("echo", "echo", json!({ "text": "hello" }))
        .await
        .unwrap();
    assert!(result.success);
    assert_eq!(result.data, Some(json!({ "text": "hello" })));

    let unknown = manager.call_tool("echo", "nope", json!({})).await.unwrap();
    assert!(!unknown.success);

    manager.shutdown().await;
}

#[tokio::test]
async fn discover_tools_refreshes_cache() {
    let protocol = Arc::new(EchoProtocol::default());
    let (manager, _emitter) = manager_with(protocol.clone(), Duration::from_secs(5));
    manager.connect(echo_server()).await.unwrap();

    let tools = manager.discover_tools("echo").await.unwrap();
    assert_eq!(tools.len(), 1);
    assert_eq!(protocol.discoveries.load(Ordering::SeqCst), 2);

    let all = manager.all_tools().await;
    assert_eq!(all, vec![("echo".to_string(), tools)]);

    manager.shutdown().await;
}

#[tokio::test]
async fn calls_to_unknown_server_are_not_connected() {
    let (manager, _emitter) = echo_manager();

    let err = manager.call_tool("missing", "echo", json!({})).await.unwrap_err();
    assert!(err.is_not_connected());
    assert!(manager.discover_tools("missing").await.unwrap_err().is_not_connected());
}

#[tokio::test]
async fn call_tool_after_external_kill_is_not_connected() {
    let (manager, emitter) = echo_manager();
    let info = manager.connect(echo_server()).await.unwrap();

    kill_pid(info.pid.unwrap()).await.unwrap();

    let err = manager
        .call_tool("echo", "echo", json!({ "text": "hi" }))
        .await
        .unwrap_err();
    assert!(err.is_not_connected(), "unexpected error: {err}");

    assert!(wait_for_state(&manager, "echo", ConnectionState::Error).await);
    assert!(manager.list_connected().await.is_empty());
    assert!(emitter.count("server:error") >= 1);

    manager.shutdown().await;
}

#[tokio::test]
async fn process_loss_is_noticed_without_a_call() {
    let (manager, _emitter) = echo_manager();
    let info = manager.connect(echo_server()).await.unwrap();

    kill_pid(info.pid.unwrap()).await.unwrap();

    assert!(wait_for_state(&manager, "echo", ConnectionState::Error).await);
    let info = manager.info("echo").await.unwrap();
    assert!(info.last_error.unwrap().contains("exited"));

    manager.shutdown().await;
}

#[tokio::test]
async fn failed_discovery_leaves_error_and_no_process() {
    let (manager, emitter) = manager_with(Arc::new(FailingProtocol), Duration::from_secs(5));

    let err = manager.connect(echo_server()).await.unwrap_err();
    assert!(matches!(
        err,
        ConnectionError::Protocol {
            source: ProtocolError::Remote { code: -32601, .. },
            ..
        }
    ));

    let info = manager.info("echo").await.unwrap();
    assert_eq!(info.state, ConnectionState::Error);
    assert!(info.last_error.unwrap().contains("method not found"));
    assert!(manager.pool().get("echo").is_none());
    assert_eq!(emitter.count("server:error"), 1);

    manager.shutdown().await;
}

#[tokio::test]
async fn exit_during_discovery_fails_connect() {
    let (manager, emitter) = manager_with(Arc::new(SlowProtocol::new()), Duration::from_secs(5));
    let config = ServerConfig::new("quitter", "sh").with_args(["-c", "exit 3"]);

    let err = manager.connect(config).await.unwrap_err();
    assert!(matches!(err, ConnectionError::ProcessExited(ref id) if id == "quitter"));

    let info = manager.info("quitter").await.unwrap();
    assert_eq!(info.state, ConnectionState::Error);
    assert!(manager.list_connected().await.is_empty());
    assert!(
        manager
            .pool()
            .get("quitter")
            .is_none_or(|p| !p.is_alive())
    );
    assert_eq!(emitter.count("server:connected"), 0);

    manager.shutdown().await;
}

#[tokio::test]
async fn connect_binds_to_process_restarted_during_discovery() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("started-once");
    let (manager, _emitter) = manager_with(Arc::new(SlowProtocol::new()), Duration::from_secs(5));

    // First run exits with an error; the restart becomes `cat`.
    let config = ServerConfig::new("flaky", "sh")
        .with_args([
            "-c".to_string(),
            r#"if [ -f "$1" ]; then exec cat; else touch "$1"; exit 1; fi"#.to_string(),
            "sh".to_string(),
            marker.to_string_lossy().into_owned(),
        ])
        .with_retries(1);

    let info = manager.connect(config).await.unwrap();
    assert_eq!(info.state, ConnectionState::Connected);

    let process = manager.pool().get("flaky").unwrap();
    assert!(process.is_alive());
    assert_eq!(info.pid, Some(process.pid()));
    assert_eq!(process.restart_count(), 1);

    let result = manager
        .call_tool("flaky", "echo", json!({"ok": true}))
        .await
        .unwrap();
    assert_eq!(result.data, Some(json!({"ok": true})));
    assert_eq!(
        manager.info("flaky").await.unwrap().state,
        ConnectionState::Connected
    );

    manager.shutdown().await;
}

#[tokio::test]
async fn silent_server_times_out() {
    let (manager, _emitter) = manager_with(Arc::new(SilentProtocol), Duration::from_millis(200));

    let err = manager.connect(echo_server()).await.unwrap_err();
    assert!(matches!(
        err,
        ConnectionError::Timeout {
            operation: "discover_tools",
            timeout_ms: 200,
            ..
        }
    ));
    assert_eq!(
        manager.info("echo").await.unwrap().state,
        ConnectionState::Error
    );

    manager.shutdown().await;
}

#[tokio::test]
async fn invalid_config_is_rejected_before_spawning() {
    let (manager, _emitter) = echo_manager();

    let err = manager
        .connect(ServerConfig::new("bad", "cat -n"))
        .await
        .unwrap_err();
    assert!(matches!(err, ConnectionError::InvalidConfig(_)));
    assert_eq!(
        manager.info("bad").await.unwrap().state,
        ConnectionState::Error
    );

    let err = manager
        .connect(ServerConfig::new("ghost", "definitely-not-a-real-binary-7f3a"))
        .await
        .unwrap_err();
    assert!(matches!(err, ConnectionError::CommandNotFound { .. }));
    assert!(manager.pool().list().is_empty());
}

#[tokio::test]
async fn disconnect_then_reconnect() {
    let (manager, emitter) = echo_manager();
    let first = manager.connect(echo_server()).await.unwrap();

    manager.disconnect("echo").await.unwrap();
    assert!(manager.info("echo").await.is_none());
    assert!(manager.pool().get("echo").is_none());
    assert_eq!(emitter.count("server:disconnected"), 1);

    // Unknown ids are a no-op.
    manager.disconnect("echo").await.unwrap();
    assert_eq!(emitter.count("server:disconnected"), 1);

    let second = manager.connect(echo_server()).await.unwrap();
    assert_eq!(second.state, ConnectionState::Connected);
    assert_ne!(first.pid, second.pid);

    manager.shutdown().await;
}

#[tokio::test]
async fn error_state_can_reconnect() {
    let (manager, _emitter) = echo_manager();
    let info = manager.connect(echo_server()).await.unwrap();
    kill_pid(info.pid.unwrap()).await.unwrap();
    assert!(wait_for_state(&manager, "echo", ConnectionState::Error).await);

    let again = manager.connect(echo_server()).await.unwrap();
    assert_eq!(again.state, ConnectionState::Connected);
    assert_ne!(again.pid, info.pid);

    manager.shutdown().await;
}

#[tokio::test]
async fn restarted_process_is_reconnected() {
    let (manager, _emitter) = echo_manager();
    let info = manager
        .connect(echo_server().with_retries(1))
        .await
        .unwrap();
    let old_pid = info.pid.unwrap();

    kill_pid(old_pid).await.unwrap();

    let mut resumed = None;
    for _ in 0..250 {
        if let Some(current) = manager.info("echo").await {
            if current.state == ConnectionState::Connected && current.pid != Some(old_pid) {
                resumed = Some(current);
                break;
            }
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let resumed = resumed.expect("connection did not resume after restart");
    assert_eq!(resumed.tools.len(), 1);

    let result = manager
        .call_tool("echo", "echo", json!([1, 2, 3]))
        .await
        .unwrap();
    assert_eq!(result.data, Some(json!([1, 2, 3])));

    manager.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn shutdown_disconnects_everything() {
    let (manager, emitter) = echo_manager();
    let (a, b) = tokio::join!(
        manager.connect(ServerConfig::new("a", "cat")),
        manager.connect(ServerConfig::new("b", "cat"))
    );
    a.unwrap();
    b.unwrap();

    manager.shutdown().await;

    assert!(manager.list_all().await.is_empty());
    assert!(manager.pool().list().is_empty());
    assert_eq!(emitter.count("server:disconnected"), 2);
    assert!(matches!(
        manager.connect(echo_server()).await,
        Err(ConnectionError::ShuttingDown)
    ));
}
