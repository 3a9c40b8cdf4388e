//! Domain types shared across the supervisor, connection and orchestration layers.
//!
//! These are pure data types with no infrastructure dependencies.

mod process;
mod server;
mod service;
mod tool;

pub use process::{
    DEFAULT_STARTUP_TIMEOUT_MS, ExitInfo, ProcessInfo, ProcessSpec, ProcessState, ReusePolicy,
    StdioMode,
};
pub use server::{
    ConnectionInfo, ConnectionState, DEFAULT_SERVER_TIMEOUT_MS, MAX_SERVER_RETRIES, ServerConfig,
    ServerConfigError,
};
pub use service::{ServiceState, ServiceStatus};
pub use tool::{Tool, ToolResult};
