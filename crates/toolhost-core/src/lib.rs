#![doc = include_str!(concat!(env!("OUT_DIR"), "/README_GENERATED.md"))]
#![deny(unused_crate_dependencies)]

pub mod domain;
pub mod events;
pub mod paths;
pub mod ports;
pub mod settings;

// Re-export commonly used types for convenience
pub use domain::{
    ConnectionInfo, ConnectionState, ExitInfo, ProcessInfo, ProcessSpec, ProcessState,
    ReusePolicy, ServerConfig, ServerConfigError, ServiceState, ServiceStatus, StdioMode, Tool,
    ToolResult,
};
pub use events::AppEvent;
pub use ports::{
    AppEventEmitter, LogStream, NoopEmitter, ProcessChannel, ProcessLogSinkPort, ProcessProbe,
    ProtocolError, ToolProtocol,
};
pub use settings::{SettingsError, SupervisorSettings, validate_settings};

// Re-export path utilities
pub use paths::{
    DirectoryCreationStrategy, PathError, data_root, ensure_directory, resolve_data_dir,
    verify_writable,
};
