#![doc = include_str!(concat!(env!("OUT_DIR"), "/README_GENERATED.md"))]
#![deny(unsafe_code)]
#![deny(unused_crate_dependencies)]

pub(crate) mod connection;
pub mod error;
pub mod manager;
pub mod path;
pub(crate) mod probe;

// Re-export domain types from core for convenience
pub use toolhost_core::{
    ConnectionInfo, ConnectionState, ServerConfig, Tool, ToolProtocol, ToolResult,
};

// Re-export this crate's public types
pub use error::ConnectionError;
pub use manager::{ConnectionManager, ConnectionSettings};
pub use probe::ProtocolProbe;
