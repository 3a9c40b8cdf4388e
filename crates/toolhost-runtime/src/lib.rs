#![doc = include_str!(concat!(env!("OUT_DIR"), "/README_GENERATED.md"))]
#![deny(unsafe_code)]

pub mod broadcaster;
pub mod logs;
pub mod pool;
pub mod shutdown;
mod stream;

pub use broadcaster::EventBroadcaster;
pub use logs::{MAX_LOG_LINES, ProcessLogEntry, ProcessLogManager};
pub use pool::{ManagedProcess, PoolConfig, PoolError, PoolNotice, ProcessPool};
