#![doc = include_str!(concat!(env!("OUT_DIR"), "/README_GENERATED.md"))]
#![deny(unsafe_code)]
#![deny(unused_crate_dependencies)]

// Used by main.rs only
use dotenvy as _;
use tracing_subscriber as _;

pub mod bootstrap;
pub mod commands;
pub mod config;
pub mod error;
pub mod handlers;
pub mod parser;
pub mod presentation;
pub mod protocol;

pub use bootstrap::{CliContext, bootstrap, build_orchestrator};
pub use commands::Commands;
pub use config::{CliConfig, ConfigFile};
pub use error::CliError;
pub use parser::Cli;
pub use protocol::NoopProtocol;
