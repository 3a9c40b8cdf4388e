//! Subcommand definitions.

use clap::Subcommand;

#[derive(Subcommand)]
pub enum Commands {
    /// Validate settings and server descriptors without starting anything
    Check {
        /// Also fail when a server's command cannot be found on PATH
        #[arg(long)]
        strict: bool,
    },
    /// Start all services, report their status and run until Ctrl-C
    Supervise,
    /// Start all services, print their status as JSON and shut down
    Status,
}
