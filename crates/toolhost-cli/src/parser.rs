//! Main CLI parser and top-level argument handling.

use std::path::PathBuf;

use clap::Parser;

use crate::commands::Commands;

/// Supervise helper tool servers running as local child processes.
#[derive(Parser)]
#[command(name = "toolhost")]
#[command(about = "Supervise local tool servers")]
#[command(version)]
pub struct Cli {
    /// JSON file describing settings and servers
    #[arg(short = 'c', long = "config", global = true, env = "TOOLHOST_CONFIG")]
    pub config: Option<PathBuf>,

    /// Override the data directory for this invocation
    #[arg(long = "data-dir", global = true)]
    pub data_dir: Option<String>,

    /// Enable verbose/debug output
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parser_builds() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from([
            "toolhost",
            "status",
            "--config",
            "servers.json",
            "-v",
        ]);
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("servers.json")));
        assert!(matches!(cli.command, Some(Commands::Status)));
    }

    #[test]
    fn test_check_strict_flag() {
        let cli = Cli::parse_from(["toolhost", "check", "--strict"]);
        assert!(matches!(cli.command, Some(Commands::Check { strict: true })));
    }

    #[test]
    fn test_no_subcommand() {
        let cli = Cli::parse_from(["toolhost"]);
        assert!(cli.command.is_none());
        assert!(!cli.verbose);
    }
}
