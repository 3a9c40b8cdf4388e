//! Check command handler.
//!
//! Validates settings and server descriptors without starting anything.

use anyhow::Result;
use toolhost_core::ServerConfig;
use toolhost_mcp::path::{build_effective_path, resolve_command};

use crate::config::CliConfig;
use crate::error::CliError;

/// Outcome of checking one server descriptor.
#[derive(Debug, PartialEq, Eq)]
pub enum ServerCheck {
    Ok { id: String, program: String },
    Disabled { id: String },
    CommandNotFound { id: String, command: String },
    Invalid { id: String, reason: String },
}

impl ServerCheck {
    pub fn of(server: &ServerConfig) -> Self {
        if let Err(e) = server.validate() {
            return Self::Invalid {
                id: server.id.clone(),
                reason: e.to_string(),
            };
        }
        if !server.enabled {
            return Self::Disabled {
                id: server.id.clone(),
            };
        }

        let search = build_effective_path(&server.command, server.path_extra.as_deref());
        match resolve_command(&server.command, &search, server.working_dir.as_deref()) {
            Some(program) => Self::Ok {
                id: server.id.clone(),
                program: program.display().to_string(),
            },
            None => Self::CommandNotFound {
                id: server.id.clone(),
                command: server.command.clone(),
            },
        }
    }

    /// Whether this outcome fails the check.
    pub const fn is_failure(&self, strict: bool) -> bool {
        match self {
            Self::Ok { .. } | Self::Disabled { .. } => false,
            Self::CommandNotFound { .. } => strict,
            Self::Invalid { .. } => true,
        }
    }
}

/// Execute the check command.
///
/// Missing executables are reported but only fail the check with `strict`;
/// they may appear on PATH by the time the server is started.
pub fn execute(config: &CliConfig, strict: bool) -> Result<()> {
    if let Some(source) = &config.source {
        println!("config   = {}", source.display());
    }
    config.orchestrator.validate().map_err(CliError::from)?;
    println!("settings = ok");

    let checks: Vec<ServerCheck> = config.orchestrator.servers.iter().map(ServerCheck::of).collect();
    for check in &checks {
        match check {
            ServerCheck::Ok { id, program } => println!("{id}: ok ({program})"),
            ServerCheck::Disabled { id } => println!("{id}: disabled"),
            ServerCheck::CommandNotFound { id, command } => {
                println!("{id}: command '{command}' not found on PATH");
            }
            ServerCheck::Invalid { id, reason } => println!("{id}: invalid: {reason}"),
        }
    }

    let failures = checks.iter().filter(|c| c.is_failure(strict)).count();
    if failures > 0 {
        return Err(CliError::Config(format!("{failures} server(s) failed the check")).into());
    }
    println!("{} server(s) checked", checks.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_descriptor() {
        let check = ServerCheck::of(&ServerConfig::new("fs", "cat -n"));
        assert!(matches!(check, ServerCheck::Invalid { .. }));
        assert!(check.is_failure(false));
    }

    #[test]
    fn test_missing_command_only_fails_strict() {
        let check = ServerCheck::of(&ServerConfig::new("fs", "toolhost-no-such-binary"));
        assert!(matches!(check, ServerCheck::CommandNotFound { .. }));
        assert!(!check.is_failure(false));
        assert!(check.is_failure(true));
    }

    #[test]
    fn test_disabled_is_not_resolved() {
        let mut server = ServerConfig::new("off", "toolhost-no-such-binary");
        server.enabled = false;
        assert_eq!(
            ServerCheck::of(&server),
            ServerCheck::Disabled {
                id: "off".to_string()
            }
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_command_on_path_is_ok() {
        let check = ServerCheck::of(&ServerConfig::new("sh", "sh"));
        assert!(matches!(check, ServerCheck::Ok { .. }));
    }

    #[test]
    fn test_execute_fails_on_duplicate_ids() {
        let mut config = CliConfig::resolve(None, None, |_| None).unwrap();
        config.orchestrator.servers = vec![
            ServerConfig::new("fs", "cat"),
            ServerConfig::new("fs", "cat"),
        ];
        let err = execute(&config, false).unwrap_err();
        let cli_err = err.downcast_ref::<CliError>().unwrap();
        assert_eq!(cli_err.exit_code(), 78);
    }
}
