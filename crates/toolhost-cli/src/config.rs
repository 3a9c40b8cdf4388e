//! Configuration file loading.
//!
//! Precedence, lowest first: defaults, the JSON file, `TOOLHOST_*`
//! environment variables, command-line flags.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use toolhost_bootstrap::OrchestratorConfig;
use toolhost_core::{ServerConfig, SupervisorSettings};

use crate::error::CliError;

/// On-disk configuration document.
///
/// ```json
/// {
///   "settings": { "grace_period_ms": 2000 },
///   "servers": [{ "id": "fs", "command": "fs-server", "args": ["--root", "."] }]
/// }
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub settings: SupervisorSettings,
    pub servers: Vec<ServerConfig>,
    pub directories: Vec<PathBuf>,
}

impl ConfigFile {
    pub fn parse(text: &str) -> Result<Self, CliError> {
        serde_json::from_str(text).map_err(|e| CliError::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self, CliError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| CliError::Io(format!("{}: {e}", path.display())))?;
        Self::parse(&text).map_err(|e| match e {
            CliError::Config(msg) => CliError::Config(format!("{}: {msg}", path.display())),
            other => other,
        })
    }
}

/// Fully resolved configuration for one CLI invocation.
#[derive(Debug, Clone)]
pub struct CliConfig {
    /// File the configuration was read from, if any.
    pub source: Option<PathBuf>,
    pub orchestrator: OrchestratorConfig,
}

impl CliConfig {
    /// Resolve configuration from the file, the process environment and flags.
    pub fn load(path: Option<&Path>, data_dir: Option<&str>) -> Result<Self, CliError> {
        Self::resolve(path, data_dir, |key| std::env::var(key).ok())
    }

    /// Like [`CliConfig::load`] with an explicit environment lookup.
    pub fn resolve<F>(path: Option<&Path>, data_dir: Option<&str>, lookup: F) -> Result<Self, CliError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let file = path.map(ConfigFile::load).transpose()?.unwrap_or_default();

        let mut settings = file.settings;
        settings
            .apply_overrides_from(lookup)
            .map_err(|e| CliError::Config(e.to_string()))?;
        if let Some(dir) = data_dir {
            settings.data_dir = Some(dir.to_string());
        }

        let orchestrator = OrchestratorConfig {
            settings,
            servers: file.servers,
            directories: file.directories,
        };

        Ok(Self {
            source: path.map(Path::to_path_buf),
            orchestrator,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_parse_minimal_document() {
        let file = ConfigFile::parse(r#"{ "servers": [{ "id": "fs", "command": "cat" }] }"#)
            .unwrap();
        assert_eq!(file.servers.len(), 1);
        assert!(file.servers[0].enabled);
        assert_eq!(file.settings, SupervisorSettings::default());
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        let err = ConfigFile::parse(r#"{ "sever": [] }"#).unwrap_err();
        assert!(matches!(err, CliError::Config(_)));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ConfigFile::load(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, CliError::Io(_)));
    }

    #[test]
    fn test_precedence_file_env_flag() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("toolhost.json");
        std::fs::write(
            &path,
            r#"{ "settings": { "grace_period_ms": 750, "restart_cooldown_ms": 10, "data_dir": "/from/file" } }"#,
        )
        .unwrap();

        let env = |key: &str| match key {
            "TOOLHOST_GRACE_PERIOD_MS" => Some("900".to_string()),
            "TOOLHOST_DATA_DIR" => Some("/from/env".to_string()),
            _ => None,
        };
        let config = CliConfig::resolve(Some(&path), Some("/from/flag"), env).unwrap();
        let settings = &config.orchestrator.settings;

        assert_eq!(settings.grace_period_ms, Some(900));
        assert_eq!(settings.restart_cooldown_ms, Some(10));
        assert_eq!(settings.data_dir.as_deref(), Some("/from/flag"));
        assert_eq!(config.source, Some(path));
    }

    #[test]
    fn test_no_file_means_defaults() {
        let config = CliConfig::resolve(None, None, no_env).unwrap();
        assert!(config.orchestrator.servers.is_empty());
        assert!(config.source.is_none());
    }

    #[test]
    fn test_bad_env_value_is_config_error() {
        let env = |key: &str| (key == "TOOLHOST_GRACE_PERIOD_MS").then(|| "soon".to_string());
        let err = CliConfig::resolve(None, None, env).unwrap_err();
        assert_eq!(err.exit_code(), 78);
    }
}
