//! Supervisor settings and validation.
//!
//! All fields are optional so a partial JSON document or a handful of
//! environment variables can override the defaults.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::ReusePolicy;

/// Default grace period between SIGTERM and forced kill.
pub const DEFAULT_GRACE_PERIOD_MS: u64 = 2_000;

/// Default interval of the background health sweep.
pub const DEFAULT_HEALTH_SWEEP_SECS: u64 = 30;

/// Default pause before an automatic restart.
pub const DEFAULT_RESTART_COOLDOWN_MS: u64 = 1_000;

/// Default bound on discovery and tool calls.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

/// Default bound on the orphan cleanup sweep at shutdown.
pub const DEFAULT_CLEANUP_TIMEOUT_MS: u64 = 5_000;

pub const ENV_GRACE_PERIOD_MS: &str = "TOOLHOST_GRACE_PERIOD_MS";
pub const ENV_HEALTH_SWEEP_SECS: &str = "TOOLHOST_HEALTH_SWEEP_SECS";
pub const ENV_RESTART_COOLDOWN_MS: &str = "TOOLHOST_RESTART_COOLDOWN_MS";
pub const ENV_REQUEST_TIMEOUT_MS: &str = "TOOLHOST_REQUEST_TIMEOUT_MS";
pub const ENV_CLEANUP_TIMEOUT_MS: &str = "TOOLHOST_CLEANUP_TIMEOUT_MS";
pub const ENV_DATA_DIR: &str = "TOOLHOST_DATA_DIR";

/// Supervisor settings structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SupervisorSettings {
    /// Time a process gets to exit after SIGTERM before it is killed.
    pub grace_period_ms: Option<u64>,

    /// Interval of the background health sweep (1-3600).
    pub health_sweep_secs: Option<u64>,

    /// Pause before each automatic restart.
    pub restart_cooldown_ms: Option<u64>,

    /// Bound on tool discovery and tool calls.
    pub request_timeout_ms: Option<u64>,

    /// Bound on the orphan cleanup sweep at shutdown.
    pub cleanup_timeout_ms: Option<u64>,

    /// Process-name fragments the cleanup sweep treats as ours.
    pub cleanup_patterns: Option<Vec<String>>,

    /// When a pooled process may be reused.
    pub reuse_policy: Option<ReusePolicy>,

    /// Fail orchestrator initialization if any enabled server fails to connect.
    pub require_all_servers: Option<bool>,

    /// Data directory created by the infrastructure phase.
    pub data_dir: Option<String>,
}

impl SupervisorSettings {
    /// Create settings with sensible defaults.
    #[must_use]
    pub const fn with_defaults() -> Self {
        Self {
            grace_period_ms: Some(DEFAULT_GRACE_PERIOD_MS),
            health_sweep_secs: Some(DEFAULT_HEALTH_SWEEP_SECS),
            restart_cooldown_ms: Some(DEFAULT_RESTART_COOLDOWN_MS),
            request_timeout_ms: Some(DEFAULT_REQUEST_TIMEOUT_MS),
            cleanup_timeout_ms: Some(DEFAULT_CLEANUP_TIMEOUT_MS),
            cleanup_patterns: None,
            reuse_policy: Some(ReusePolicy::ProcessAlive),
            require_all_servers: Some(false),
            data_dir: None,
        }
    }

    #[must_use]
    pub const fn effective_grace_period(&self) -> Duration {
        Duration::from_millis(match self.grace_period_ms {
            Some(ms) => ms,
            None => DEFAULT_GRACE_PERIOD_MS,
        })
    }

    #[must_use]
    pub const fn effective_health_sweep_interval(&self) -> Duration {
        Duration::from_secs(match self.health_sweep_secs {
            Some(secs) => secs,
            None => DEFAULT_HEALTH_SWEEP_SECS,
        })
    }

    #[must_use]
    pub const fn effective_restart_cooldown(&self) -> Duration {
        Duration::from_millis(match self.restart_cooldown_ms {
            Some(ms) => ms,
            None => DEFAULT_RESTART_COOLDOWN_MS,
        })
    }

    #[must_use]
    pub const fn effective_request_timeout(&self) -> Duration {
        Duration::from_millis(match self.request_timeout_ms {
            Some(ms) => ms,
            None => DEFAULT_REQUEST_TIMEOUT_MS,
        })
    }

    #[must_use]
    pub const fn effective_cleanup_timeout(&self) -> Duration {
        Duration::from_millis(match self.cleanup_timeout_ms {
            Some(ms) => ms,
            None => DEFAULT_CLEANUP_TIMEOUT_MS,
        })
    }

    #[must_use]
    pub fn effective_reuse_policy(&self) -> ReusePolicy {
        self.reuse_policy.unwrap_or_default()
    }

    #[must_use]
    pub fn effective_require_all_servers(&self) -> bool {
        self.require_all_servers.unwrap_or(false)
    }

    /// Apply `TOOLHOST_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<(), SettingsError> {
        self.apply_overrides_from(|key| std::env::var(key).ok())?;
        tracing::debug!(settings = ?self, "Applied environment overrides");
        Ok(())
    }

    /// Apply `TOOLHOST_*` overrides from an arbitrary lookup.
    ///
    /// Unset keys leave the field untouched; unparsable values are an error.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<(), SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let parse = |key: &'static str| -> Result<Option<u64>, SettingsError> {
            lookup(key)
                .map(|raw| {
                    raw.trim()
                        .parse::<u64>()
                        .map_err(|_| SettingsError::InvalidEnvValue { key, value: raw })
                })
                .transpose()
        };

        if let Some(v) = parse(ENV_GRACE_PERIOD_MS)? {
            self.grace_period_ms = Some(v);
        }
        if let Some(v) = parse(ENV_HEALTH_SWEEP_SECS)? {
            self.health_sweep_secs = Some(v);
        }
        if let Some(v) = parse(ENV_RESTART_COOLDOWN_MS)? {
            self.restart_cooldown_ms = Some(v);
        }
        if let Some(v) = parse(ENV_REQUEST_TIMEOUT_MS)? {
            self.request_timeout_ms = Some(v);
        }
        if let Some(v) = parse(ENV_CLEANUP_TIMEOUT_MS)? {
            self.cleanup_timeout_ms = Some(v);
        }
        if let Some(dir) = lookup(ENV_DATA_DIR) {
            self.data_dir = Some(dir);
        }
        Ok(())
    }
}

/// Settings validation error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SettingsError {
    #[error("Grace period must be between 100 and 60,000 ms, got {0}")]
    InvalidGracePeriod(u64),

    #[error("Health sweep interval must be between 1 and 3600 seconds, got {0}")]
    InvalidSweepInterval(u64),

    #[error("Restart cooldown must be at most 60,000 ms, got {0}")]
    InvalidRestartCooldown(u64),

    #[error("Request timeout must be between 100 and 600,000 ms, got {0}")]
    InvalidRequestTimeout(u64),

    #[error("Cleanup timeout must be between 100 and 60,000 ms, got {0}")]
    InvalidCleanupTimeout(u64),

    #[error("Data directory cannot be empty")]
    EmptyDataDir,

    #[error("Invalid value for {key}: '{value}'")]
    InvalidEnvValue { key: &'static str, value: String },
}

/// Validate settings values.
pub fn validate_settings(settings: &SupervisorSettings) -> Result<(), SettingsError> {
    if let Some(ms) = settings.grace_period_ms {
        if !(100..=60_000).contains(&ms) {
            return Err(SettingsError::InvalidGracePeriod(ms));
        }
    }

    if let Some(secs) = settings.health_sweep_secs {
        if !(1..=3600).contains(&secs) {
            return Err(SettingsError::InvalidSweepInterval(secs));
        }
    }

    if let Some(ms) = settings.restart_cooldown_ms {
        if ms > 60_000 {
            return Err(SettingsError::InvalidRestartCooldown(ms));
        }
    }

    if let Some(ms) = settings.request_timeout_ms {
        if !(100..=600_000).contains(&ms) {
            return Err(SettingsError::InvalidRequestTimeout(ms));
        }
    }

    if let Some(ms) = settings.cleanup_timeout_ms {
        if !(100..=60_000).contains(&ms) {
            return Err(SettingsError::InvalidCleanupTimeout(ms));
        }
    }

    if settings
        .data_dir
        .as_ref()
        .is_some_and(|p| p.trim().is_empty())
    {
        return Err(SettingsError::EmptyDataDir);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_settings() {
        let settings = SupervisorSettings::with_defaults();
        assert_eq!(settings.grace_period_ms, Some(DEFAULT_GRACE_PERIOD_MS));
        assert_eq!(settings.effective_health_sweep_interval(), Duration::from_secs(30));
        assert_eq!(settings.effective_reuse_policy(), ReusePolicy::ProcessAlive);
        assert!(!settings.effective_require_all_servers());
        assert!(validate_settings(&settings).is_ok());
    }

    #[test]
    fn test_effective_values_fall_back_to_defaults() {
        let settings = SupervisorSettings::default();
        assert_eq!(settings.effective_grace_period(), Duration::from_millis(2_000));
        assert_eq!(settings.effective_request_timeout(), Duration::from_secs(30));
        assert_eq!(settings.effective_cleanup_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_validate_grace_period_too_small() {
        let settings = SupervisorSettings {
            grace_period_ms: Some(10),
            ..Default::default()
        };
        assert!(matches!(
            validate_settings(&settings),
            Err(SettingsError::InvalidGracePeriod(10))
        ));
    }

    #[test]
    fn test_validate_sweep_interval_zero() {
        let settings = SupervisorSettings {
            health_sweep_secs: Some(0),
            ..Default::default()
        };
        assert!(matches!(
            validate_settings(&settings),
            Err(SettingsError::InvalidSweepInterval(0))
        ));
    }

    #[test]
    fn test_validate_empty_data_dir() {
        let settings = SupervisorSettings {
            data_dir: Some("  ".to_string()),
            ..Default::default()
        };
        assert_eq!(validate_settings(&settings), Err(SettingsError::EmptyDataDir));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_GRACE_PERIOD_MS, "500"),
            (ENV_REQUEST_TIMEOUT_MS, " 1500 "),
            (ENV_DATA_DIR, "/tmp/toolhost"),
        ]);
        let mut settings = SupervisorSettings::with_defaults();
        settings
            .apply_overrides_from(|key| env.get(key).map(ToString::to_string))
            .unwrap();

        assert_eq!(settings.grace_period_ms, Some(500));
        assert_eq!(settings.request_timeout_ms, Some(1500));
        assert_eq!(settings.data_dir.as_deref(), Some("/tmp/toolhost"));
        assert_eq!(settings.health_sweep_secs, Some(DEFAULT_HEALTH_SWEEP_SECS));
    }

    #[test]
    fn test_env_override_rejects_garbage() {
        let mut settings = SupervisorSettings::with_defaults();
        let err = settings
            .apply_overrides_from(|key| (key == ENV_HEALTH_SWEEP_SECS).then(|| "soon".to_string()))
            .unwrap_err();
        assert!(matches!(
            err,
            SettingsError::InvalidEnvValue {
                key: ENV_HEALTH_SWEEP_SECS,
                ..
            }
        ));
    }

    #[test]
    fn test_settings_deserialize_partial() {
        let settings: SupervisorSettings =
            serde_json::from_str(r#"{"grace_period_ms": 750, "reuse_policy": "protocol_ping"}"#)
                .unwrap();
        assert_eq!(settings.grace_period_ms, Some(750));
        assert_eq!(settings.effective_reuse_policy(), ReusePolicy::ProtocolPing);
        assert_eq!(settings.health_sweep_secs, None);
    }
}
