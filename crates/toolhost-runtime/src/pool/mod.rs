//! Process pool: spawn, reuse, restart and terminate helper processes.

mod error;
mod managed;
mod manager;
mod spawn;
mod sweep;

use std::time::Duration;

use toolhost_core::settings::SupervisorSettings;
use toolhost_core::{ExitInfo, ReusePolicy};

pub use error::PoolError;
pub use managed::ManagedProcess;
pub use manager::ProcessPool;
pub use sweep::cleanup_orphans;

/// Default bound on reaping a process after a forced kill.
pub const DEFAULT_REAP_TIMEOUT: Duration = Duration::from_secs(5);

/// Resolved pool configuration.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Time between SIGTERM and forced kill.
    pub grace_period: Duration,
    /// Bound on waiting for the reap after a forced kill.
    pub reap_timeout: Duration,
    /// Interval of the background health sweep.
    pub health_sweep_interval: Duration,
    /// Pause before each automatic restart.
    pub restart_cooldown: Duration,
    /// Bound on the orphan cleanup sweep at shutdown.
    pub cleanup_timeout: Duration,
    /// Process-name fragments the cleanup sweep kills. Empty disables it.
    pub cleanup_patterns: Vec<String>,
    /// When an existing entry may be handed out again.
    pub reuse_policy: ReusePolicy,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::from_settings(&SupervisorSettings::with_defaults())
    }
}

impl PoolConfig {
    pub fn from_settings(settings: &SupervisorSettings) -> Self {
        Self {
            grace_period: settings.effective_grace_period(),
            reap_timeout: DEFAULT_REAP_TIMEOUT,
            health_sweep_interval: settings.effective_health_sweep_interval(),
            restart_cooldown: settings.effective_restart_cooldown(),
            cleanup_timeout: settings.effective_cleanup_timeout(),
            cleanup_patterns: settings.cleanup_patterns.clone().unwrap_or_default(),
            reuse_policy: settings.effective_reuse_policy(),
        }
    }
}

/// Lifecycle notices for layers built on top of the pool.
///
/// Unlike `AppEvent`s these are meant for in-process consumers that need to
/// react (the connection manager), not for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolNotice {
    /// A pooled process exited without being terminated through the pool.
    Exited {
        id: String,
        pid: u32,
        exit: ExitInfo,
        /// An automatic restart will be attempted.
        will_restart: bool,
    },
    /// An automatic restart produced a new incarnation.
    Restarted {
        id: String,
        pid: u32,
        restart_count: u32,
    },
}

impl PoolNotice {
    pub fn id(&self) -> &str {
        match self {
            Self::Exited { id, .. } | Self::Restarted { id, .. } => id,
        }
    }
}
