//! Data directory resolution.

use std::env;
use std::path::PathBuf;

use super::error::PathError;
use crate::settings::ENV_DATA_DIR;

/// Get the root directory for supervisor data (logs, runtime state).
///
/// Resolution order:
/// 1. `TOOLHOST_DATA_DIR` environment variable
/// 2. System local data directory (e.g., `~/.local/share/toolhost`)
pub fn data_root() -> Result<PathBuf, PathError> {
    if let Ok(dir) = env::var(ENV_DATA_DIR) {
        let trimmed = dir.trim();
        if !trimmed.is_empty() {
            return Ok(PathBuf::from(trimmed));
        }
    }

    dirs::data_local_dir()
        .map(|d| d.join("toolhost"))
        .ok_or(PathError::NoDataDir)
}

/// Resolve the data directory, preferring an explicit setting.
pub fn resolve_data_dir(configured: Option<&str>) -> Result<PathBuf, PathError> {
    match configured.map(str::trim) {
        Some("") => Err(PathError::EmptyPath),
        Some(dir) => Ok(PathBuf::from(dir)),
        None => data_root(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_setting_wins() {
        let dir = resolve_data_dir(Some("/srv/toolhost")).unwrap();
        assert_eq!(dir, PathBuf::from("/srv/toolhost"));
    }

    #[test]
    fn empty_setting_is_rejected() {
        assert!(matches!(resolve_data_dir(Some(" ")), Err(PathError::EmptyPath)));
    }
}
