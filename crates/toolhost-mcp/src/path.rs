//! Effective PATH and command resolution for helper processes.
//!
//! Helpers are often scripts (`npx`, `uvx`, a shebang file) that need their
//! interpreter on `PATH`. The child gets:
//! 1. User-provided `path_extra` entries
//! 2. The directory containing the command, if it is a path
//! 3. The inherited `PATH`
//! 4. Platform-specific defaults (macOS: Homebrew, etc.)
//!
//! Entries are deduplicated, first occurrence wins.

use std::collections::HashSet;
use std::env;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

/// Platform-specific PATH separator
#[cfg(unix)]
const PATH_SEPARATOR: &str = ":";
#[cfg(windows)]
const PATH_SEPARATOR: &str = ";";

/// Default paths to include on macOS when PATH is limited (bundled apps)
#[cfg(target_os = "macos")]
const MACOS_DEFAULT_PATHS: &str = "/opt/homebrew/bin:/usr/local/bin:/usr/bin:/bin:/usr/sbin:/sbin";

/// Build the PATH handed to a helper started with `command`.
pub fn build_effective_path(command: &str, path_extra: Option<&str>) -> OsString {
    compose_path(command, path_extra, env::var_os("PATH").as_deref())
}

fn compose_path(command: &str, path_extra: Option<&str>, inherited: Option<&OsStr>) -> OsString {
    let mut entries: Vec<String> = Vec::new();

    if let Some(extra) = path_extra {
        entries.extend(split_entries(extra));
    }

    if is_path_like(command) {
        if let Some(dir) = Path::new(command).parent().and_then(Path::to_str) {
            if !dir.is_empty() {
                entries.push(dir.to_string());
            }
        }
    }

    if let Some(inherited) = inherited.and_then(OsStr::to_str) {
        entries.extend(split_entries(inherited));
    }

    #[cfg(target_os = "macos")]
    entries.extend(split_entries(MACOS_DEFAULT_PATHS));

    let mut seen = HashSet::new();
    let deduped: Vec<String> = entries
        .into_iter()
        .filter(|entry| seen.insert(entry.clone()))
        .collect();

    OsString::from(deduped.join(PATH_SEPARATOR))
}

fn split_entries(value: &str) -> impl Iterator<Item = String> + '_ {
    value
        .split(PATH_SEPARATOR)
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
}

/// A command containing a separator is a path, not a name to search for.
fn is_path_like(command: &str) -> bool {
    command.contains('/') || command.contains(std::path::MAIN_SEPARATOR)
}

/// Resolve `command` to the executable that will be spawned.
///
/// Path-like commands are taken as-is (relative ones against `working_dir`
/// when set) and must point at an executable file. Bare names are searched
/// for in `search_path`. Returns `None` if nothing usable is found.
pub fn resolve_command(
    command: &str,
    search_path: &OsStr,
    working_dir: Option<&Path>,
) -> Option<PathBuf> {
    if is_path_like(command) {
        let path = Path::new(command);
        let candidate = match working_dir {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path.to_path_buf(),
        };
        return is_executable(&candidate).then_some(candidate);
    }

    env::split_paths(search_path)
        .map(|dir| dir.join(command))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path).is_ok_and(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file() || path.with_extension("exe").is_file()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compose_path_puts_extra_first() {
        let path = compose_path("node", Some("/custom/bin"), Some(OsStr::new("/usr/bin")));
        let path_str = path.to_str().unwrap();
        assert!(path_str.starts_with("/custom/bin"));
        assert!(path_str.contains("/usr/bin"));
    }

    #[cfg(unix)]
    #[test]
    fn test_compose_path_includes_command_dir() {
        let path = compose_path("/opt/homebrew/bin/npx", None, Some(OsStr::new("/usr/bin")));
        let entries: Vec<&str> = path.to_str().unwrap().split(PATH_SEPARATOR).collect();
        assert_eq!(entries[0], "/opt/homebrew/bin");
    }

    #[cfg(unix)]
    #[test]
    fn test_compose_path_deduplicates() {
        let path = compose_path(
            "/usr/bin/node",
            Some("/usr/bin:/custom/path"),
            Some(OsStr::new("/usr/bin:/bin")),
        );
        let entries: Vec<&str> = path.to_str().unwrap().split(PATH_SEPARATOR).collect();
        let count = entries.iter().filter(|&&e| e == "/usr/bin").count();
        assert_eq!(count, 1, "PATH should deduplicate /usr/bin");
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_command_searches_path() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let exe = dir.path().join("my-server");
        std::fs::write(&exe, "#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&exe, std::fs::Permissions::from_mode(0o755)).unwrap();

        let search = env::join_paths([dir.path()]).unwrap();
        assert_eq!(resolve_command("my-server", &search, None), Some(exe));
        assert_eq!(resolve_command("not-there", &search, None), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_command_rejects_non_executable() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("data.txt");
        std::fs::write(&file, "plain").unwrap();

        let search = env::join_paths([dir.path()]).unwrap();
        assert_eq!(resolve_command("data.txt", &search, None), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_relative_command_against_working_dir() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let exe = dir.path().join("run.sh");
        std::fs::write(&exe, "#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&exe, std::fs::Permissions::from_mode(0o700)).unwrap();

        let resolved = resolve_command("./run.sh", OsStr::new(""), Some(dir.path()));
        assert_eq!(resolved, Some(dir.path().join("./run.sh")));
    }
}
