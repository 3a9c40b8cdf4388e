//! Process log sink port for structured log capture.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Which standard stream a captured line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStream {
    Stdout,
    Stderr,
}

impl LogStream {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        }
    }
}

impl fmt::Display for LogStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Port for appending process log lines to a sink.
///
/// Implementations should be thread-safe and non-blocking; they are called
/// from stream reader tasks.
pub trait ProcessLogSinkPort: Send + Sync {
    /// Append a log line (without trailing newline) from a pooled process.
    fn append(&self, process_id: &str, stream: LogStream, line: String);
}
