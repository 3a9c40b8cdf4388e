//! Captured process output.
//!
//! Every pooled process gets a bounded ring buffer of its stdout/stderr
//! lines, plus a broadcast channel for live followers.

use std::collections::{HashMap, VecDeque};
use std::sync::{PoisonError, RwLock};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use toolhost_core::{LogStream, ProcessLogSinkPort};

/// Maximum number of log lines to keep in the ring buffer per process
pub const MAX_LOG_LINES: usize = 5000;

/// Capacity of the live log broadcast channel
const LOG_CHANNEL_CAPACITY: usize = 1000;

/// A single captured line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessLogEntry {
    /// Unix timestamp in milliseconds
    pub timestamp: i64,
    /// Pool id of the process
    pub process_id: String,
    /// Which stream the line came from
    pub stream: LogStream,
    /// The line content, without trailing newline
    pub line: String,
}

impl ProcessLogEntry {
    /// Create a new log entry with current timestamp
    pub fn new(process_id: impl Into<String>, stream: LogStream, line: String) -> Self {
        Self {
            timestamp: Utc::now().timestamp_millis(),
            process_id: process_id.into(),
            stream,
            line,
        }
    }
}

/// Ring buffer storing recent log lines for one process
#[derive(Debug, Default)]
struct LogBuffer {
    lines: VecDeque<ProcessLogEntry>,
}

impl LogBuffer {
    fn push(&mut self, entry: ProcessLogEntry) {
        if self.lines.len() >= MAX_LOG_LINES {
            self.lines.pop_front();
        }
        self.lines.push_back(entry);
    }
}

/// Log buffers and a live broadcast for all pooled processes
pub struct ProcessLogManager {
    buffers: RwLock<HashMap<String, LogBuffer>>,
    broadcast_tx: broadcast::Sender<ProcessLogEntry>,
}

impl ProcessLogManager {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(LOG_CHANNEL_CAPACITY);
        Self {
            buffers: RwLock::new(HashMap::new()),
            broadcast_tx,
        }
    }

    /// Add a line for a process (sync - callable from any task or thread)
    pub fn add_log(&self, process_id: &str, stream: LogStream, line: String) {
        let entry = ProcessLogEntry::new(process_id, stream, line);

        self.buffers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(process_id.to_string())
            .or_default()
            .push(entry.clone());

        // Ignore if no receivers
        let _ = self.broadcast_tx.send(entry);
    }

    /// All buffered lines for a process, oldest first
    pub fn get_logs(&self, process_id: &str) -> Vec<ProcessLogEntry> {
        self.buffers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(process_id)
            .map(|b| b.lines.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// The last `n` lines of one stream, oldest first
    pub fn tail(&self, process_id: &str, stream: LogStream, n: usize) -> Vec<String> {
        let buffers = self.buffers.read().unwrap_or_else(PoisonError::into_inner);
        let Some(buffer) = buffers.get(process_id) else {
            return Vec::new();
        };
        let mut lines: Vec<String> = buffer
            .lines
            .iter()
            .rev()
            .filter(|e| e.stream == stream)
            .take(n)
            .map(|e| e.line.clone())
            .collect();
        lines.reverse();
        lines
    }

    /// Subscribe to lines from every process as they arrive
    pub fn subscribe(&self) -> broadcast::Receiver<ProcessLogEntry> {
        self.broadcast_tx.subscribe()
    }

    /// Start a fresh buffer for a process (called on every spawn)
    pub fn init_process(&self, process_id: &str) {
        self.buffers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(process_id.to_string(), LogBuffer::default());
    }

    pub fn clear_logs(&self, process_id: &str) {
        self.buffers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(process_id);
    }
}

impl Default for ProcessLogManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessLogSinkPort for ProcessLogManager {
    fn append(&self, process_id: &str, stream: LogStream, line: String) {
        self.add_log(process_id, stream, line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_is_bounded() {
        let logs = ProcessLogManager::new();
        logs.init_process("fs");
        for i in 0..(MAX_LOG_LINES + 10) {
            logs.add_log("fs", LogStream::Stderr, format!("line {i}"));
        }
        let all = logs.get_logs("fs");
        assert_eq!(all.len(), MAX_LOG_LINES);
        assert_eq!(all[0].line, "line 10");
    }

    #[test]
    fn tail_filters_by_stream() {
        let logs = ProcessLogManager::new();
        logs.add_log("fs", LogStream::Stderr, "a".into());
        logs.add_log("fs", LogStream::Stdout, "b".into());
        logs.add_log("fs", LogStream::Stderr, "c".into());
        logs.add_log("fs", LogStream::Stderr, "d".into());

        assert_eq!(logs.tail("fs", LogStream::Stderr, 2), vec!["c", "d"]);
        assert!(logs.tail("other", LogStream::Stderr, 2).is_empty());
    }

    #[tokio::test]
    async fn subscribers_receive_lines() {
        let logs = ProcessLogManager::new();
        let mut rx = logs.subscribe();
        logs.append("fs", LogStream::Stdout, "ready".into());

        let entry = rx.recv().await.unwrap();
        assert_eq!(entry.process_id, "fs");
        assert_eq!(entry.line, "ready");

        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("\"processId\":\"fs\""));
        assert!(json.contains("\"stream\":\"stdout\""));
    }

    #[test]
    fn init_resets_buffer() {
        let logs = ProcessLogManager::new();
        logs.add_log("fs", LogStream::Stdout, "old".into());
        logs.init_process("fs");
        assert!(logs.get_logs("fs").is_empty());
        logs.add_log("fs", LogStream::Stdout, "x".into());
        logs.clear_logs("fs");
        assert!(logs.get_logs("fs").is_empty());
    }
}
