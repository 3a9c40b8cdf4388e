//! Status report rendering.

use serde::Serialize;
use toolhost_bootstrap::ServiceOrchestrator;
use toolhost_core::{AppEvent, ConnectionInfo, ProcessInfo, ServiceStatus};

use super::tables::{format_optional, print_separator, truncate_string};

/// Snapshot of everything the orchestrator is running.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub ready: bool,
    pub services: Vec<ServiceStatus>,
    pub processes: Vec<ProcessInfo>,
    pub connections: Vec<ConnectionInfo>,
}

impl StatusReport {
    /// Collect a report; sections for services that never started are empty.
    pub async fn collect(orchestrator: &ServiceOrchestrator) -> Self {
        let processes = orchestrator
            .process_pool()
            .map(|pool| pool.list())
            .unwrap_or_default();
        let connections = match orchestrator.connections() {
            Ok(manager) => manager.list_all().await,
            Err(_) => Vec::new(),
        };

        Self {
            ready: orchestrator.is_initialized(),
            services: orchestrator.all_statuses(),
            processes,
            connections,
        }
    }
}

/// Print the report as human-readable tables.
pub fn print_report(report: &StatusReport) {
    println!("{:<16} {:<14} MESSAGE", "SERVICE", "STATUS");
    print_separator(72);
    for status in &report.services {
        println!(
            "{:<16} {:<14} {}",
            status.name,
            status.status.to_string(),
            truncate_string(&status.message, 40)
        );
    }

    if report.connections.is_empty() {
        println!();
        println!("No servers configured.");
        return;
    }

    println!();
    println!(
        "{:<16} {:<13} {:>8} {:>6}  LAST ERROR",
        "SERVER", "STATE", "PID", "TOOLS"
    );
    print_separator(72);
    for conn in &report.connections {
        println!(
            "{:<16} {:<13} {:>8} {:>6}  {}",
            truncate_string(&conn.server_id, 16),
            conn.state.to_string(),
            format_optional(conn.pid.as_ref(), "-"),
            conn.tools.len(),
            truncate_string(conn.last_error.as_deref().unwrap_or(""), 30)
        );
    }

    let restarted: Vec<&ProcessInfo> = report
        .processes
        .iter()
        .filter(|p| p.restart_count > 0)
        .collect();
    for process in restarted {
        println!(
            "  {} restarted {} time(s), now {}",
            process.id, process.restart_count, process.state
        );
    }
}

/// One log line per event: the stable event name plus its JSON payload.
pub fn format_event(event: &AppEvent) -> String {
    let payload = serde_json::to_string(event).unwrap_or_default();
    format!("[{}] {payload}", event.event_name())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_event_has_name_and_payload() {
        let line = format_event(&AppEvent::server_connected("fs", 3));
        assert!(line.starts_with("[server:connected] "));
        assert!(line.contains("\"fs\""));
    }

    #[test]
    fn test_report_serializes_camel_case() {
        let report = StatusReport {
            ready: false,
            services: vec![ServiceStatus::error("connections", "boom")],
            processes: Vec::new(),
            connections: Vec::new(),
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["ready"], false);
        assert_eq!(json["services"][0]["name"], "connections");
        assert!(json["processes"].as_array().unwrap().is_empty());
    }
}
