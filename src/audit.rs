//! Audit events produced by scans and remediation batches.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Notice,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Info => "info",
            Severity::Notice => "notice",
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditEvent {
    pub severity: Severity,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        AuditEvent {
            severity,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Receives audit events. Delivery failures are the sink's problem and
/// never fail the operation that produced the event.
pub trait AuditSink: Send + Sync {
    fn report(&self, event: AuditEvent);
}

/// Sends every event to the log and, when configured, appends it as a JSON
/// line to a file.
#[derive(Debug, Default)]
pub struct AuditLog {
    file: Option<PathBuf>,
    // Keeps lines from concurrent reporters whole.
    write_lock: Mutex<()>,
}

impl AuditLog {
    pub fn new(file: Option<PathBuf>) -> Self {
        AuditLog {
            file,
            write_lock: Mutex::new(()),
        }
    }

    fn append(&self, path: &PathBuf, event: &AuditEvent) -> std::io::Result<()> {
        let mut line = serde_json::to_string(event)?;
        line.push('\n');

        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(line.as_bytes())
    }
}

impl AuditSink for AuditLog {
    fn report(&self, event: AuditEvent) {
        match event.severity {
            Severity::Info | Severity::Notice => info!("[{}] {}", event.severity, event.message),
            Severity::Warning | Severity::Error => warn!("[{}] {}", event.severity, event.message),
        }

        if let Some(path) = &self.file
            && let Err(e) = self.append(path, &event)
        {
            warn!("Cannot append to audit log {}: {}", path.display(), e);
        }
    }
}

/// Collects events in memory.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<AuditEvent>>,
}

#[cfg(test)]
impl MemorySink {
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[cfg(test)]
impl AuditSink for MemorySink {
    fn report(&self, event: AuditEvent) {
        self.events.lock().unwrap().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn severities_order_by_risk() {
        assert!(Severity::Info < Severity::Notice);
        assert!(Severity::Notice < Severity::Warning);
        assert!(Severity::Warning < Severity::Error);
    }

    #[test]
    fn log_file_gets_one_json_line_per_event() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("logs/audit.jsonl");
        let log = AuditLog::new(Some(path.clone()));

        log.report(AuditEvent::new(Severity::Notice, "Non-core file deleted: a.php"));
        log.report(AuditEvent::new(Severity::Info, "1 out of 1 files were successfully processed."));

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["severity"], "notice");
        assert_eq!(first["message"], "Non-core file deleted: a.php");
        assert!(first["timestamp"].is_string());
    }

    #[test]
    fn unwritable_log_file_does_not_panic() {
        let temp = TempDir::new().unwrap();
        // A directory cannot be opened for appending.
        let log = AuditLog::new(Some(temp.path().to_path_buf()));

        log.report(AuditEvent::new(Severity::Error, "boom"));
    }
}
