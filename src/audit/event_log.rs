use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use tokio::io::AsyncWriteExt;

use crate::errors::FrameworkError;

/// Lifecycle events recorded for every request. Violations are stored
/// separately in the violation store; events carry only counts.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum AuditEvent {
    RequestReceived {
        execution_id: String,
        level: String,
    },
    RollbackPointCreated {
        execution_id: String,
        rollback_id: String,
        target_dir: String,
    },
    ExecutionStarted {
        execution_id: String,
    },
    RolledBack {
        execution_id: String,
        rollback_id: String,
        restored: bool,
    },
    /// The single summary record written for every terminal state.
    RequestCompleted {
        execution_id: String,
        terminal_state: String,
        outcome: String,
        success: bool,
        violation_count: usize,
    },
}

impl AuditEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            AuditEvent::RequestReceived { .. } => "request_received",
            AuditEvent::RollbackPointCreated { .. } => "rollback_point_created",
            AuditEvent::ExecutionStarted { .. } => "execution_started",
            AuditEvent::RolledBack { .. } => "rolled_back",
            AuditEvent::RequestCompleted { .. } => "request_completed",
        }
    }
}

#[derive(Debug, Serialize)]
struct AuditRecord {
    event_type: String,
    timestamp: String,
    data: serde_json::Value,
}

/// Append-only JSONL event log. Each append opens the file in append mode
/// and writes one full line; there is no shared lock to contend on, so
/// concurrent executions never serialize behind each other here.
pub struct EventLog {
    path: PathBuf,
}

impl EventLog {
    pub fn new(audit_dir: &Path) -> Self {
        Self {
            path: audit_dir.join("events.jsonl"),
        }
    }

    pub async fn append(&self, event: &AuditEvent) -> Result<(), FrameworkError> {
        let record = AuditRecord {
            event_type: event.kind().to_string(),
            timestamp: Utc::now().to_rfc3339(),
            data: serde_json::to_value(event)?,
        };
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| FrameworkError::Audit(format!("Failed to open event log: {e}")))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| FrameworkError::Audit(format!("Failed to append event: {e}")))?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_append_writes_one_line_per_event() {
        let dir = tempfile::tempdir().unwrap();
        let log = EventLog::new(dir.path());

        log.append(&AuditEvent::RequestReceived {
            execution_id: "exec-1".into(),
            level: "low".into(),
        })
        .await
        .unwrap();
        log.append(&AuditEvent::ExecutionStarted {
            execution_id: "exec-1".into(),
        })
        .await
        .unwrap();

        let content = tokio::fs::read_to_string(log.path()).await.unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["event_type"], "request_received");
        assert_eq!(first["data"]["execution_id"], "exec-1");
        assert!(first["timestamp"].as_str().unwrap().contains('T'));
    }

    #[tokio::test]
    async fn test_append_only_preserves_existing_records() {
        let dir = tempfile::tempdir().unwrap();
        let log = EventLog::new(dir.path());

        log.append(&AuditEvent::ExecutionStarted {
            execution_id: "a".into(),
        })
        .await
        .unwrap();
        let before = tokio::fs::read_to_string(log.path()).await.unwrap();

        log.append(&AuditEvent::ExecutionStarted {
            execution_id: "b".into(),
        })
        .await
        .unwrap();
        let after = tokio::fs::read_to_string(log.path()).await.unwrap();

        assert!(after.starts_with(&before));
    }
}
