use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::Connection;

use crate::errors::FrameworkError;
use crate::models::{SecurityLevel, SecurityViolation, ThreatKind};

const CREATE_TABLES: &str = "
CREATE TABLE IF NOT EXISTS violations (
    id TEXT PRIMARY KEY,
    execution_id TEXT NOT NULL,
    kind TEXT NOT NULL,
    severity TEXT NOT NULL,
    description TEXT NOT NULL,
    blocked_content TEXT NOT NULL,
    source_location TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_violations_severity ON violations(severity);
CREATE INDEX IF NOT EXISTS idx_violations_kind ON violations(kind);
CREATE INDEX IF NOT EXISTS idx_violations_created_at ON violations(created_at);
";

/// Filter for querying the violation store. All fields optional; unset
/// fields match everything.
#[derive(Debug, Clone, Default)]
pub struct ViolationFilter {
    pub min_severity: Option<SecurityLevel>,
    pub kind: Option<ThreatKind>,
    pub since: Option<DateTime<Utc>>,
}

/// A violation as read back from the store, tied to the execution that
/// produced it.
#[derive(Debug, Clone, serde::Serialize)]
pub struct StoredViolation {
    pub execution_id: String,
    pub violation: SecurityViolation,
}

/// Durable, insert-only violation record store. Rows are never updated or
/// deleted by the framework; downstream tooling queries them directly.
pub struct ViolationStore {
    conn: Arc<Mutex<Connection>>,
}

impl ViolationStore {
    pub fn new(path: &Path) -> Result<Self, FrameworkError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)
            .map_err(|e| FrameworkError::Database(format!("Failed to open violation store: {e}")))?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .map_err(|e| FrameworkError::Database(format!("Failed to set pragmas: {e}")))?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.initialize()?;
        Ok(store)
    }

    pub fn in_memory() -> Result<Self, FrameworkError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| FrameworkError::Database(format!("Failed to open in-memory db: {e}")))?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.initialize()?;
        Ok(store)
    }

    fn initialize(&self) -> Result<(), FrameworkError> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(CREATE_TABLES)
            .map_err(|e| FrameworkError::Database(format!("Failed to create tables: {e}")))?;
        Ok(())
    }

    pub fn insert(
        &self,
        execution_id: &str,
        violation: &SecurityViolation,
    ) -> Result<(), FrameworkError> {
        let conn = self.conn.lock().unwrap();
        let id = uuid::Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO violations (id, execution_id, kind, severity, description, blocked_content, source_location, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            rusqlite::params![
                id,
                execution_id,
                violation.kind.as_str(),
                violation.severity.as_str(),
                violation.description,
                violation.blocked_content,
                violation.source_location,
                violation.timestamp.to_rfc3339(),
            ],
        )
        .map_err(|e| FrameworkError::Database(format!("Failed to insert violation: {e}")))?;
        Ok(())
    }

    pub fn query(&self, filter: &ViolationFilter) -> Result<Vec<StoredViolation>, FrameworkError> {
        let mut sql = String::from(
            "SELECT execution_id, kind, severity, description, blocked_content, source_location, created_at FROM violations WHERE 1=1",
        );
        let mut params: Vec<String> = Vec::new();

        if let Some(min) = filter.min_severity {
            // Rank is an internal constant, safe to inline.
            sql.push_str(&format!(
                " AND CASE severity WHEN 'critical' THEN 3 WHEN 'high' THEN 2 WHEN 'medium' THEN 1 ELSE 0 END >= {}",
                min.rank()
            ));
        }
        if let Some(kind) = filter.kind {
            sql.push_str(&format!(" AND kind = ?{}", params.len() + 1));
            params.push(kind.as_str().to_string());
        }
        if let Some(since) = filter.since {
            sql.push_str(&format!(" AND created_at >= ?{}", params.len() + 1));
            params.push(since.to_rfc3339());
        }
        sql.push_str(" ORDER BY created_at DESC");

        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| FrameworkError::Database(format!("Query failed: {e}")))?;

        let rows = stmt
            .query_map(rusqlite::params_from_iter(params.iter()), |row| {
                let kind_str: String = row.get(1)?;
                let severity_str: String = row.get(2)?;
                let created_at_str: String = row.get(6)?;

                let kind = ThreatKind::parse(&kind_str).unwrap_or(ThreatKind::CommandInjection);
                let severity =
                    SecurityLevel::parse(&severity_str).unwrap_or(SecurityLevel::Critical);
                let timestamp = DateTime::parse_from_rfc3339(&created_at_str)
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or_else(|_| Utc::now());

                Ok(StoredViolation {
                    execution_id: row.get(0)?,
                    violation: SecurityViolation {
                        kind,
                        severity,
                        description: row.get(3)?,
                        blocked_content: row.get(4)?,
                        timestamp,
                        source_location: row.get(5)?,
                    },
                })
            })
            .map_err(|e| FrameworkError::Database(format!("Query error: {e}")))?;

        let mut violations = Vec::new();
        for row in rows {
            violations.push(row.map_err(|e| FrameworkError::Database(format!("Row error: {e}")))?);
        }
        Ok(violations)
    }
}

impl Clone for ViolationStore {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
        }
    }
}
