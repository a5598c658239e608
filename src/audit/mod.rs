pub mod event_log;
pub mod store;

use std::path::Path;

use crate::errors::FrameworkError;
use crate::models::SecurityViolation;

pub use event_log::{AuditEvent, EventLog};
pub use store::{StoredViolation, ViolationFilter, ViolationStore};

/// The framework's audit trail: an append-only JSONL event log plus a
/// durable, queryable violation store. Both are append-only; committed
/// records are never edited in place.
pub struct AuditLog {
    events: EventLog,
    store: ViolationStore,
}

impl AuditLog {
    pub async fn initialize(audit_dir: &Path) -> Result<Self, FrameworkError> {
        tokio::fs::create_dir_all(audit_dir).await?;
        let store = ViolationStore::new(&audit_dir.join("violations.db"))?;
        Ok(Self {
            events: EventLog::new(audit_dir),
            store,
        })
    }

    pub async fn log_event(&self, event: AuditEvent) -> Result<(), FrameworkError> {
        self.events.append(&event).await
    }

    pub fn log_violation(
        &self,
        execution_id: &str,
        violation: &SecurityViolation,
    ) -> Result<(), FrameworkError> {
        self.store.insert(execution_id, violation)
    }

    pub fn store(&self) -> &ViolationStore {
        &self.store
    }
}
