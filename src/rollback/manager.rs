use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use data_encoding::HEXLOWER;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{info, warn};

use crate::errors::FrameworkError;

/// A durable snapshot of the watched directory, taken before a potentially
/// mutating execution. Exactly one point is live per in-flight execution.
#[derive(Debug, Clone, Serialize)]
pub struct RollbackPoint {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub target_dir: PathBuf,
    pub archive_path: PathBuf,
    /// sha-256 of the archive, hex-encoded. Checked again before a restore
    /// so a tampered snapshot is refused rather than replayed.
    pub checksum: String,
}

/// Snapshots mutable state before execution and restores it on failure.
/// Snapshot and restore for the same directory are serialized through
/// [`RollbackManager::lock_dir`]; disjoint directories proceed concurrently.
pub struct RollbackManager {
    snapshot_dir: PathBuf,
    points: DashMap<String, RollbackPoint>,
    dir_locks: DashMap<PathBuf, Arc<Mutex<()>>>,
}

impl RollbackManager {
    pub fn new(snapshot_dir: &Path) -> Result<Self, FrameworkError> {
        std::fs::create_dir_all(snapshot_dir)?;
        Ok(Self {
            snapshot_dir: snapshot_dir.to_path_buf(),
            points: DashMap::new(),
            dir_locks: DashMap::new(),
        })
    }

    /// Acquire the guard serializing rollback and execution activity for
    /// `dir`. Held by the orchestrator across snapshot, execution, and
    /// restore/commit so a restore can never race a concurrent snapshot of
    /// the same directory.
    pub async fn lock_dir(&self, dir: &Path) -> OwnedMutexGuard<()> {
        let lock = self
            .dir_locks
            .entry(dir.to_path_buf())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }

    /// Snapshot `dir` into a tar archive. The archive is fsynced before this
    /// returns: no execution starts without a confirmed, durable rollback
    /// point.
    pub fn create_rollback_point(&self, dir: &Path) -> Result<RollbackPoint, FrameworkError> {
        if !dir.is_dir() {
            return Err(FrameworkError::Rollback(format!(
                "Target directory does not exist: {}",
                dir.display()
            )));
        }

        let id = uuid::Uuid::new_v4().to_string();
        let archive_path = self.snapshot_dir.join(format!("{id}.tar"));

        let file = File::create(&archive_path)?;
        let mut builder = tar::Builder::new(file);
        builder
            .append_dir_all(".", dir)
            .map_err(|e| FrameworkError::Rollback(format!("Failed to archive {}: {e}", dir.display())))?;
        let file = builder
            .into_inner()
            .map_err(|e| FrameworkError::Rollback(format!("Failed to finish archive: {e}")))?;
        file.sync_all()?;

        let checksum = file_checksum(&archive_path)?;
        let point = RollbackPoint {
            id: id.clone(),
            created_at: Utc::now(),
            target_dir: dir.to_path_buf(),
            archive_path,
            checksum,
        };
        self.points.insert(id.clone(), point.clone());

        info!(rollback_id = %id, dir = %dir.display(), "Rollback point created");
        Ok(point)
    }

    /// Restore the watched directory to the snapshotted state. Idempotent:
    /// the archive is retained, so restoring the same id twice repeats the
    /// same byte-exact restoration. Unknown ids return `false`.
    pub fn restore(&self, id: &str) -> Result<bool, FrameworkError> {
        let point = match self.points.get(id) {
            Some(entry) => entry.clone(),
            None => return Ok(false),
        };

        let actual = file_checksum(&point.archive_path)?;
        if actual != point.checksum {
            return Err(FrameworkError::Rollback(format!(
                "Snapshot archive checksum mismatch for rollback point {id}"
            )));
        }

        clear_dir(&point.target_dir)?;
        let file = File::open(&point.archive_path)?;
        tar::Archive::new(file)
            .unpack(&point.target_dir)
            .map_err(|e| FrameworkError::Rollback(format!("Failed to unpack snapshot: {e}")))?;

        warn!(rollback_id = %id, dir = %point.target_dir.display(), "Directory restored from rollback point");
        Ok(true)
    }

    /// Discard a rollback point after a successful execution.
    pub fn commit(&self, id: &str) -> Result<(), FrameworkError> {
        if let Some((_, point)) = self.points.remove(id) {
            if point.archive_path.exists() {
                std::fs::remove_file(&point.archive_path)?;
            }
            info!(rollback_id = %id, "Rollback point committed");
        }
        Ok(())
    }
}

fn file_checksum(path: &Path) -> Result<String, FrameworkError> {
    let bytes = std::fs::read(path)?;
    let digest = Sha256::digest(&bytes);
    Ok(HEXLOWER.encode(&digest))
}

fn clear_dir(dir: &Path) -> Result<(), FrameworkError> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            std::fs::remove_dir_all(&path)?;
        } else {
            std::fs::remove_file(&path)?;
        }
    }
    Ok(())
}
