//! Durable queue store abstraction.
//!
//! A store persists `OfflineOperation` records keyed by id and enumerates
//! them in replay order. It applies no retry policy of its own; every
//! failure goes back to the caller.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::operation::{OfflineOperation, OperationId, OperationStatus, PageCursor};
use crate::error::StorageError;

/// Persistent, key-ordered storage of queued operations.
pub trait QueueStore: Send + Sync {
    /// Insert or overwrite the record with `op.id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage medium fails.
    fn put(&self, op: &OfflineOperation) -> Result<(), StorageError>;

    /// Fetch a record by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage medium fails or the record is corrupt.
    fn get(&self, id: &OperationId) -> Result<Option<OfflineOperation>, StorageError>;

    /// List non-completed records in `(created_at, id)` order, starting
    /// strictly after `after`.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage medium fails or a record is corrupt.
    fn list_pending(
        &self,
        after: Option<&PageCursor>,
        limit: usize,
    ) -> Result<Vec<OfflineOperation>, StorageError>;

    /// Number of stored records, without reading payloads.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage medium fails.
    fn count(&self) -> Result<u64, StorageError>;

    /// Remove a record. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage medium fails.
    fn delete(&self, id: &OperationId) -> Result<bool, StorageError>;

    /// All records with `status`, in replay order.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage medium fails or a record is corrupt.
    fn list_by_status(&self, status: OperationStatus)
        -> Result<Vec<OfflineOperation>, StorageError>;

    /// Per-status counts.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage medium fails.
    fn stats(&self) -> Result<QueueStats, StorageError>;

    /// Remove completed records created before `cutoff`.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage medium fails.
    fn delete_completed_before(&self, cutoff: DateTime<Utc>) -> Result<usize, StorageError>;

    /// Remove every record.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage medium fails.
    fn clear(&self) -> Result<usize, StorageError>;
}

/// Queue statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    /// Number of pending operations
    pub pending: u64,
    /// Number of operations caught mid-sync
    pub syncing: u64,
    /// Number of completed operations not yet pruned
    pub completed: u64,
    /// Number of failed operations (retryable and dead-lettered)
    pub failed: u64,
    /// Oldest non-completed operation
    pub oldest_pending: Option<DateTime<Utc>>,
}

impl QueueStats {
    /// Total number of records.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.pending + self.syncing + self.completed + self.failed
    }

    /// Records still awaiting a successful sync.
    #[must_use]
    pub const fn outstanding(&self) -> u64 {
        self.pending + self.syncing + self.failed
    }
}

/// In-memory queue store.
///
/// Not durable; useful for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryQueueStore {
    records: Mutex<HashMap<OperationId, OfflineOperation>>,
}

impl MemoryQueueStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn sorted(&self, filter: impl Fn(&OfflineOperation) -> bool) -> Vec<OfflineOperation> {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        let mut ops: Vec<_> = records.values().filter(|op| filter(op)).cloned().collect();
        ops.sort_by_key(OfflineOperation::cursor);
        ops
    }
}

impl QueueStore for MemoryQueueStore {
    fn put(&self, op: &OfflineOperation) -> Result<(), StorageError> {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        records.insert(op.id, op.clone());
        Ok(())
    }

    fn get(&self, id: &OperationId) -> Result<Option<OfflineOperation>, StorageError> {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(records.get(id).cloned())
    }

    fn list_pending(
        &self,
        after: Option<&PageCursor>,
        limit: usize,
    ) -> Result<Vec<OfflineOperation>, StorageError> {
        let mut ops = self.sorted(|op| {
            op.status != OperationStatus::Completed && after.map_or(true, |c| op.cursor() > *c)
        });
        ops.truncate(limit);
        Ok(ops)
    }

    fn count(&self) -> Result<u64, StorageError> {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(records.len() as u64)
    }

    fn delete(&self, id: &OperationId) -> Result<bool, StorageError> {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(records.remove(id).is_some())
    }

    fn list_by_status(
        &self,
        status: OperationStatus,
    ) -> Result<Vec<OfflineOperation>, StorageError> {
        Ok(self.sorted(|op| op.status == status))
    }

    fn stats(&self) -> Result<QueueStats, StorageError> {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        let mut stats = QueueStats::default();
        for op in records.values() {
            match op.status {
                OperationStatus::Pending => stats.pending += 1,
                OperationStatus::Syncing => stats.syncing += 1,
                OperationStatus::Completed => stats.completed += 1,
                OperationStatus::Failed => stats.failed += 1,
            }
            if op.status != OperationStatus::Completed {
                stats.oldest_pending = Some(
                    stats
                        .oldest_pending
                        .map_or(op.created_at, |t| t.min(op.created_at)),
                );
            }
        }
        Ok(stats)
    }

    fn delete_completed_before(&self, cutoff: DateTime<Utc>) -> Result<usize, StorageError> {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        let before = records.len();
        records.retain(|_, op| !(op.status == OperationStatus::Completed && op.created_at < cutoff));
        Ok(before - records.len())
    }

    fn clear(&self) -> Result<usize, StorageError> {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        let removed = records.len();
        records.clear();
        Ok(removed)
    }
}
