//! The operation queue: domain API over a queue store.
//!
//! Owns the store exclusively. Every status change of a queued operation
//! goes through here, which is what makes per-item transitions race-free.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Duration, SubsecRound, Utc};
use colored::Colorize;
use serde::Serialize;
use serde_json::Value;

use super::executor::{ExecutorCall, ExecutorRegistry, OnlineExecutor};
use super::operation::{OfflineOperation, OperationId, OperationStatus, OperationType, PageCursor};
use super::store::{QueueStats, QueueStore};
use crate::config::QueueConfig;
use crate::error::ResyncError;

/// Outcome of syncing one operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncOutcome {
    /// Operation id
    pub id: OperationId,
    /// Operation type
    pub op_type: OperationType,
    /// Whether the executor succeeded
    pub success: bool,
    /// Error message if it failed
    pub error: Option<String>,
    /// Whether this failure exhausted the retry bound
    pub dead_lettered: bool,
}

/// Result of a sync pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Number of successful operations
    pub succeeded: usize,
    /// Number of failed operations (including newly dead-lettered ones)
    pub failed: usize,
    /// Number of operations dead-lettered by this pass
    pub dead_lettered: usize,
    /// True when another pass was already running; this request was folded
    /// into it and nothing was processed here
    pub coalesced: bool,
    /// Individual results, in processing order
    pub results: Vec<SyncOutcome>,
}

impl SyncReport {
    /// Report for a request folded into a running pass.
    #[must_use]
    pub fn coalesced() -> Self {
        Self {
            coalesced: true,
            ..Self::default()
        }
    }

    /// Add a result.
    pub fn add(&mut self, outcome: SyncOutcome) {
        if outcome.success {
            self.succeeded += 1;
        } else {
            self.failed += 1;
            if outcome.dead_lettered {
                self.dead_lettered += 1;
            }
        }
        self.results.push(outcome);
    }

    /// Fold another pass into this one.
    pub fn merge(&mut self, other: Self) {
        for outcome in other.results {
            self.add(outcome);
        }
    }

    /// Check if all operations succeeded.
    #[must_use]
    pub const fn all_succeeded(&self) -> bool {
        self.failed == 0
    }

    /// Get total operations processed.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.succeeded + self.failed
    }
}

/// Format a sync report for display.
#[must_use]
pub fn format_sync_report(report: &SyncReport) -> String {
    let mut lines = Vec::new();

    lines.push(format!("Sync completed: {} operations", report.total()));
    lines.push("─".repeat(40));

    if report.succeeded > 0 {
        lines.push(format!(
            "  {} {}",
            "✓".green(),
            format!("{} succeeded", report.succeeded).green()
        ));
    }

    if report.failed > 0 {
        lines.push(format!(
            "  {} {}",
            "✗".red(),
            format!("{} failed", report.failed).red()
        ));
    }

    if report.dead_lettered > 0 {
        lines.push(format!(
            "  {} {}",
            "☠".yellow(),
            format!("{} dead-lettered", report.dead_lettered).yellow()
        ));
    }

    let errors: Vec<_> = report
        .results
        .iter()
        .filter(|r| r.error.is_some())
        .take(3)
        .collect();

    if !errors.is_empty() {
        lines.push(String::new());
        lines.push("Errors:".to_string());
        for err in errors {
            lines.push(format!(
                "  - {} {}: {}",
                err.op_type,
                err.id,
                err.error.as_deref().unwrap_or("Unknown error")
            ));
        }
    }

    lines.join("\n")
}

#[derive(Debug, Default)]
struct PassState {
    running: bool,
    rerun_requested: bool,
}

/// Durable queue of operations awaiting the backend.
pub struct OperationQueue {
    store: Arc<dyn QueueStore>,
    executors: ExecutorRegistry,
    config: QueueConfig,
    pass: Mutex<PassState>,
    in_flight: Mutex<HashSet<OperationId>>,
    last_created: Mutex<Option<DateTime<Utc>>>,
}

impl std::fmt::Debug for OperationQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationQueue")
            .field("executors", &self.executors)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl OperationQueue {
    /// Create a queue over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn QueueStore>, config: QueueConfig) -> Self {
        Self {
            store,
            executors: ExecutorRegistry::new(),
            config,
            pass: Mutex::new(PassState::default()),
            in_flight: Mutex::new(HashSet::new()),
            last_created: Mutex::new(None),
        }
    }

    /// Queue settings.
    #[must_use]
    pub const fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Executors used to replay operations.
    #[must_use]
    pub const fn executors(&self) -> &ExecutorRegistry {
        &self.executors
    }

    /// Register the executor that replays `op_type`.
    pub fn register_executor(&self, op_type: OperationType, executor: Arc<dyn OnlineExecutor>) {
        self.executors.register(op_type, executor);
    }

    /// Put operations interrupted mid-sync back to pending.
    ///
    /// Call once at startup. The interrupted attempt's side effect is
    /// assumed to be safely repeatable by the backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn recover(&self) -> Result<usize, ResyncError> {
        let interrupted = self.store.list_by_status(OperationStatus::Syncing)?;
        let count = interrupted.len();

        for mut op in interrupted {
            op.status = OperationStatus::Pending;
            self.store.put(&op)?;
            tracing::info!(operation_id = %op.id, op_type = %op.op_type, "recovered interrupted operation");
        }

        Ok(count)
    }

    /// Queue an operation for later synchronization.
    ///
    /// Returns once the operation is persisted.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails; nothing is queued in that case.
    pub fn enqueue(&self, op_type: OperationType, payload: Value) -> Result<OperationId, ResyncError> {
        let op = OfflineOperation::new(op_type, payload, self.next_timestamp());
        self.store.put(&op)?;

        tracing::info!(operation_id = %op.id, op_type = %op_type, "queued operation");
        Ok(op.id)
    }

    /// Get a specific operation by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn get(&self, id: &OperationId) -> Result<Option<OfflineOperation>, ResyncError> {
        Ok(self.store.get(id)?)
    }

    /// Number of stored operations.
    ///
    /// Completed operations count until pruned.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn get_queue_size(&self) -> Result<u64, ResyncError> {
        Ok(self.store.count()?)
    }

    /// Get queue statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn stats(&self) -> Result<QueueStats, ResyncError> {
        Ok(self.store.stats()?)
    }

    /// All operations with a given status.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn list(&self, status: OperationStatus) -> Result<Vec<OfflineOperation>, ResyncError> {
        Ok(self.store.list_by_status(status)?)
    }

    /// Operations that exhausted the retry bound and need manual action.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn dead_letters(&self) -> Result<Vec<OfflineOperation>, ResyncError> {
        let bound = self.config.retry_bound;
        Ok(self
            .store
            .list_by_status(OperationStatus::Failed)?
            .into_iter()
            .filter(|op| op.is_dead_lettered(bound))
            .collect())
    }

    /// Reset a failed operation so the next pass attempts it again.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for unknown ids, `Busy` while the operation is
    /// being synced and `InvalidTransition` unless it is failed.
    pub fn retry(&self, id: &OperationId) -> Result<OfflineOperation, ResyncError> {
        let _guard = self.claim(*id)?;

        let mut op = self
            .store
            .get(id)?
            .ok_or_else(|| ResyncError::NotFound(format!("operation {id}")))?;

        transition(&mut op, OperationStatus::Pending)?;
        op.retry_count = 0;
        op.error = None;
        self.store.put(&op)?;

        tracing::info!(operation_id = %op.id, "operation reset for retry");
        Ok(op)
    }

    /// Reset every failed operation, dead letters included.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn retry_all_failed(&self) -> Result<usize, ResyncError> {
        let failed = self.store.list_by_status(OperationStatus::Failed)?;
        let mut reset = 0;

        for op in failed {
            match self.retry(&op.id) {
                Ok(_) => reset += 1,
                // Picked up by a running pass in the meantime
                Err(ResyncError::Busy(_) | ResyncError::InvalidTransition { .. }) => {}
                Err(e) => return Err(e),
            }
        }

        Ok(reset)
    }

    /// Remove an operation without syncing it.
    ///
    /// # Errors
    ///
    /// Returns `Busy` while the operation is being synced, or a store error.
    pub fn discard(&self, id: &OperationId) -> Result<bool, ResyncError> {
        let _guard = self.claim(*id)?;
        let removed = self.store.delete(id)?;
        if removed {
            tracing::info!(operation_id = %id, "operation discarded");
        }
        Ok(removed)
    }

    /// Delete completed operations older than `older_than`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn prune_completed(&self, older_than: Duration) -> Result<usize, ResyncError> {
        Ok(self.store.delete_completed_before(Utc::now() - older_than)?)
    }

    /// Remove every operation.
    ///
    /// # Errors
    ///
    /// Returns `Busy` while any operation is being synced, or a store error.
    pub fn clear(&self) -> Result<usize, ResyncError> {
        // Held across the delete so no pass can claim an item meanwhile
        let in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(id) = in_flight.iter().next() {
            return Err(ResyncError::Busy(id.to_string()));
        }
        let removed = self.store.clear()?;
        drop(in_flight);

        tracing::warn!(removed, "queue cleared");
        Ok(removed)
    }

    /// Replay every eligible operation in enqueue order.
    ///
    /// Executor failures are recorded per item and never stop the pass.
    /// If a pass is already running, the request is folded into it: the
    /// running pass does one more sweep and this call returns a coalesced
    /// report at once. The extra sweep only picks up operations not yet
    /// attempted by this call, so each operation appears at most once in
    /// the report.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn sync_all(&self) -> Result<SyncReport, ResyncError> {
        {
            let mut pass = self.pass.lock().unwrap_or_else(PoisonError::into_inner);
            if pass.running {
                pass.rerun_requested = true;
                tracing::debug!("sync already running; re-run requested");
                return Ok(SyncReport::coalesced());
            }
            pass.running = true;
        }

        let _running = PassGuard { state: &self.pass };
        let mut report = SyncReport::default();
        let mut attempted = HashSet::new();

        loop {
            report.merge(self.run_pass(&mut attempted).await?);

            let rerun = {
                let mut pass = self.pass.lock().unwrap_or_else(PoisonError::into_inner);
                std::mem::take(&mut pass.rerun_requested)
            };
            if !rerun {
                break;
            }
        }

        tracing::info!(
            succeeded = report.succeeded,
            failed = report.failed,
            dead_lettered = report.dead_lettered,
            "sync finished"
        );
        Ok(report)
    }

    async fn run_pass(&self, attempted: &mut HashSet<OperationId>) -> Result<SyncReport, ResyncError> {
        let mut report = SyncReport::default();
        let mut cursor: Option<PageCursor> = None;
        let page_size = self.config.page_size.max(1);

        loop {
            let page = self.store.list_pending(cursor.as_ref(), page_size)?;
            let Some(last) = page.last() else {
                break;
            };
            cursor = Some(last.cursor());
            let exhausted = page.len() < page_size;

            for op in page {
                if attempted.contains(&op.id) || !op.is_retryable(self.config.retry_bound) {
                    continue;
                }
                let Ok(_guard) = self.claim(op.id) else {
                    continue;
                };
                // The page may be stale: a discard or retry can land while
                // earlier items are executing
                let Some(current) = self.store.get(&op.id)? else {
                    continue;
                };
                if !current.is_retryable(self.config.retry_bound) {
                    continue;
                }
                attempted.insert(current.id);
                report.add(self.sync_one(current).await?);
            }

            if exhausted {
                break;
            }
        }

        Ok(report)
    }

    async fn sync_one(&self, mut op: OfflineOperation) -> Result<SyncOutcome, ResyncError> {
        // A stray `syncing` record is an interrupted attempt: retry it as is
        match op.status {
            OperationStatus::Failed => transition(&mut op, OperationStatus::Pending)?,
            OperationStatus::Syncing => op.status = OperationStatus::Pending,
            OperationStatus::Pending | OperationStatus::Completed => {}
        }
        transition(&mut op, OperationStatus::Syncing)?;
        self.store.put(&op)?;

        tracing::debug!(operation_id = %op.id, op_type = %op.op_type, attempt = op.retry_count + 1, "syncing operation");

        let result = match self.executors.get(op.op_type) {
            Some(executor) => {
                executor
                    .execute(ExecutorCall {
                        op_type: op.op_type,
                        payload: op.payload.clone(),
                        operation_id: Some(op.id),
                    })
                    .await
            }
            None => Err(crate::error::ExecutorError::Application(format!(
                "no online executor registered for {}",
                op.op_type
            ))),
        };

        let outcome = match result {
            Ok(_) => {
                transition(&mut op, OperationStatus::Completed)?;
                op.synced_at = Some(Utc::now());
                op.error = None;

                if self.config.prune_completed {
                    self.store.delete(&op.id)?;
                } else {
                    self.store.put(&op)?;
                }

                tracing::info!(operation_id = %op.id, op_type = %op.op_type, "operation synced");
                SyncOutcome {
                    id: op.id,
                    op_type: op.op_type,
                    success: true,
                    error: None,
                    dead_lettered: false,
                }
            }
            Err(e) => {
                let message = e.to_string();
                transition(&mut op, OperationStatus::Failed)?;
                op.retry_count += 1;
                op.error = Some(message.clone());
                self.store.put(&op)?;

                let dead_lettered = op.is_dead_lettered(self.config.retry_bound);
                if dead_lettered {
                    tracing::warn!(
                        operation_id = %op.id,
                        op_type = %op.op_type,
                        retry_count = op.retry_count,
                        error = %message,
                        "operation dead-lettered"
                    );
                } else {
                    tracing::warn!(
                        operation_id = %op.id,
                        op_type = %op.op_type,
                        retry_count = op.retry_count,
                        error = %message,
                        "operation sync failed"
                    );
                }

                SyncOutcome {
                    id: op.id,
                    op_type: op.op_type,
                    success: false,
                    error: Some(message),
                    dead_lettered,
                }
            }
        };

        Ok(outcome)
    }

    /// Mark `id` in flight until the guard drops.
    fn claim(&self, id: OperationId) -> Result<InFlightGuard<'_>, ResyncError> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if !in_flight.insert(id) {
            return Err(ResyncError::Busy(id.to_string()));
        }
        Ok(InFlightGuard {
            set: &self.in_flight,
            id,
        })
    }

    /// Enqueue timestamp, strictly after the previous one.
    fn next_timestamp(&self) -> DateTime<Utc> {
        let mut last = self
            .last_created
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        // Stored with microsecond precision
        let mut now = Utc::now().trunc_subsecs(6);
        if let Some(prev) = *last {
            if now <= prev {
                now = prev + Duration::microseconds(1);
            }
        }
        *last = Some(now);
        now
    }
}

fn transition(op: &mut OfflineOperation, next: OperationStatus) -> Result<(), ResyncError> {
    if !op.status.can_transition_to(next) {
        return Err(ResyncError::InvalidTransition {
            id: op.id.to_string(),
            from: op.status,
            to: next,
        });
    }
    op.status = next;
    Ok(())
}

struct PassGuard<'a> {
    state: &'a Mutex<PassState>,
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        let mut pass = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        pass.running = false;
        pass.rerun_requested = false;
    }
}

struct InFlightGuard<'a> {
    set: &'a Mutex<HashSet<OperationId>>,
    id: OperationId,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let mut set = self.set.lock().unwrap_or_else(PoisonError::into_inner);
        set.remove(&self.id);
    }
}
