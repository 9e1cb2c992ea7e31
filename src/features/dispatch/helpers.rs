//! Execute-or-queue helpers.
//!
//! Every call site that wants offline resilience goes through
//! [`Dispatcher::execute_or_queue`]: the call runs now when the backend is
//! reachable, and is queued instead when it is not or when the attempt
//! fails with a transient network error.

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::Serialize;
use serde_json::Value;

use crate::error::{ExecutorError, ResyncError};
use crate::features::connectivity::ConnectivityMonitor;
use crate::features::queue::{ExecutorCall, OnlineExecutor, OperationId, OperationQueue, OperationType};

/// Result of a dispatched call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "value", rename_all = "snake_case")]
pub enum DispatchOutcome<T> {
    /// The call ran now
    Executed(T),
    /// The call was queued for later
    Queued(OperationId),
}

impl<T> DispatchOutcome<T> {
    /// Whether the call was deferred to the queue.
    #[must_use]
    pub const fn is_queued(&self) -> bool {
        matches!(self, Self::Queued(_))
    }

    /// The value, if the call ran.
    #[must_use]
    pub fn executed(self) -> Option<T> {
        match self {
            Self::Executed(value) => Some(value),
            Self::Queued(_) => None,
        }
    }
}

/// Routes calls to the backend or to the queue.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    queue: Arc<OperationQueue>,
    monitor: Arc<ConnectivityMonitor>,
}

impl Dispatcher {
    /// Create a dispatcher over a queue and the monitor that gates it.
    #[must_use]
    pub const fn new(queue: Arc<OperationQueue>, monitor: Arc<ConnectivityMonitor>) -> Self {
        Self { queue, monitor }
    }

    /// The queue deferred calls go to.
    #[must_use]
    pub const fn queue(&self) -> &Arc<OperationQueue> {
        &self.queue
    }

    /// Run `online` now, or queue `payload` for later.
    ///
    /// `online` receives the payload. Transient failures (`Network`,
    /// `Timeout`) queue the operation; any other failure is returned as is.
    ///
    /// # Errors
    ///
    /// Returns the executor's non-transient error, or a storage error if
    /// the operation cannot be queued.
    pub async fn execute_or_queue<T, F, Fut>(
        &self,
        op_type: OperationType,
        payload: Value,
        online: F,
    ) -> Result<DispatchOutcome<T>, ResyncError>
    where
        F: FnOnce(Value) -> Fut + Send,
        Fut: Future<Output = Result<T, ExecutorError>> + Send,
    {
        if !self.monitor.is_reachable() {
            let id = self.queue.enqueue(op_type, payload)?;
            tracing::info!(operation_id = %id, op_type = %op_type, "offline; operation queued");
            return Ok(DispatchOutcome::Queued(id));
        }

        match online(payload.clone()).await {
            Ok(value) => Ok(DispatchOutcome::Executed(value)),
            Err(e) if e.is_transient() => {
                let id = self.queue.enqueue(op_type, payload)?;
                tracing::warn!(
                    operation_id = %id,
                    op_type = %op_type,
                    error = %e,
                    "transient failure; operation queued"
                );
                Ok(DispatchOutcome::Queued(id))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Wrap `action` so every call goes through
    /// [`execute_or_queue`](Self::execute_or_queue).
    ///
    /// `action` also becomes the replay executor for `op_type` unless one
    /// is registered already.
    pub fn with_offline_queue(
        self: &Arc<Self>,
        op_type: OperationType,
        action: Arc<dyn OnlineExecutor>,
    ) -> impl Fn(Value) -> BoxFuture<'static, Result<DispatchOutcome<Value>, ResyncError>> + Send + Sync
    {
        self.queue
            .executors()
            .register_if_absent(op_type, Arc::clone(&action));

        let dispatcher = Arc::clone(self);
        move |payload: Value| -> BoxFuture<'static, Result<DispatchOutcome<Value>, ResyncError>> {
            let dispatcher = Arc::clone(&dispatcher);
            let action = Arc::clone(&action);
            Box::pin(async move {
                dispatcher
                    .execute_or_queue(op_type, payload, move |payload| async move {
                        action
                            .execute(ExecutorCall::immediate(op_type, payload))
                            .await
                    })
                    .await
            })
        }
    }
}
