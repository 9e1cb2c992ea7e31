//! What the monitor synchronizes when connectivity returns.

use async_trait::async_trait;

use crate::error::ResyncError;
use crate::features::queue::{OperationQueue, SyncReport};

/// The monitor's only view of the queue.
#[async_trait]
pub trait SyncTarget: Send + Sync {
    /// Number of stored operations.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    fn pending_count(&self) -> Result<u64, ResyncError>;

    /// Run a sync pass.
    ///
    /// # Errors
    ///
    /// Returns an error if the pass could not run.
    async fn sync(&self) -> Result<SyncReport, ResyncError>;
}

#[async_trait]
impl SyncTarget for OperationQueue {
    fn pending_count(&self) -> Result<u64, ResyncError> {
        Ok(self.stats()?.outstanding())
    }

    async fn sync(&self) -> Result<SyncReport, ResyncError> {
        self.sync_all().await
    }
}
