//! Command implementations for resync.
//!
//! This module contains the implementation of all CLI commands.

mod actions;
mod completions;
mod monitor;
mod queue;
mod sync;

pub use actions::actions;
pub use completions::completions;
pub use monitor::{monitor, probe, ConsoleNotifier};
pub use queue::queue;
pub use sync::sync;

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{Config, Paths};
use crate::error::ResyncError;
use crate::features::dispatch::UsageTracker;
use crate::features::queue::{HttpExecutor, OnlineExecutor, OperationQueue, SqliteQueueStore};
use crate::storage::{Database, SqliteKv};

/// Everything a command needs: resolved paths, settings, the queue and
/// quick action usage.
#[derive(Debug)]
pub struct Context {
    /// Resolved data paths
    pub paths: Paths,
    /// Loaded settings
    pub config: Config,
    /// Operation queue over the on-disk store
    pub queue: Arc<OperationQueue>,
    /// Quick action usage, kept in the same database
    pub usage: Arc<UsageTracker>,
}

impl Context {
    /// Resolve paths, load settings and open the queue.
    ///
    /// Opening never touches queued operations, so read-only commands can
    /// run next to a sync in another process.
    ///
    /// # Errors
    ///
    /// Returns an error if the data directory, config file or database
    /// cannot be used.
    pub fn open(home: Option<PathBuf>) -> Result<Self, ResyncError> {
        let paths = match home {
            Some(root) => Paths::with_root(root),
            None => Paths::new()?,
        };
        paths.ensure_dirs()?;

        let config = Config::load_from_path(&paths.config_file)?;
        let db = Database::open_at(&paths.database)?;
        let usage = Arc::new(UsageTracker::new(
            Arc::new(SqliteKv::new(db.clone())),
            config.actions.max_usage_records,
        ));
        let queue = Arc::new(OperationQueue::new(
            Arc::new(SqliteQueueStore::new(db)),
            config.queue.clone(),
        ));

        Ok(Self {
            paths,
            config,
            queue,
            usage,
        })
    }

    /// Put operations left mid-sync by an earlier process back to pending.
    ///
    /// Only commands that sync call this.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn recover_interrupted(&self) -> Result<usize, ResyncError> {
        let recovered = self.queue.recover()?;
        if recovered > 0 {
            tracing::warn!(recovered, "recovered operations interrupted mid-sync");
        }
        Ok(recovered)
    }

    /// Replay every operation type over HTTP against the configured backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn register_http_executor(&self) -> Result<(), ResyncError> {
        let executor: Arc<dyn OnlineExecutor> = Arc::new(HttpExecutor::new(&self.config.backend)?);
        self.queue.executors().register_all(&executor);
        Ok(())
    }
}
