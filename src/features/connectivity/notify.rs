//! User-facing sync notifications.
//!
//! Purely advisory: nothing depends on a notification being delivered.

/// Receives the three sync notification moments.
#[cfg_attr(test, mockall::automock)]
pub trait Notifier: Send + Sync {
    /// A sync pass is starting with `count` queued operations.
    fn sync_started(&self, count: u64);

    /// A sync pass finished.
    fn sync_completed(&self, succeeded: usize, failed: usize);

    /// A sync pass could not run at all.
    fn sync_failed(&self, message: &str);
}

/// Notifier that writes to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn sync_started(&self, count: u64) {
        tracing::info!(count, "syncing queued operations");
    }

    fn sync_completed(&self, succeeded: usize, failed: usize) {
        if failed == 0 {
            tracing::info!(succeeded, "sync complete");
        } else {
            tracing::warn!(succeeded, failed, "sync complete with failures");
        }
    }

    fn sync_failed(&self, message: &str) {
        tracing::error!(error = message, "sync failed");
    }
}
