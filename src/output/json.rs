//! JSON output formatting for resync.

use serde::Serialize;
use serde_json::json;

use crate::error::ResyncError;
use crate::features::queue::{OfflineOperation, QueueStats};

/// Format operations as JSON
///
/// # Errors
///
/// Returns `ResyncError::Json` if serialization fails.
pub fn format_operations_json(
    operations: &[OfflineOperation],
    list_name: &str,
) -> Result<String, ResyncError> {
    let output = json!({
        "list": list_name,
        "count": operations.len(),
        "items": operations
    });
    Ok(serde_json::to_string_pretty(&output)?)
}

/// Format queue statistics as JSON
///
/// # Errors
///
/// Returns `ResyncError::Json` if serialization fails.
pub fn format_stats_json(stats: &QueueStats, dead_lettered: usize) -> Result<String, ResyncError> {
    let output = json!({
        "pending": stats.pending,
        "syncing": stats.syncing,
        "completed": stats.completed,
        "failed": stats.failed,
        "dead_lettered": dead_lettered,
        "total": stats.total(),
        "oldest_pending": stats.oldest_pending.map(|t| t.to_rfc3339()),
    });
    Ok(serde_json::to_string_pretty(&output)?)
}

/// Serialize any value as pretty JSON
///
/// # Errors
///
/// Returns `ResyncError::Json` if serialization fails.
pub fn to_json<T: Serialize>(value: &T) -> Result<String, ResyncError> {
    Ok(serde_json::to_string_pretty(value)?)
}
