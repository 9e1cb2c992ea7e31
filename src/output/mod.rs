//! Output formatting for resync.
//!
//! This module provides formatters for displaying queue data in various formats.

mod json;
mod pretty;

use crate::cli::args::OutputFormat;
use crate::error::ResyncError;
use crate::features::queue::{OfflineOperation, QueueStats};

pub use json::*;
pub use pretty::*;

/// Format operations based on output format
///
/// # Errors
///
/// Returns `ResyncError::Json` if JSON serialization fails.
pub fn format_operations(
    operations: &[OfflineOperation],
    title: &str,
    format: OutputFormat,
) -> Result<String, ResyncError> {
    match format {
        OutputFormat::Pretty => Ok(format_operations_pretty(operations, title)),
        OutputFormat::Json => format_operations_json(operations, title),
    }
}

/// Format a single operation based on output format
///
/// # Errors
///
/// Returns `ResyncError::Json` if JSON serialization fails.
pub fn format_operation(op: &OfflineOperation, format: OutputFormat) -> Result<String, ResyncError> {
    match format {
        OutputFormat::Pretty => Ok(format_operation_pretty(op)),
        OutputFormat::Json => to_json(op),
    }
}

/// Format queue statistics based on output format
///
/// # Errors
///
/// Returns `ResyncError::Json` if JSON serialization fails.
pub fn format_stats(
    stats: &QueueStats,
    dead_lettered: usize,
    format: OutputFormat,
) -> Result<String, ResyncError> {
    match format {
        OutputFormat::Pretty => Ok(format_stats_pretty(stats, dead_lettered)),
        OutputFormat::Json => format_stats_json(stats, dead_lettered),
    }
}
