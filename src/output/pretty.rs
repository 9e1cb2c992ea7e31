use chrono::Utc;
use colored::Colorize;

use crate::features::connectivity::{ConnectionInfo, ConnectionStatus};
use crate::features::queue::{OfflineOperation, OperationStatus, QueueStats};

/// Format a list of operations as a pretty table
pub fn format_operations_pretty(operations: &[OfflineOperation], title: &str) -> String {
    if operations.is_empty() {
        return format!("{title} (0 operations)\n  No operations");
    }

    let mut output = format!("{title} ({} operations)\n", operations.len());
    output.push_str(&"─".repeat(72));
    output.push('\n');

    for op in operations {
        let status_icon = match op.status {
            OperationStatus::Pending => "⏳".normal(),
            OperationStatus::Syncing => "▶".cyan(),
            OperationStatus::Completed => "✓".green(),
            OperationStatus::Failed => "✗".red(),
        };

        let mut line = format!(
            "{} {}  {:<16} {}",
            status_icon,
            op.id.to_string().dimmed(),
            op.op_type.display_name(),
            op.created_at.format("%Y-%m-%d %H:%M:%S")
        );

        if op.retry_count > 0 {
            line.push_str(&format!("  {}", format!("{} retries", op.retry_count).yellow()));
        }

        output.push_str(&line);
        output.push('\n');

        if let Some(error) = &op.error {
            output.push_str(&format!("    {}\n", truncate(error, 60).red()));
        }
    }

    output
}

/// Format a single operation as pretty output
pub fn format_operation_pretty(op: &OfflineOperation) -> String {
    let mut output = format!("{} {}\n", op.op_type.display_name().bold(), op.id);
    output.push_str(&format!("  {}: {}\n", "Status".dimmed(), op.status));
    output.push_str(&format!("  {}: {}\n", "Retries".dimmed(), op.retry_count));
    output.push_str(&format!("  {}: {}\n", "Queued".dimmed(), op.created_at.to_rfc3339()));

    if let Some(synced_at) = op.synced_at {
        output.push_str(&format!("  {}: {}\n", "Synced".dimmed(), synced_at.to_rfc3339()));
    }

    if let Some(error) = &op.error {
        output.push_str(&format!("  {}: {}\n", "Error".dimmed(), error.red()));
    }

    output
}

/// Format queue statistics
pub fn format_stats_pretty(stats: &QueueStats, dead_lettered: usize) -> String {
    let mut lines = Vec::new();

    lines.push("Operation Queue Status".bold().to_string());
    lines.push("─".repeat(40));

    lines.push(format!(
        "  Pending:    {} {}",
        stats.pending,
        if stats.pending > 0 {
            "operations waiting".dimmed()
        } else {
            "".dimmed()
        }
    ));

    if stats.syncing > 0 {
        lines.push(format!(
            "  Syncing:    {} {}",
            stats.syncing,
            "interrupted or in progress".dimmed()
        ));
    }

    lines.push(format!("  Completed:  {} {}", stats.completed, "not yet pruned".dimmed()));

    lines.push(format!(
        "  Failed:     {} {}",
        stats.failed,
        if dead_lettered > 0 {
            format!("({dead_lettered} dead-lettered, need attention)").red()
        } else {
            "".normal()
        }
    ));

    if let Some(oldest) = stats.oldest_pending {
        let age = Utc::now().signed_duration_since(oldest);
        let age_str = if age.num_hours() > 0 {
            format!("{} hours ago", age.num_hours())
        } else if age.num_minutes() > 0 {
            format!("{} minutes ago", age.num_minutes())
        } else {
            "just now".to_string()
        };
        lines.push(format!("  Oldest:     {}", age_str.dimmed()));
    }

    if stats.outstanding() > 0 {
        lines.push(String::new());
        lines.push(
            "Run 'resync sync' to replay queued operations"
                .dimmed()
                .to_string(),
        );
    }

    lines.join("\n")
}

/// Format connection info on one line
pub fn format_connection_pretty(info: &ConnectionInfo) -> String {
    let status = match info.status {
        ConnectionStatus::Online => "online".green().bold(),
        ConnectionStatus::Slow => "slow".yellow().bold(),
        ConnectionStatus::Offline => "offline".red().bold(),
    };

    let mut line = format!("{} {status}", "●".dimmed());

    if let Some(effective) = info.effective_type {
        line.push_str(&format!("  {}", effective.to_string().cyan()));
    }
    if let Some(rtt) = info.rtt {
        line.push_str(&format!("  {}", format!("{rtt}ms").dimmed()));
    }
    if let Some(downlink) = info.downlink {
        line.push_str(&format!("  {}", format!("{downlink:.1} Mbps").dimmed()));
    }

    line
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        let head: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{head}...")
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::connectivity::{EffectiveType, LinkQuality};
    use crate::features::queue::OperationType;
    use serde_json::json;

    #[test]
    fn test_format_empty_operations() {
        let output = format_operations_pretty(&[], "Pending");
        assert!(output.contains("0 operations"));
    }

    #[test]
    fn test_format_operations_shows_errors() {
        let mut op = OfflineOperation::new(OperationType::CheckIn, json!({}), Utc::now());
        op.status = OperationStatus::Failed;
        op.retry_count = 2;
        op.error = Some("backend said no".to_string());

        let output = format_operations_pretty(&[op.clone()], "Failed");
        assert!(output.contains(&op.id.to_string()));
        assert!(output.contains("Check-in"));
        assert!(output.contains("2 retries"));
        assert!(output.contains("backend said no"));
    }

    #[test]
    fn test_format_stats() {
        let stats = QueueStats {
            pending: 2,
            failed: 1,
            ..QueueStats::default()
        };
        let output = format_stats_pretty(&stats, 1);
        assert!(output.contains("Pending:    2"));
        assert!(output.contains("1 dead-lettered"));
        assert!(output.contains("resync sync"));
    }

    #[test]
    fn test_format_connection() {
        let info = ConnectionInfo::new(
            ConnectionStatus::Slow,
            &LinkQuality {
                effective_type: Some(EffectiveType::TwoG),
                rtt: Some(900),
                ..LinkQuality::default()
            },
        );
        let output = format_connection_pretty(&info);
        assert!(output.contains("slow"));
        assert!(output.contains("2g"));
        assert!(output.contains("900ms"));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a very long error message", 10), "a very ...");
    }
}
