//! Queue command implementation.
//!
//! Handles operation queue inspection and operator actions.

use chrono::Duration;
use serde_json::json;

use super::Context;
use crate::cli::args::{OutputFormat, QueueCommands};
use crate::error::ResyncError;
use crate::features::queue::{OperationId, OperationStatus, OperationType};
use crate::output::{format_operation, format_operations, format_stats, to_json};

/// Execute queue subcommands.
///
/// # Errors
///
/// Returns an error if arguments are invalid or the queue fails.
pub fn queue(ctx: &Context, cmd: QueueCommands, format: OutputFormat) -> Result<String, ResyncError> {
    match cmd {
        QueueCommands::Status => show_status(ctx, format),
        QueueCommands::List { status, limit } => list_operations(ctx, &status, limit, format),
        QueueCommands::Add { op_type, payload } => add_operation(ctx, &op_type, &payload, format),
        QueueCommands::Retry { all, id } => retry_operations(ctx, all, id.as_deref(), format),
        QueueCommands::Discard { id } => discard_operation(ctx, &id, format),
        QueueCommands::DeadLetters => {
            let dead = ctx.queue.dead_letters()?;
            match format {
                OutputFormat::Pretty if dead.is_empty() => Ok("No dead-lettered operations.".to_string()),
                _ => format_operations(&dead, "dead-letters", format),
            }
        }
        QueueCommands::Clear {
            all,
            older_than,
            force,
        } => clear_operations(ctx, all, older_than, force, format),
    }
}

fn show_status(ctx: &Context, format: OutputFormat) -> Result<String, ResyncError> {
    let stats = ctx.queue.stats()?;
    let dead_lettered = ctx.queue.dead_letters()?.len();
    format_stats(&stats, dead_lettered, format)
}

fn list_operations(
    ctx: &Context,
    status: &str,
    limit: usize,
    format: OutputFormat,
) -> Result<String, ResyncError> {
    let status: OperationStatus = status.parse().map_err(ResyncError::Config)?;

    let mut operations = ctx.queue.list(status)?;
    operations.truncate(limit);

    let title = status.to_string().to_uppercase();
    format_operations(&operations, &title, format)
}

fn add_operation(
    ctx: &Context,
    op_type: &str,
    payload: &str,
    format: OutputFormat,
) -> Result<String, ResyncError> {
    let op_type: OperationType = op_type.parse().map_err(ResyncError::Config)?;
    let payload: serde_json::Value = serde_json::from_str(payload)
        .map_err(|e| ResyncError::Config(format!("Payload is not valid JSON: {e}")))?;

    let id = ctx.queue.enqueue(op_type, payload)?;
    let operation = ctx
        .queue
        .get(&id)?
        .ok_or_else(|| ResyncError::NotFound(format!("operation {id}")))?;

    match format {
        OutputFormat::Json => to_json(&operation),
        OutputFormat::Pretty => Ok(format!(
            "Queued {} operation (ID: {id}); it will sync when online",
            op_type.display_name()
        )),
    }
}

fn retry_operations(
    ctx: &Context,
    all: bool,
    id: Option<&str>,
    format: OutputFormat,
) -> Result<String, ResyncError> {
    if let Some(id) = id {
        let operation = ctx.queue.retry(&parse_id(id)?)?;
        match format {
            OutputFormat::Json => to_json(&operation),
            OutputFormat::Pretty => Ok(format!("Reset operation {id} for retry")),
        }
    } else if all {
        let count = ctx.queue.retry_all_failed()?;
        match format {
            OutputFormat::Json => to_json(&json!({ "reset": count })),
            OutputFormat::Pretty => Ok(format!("Reset {count} failed operations for retry")),
        }
    } else {
        Err(ResyncError::Config(
            "Specify --all or provide an operation ID".to_string(),
        ))
    }
}

fn discard_operation(ctx: &Context, id: &str, format: OutputFormat) -> Result<String, ResyncError> {
    let op_id = parse_id(id)?;
    let operation = ctx
        .queue
        .get(&op_id)?
        .ok_or_else(|| ResyncError::NotFound(format!("operation {id}")))?;

    ctx.queue.discard(&op_id)?;

    match format {
        OutputFormat::Json => to_json(&json!({ "discarded": operation })),
        OutputFormat::Pretty => Ok(format!(
            "Discarded operation:\n{}",
            format_operation(&operation, format)?
        )),
    }
}

fn clear_operations(
    ctx: &Context,
    all: bool,
    older_than: i64,
    force: bool,
    format: OutputFormat,
) -> Result<String, ResyncError> {
    if all {
        if !force {
            return Err(ResyncError::Config(
                "Use --force to clear all operations".to_string(),
            ));
        }
        let count = ctx.queue.clear()?;

        match format {
            OutputFormat::Json => to_json(&json!({ "cleared": count })),
            OutputFormat::Pretty => Ok(format!("Cleared all {count} operations from queue")),
        }
    } else {
        let count = ctx.queue.prune_completed(Duration::hours(older_than))?;

        match format {
            OutputFormat::Json => to_json(&json!({ "cleared": count })),
            OutputFormat::Pretty => Ok(format!(
                "Cleared {count} completed operations older than {older_than} hours"
            )),
        }
    }
}

fn parse_id(id: &str) -> Result<OperationId, ResyncError> {
    id.parse()
        .map_err(|e| ResyncError::Config(format!("Invalid operation ID '{id}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn context() -> (TempDir, Context) {
        let temp = TempDir::new().unwrap();
        let ctx = Context::open(Some(temp.path().to_path_buf())).unwrap();
        (temp, ctx)
    }

    #[test]
    fn test_add_and_list() {
        let (_temp, ctx) = context();

        let added = queue(
            &ctx,
            QueueCommands::Add {
                op_type: "capture_text".to_string(),
                payload: r#"{"text":"hello"}"#.to_string(),
            },
            OutputFormat::Json,
        )
        .unwrap();
        let added: serde_json::Value = serde_json::from_str(&added).unwrap();
        assert_eq!(added["type"], "capture-text");
        assert_eq!(added["payload"]["text"], "hello");

        let listed = queue(
            &ctx,
            QueueCommands::List {
                status: "pending".to_string(),
                limit: 10,
            },
            OutputFormat::Json,
        )
        .unwrap();
        let listed: serde_json::Value = serde_json::from_str(&listed).unwrap();
        assert_eq!(listed["count"], 1);
    }

    #[test]
    fn test_add_rejects_bad_input() {
        let (_temp, ctx) = context();

        let bad_type = queue(
            &ctx,
            QueueCommands::Add {
                op_type: "teleport".to_string(),
                payload: "{}".to_string(),
            },
            OutputFormat::Pretty,
        );
        assert!(matches!(bad_type, Err(ResyncError::Config(_))));

        let bad_payload = queue(
            &ctx,
            QueueCommands::Add {
                op_type: "check-in".to_string(),
                payload: "{not json".to_string(),
            },
            OutputFormat::Pretty,
        );
        assert!(matches!(bad_payload, Err(ResyncError::Config(_))));
    }

    #[test]
    fn test_retry_requires_target() {
        let (_temp, ctx) = context();
        let result = queue(&ctx, QueueCommands::Retry { all: false, id: None }, OutputFormat::Pretty);
        assert!(matches!(result, Err(ResyncError::Config(_))));
    }

    #[test]
    fn test_discard() {
        let (_temp, ctx) = context();
        let id = ctx
            .queue
            .enqueue(OperationType::CheckIn, json!({}))
            .unwrap();

        let output = queue(
            &ctx,
            QueueCommands::Discard { id: id.to_string() },
            OutputFormat::Pretty,
        )
        .unwrap();
        assert!(output.contains("Discarded"));
        assert_eq!(ctx.queue.get_queue_size().unwrap(), 0);

        let missing = queue(
            &ctx,
            QueueCommands::Discard { id: id.to_string() },
            OutputFormat::Pretty,
        );
        assert!(matches!(missing, Err(ResyncError::NotFound(_))));
    }

    #[test]
    fn test_clear_all_requires_force() {
        let (_temp, ctx) = context();
        ctx.queue.enqueue(OperationType::CheckIn, json!({})).unwrap();

        let refused = queue(
            &ctx,
            QueueCommands::Clear {
                all: true,
                older_than: 24,
                force: false,
            },
            OutputFormat::Pretty,
        );
        assert!(matches!(refused, Err(ResyncError::Config(_))));

        queue(
            &ctx,
            QueueCommands::Clear {
                all: true,
                older_than: 24,
                force: true,
            },
            OutputFormat::Pretty,
        )
        .unwrap();
        assert_eq!(ctx.queue.get_queue_size().unwrap(), 0);
    }

    #[test]
    fn test_status_json() {
        let (_temp, ctx) = context();
        ctx.queue.enqueue(OperationType::CheckIn, json!({})).unwrap();

        let output = queue(&ctx, QueueCommands::Status, OutputFormat::Json).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed["pending"], 1);
        assert_eq!(parsed["dead_lettered"], 0);
    }
}
