//! Sync command implementation.

use super::Context;
use crate::cli::args::OutputFormat;
use crate::error::ResyncError;
use crate::features::queue::format_sync_report;
use crate::output::to_json;

/// Replay every queued operation against the backend.
///
/// # Errors
///
/// Returns an error if the store fails or the HTTP client cannot be built.
/// Individual operation failures are part of the report, not errors.
pub async fn sync(ctx: &Context, format: OutputFormat) -> Result<String, ResyncError> {
    ctx.register_http_executor()?;
    ctx.recover_interrupted()?;

    let outstanding = ctx.queue.stats()?.outstanding();
    if outstanding == 0 && format == OutputFormat::Pretty {
        return Ok("Nothing to sync.".to_string());
    }

    let report = ctx.queue.sync_all().await?;

    match format {
        OutputFormat::Json => to_json(&report),
        OutputFormat::Pretty => Ok(format_sync_report(&report)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::queue::OperationType;
    use serde_json::json;
    use tempfile::TempDir;

    fn context() -> (TempDir, Context) {
        let temp = TempDir::new().unwrap();
        let ctx = Context::open(Some(temp.path().to_path_buf())).unwrap();
        (temp, ctx)
    }

    #[tokio::test]
    async fn test_sync_empty_queue() {
        let (_temp, ctx) = context();
        let output = sync(&ctx, OutputFormat::Pretty).await.unwrap();
        assert_eq!(output, "Nothing to sync.");
    }

    #[tokio::test]
    async fn test_sync_unreachable_backend_records_failure() {
        let (temp, _) = context();
        std::fs::write(
            temp.path().join("config.yaml"),
            "backend:\n  base_url: http://127.0.0.1:9\n  request_timeout_secs: 1\n",
        )
        .unwrap();
        let ctx = Context::open(Some(temp.path().to_path_buf())).unwrap();
        let id = ctx.queue.enqueue(OperationType::CheckIn, json!({})).unwrap();

        let output = sync(&ctx, OutputFormat::Json).await.unwrap();
        let report: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(report["succeeded"], 0);
        assert_eq!(report["failed"], 1);

        let op = ctx.queue.get(&id).unwrap().unwrap();
        assert_eq!(op.retry_count, 1);
        assert!(op.error.is_some());
    }
}
