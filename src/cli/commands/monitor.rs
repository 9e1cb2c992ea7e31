//! Monitor and probe commands.

use std::sync::Arc;
use std::time::Duration;

use colored::Colorize;

use super::Context;
use crate::cli::args::OutputFormat;
use crate::error::ResyncError;
use crate::features::connectivity::{
    ConnectionInfo, ConnectivityMonitor, HttpProbe, LivenessProbe, LogNotifier, Notifier, SyncTarget,
};
use crate::output::{format_connection_pretty, to_json};

/// Notifier that prints sync progress to the terminal.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn sync_started(&self, count: u64) {
        println!("{} syncing {count} queued operations", "↻".cyan());
    }

    fn sync_completed(&self, succeeded: usize, failed: usize) {
        if failed == 0 {
            println!("{} synced {succeeded} operations", "✓".green());
        } else {
            println!(
                "{} synced {succeeded} operations, {}",
                "!".yellow(),
                format!("{failed} failed").red()
            );
        }
    }

    fn sync_failed(&self, message: &str) {
        println!("{} sync failed: {}", "✗".red(), message.red());
    }
}

fn render(info: &ConnectionInfo, format: OutputFormat) -> String {
    match format {
        OutputFormat::Pretty => format_connection_pretty(info),
        OutputFormat::Json => serde_json::to_string(info).unwrap_or_default(),
    }
}

fn build_monitor(ctx: &Context, notifier: Arc<dyn Notifier>) -> Result<Arc<ConnectivityMonitor>, ResyncError> {
    let probe: Arc<dyn LivenessProbe> = Arc::new(HttpProbe::new(&ctx.config.backend, &ctx.config.monitor)?);
    let target: Arc<dyn SyncTarget> = ctx.queue.clone();
    Ok(Arc::new(ConnectivityMonitor::new(
        ctx.config.monitor.clone(),
        target,
        probe,
        notifier,
    )))
}

/// Watch connectivity until Ctrl-C or `duration` elapses.
///
/// Every status change is printed. Queued operations are synced when the
/// backend becomes reachable again, unless `no_auto_sync` is set.
///
/// # Errors
///
/// Returns an error if the probe or executor HTTP clients cannot be built.
pub async fn monitor(
    ctx: &Context,
    duration: Option<u64>,
    no_auto_sync: bool,
    format: OutputFormat,
) -> Result<String, ResyncError> {
    ctx.register_http_executor()?;
    ctx.recover_interrupted()?;
    let monitor = build_monitor(ctx, Arc::new(ConsoleNotifier))?;
    monitor.set_auto_sync(!no_auto_sync);

    let initial = monitor.check_now().await;
    // Prints the current status right away, then every change
    let subscription = monitor.on_status_change(move |info| println!("{}", render(info, format)));
    if initial.is_reachable() && ctx.queue.stats()?.outstanding() > 0 {
        println!(
            "{}",
            "Operations are queued; run 'resync sync' to replay them now".dimmed()
        );
    }

    monitor.start();

    let deadline = async {
        match duration {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::warn!(error = %e, "failed to listen for Ctrl-C");
            }
        }
        () = deadline => {}
    }

    subscription.unsubscribe();
    monitor.dispose();

    let stats = ctx.queue.stats()?;
    match format {
        OutputFormat::Json => to_json(&serde_json::json!({
            "status": monitor.status(),
            "outstanding": stats.outstanding(),
        })),
        OutputFormat::Pretty => Ok(format!(
            "Stopped monitoring ({} operations outstanding)",
            stats.outstanding()
        )),
    }
}

/// Probe the backend once.
///
/// # Errors
///
/// Returns an error if the probe HTTP client cannot be built.
pub async fn probe(ctx: &Context, format: OutputFormat) -> Result<String, ResyncError> {
    let monitor = build_monitor(ctx, Arc::new(LogNotifier))?;
    monitor.check_now().await;
    let info = monitor.connection_info();
    monitor.dispose();

    match format {
        OutputFormat::Json => to_json(&info),
        OutputFormat::Pretty => Ok(format!(
            "{}  {}",
            format_connection_pretty(&info),
            ctx.config.backend.health_url().dimmed()
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn unreachable_context() -> (TempDir, Context) {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join("config.yaml"),
            "backend:\n  base_url: http://127.0.0.1:9\nmonitor:\n  probe_timeout_ms: 500\n",
        )
        .unwrap();
        let ctx = Context::open(Some(temp.path().to_path_buf())).unwrap();
        (temp, ctx)
    }

    #[tokio::test]
    async fn test_probe_unreachable_backend() {
        let (_temp, ctx) = unreachable_context();
        let output = probe(&ctx, OutputFormat::Json).await.unwrap();
        let info: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(info["status"], "offline");
    }

    #[tokio::test]
    async fn test_monitor_stops_after_duration() {
        let (_temp, ctx) = unreachable_context();
        let output = monitor(&ctx, Some(0), true, OutputFormat::Json).await.unwrap();
        let summary: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(summary["status"], "offline");
        assert_eq!(summary["outstanding"], 0);
    }
}
