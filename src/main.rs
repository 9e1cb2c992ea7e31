use clap::Parser;
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use resync::cli::args::{Cli, Commands};
use resync::cli::commands::{self, Context};
use resync::error::ResyncError;

const LOG_ENV: &str = "RESYNC_LOG";

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("{}: {}", "error".red().bold(), e);
        std::process::exit(1);
    }
}

fn init_logging(default_level: &str, verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_level))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run() -> Result<(), ResyncError> {
    let cli = Cli::parse();
    let format = cli.output;

    if let Commands::Completions { shell } = cli.command {
        println!("{}", commands::completions(shell)?);
        return Ok(());
    }

    let ctx = Context::open(cli.home)?;
    init_logging(&ctx.config.logging.level, cli.verbose);

    let output = match cli.command {
        Commands::Queue(args) => commands::queue(&ctx, args.command, format)?,
        Commands::Sync => commands::sync(&ctx, format).await?,
        Commands::Monitor {
            duration,
            no_auto_sync,
        } => commands::monitor(&ctx, duration, no_auto_sync, format).await?,
        Commands::Probe => commands::probe(&ctx, format).await?,
        Commands::Actions(args) => commands::actions(&ctx, args.command, format)?,
        Commands::Completions { .. } => String::new(),
    };

    if !output.is_empty() {
        println!("{output}");
    }
    Ok(())
}
