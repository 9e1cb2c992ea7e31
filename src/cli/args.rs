use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};

use crate::config::HOME_ENV;

#[derive(Parser)]
#[command(name = "resync")]
#[command(about = "Offline-first operation queue with connectivity-aware sync")]
#[command(long_about = "resync - offline operation queue

Records operations durably while the backend is unreachable and replays
them in order once connectivity returns.

QUICK START:
  resync queue add capture-text '{\"text\":\"hi\"}'   Queue an operation
  resync queue status                                 Show queue counts
  resync sync                                         Replay the queue now
  resync monitor                                      Watch connectivity and sync on restore

OUTPUT FORMATS:
  --output pretty    Human-readable colored output (default)
  --output json      Machine-readable JSON for scripting

For more information on a specific command, run:
  resync <command> --help")]
#[command(version, propagate_version = true)]
pub struct Cli {
    /// Output format for command results
    ///
    /// Use 'pretty' for human-readable colored output (default),
    /// or 'json' for machine-readable output suitable for scripting.
    #[arg(short, long, value_enum, default_value = "pretty", global = true)]
    pub output: OutputFormat,

    /// Data directory holding config.yaml and the queue database
    #[arg(long, env = HOME_ENV, global = true)]
    pub home: Option<PathBuf>,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for command results.
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable colored output.
    #[default]
    Pretty,
    /// Machine-readable JSON output.
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Inspect and manage the operation queue
    ///
    /// # Examples
    ///
    ///   resync queue status
    ///   resync queue list --status failed
    ///   resync queue add check-in '{"site": 4}'
    ///   resync queue dead-letters
    #[command(alias = "q")]
    Queue(QueueArgs),

    /// Replay queued operations against the backend now
    ///
    /// Operations are sent in the order they were queued. Failures are
    /// recorded per operation and never stop the pass; an operation that
    /// keeps failing is dead-lettered after the configured retry bound.
    ///
    /// # Examples
    ///
    ///   resync sync
    ///   resync sync -o json
    Sync,

    /// Watch connectivity and sync when it returns
    ///
    /// Probes the backend's health endpoint on the configured interval and
    /// prints every status change. Press Ctrl-C to stop.
    ///
    /// # Examples
    ///
    ///   resync monitor
    ///   resync monitor --duration 120
    Monitor {
        /// Stop after this many seconds
        #[arg(long, short = 'd')]
        duration: Option<u64>,

        /// Do not sync automatically when connectivity returns
        #[arg(long)]
        no_auto_sync: bool,
    },

    /// Probe the backend once and report connectivity
    Probe,

    /// Inspect quick actions and their usage ranking
    ///
    /// Actions are declared in actions.yaml in the data directory.
    ///
    /// # Examples
    ///
    ///   resync actions list
    ///   resync actions top -n 3
    ///   resync actions pin new-note
    Actions(ActionsArgs),

    /// Generate shell completions
    ///
    /// # Examples
    ///
    ///   resync completions bash > /usr/local/etc/bash_completion.d/resync
    ///   resync completions zsh > ~/.zsh/completions/_resync
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

/// Arguments for the queue command.
#[derive(clap::Args)]
pub struct QueueArgs {
    #[command(subcommand)]
    pub command: QueueCommands,
}

/// Queue subcommands.
#[derive(Subcommand)]
pub enum QueueCommands {
    /// Show queue status
    ///
    /// Displays pending, syncing, completed, failed and dead-lettered counts.
    Status,

    /// List queued operations
    List {
        /// Filter by status (pending, syncing, completed, failed)
        #[arg(long, short = 's', default_value = "pending")]
        status: String,

        /// Maximum operations to show
        #[arg(long, short = 'n', default_value = "20")]
        limit: usize,
    },

    /// Queue an operation
    ///
    /// The payload is passed through to the backend untouched.
    Add {
        /// Operation type (capture-photo, capture-text, check-in, ...)
        op_type: String,

        /// Payload as JSON
        #[arg(default_value = "{}")]
        payload: String,
    },

    /// Reset failed operations for another attempt
    ///
    /// Dead-lettered operations are only retried this way.
    Retry {
        /// Retry all failed operations
        #[arg(long)]
        all: bool,

        /// Operation ID to retry
        id: Option<String>,
    },

    /// Remove an operation without syncing it
    Discard {
        /// Operation ID
        id: String,
    },

    /// List operations that exhausted their retries
    DeadLetters,

    /// Remove operations from the queue
    ///
    /// By default only prunes completed operations.
    Clear {
        /// Remove every operation, including unsynced ones
        #[arg(long)]
        all: bool,

        /// Only prune completed operations older than this many hours
        #[arg(long, default_value = "24")]
        older_than: i64,

        /// Required with --all
        #[arg(long)]
        force: bool,
    },
}

/// Arguments for the actions command.
#[derive(clap::Args)]
pub struct ActionsArgs {
    #[command(subcommand)]
    pub command: ActionsCommands,
}

/// Quick action subcommands.
#[derive(Subcommand)]
pub enum ActionsCommands {
    /// List registered actions with their use counts
    List,

    /// Most used actions, ties broken by recency
    Top {
        /// Maximum actions to show
        #[arg(long, short = 'n', default_value = "5")]
        limit: usize,
    },

    /// Pin an action
    Pin {
        /// Action ID
        id: String,
    },

    /// Unpin an action
    Unpin {
        /// Action ID
        id: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_queue_add() {
        let cli = Cli::parse_from(["resync", "-o", "json", "queue", "add", "check-in", r#"{"a":1}"#]);
        assert_eq!(cli.output, OutputFormat::Json);
        match cli.command {
            Commands::Queue(QueueArgs {
                command: QueueCommands::Add { op_type, payload },
            }) => {
                assert_eq!(op_type, "check-in");
                assert_eq!(payload, r#"{"a":1}"#);
            }
            _ => panic!("expected queue add"),
        }
    }

    #[test]
    fn test_parse_monitor_duration() {
        let cli = Cli::parse_from(["resync", "monitor", "--duration", "5"]);
        assert!(matches!(
            cli.command,
            Commands::Monitor {
                duration: Some(5),
                no_auto_sync: false
            }
        ));
    }
}
