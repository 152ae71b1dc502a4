//! spanner-truncate deletes all rows from the tables in a Cloud Spanner
//! database without deleting the tables themselves.

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use truncate::RunOptions;

/// Runs are bounded even when a delete never finishes.
const MAX_RUN_TIME: Duration = Duration::from_secs(24 * 3600);

#[derive(Parser, Debug)]
#[command(
    name = "spanner-truncate",
    version,
    about = "Delete all rows from the tables in a Cloud Spanner database without deleting the tables themselves"
)]
struct Args {
    /// GCP Project ID
    #[arg(short, long, env = "SPANNER_PROJECT_ID")]
    project: String,

    /// Cloud Spanner Instance ID
    #[arg(short, long, env = "SPANNER_INSTANCE_ID")]
    instance: String,

    /// Cloud Spanner Database ID
    #[arg(short, long, env = "SPANNER_DATABASE_ID")]
    database: String,

    /// Disable all interactive prompts
    #[arg(short, long)]
    quiet: bool,

    /// Comma separated table names to be truncated. Default to truncate all
    /// tables if not specified
    #[arg(short, long, value_delimiter = ',', conflicts_with = "exclude_tables")]
    tables: Vec<String>,

    /// Comma separated table names to be exempted from truncating
    #[arg(short, long, value_delimiter = ',')]
    exclude_tables: Vec<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = wait_for_shutdown_signal() => info!("received shutdown signal"),
            _ = tokio::time::sleep(MAX_RUN_TIME) => warn!("run deadline exceeded"),
        }
        canceller.cancel();
    });

    let options = RunOptions {
        project: args.project,
        instance: args.instance,
        database: args.database,
        quiet: args.quiet,
        target_tables: args.tables,
        exclude_tables: args.exclude_tables,
    };

    truncate::run(options, token).await.map_err(Into::into)
}

fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "warn" }));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigint =
            signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?;
        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;

        tokio::select! {
            _ = sigint.recv() => info!("received SIGINT"),
            _ = sigterm.recv() => info!("received SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for shutdown signal")?;
        info!("received Ctrl+C");
    }

    Ok(())
}
