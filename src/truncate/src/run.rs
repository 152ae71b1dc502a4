use std::io::{self, BufRead, Write};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::client::SpannerClient;
use crate::coordinator::Coordinator;
use crate::error::Error;
use crate::progress::ProgressRenderer;
use crate::schema::filter_table_schemas;
use crate::spanner::CloudSpannerClient;

/// Everything a truncation run needs besides a client.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub project: String,
    pub instance: String,
    pub database: String,

    /// Skip the interactive confirmation prompt.
    pub quiet: bool,

    /// Only truncate these tables (plus their cascade descendants).
    pub target_tables: Vec<String>,

    /// Truncate everything except these tables (plus the ancestors that
    /// would cascade into them). Mutually exclusive with `target_tables`.
    pub exclude_tables: Vec<String>,
}

/// Deletes all rows from the database described by `options`.
///
/// Creates the Cloud Spanner client internally and closes it on every exit
/// path, including errors and cancellation.
pub async fn run(options: RunOptions, token: CancellationToken) -> Result<(), Error> {
    let database = format!(
        "projects/{}/instances/{}/databases/{}",
        options.project, options.instance, options.database
    );

    let spanner = CloudSpannerClient::connect(&database)
        .await
        .map_err(Error::ClientOpen)?;
    let client: Arc<dyn SpannerClient> = Arc::new(spanner.clone());

    println!("Fetching table schema from {database}");
    let result = run_with_client(
        client,
        options.quiet,
        &options.target_tables,
        &options.exclude_tables,
        token,
    )
    .await;

    info!("closing spanner client");
    spanner.close().await;
    result
}

/// Deletes all rows using an externally supplied client.
///
/// Prints the deletion plan, asks for confirmation unless `quiet`, then
/// drives the coordinator to completion while the progress bars render.
/// Declining the prompt is not an error; the database is left untouched.
pub async fn run_with_client(
    client: Arc<dyn SpannerClient>,
    quiet: bool,
    target_tables: &[String],
    exclude_tables: &[String],
    token: CancellationToken,
) -> Result<(), Error> {
    let schemas = tokio::select! {
        schemas = client.fetch_table_schemas() => schemas.map_err(Error::SchemaFetch)?,
        _ = token.cancelled() => return Err(Error::Cancelled),
    };
    let schemas = filter_table_schemas(schemas, target_tables, exclude_tables)?;

    for schema in &schemas {
        println!("{}", schema.table_name);
    }
    println!();

    if quiet {
        println!("Rows in these tables will be deleted.");
    } else if !confirm("Rows in these tables will be deleted. Do you want to continue?").await {
        return Ok(());
    }

    let indexes = tokio::select! {
        indexes = client.fetch_index_schemas() => indexes.map_err(Error::SchemaFetch)?,
        _ = token.cancelled() => return Err(Error::Cancelled),
    };

    let mut coordinator = Coordinator::new(&schemas, &indexes, client);
    // Child token so the scheduler and samplers stop when this run is over,
    // not only on external cancellation.
    let run_token = token.child_token();
    coordinator.start(run_token.clone());

    let progress = ProgressRenderer::start(Arc::clone(coordinator.graph()));
    let result = coordinator.wait_completed().await;
    run_token.cancel();
    progress.finish(coordinator.graph());

    result.map(|()| {
        println!("\nDone! All rows have been deleted successfully.");
    })
}

/// Prompts until the user answers `Y` or `n`. EOF counts as declining.
async fn confirm(message: &str) -> bool {
    let message = message.to_string();
    tokio::task::spawn_blocking(move || {
        print!("{message} [Y/n] ");
        io::stdout().flush().ok();

        let mut line = String::new();
        let mut stdin = io::stdin().lock();
        loop {
            line.clear();
            match stdin.read_line(&mut line) {
                Ok(0) | Err(_) => return false,
                Ok(_) => {}
            }
            match line.trim_end() {
                "Y" => return true,
                "n" => return false,
                _ => {
                    print!("Please answer Y or n: ");
                    io::stdout().flush().ok();
                }
            }
        }
    })
    .await
    .unwrap_or(false)
}
