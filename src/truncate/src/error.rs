use thiserror::Error;

use crate::client::ClientError;

/// Errors that abort a truncation run.
///
/// Row-count sampling failures are not represented here: sampling is
/// best-effort and transient query errors are swallowed at the source.
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to create Cloud Spanner client: {0}")]
    ClientOpen(#[source] ClientError),

    #[error("failed to fetch table schema: {0}")]
    SchemaFetch(#[source] ClientError),

    #[error("tables and exclude-tables cannot be specified at the same time")]
    ConflictingSelection,

    #[error("failed to delete rows from {table}: {source}")]
    Delete {
        table: String,
        #[source]
        source: ClientError,
    },

    #[error("no deletable tables found, probably there are circular foreign key references between tables")]
    Stall,

    #[error("operation cancelled")]
    Cancelled,
}
