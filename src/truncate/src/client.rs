use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::schema::{IndexSchema, TableSchema};

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors surfaced by a [`SpannerClient`] implementation.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to open client: {0}")]
    Open(#[source] BoxError),
    #[error("query failed: {0}")]
    Query(#[source] BoxError),
    #[error("partitioned update failed: {0}")]
    Update(#[source] BoxError),
}

/// Database operations the truncation pipeline needs.
///
/// The production implementation talks to Cloud Spanner
/// ([`crate::spanner::CloudSpannerClient`]); tests run against the in-memory
/// [`crate::testing::FakeSpannerClient`].
#[async_trait]
pub trait SpannerClient: Send + Sync {
    /// Fetches all base tables with their interleave parent, `ON DELETE`
    /// action, and the list of tables referencing them via foreign keys.
    /// Results are ordered by table name, ascending.
    async fn fetch_table_schemas(&self) -> Result<Vec<TableSchema>, ClientError>;

    /// Fetches all secondary indexes with their base table and the table
    /// they are interleaved in, if any.
    async fn fetch_index_schemas(&self) -> Result<Vec<IndexSchema>, ClientError>;

    /// Counts the rows of a table with a bounded-staleness read so the
    /// periodic sampling does not hammer the leader replica.
    async fn count_rows(&self, table: &str, staleness: Duration) -> Result<u64, ClientError>;

    /// Deletes every row of a table through partitioned DML. At-least-once,
    /// non-transactional, not subject to per-transaction mutation limits.
    async fn delete_all_rows(&self, table: &str) -> Result<(), ClientError>;
}
