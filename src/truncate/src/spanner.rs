//! [`SpannerClient`] implementation backed by the real Cloud Spanner
//! service.

use std::time::Duration;

use async_trait::async_trait;
use google_cloud_spanner::client::{Client, ClientConfig};
use google_cloud_spanner::statement::Statement;
use google_cloud_spanner::value::TimestampBound;

use crate::client::{BoxError, ClientError, SpannerClient};
use crate::schema::{self, DeleteAction, IndexSchema, TableSchema};

/// Cloud Spanner connection shared by the schema fetch, the row-count
/// samplers, and the partitioned deletes. Cloning shares the underlying
/// session pool.
#[derive(Clone)]
pub struct CloudSpannerClient {
    inner: Client,
}

impl CloudSpannerClient {
    /// Connects to `projects/{p}/instances/{i}/databases/{d}` with
    /// application default credentials.
    pub async fn connect(database: &str) -> Result<Self, ClientError> {
        let config = ClientConfig::default().with_auth().await.map_err(open_err)?;
        let inner = Client::new(database, config).await.map_err(open_err)?;
        Ok(Self { inner })
    }

    /// Releases the session pool. Call once the run is over.
    pub async fn close(self) {
        self.inner.close().await;
    }
}

fn open_err(err: impl Into<BoxError>) -> ClientError {
    ClientError::Open(err.into())
}

fn query_err(err: impl Into<BoxError>) -> ClientError {
    ClientError::Query(err.into())
}

#[async_trait]
impl SpannerClient for CloudSpannerClient {
    async fn fetch_table_schemas(&self) -> Result<Vec<TableSchema>, ClientError> {
        let mut tx = self.inner.single().await.map_err(query_err)?;
        let mut rows = tx
            .query(Statement::new(schema::TABLE_SCHEMA_QUERY))
            .await
            .map_err(query_err)?;

        let mut schemas = Vec::new();
        while let Some(row) = rows.next().await.map_err(query_err)? {
            let table_name = row.column_by_name::<String>("TABLE_NAME").map_err(query_err)?;
            let parent = row
                .column_by_name::<Option<String>>("PARENT_TABLE_NAME")
                .map_err(query_err)?;
            let on_delete = row
                .column_by_name::<Option<String>>("ON_DELETE_ACTION")
                .map_err(query_err)?;
            let referenced_by = row
                .column_by_name::<Vec<String>>("referencedBy")
                .map_err(query_err)?;

            schemas.push(TableSchema {
                table_name,
                parent_table_name: parent.unwrap_or_default(),
                parent_on_delete: DeleteAction::parse(on_delete.as_deref()),
                referenced_by,
            });
        }
        Ok(schemas)
    }

    async fn fetch_index_schemas(&self) -> Result<Vec<IndexSchema>, ClientError> {
        let mut tx = self.inner.single().await.map_err(query_err)?;
        let mut rows = tx
            .query(Statement::new(schema::INDEX_SCHEMA_QUERY))
            .await
            .map_err(query_err)?;

        let mut indexes = Vec::new();
        while let Some(row) = rows.next().await.map_err(query_err)? {
            let index_name = row.column_by_name::<String>("INDEX_NAME").map_err(query_err)?;
            let base_table_name = row.column_by_name::<String>("TABLE_NAME").map_err(query_err)?;
            let parent = row
                .column_by_name::<Option<String>>("PARENT_TABLE_NAME")
                .map_err(query_err)?;

            indexes.push(IndexSchema {
                index_name,
                base_table_name,
                parent_table_name: parent.unwrap_or_default(),
            });
        }
        Ok(indexes)
    }

    async fn count_rows(&self, table: &str, staleness: Duration) -> Result<u64, ClientError> {
        // The stale read keeps the per-second sampling off the leader
        // replica.
        let mut tx = self
            .inner
            .single_with_timestamp_bound(TimestampBound::exact_staleness(staleness))
            .await
            .map_err(query_err)?;
        let stmt = Statement::new(format!("SELECT COUNT(*) AS count FROM `{table}`"));
        let mut rows = tx.query(stmt).await.map_err(query_err)?;

        match rows.next().await.map_err(query_err)? {
            Some(row) => {
                let count = row.column_by_name::<i64>("count").map_err(query_err)?;
                Ok(count.max(0) as u64)
            }
            None => Ok(0),
        }
    }

    async fn delete_all_rows(&self, table: &str) -> Result<(), ClientError> {
        let stmt = Statement::new(format!("DELETE FROM `{table}` WHERE true"));
        self.inner
            .partitioned_update(stmt)
            .await
            .map(|_| ())
            .map_err(|err| ClientError::Update(err.into()))
    }
}
