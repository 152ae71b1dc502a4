//! In-memory [`SpannerClient`] used by the unit and integration tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::client::{ClientError, SpannerClient};
use crate::schema::{IndexSchema, TableSchema};

#[derive(Default)]
struct FakeState {
    rows: HashMap<String, u64>,
    deleted: Vec<String>,
    fail_delete: HashSet<String>,
    fail_count: HashSet<String>,
    hang_delete: HashSet<String>,
}

/// Fake database holding per-table row counts.
///
/// Bulk deletes empty the table and its cascade-reachable descendants, the
/// way a partitioned delete on an interleaved hierarchy would. Failures can
/// be injected per table for both deletes and counts.
#[derive(Default)]
pub struct FakeSpannerClient {
    schemas: Vec<TableSchema>,
    indexes: Vec<IndexSchema>,
    state: Mutex<FakeState>,
}

impl FakeSpannerClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a table with its schema descriptor and initial row count.
    pub fn with_table(mut self, schema: TableSchema, rows: u64) -> Self {
        self.state
            .get_mut()
            .expect("fake state poisoned")
            .rows
            .insert(schema.table_name.clone(), rows);
        self.schemas.push(schema);
        self
    }

    /// Adds a table that is neither interleaved nor referenced.
    pub fn with_flat_table(self, name: &str, rows: u64) -> Self {
        self.with_table(
            TableSchema {
                table_name: name.to_string(),
                ..TableSchema::default()
            },
            rows,
        )
    }

    pub fn with_index(mut self, index: IndexSchema) -> Self {
        self.indexes.push(index);
        self
    }

    pub fn set_rows(&self, table: &str, rows: u64) {
        self.lock().rows.insert(table.to_string(), rows);
    }

    /// Makes `delete_all_rows` fail for the given table.
    pub fn fail_delete(&self, table: &str) {
        self.lock().fail_delete.insert(table.to_string());
    }

    /// Makes `delete_all_rows` park forever for the given table, so tests
    /// can exercise cancellation of an in-flight delete.
    pub fn hang_delete(&self, table: &str) {
        self.lock().hang_delete.insert(table.to_string());
    }

    /// Makes `count_rows` fail for the given table.
    pub fn fail_count(&self, table: &str) {
        self.lock().fail_count.insert(table.to_string());
    }

    pub fn clear_count_failure(&self, table: &str) {
        self.lock().fail_count.remove(table);
    }

    /// Tables that received a bulk delete, in issue order.
    pub fn deleted_tables(&self) -> Vec<String> {
        self.lock().deleted.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().expect("fake state poisoned")
    }

    /// The deleted table plus everything reachable over cascade edges.
    fn cascade_closure(&self, table: &str) -> Vec<String> {
        let mut closure = vec![table.to_string()];
        let mut cursor = 0;
        while cursor < closure.len() {
            for schema in &self.schemas {
                if schema.is_cascade_deletable()
                    && schema.parent_table_name == closure[cursor]
                    && !closure.contains(&schema.table_name)
                {
                    closure.push(schema.table_name.clone());
                }
            }
            cursor += 1;
        }
        closure
    }
}

#[async_trait]
impl SpannerClient for FakeSpannerClient {
    async fn fetch_table_schemas(&self) -> Result<Vec<TableSchema>, ClientError> {
        let mut schemas = self.schemas.clone();
        schemas.sort_by(|a, b| a.table_name.cmp(&b.table_name));
        Ok(schemas)
    }

    async fn fetch_index_schemas(&self) -> Result<Vec<IndexSchema>, ClientError> {
        Ok(self.indexes.clone())
    }

    async fn count_rows(&self, table: &str, _staleness: Duration) -> Result<u64, ClientError> {
        let state = self.lock();
        if state.fail_count.contains(table) {
            return Err(ClientError::Query("injected count failure".into()));
        }
        Ok(state.rows.get(table).copied().unwrap_or(0))
    }

    async fn delete_all_rows(&self, table: &str) -> Result<(), ClientError> {
        let hang = self.lock().hang_delete.contains(table);
        if hang {
            std::future::pending::<()>().await;
        }

        let mut state = self.lock();
        if state.fail_delete.contains(table) {
            return Err(ClientError::Update("injected delete failure".into()));
        }

        state.deleted.push(table.to_string());
        for name in self.cascade_closure(table) {
            state.rows.insert(name, 0);
        }
        Ok(())
    }
}
