use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::client::SpannerClient;
use crate::error::Error;
use crate::graph::TableGraph;
use crate::schema::{IndexSchema, TableSchema};

/// How often the coordinator looks for tables that became deletable.
const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Schedules bulk deletes so that no table is deleted while a database
/// constraint still depends on its rows.
///
/// Each tick the coordinator computes the set of currently deletable tables
/// from the relationship graph, starts their deletes in parallel, and marks
/// their cascade subtrees. When nothing is deletable, nothing is in flight,
/// and tables remain, the run has stalled on a dependency cycle.
pub struct Coordinator {
    graph: Arc<TableGraph>,
    err_tx: mpsc::Sender<Error>,
    err_rx: mpsc::Receiver<Error>,
}

impl Coordinator {
    pub fn new(
        schemas: &[TableSchema],
        indexes: &[IndexSchema],
        client: Arc<dyn SpannerClient>,
    ) -> Self {
        let graph = Arc::new(TableGraph::new(schemas, indexes, client));
        // Every deleter plus the tick task can report one error.
        let (err_tx, err_rx) = mpsc::channel(schemas.len().max(1) + 1);
        Self {
            graph,
            err_tx,
            err_rx,
        }
    }

    /// The relationship graph, for read-only progress observation.
    pub fn graph(&self) -> &Arc<TableGraph> {
        &self.graph
    }

    /// Starts the row-count samplers and the scheduling loop.
    pub fn start(&self, token: CancellationToken) {
        for table in self.graph.tables() {
            Arc::clone(table.deleter()).start_row_count_updater(token.clone());
        }

        let graph = Arc::clone(&self.graph);
        let err_tx = self.err_tx.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(TICK_INTERVAL);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if !tick(&graph, &err_tx, &token).await {
                            return;
                        }
                    }
                    _ = token.cancelled() => {
                        let _ = err_tx.send(Error::Cancelled).await;
                        return;
                    }
                }
            }
        });
    }

    /// Blocks until every table drained or a run-level error occurred.
    /// The first error wins; in-flight deletes are left to the token.
    pub async fn wait_completed(&mut self) -> Result<(), Error> {
        let graph = Arc::clone(&self.graph);
        let mut ticker = tokio::time::interval(TICK_INTERVAL);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if graph.all_completed() {
                        return Ok(());
                    }
                }
                err = self.err_rx.recv() => {
                    if let Some(err) = err {
                        return Err(err);
                    }
                }
            }
        }
    }
}

/// One scheduling pass. Returns false once the loop should stop.
async fn tick(
    graph: &Arc<TableGraph>,
    err_tx: &mpsc::Sender<Error>,
    token: &CancellationToken,
) -> bool {
    let deletable = graph.find_deletable();

    if deletable.is_empty() {
        if !graph.all_completed() && !graph.any_deleting() {
            let _ = err_tx.send(Error::Stall).await;
            return false;
        }
        return true;
    }

    for id in deletable {
        let table = graph.table(id);
        info!(table = %table.name(), "starting bulk delete");

        let deleter = Arc::clone(table.deleter());
        let err_tx = err_tx.clone();
        let token = token.clone();
        tokio::spawn(async move {
            if let Err(err) = deleter.delete_rows(&token).await {
                debug!(table = %deleter.table_name(), %err, "bulk delete failed");
                let _ = err_tx.send(err).await;
            }
        });

        // The parent delete wipes the cascade subtree along with it.
        graph.mark_cascading(id);
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deleter::Status;
    use crate::schema::DeleteAction;
    use crate::testing::FakeSpannerClient;

    fn child_of(name: &str, parent: &str, on_delete: DeleteAction) -> TableSchema {
        TableSchema {
            table_name: name.to_string(),
            parent_table_name: parent.to_string(),
            parent_on_delete: on_delete,
            referenced_by: Vec::new(),
        }
    }

    fn flat(name: &str) -> TableSchema {
        TableSchema {
            table_name: name.to_string(),
            ..TableSchema::default()
        }
    }

    async fn drive(fake: Arc<FakeSpannerClient>, schemas: Vec<TableSchema>) -> Result<(), Error> {
        let mut coordinator = Coordinator::new(&schemas, &[], fake);
        let token = CancellationToken::new();
        coordinator.start(token.clone());
        let result = coordinator.wait_completed().await;
        token.cancel();
        result
    }

    #[tokio::test(start_paused = true)]
    async fn drains_flat_tables_in_parallel() {
        let schemas = vec![flat("A"), flat("B")];
        let fake = Arc::new(
            FakeSpannerClient::new()
                .with_flat_table("A", 10)
                .with_flat_table("B", 20),
        );

        drive(Arc::clone(&fake), schemas).await.unwrap();

        let mut deleted = fake.deleted_tables();
        deleted.sort_unstable();
        assert_eq!(deleted, ["A", "B"]);
    }

    #[tokio::test(start_paused = true)]
    async fn cascade_chain_needs_a_single_delete() {
        let a = flat("A");
        let b = child_of("B", "A", DeleteAction::Cascade);
        let c = child_of("C", "B", DeleteAction::Cascade);
        let fake = Arc::new(
            FakeSpannerClient::new()
                .with_table(a.clone(), 5)
                .with_table(b.clone(), 5)
                .with_table(c.clone(), 5),
        );

        drive(Arc::clone(&fake), vec![a, b, c]).await.unwrap();

        // The root delete cascades; the children drain without their own
        // partitioned DML.
        assert_eq!(fake.deleted_tables(), ["A"]);
    }

    #[tokio::test(start_paused = true)]
    async fn no_action_child_is_deleted_before_its_parent() {
        let a = flat("A");
        let b = child_of("B", "A", DeleteAction::NoAction);
        let fake = Arc::new(
            FakeSpannerClient::new()
                .with_table(a.clone(), 3)
                .with_table(b.clone(), 3),
        );

        drive(Arc::clone(&fake), vec![a, b]).await.unwrap();
        assert_eq!(fake.deleted_tables(), ["B", "A"]);
    }

    #[tokio::test(start_paused = true)]
    async fn referencing_table_is_deleted_before_its_target() {
        let mut a = flat("A");
        a.referenced_by = vec!["B".to_string()];
        let b = flat("B");
        let fake = Arc::new(
            FakeSpannerClient::new()
                .with_table(a.clone(), 3)
                .with_table(b.clone(), 3),
        );

        drive(Arc::clone(&fake), vec![a, b]).await.unwrap();
        assert_eq!(fake.deleted_tables(), ["B", "A"]);
    }

    #[tokio::test(start_paused = true)]
    async fn foreign_key_cycle_stalls_the_run() {
        let mut a = flat("A");
        a.referenced_by = vec!["B".to_string()];
        let mut b = flat("B");
        b.referenced_by = vec!["A".to_string()];
        let fake = Arc::new(
            FakeSpannerClient::new()
                .with_table(a.clone(), 1)
                .with_table(b.clone(), 1),
        );

        let err = drive(fake, vec![a, b]).await.unwrap_err();
        assert!(matches!(err, Error::Stall));
    }

    #[tokio::test(start_paused = true)]
    async fn first_delete_error_aborts_the_run() {
        let schemas = vec![flat("A")];
        let fake = Arc::new(FakeSpannerClient::new().with_flat_table("A", 9));
        fake.fail_delete("A");

        let err = drive(fake, schemas).await.unwrap_err();
        assert!(matches!(err, Error::Delete { ref table, .. } if table == "A"));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_surfaces_as_cancelled() {
        let schemas = vec![flat("A")];
        let fake = Arc::new(FakeSpannerClient::new().with_flat_table("A", 9));
        fake.hang_delete("A");

        let mut coordinator = Coordinator::new(&schemas, &[], fake);
        let token = CancellationToken::new();
        coordinator.start(token.clone());

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(3)).await;
            canceller.cancel();
        });

        let err = coordinator.wait_completed().await.unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn cascade_subtree_is_marked_while_the_root_deletes() {
        let a = flat("A");
        let b = child_of("B", "A", DeleteAction::Cascade);
        let fake = Arc::new(
            FakeSpannerClient::new()
                .with_table(a.clone(), 100)
                .with_table(b.clone(), 100),
        );
        fake.hang_delete("A");

        let mut coordinator = Coordinator::new(&[a, b], &[], fake);
        let token = CancellationToken::new();
        coordinator.start(token.clone());

        tokio::time::sleep(Duration::from_secs(3)).await;
        let statuses: Vec<Status> = coordinator
            .graph()
            .tables()
            .iter()
            .map(|table| table.deleter().status())
            .collect();
        assert_eq!(statuses, [Status::Deleting, Status::CascadeDeleting]);

        token.cancel();
        let err = coordinator.wait_completed().await.unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }
}
