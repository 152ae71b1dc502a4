use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::client::{ClientError, SpannerClient};
use crate::error::Error;

/// How often the row count of a table is sampled.
const SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

/// Staleness bound for the sampling reads, to keep them off the leader.
const COUNT_STALENESS: Duration = Duration::from_secs(1);

/// Delete status of a single table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Status {
    /// Determining the total number of rows in the table.
    Analyzing = 0,
    /// Waiting for dependent tables to drain first.
    Waiting = 1,
    /// A bulk delete is running against the table.
    Deleting = 2,
    /// An ancestor's bulk delete is cascading into the table.
    CascadeDeleting = 3,
    /// The table is empty. Terminal.
    Completed = 4,
}

impl Status {
    fn from_u8(raw: u8) -> Status {
        match raw {
            0 => Status::Analyzing,
            1 => Status::Waiting,
            2 => Status::Deleting,
            3 => Status::CascadeDeleting,
            _ => Status::Completed,
        }
    }
}

/// Deletes all rows from one table and tracks the progress of doing so.
///
/// State is written by the deleter's own two tasks (the bulk delete and the
/// row-count sampler) plus the coordinator's cascade marking, and read
/// lock-free by the coordinator and the progress renderer.
pub struct Deleter {
    table_name: String,
    client: Arc<dyn SpannerClient>,
    status: AtomicU8,

    /// Total rows in the table. Frozen at the first non-zero observation,
    /// even if rows are added while the tool runs.
    total_rows: AtomicU64,

    /// Rows remaining in the table as of the latest observation.
    remaining_rows: AtomicU64,
}

impl Deleter {
    pub fn new(table_name: String, client: Arc<dyn SpannerClient>) -> Self {
        Self {
            table_name,
            client,
            status: AtomicU8::new(Status::Analyzing as u8),
            total_rows: AtomicU64::new(0),
            remaining_rows: AtomicU64::new(0),
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn status(&self) -> Status {
        Status::from_u8(self.status.load(Ordering::Relaxed))
    }

    pub fn total_rows(&self) -> u64 {
        self.total_rows.load(Ordering::Relaxed)
    }

    pub fn remaining_rows(&self) -> u64 {
        self.remaining_rows.load(Ordering::Relaxed)
    }

    /// Deletes all rows from the table through partitioned DML.
    ///
    /// The statement is at-least-once, so a retry inside the client is
    /// harmless. Completion is observed by the row-count sampler, never
    /// derived from this call returning.
    pub async fn delete_rows(&self, token: &CancellationToken) -> Result<(), Error> {
        if !self.begin_deleting() {
            return Ok(());
        }

        tokio::select! {
            result = self.client.delete_all_rows(&self.table_name) => {
                result.map_err(|source| Error::Delete {
                    table: self.table_name.clone(),
                    source,
                })
            }
            _ = token.cancelled() => Err(Error::Cancelled),
        }
    }

    /// Marks the table as being drained by an ancestor's cascade delete.
    /// Informational only; no work is performed on this table.
    pub fn parent_deletion_started(&self) {
        let mut current = self.status.load(Ordering::Relaxed);
        loop {
            let status = Status::from_u8(current);
            if status == Status::Completed || status == Status::Deleting {
                return;
            }
            match self.status.compare_exchange(
                current,
                Status::CascadeDeleting as u8,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }

    /// Spawns the periodic row-count sampler for this table.
    ///
    /// The task exits once the table is observed empty or the token fires.
    pub fn start_row_count_updater(self: Arc<Self>, token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SAMPLE_INTERVAL);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if self.status() == Status::Completed {
                            return;
                        }
                        // Sampling is best-effort; a failed count only
                        // delays the next observation.
                        if let Err(err) = self.update_row_count().await {
                            debug!(table = %self.table_name, %err, "row count sampling failed");
                        }
                    }
                    _ = token.cancelled() => return,
                }
            }
        })
    }

    async fn update_row_count(&self) -> Result<(), ClientError> {
        let count = self
            .client
            .count_rows(&self.table_name, COUNT_STALENESS)
            .await?;

        if self.total_rows.load(Ordering::Relaxed) == 0 {
            self.total_rows.store(count, Ordering::Relaxed);
        }
        self.remaining_rows.store(count, Ordering::Relaxed);

        if count == 0 {
            self.status.store(Status::Completed as u8, Ordering::Relaxed);
        } else {
            // Only the very first observation moves the table out of
            // Analyzing; later transitions belong to the coordinator.
            let _ = self.status.compare_exchange(
                Status::Analyzing as u8,
                Status::Waiting as u8,
                Ordering::Relaxed,
                Ordering::Relaxed,
            );
        }

        Ok(())
    }

    /// Claims the bulk delete. Fails when the sampler already observed the
    /// table empty, which makes a late delete pointless.
    fn begin_deleting(&self) -> bool {
        let mut current = self.status.load(Ordering::Relaxed);
        loop {
            if Status::from_u8(current) == Status::Completed {
                return false;
            }
            match self.status.compare_exchange(
                current,
                Status::Deleting as u8,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn set_status_for_test(&self, status: Status) {
        self.status.store(status as u8, Ordering::Relaxed);
    }
}
