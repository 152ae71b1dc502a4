//! Deletes all rows from the tables in a Cloud Spanner database without
//! deleting the tables themselves.
//!
//! Table definitions, secondary indexes, and splits survive a run. The
//! interesting part is ordering: interleaved hierarchies with `ON DELETE NO
//! ACTION` children, foreign key references, and global indexes on child
//! tables all constrain which tables may be bulk-deleted at any moment. The
//! [`coordinator::Coordinator`] discovers those constraints from the
//! information schema and keeps as many partitioned deletes in flight as the
//! constraints allow, while per-table samplers track progress by row count.

pub mod client;
pub mod coordinator;
pub mod deleter;
pub mod error;
pub mod graph;
pub mod progress;
pub mod run;
pub mod schema;
pub mod spanner;
pub mod testing;
pub mod util;

pub use client::{ClientError, SpannerClient};
pub use coordinator::Coordinator;
pub use deleter::Status;
pub use error::Error;
pub use run::{RunOptions, run, run_with_client};
