//! Redis Streams job queue for the ingestion worker pool (C13, §4.13).

pub mod error;
pub mod job;
pub mod queue;

pub use error::{QueueError, QueueResult};
pub use job::{IngestJob, JobKind};
pub use queue::{JobQueue, QueueConfig};
