//! Ingestion worker: Sidecar Builder orchestration (C4, C6) and the job
//! executor pool that runs it (C13).

pub mod config;
pub mod error;
pub mod executor;
pub mod quality_gate;
pub mod sidecar;
pub mod transcript_aligner;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use executor::JobExecutor;
pub use sidecar::{run_ingest_job, SidecarContext};
