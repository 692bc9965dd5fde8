//! Worker error types.
//!
//! Same shape as `vclip-worker/src/error.rs`: one `thiserror` enum with
//! `#[from]` conversions for every adapter crate's error type, plus
//! `is_retryable()`/`is_permanent_failure()` classifiers the executor uses
//! for retry-vs-DLQ decisions (§4.13).

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("job failed: {0}")]
    JobFailed(String),

    #[error("transcription failed: {0}")]
    TranscriptionFailed(String),

    #[error("processing failed: {0}")]
    ProcessingFailed(String),

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("job exceeded its time limit")]
    TimedOut,

    #[error("media error: {0}")]
    Media(#[from] hx_media::MediaError),

    #[error("ML client error: {0}")]
    Ml(#[from] hx_ml_client::MlError),

    #[error("index adapter error: {0}")]
    Index(#[from] hx_index::IndexError),

    #[error("queue error: {0}")]
    Queue(#[from] hx_queue::QueueError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn job_failed(msg: impl Into<String>) -> Self {
        Self::JobFailed(msg.into())
    }

    pub fn transcription_failed(msg: impl Into<String>) -> Self {
        Self::TranscriptionFailed(msg.into())
    }

    pub fn processing_failed(msg: impl Into<String>) -> Self {
        Self::ProcessingFailed(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Whether this failure should be retried with backoff, vs. surfaced
    /// immediately (§4.13 "Retry policy": visual-analysis and transcription
    /// failures do not retry, they're marked on the scene/video instead).
    pub fn is_retryable(&self) -> bool {
        match self {
            WorkerError::Media(e) => e.is_retryable(),
            WorkerError::Ml(_) => false,
            WorkerError::Index(e) => e.is_retryable(),
            WorkerError::Queue(e) => e.is_retryable(),
            WorkerError::Io(_) => true,
            WorkerError::JobFailed(_)
            | WorkerError::TranscriptionFailed(_)
            | WorkerError::ProcessingFailed(_)
            | WorkerError::ConfigError(_)
            | WorkerError::TimedOut => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transcription_and_ml_failures_are_not_retried() {
        assert!(!WorkerError::transcription_failed("no speech").is_retryable());
        assert!(!WorkerError::Ml(hx_ml_client::MlError::InvalidResponse("x".into())).is_retryable());
    }

    #[test]
    fn io_errors_are_retried() {
        let err = WorkerError::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk"));
        assert!(err.is_retryable());
    }
}
