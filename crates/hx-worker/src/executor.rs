//! Job executor (C13, §4.13): a bounded worker pool over `hx-queue`'s Redis
//! Streams broker, ported from `vclip-worker/src/executor.rs`'s
//! `JobExecutor` and generalized from a single video-processing job type to
//! `hx_queue::JobKind`'s four kinds, with per-kind time limits and a
//! cooperative cancel flag instead of the teacher's single hardcoded style.

use std::sync::Arc;
use std::time::Duration;

use hx_queue::{IngestJob, JobKind, JobQueue};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::WorkerConfig;
use crate::error::WorkerError;
use crate::sidecar::{run_ingest_job, SidecarContext};

pub struct JobExecutor {
    config: WorkerConfig,
    queue: Arc<JobQueue>,
    ctx: Arc<SidecarContext>,
    job_semaphore: Arc<Semaphore>,
    shutdown: tokio::sync::watch::Sender<bool>,
    consumer_name: String,
}

impl JobExecutor {
    pub fn new(config: WorkerConfig, queue: JobQueue, ctx: SidecarContext) -> Self {
        let job_semaphore = Arc::new(Semaphore::new(config.max_concurrent_jobs));
        let (shutdown, _) = tokio::sync::watch::channel(false);
        let consumer_name = format!("hx-worker-{}", Uuid::new_v4());

        Self {
            config,
            queue: Arc::new(queue),
            ctx: Arc::new(ctx),
            job_semaphore,
            shutdown,
            consumer_name,
        }
    }

    pub async fn run(&self) -> Result<(), WorkerError> {
        info!(
            consumer = %self.consumer_name,
            max_concurrent_jobs = self.config.max_concurrent_jobs,
            "starting job executor"
        );

        self.queue.init().await?;

        let mut shutdown_rx = self.shutdown.subscribe();

        let queue_clone = Arc::clone(&self.queue);
        let ctx_clone = Arc::clone(&self.ctx);
        let consumer_name = self.consumer_name.clone();
        let semaphore_clone = Arc::clone(&self.job_semaphore);
        let claim_interval = self.config.claim_interval;
        let claim_min_idle_ms = self.config.claim_min_idle.as_millis() as u64;
        let mut shutdown_rx_claim = self.shutdown.subscribe();

        let claim_task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(claim_interval);
            loop {
                tokio::select! {
                    _ = shutdown_rx_claim.changed() => {
                        if *shutdown_rx_claim.borrow() {
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        match queue_clone.claim_pending(&consumer_name, claim_min_idle_ms, 5).await {
                            Ok(jobs) if !jobs.is_empty() => {
                                info!(count = jobs.len(), "claimed pending jobs");
                                for (message_id, job) in jobs {
                                    let ctx = Arc::clone(&ctx_clone);
                                    let queue = Arc::clone(&queue_clone);
                                    let Ok(permit) = semaphore_clone.clone().acquire_owned().await else {
                                        break;
                                    };
                                    tokio::spawn(async move {
                                        let _permit = permit;
                                        Self::execute_job(ctx, queue, message_id, job).await;
                                    });
                                }
                            }
                            Ok(_) => {}
                            Err(e) => warn!(error = %e, "failed to claim pending jobs"),
                        }
                    }
                }
            }
        });

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("shutdown signal received, stopping executor");
                        break;
                    }
                }
                result = self.consume_jobs() => {
                    if let Err(e) = result {
                        error!(error = %e, "error consuming jobs");
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        }

        claim_task.abort();

        info!("waiting for in-flight jobs to complete");
        let _ = tokio::time::timeout(self.config.shutdown_timeout, self.wait_for_jobs()).await;

        info!("job executor stopped");
        Ok(())
    }

    async fn consume_jobs(&self) -> Result<(), WorkerError> {
        let available = self.job_semaphore.available_permits();
        if available == 0 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            return Ok(());
        }

        let jobs = self
            .queue
            .consume(&self.consumer_name, 1000, available.min(5))
            .await?;

        if jobs.is_empty() {
            return Ok(());
        }

        debug!(count = jobs.len(), "consumed jobs from queue");

        for (message_id, job) in jobs {
            let ctx = Arc::clone(&self.ctx);
            let queue = Arc::clone(&self.queue);
            let permit = self
                .job_semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| WorkerError::job_failed("semaphore closed"))?;

            tokio::spawn(async move {
                let _permit = permit;
                Self::execute_job(ctx, queue, message_id, job).await;
            });
        }

        Ok(())
    }

    /// Execute one job with a per-kind time limit and retry-then-DLQ.
    async fn execute_job(ctx: Arc<SidecarContext>, queue: Arc<JobQueue>, message_id: String, job: IngestJob) {
        let job_id = job.job_id;
        info!(%job_id, kind = %job.kind, "executing job");

        let time_limit = ctx.config.time_limit_for(job.kind);
        let result = match tokio::time::timeout(time_limit, Self::process_job(&ctx, &job)).await {
            Ok(inner) => inner,
            Err(_) => Err(WorkerError::TimedOut),
        };

        match result {
            Ok(()) => {
                info!(%job_id, "job completed successfully");
                if let Err(e) = queue.ack(&message_id).await {
                    error!(%job_id, error = %e, "failed to ack job");
                }
                if let Err(e) = queue.clear_dedup(&job).await {
                    warn!(%job_id, error = %e, "failed to clear dedup key");
                }
            }
            Err(e) => {
                error!(%job_id, error = %e, "job failed");

                if !e.is_retryable() {
                    Self::move_to_dlq(&queue, &message_id, &job, &e.to_string()).await;
                    return;
                }

                let retry_count = queue.increment_retry(&message_id).await.unwrap_or(u32::MAX);
                if retry_count >= queue.max_retries() {
                    warn!(%job_id, retry_count, "exceeded max retries, moving to DLQ");
                    Self::move_to_dlq(&queue, &message_id, &job, &e.to_string()).await;
                } else {
                    info!(%job_id, retry_count, max_retries = queue.max_retries(), "job will be retried");
                }
            }
        }
    }

    async fn move_to_dlq(queue: &JobQueue, message_id: &str, job: &IngestJob, error: &str) {
        if let Err(e) = queue.dlq(message_id, job, error).await {
            error!(job_id = %job.job_id, error = %e, "failed to move job to DLQ");
        }
    }

    async fn process_job(ctx: &SidecarContext, job: &IngestJob) -> Result<(), WorkerError> {
        match job.kind {
            JobKind::Ingest | JobKind::Reprocess => run_ingest_job(ctx, job).await,
            JobKind::Export => Err(WorkerError::job_failed(
                "export jobs are handled by the export pipeline, not the sidecar builder",
            )),
            JobKind::PersonPhoto => Err(WorkerError::job_failed(
                "person-photo jobs are handled by the person-search pipeline, not the sidecar builder",
            )),
        }
    }

    async fn wait_for_jobs(&self) {
        loop {
            if self.job_semaphore.available_permits() == self.config.max_concurrent_jobs {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consumer_name_is_unique_per_executor() {
        let queue = JobQueue::new(hx_queue::QueueConfig::default()).unwrap();
        let queue2 = JobQueue::new(hx_queue::QueueConfig::default()).unwrap();
        let ctx = test_ctx();
        let ctx2 = test_ctx();
        let a = JobExecutor::new(WorkerConfig::default(), queue, ctx);
        let b = JobExecutor::new(WorkerConfig::default(), queue2, ctx2);
        assert_ne!(a.consumer_name, b.consumer_name);
    }

    fn test_ctx() -> SidecarContext {
        use hx_ml_client::embedder::EmbedderConfig;

        struct Unimplemented;

        #[async_trait::async_trait]
        impl hx_index::contracts::ObjectStore for Unimplemented {
            async fn put(&self, _: &str, _: Vec<u8>, _: &str) -> hx_index::IndexResult<()> {
                unimplemented!()
            }
            async fn get(&self, _: &str) -> hx_index::IndexResult<Vec<u8>> {
                unimplemented!()
            }
            async fn signed_download_url(&self, _: &str, _: Duration) -> hx_index::IndexResult<String> {
                unimplemented!()
            }
            async fn signed_upload_url(&self, _: &str, _: Duration) -> hx_index::IndexResult<String> {
                unimplemented!()
            }
            async fn delete(&self, _: &str) -> hx_index::IndexResult<()> {
                unimplemented!()
            }
            async fn exists(&self, _: &str) -> hx_index::IndexResult<bool> {
                unimplemented!()
            }
        }

        #[async_trait::async_trait]
        impl hx_index::contracts::VectorStore for Unimplemented {
            async fn upsert_scene(&self, _: &hx_models::TenantId, _: &hx_models::Scene) -> hx_index::IndexResult<()> {
                unimplemented!()
            }
            async fn nearest(
                &self,
                _: hx_models::Channel,
                _: &[f32],
                _: &hx_models::TenantId,
                _: usize,
                _: f64,
                _: Option<&hx_models::VideoId>,
            ) -> hx_index::IndexResult<Vec<(hx_models::SceneId, u32, f64)>> {
                unimplemented!()
            }
            async fn batch_score(
                &self,
                _: hx_models::Channel,
                _: &[f32],
                _: &[hx_models::SceneId],
                _: &hx_models::TenantId,
            ) -> hx_index::IndexResult<std::collections::HashMap<hx_models::SceneId, f64>> {
                unimplemented!()
            }
            async fn delete_scenes(&self, _: &hx_models::VideoId) -> hx_index::IndexResult<()> {
                unimplemented!()
            }
            async fn update_person_query_embedding(&self, _: &hx_models::PersonId, _: &[f32]) -> hx_index::IndexResult<()> {
                unimplemented!()
            }
        }

        #[async_trait::async_trait]
        impl hx_index::contracts::LexicalStore for Unimplemented {
            async fn ensure_index(&self) -> hx_index::IndexResult<()> {
                unimplemented!()
            }
            async fn upsert_doc(&self, _: &hx_models::LexicalSceneDoc) -> hx_index::IndexResult<()> {
                unimplemented!()
            }
            async fn bulk_upsert(&self, _: &[hx_models::LexicalSceneDoc]) -> hx_index::IndexResult<()> {
                unimplemented!()
            }
            async fn delete_by_video(&self, _: &hx_models::VideoId) -> hx_index::IndexResult<()> {
                unimplemented!()
            }
            async fn search(
                &self,
                _: &hx_models::TenantId,
                _: &str,
                _: &str,
                _: usize,
                _: Option<&hx_models::VideoId>,
            ) -> hx_index::IndexResult<Vec<(hx_models::SceneId, f64, u32)>> {
                unimplemented!()
            }
        }

        #[async_trait::async_trait]
        impl hx_index::contracts::VideoStore for Unimplemented {
            async fn get(&self, _: &hx_models::VideoId) -> hx_index::IndexResult<Option<hx_models::Video>> {
                unimplemented!()
            }
            async fn upsert(&self, _: &hx_models::Video) -> hx_index::IndexResult<()> {
                unimplemented!()
            }
        }

        #[async_trait::async_trait]
        impl hx_ml_client::contracts::Transcriber for Unimplemented {
            async fn transcribe(&self, _: &str, _: Option<&str>) -> hx_ml_client::error::MlResult<hx_ml_client::contracts::TranscriptionResult> {
                unimplemented!()
            }
        }

        #[async_trait::async_trait]
        impl hx_ml_client::contracts::VisualAnalyzer for Unimplemented {
            async fn analyze(&self, _: &str, _: Option<&str>, _: &str) -> hx_ml_client::error::MlResult<hx_ml_client::contracts::VisualAnalysisResult> {
                unimplemented!()
            }
        }

        #[async_trait::async_trait]
        impl hx_ml_client::contracts::TextEmbedder for Unimplemented {
            async fn embed(&self, _: &str, _: Option<usize>) -> hx_ml_client::error::MlResult<Vec<f32>> {
                unimplemented!()
            }
        }

        #[async_trait::async_trait]
        impl hx_ml_client::contracts::ImageEmbedder for Unimplemented {
            async fn embed_image(&self, _: &str) -> hx_ml_client::error::MlResult<Vec<f32>> {
                unimplemented!()
            }
            async fn embed_text_for_image_space(&self, _: &str) -> hx_ml_client::error::MlResult<Vec<f32>> {
                unimplemented!()
            }
        }

        SidecarContext {
            config: WorkerConfig::default(),
            embedder_config: EmbedderConfig::default(),
            object_store: Arc::new(Unimplemented),
            vector_store: Arc::new(Unimplemented),
            lexical_store: Arc::new(Unimplemented),
            video_store: Arc::new(Unimplemented),
            transcriber: Arc::new(Unimplemented),
            visual_analyzer: Arc::new(Unimplemented),
            text_embedder: Arc::new(Unimplemented),
            image_embedder: Arc::new(Unimplemented),
            api_semaphore: Arc::new(Semaphore::new(1)),
        }
    }
}
