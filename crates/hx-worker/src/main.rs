//! Ingestion worker binary.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use hx_index::{OpenSearchLexicalStore, RestVectorStore, RestVideoStore, S3ObjectStore};
use hx_ml_client::embedder::EmbedderConfig;
use hx_ml_client::MlClient;
use hx_queue::JobQueue;
use hx_worker::{JobExecutor, SidecarContext, WorkerConfig};

#[tokio::main]
async fn main() {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("failed to install rustls crypto provider");

    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(EnvFilter::from_default_env().add_directive("hx=info".parse().unwrap()))
        .init();

    info!("starting hx-worker");

    let config = WorkerConfig::from_env();
    let embedder_config = EmbedderConfig::from_env();

    let queue = match JobQueue::from_env() {
        Ok(q) => q,
        Err(e) => {
            error!(error = %e, "failed to create job queue");
            std::process::exit(1);
        }
    };

    let object_store = match S3ObjectStore::from_env().await {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "failed to create object store");
            std::process::exit(1);
        }
    };
    let vector_store = match RestVectorStore::from_env() {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "failed to create vector store");
            std::process::exit(1);
        }
    };
    let lexical_store = match OpenSearchLexicalStore::from_env() {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "failed to create lexical store");
            std::process::exit(1);
        }
    };
    let video_store = match RestVideoStore::from_env() {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "failed to create video store");
            std::process::exit(1);
        }
    };
    let ml_client = match MlClient::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "failed to create ML client");
            std::process::exit(1);
        }
    };

    let ctx = SidecarContext {
        api_semaphore: Arc::new(Semaphore::new(config.max_api_concurrency)),
        object_store: Arc::new(object_store),
        vector_store: Arc::new(vector_store),
        lexical_store: Arc::new(lexical_store),
        video_store: Arc::new(video_store),
        transcriber: Arc::new(ml_client.clone()),
        visual_analyzer: Arc::new(ml_client.clone()),
        text_embedder: Arc::new(ml_client.clone()),
        image_embedder: Arc::new(ml_client),
        embedder_config,
        config: config.clone(),
    };

    let executor = Arc::new(JobExecutor::new(config, queue, ctx));

    let shutdown_executor = Arc::clone(&executor);
    let shutdown_handle = tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("received shutdown signal");
        shutdown_executor.shutdown();
    });

    if let Err(e) = executor.run().await {
        error!(error = %e, "executor error");
        std::process::exit(1);
    }

    shutdown_handle.await.ok();
    info!("worker shutdown complete");
}
