//! Video row store, talking to the same Postgres+pgvector REST facade as
//! `vector_store`'s RPC endpoints, just against a plain table instead of a
//! similarity function.
//!
//! Grounded on `vector_store.rs`'s bearer-auth + `with_retry` idiom.

use std::time::Duration;

use async_trait::async_trait;
use hx_models::{Video, VideoId};
use tracing::{debug, warn};

use crate::contracts::VideoStore;
use crate::error::{IndexError, IndexResult};

#[derive(Debug, Clone)]
pub struct VideoStoreConfig {
    pub base_url: String,
    pub api_key: String,
    pub timeout: Duration,
    pub max_retries: u32,
}

impl VideoStoreConfig {
    pub fn from_env() -> IndexResult<Self> {
        Ok(Self {
            base_url: std::env::var("VIDEO_STORE_URL")
                .map_err(|_| IndexError::config_error("VIDEO_STORE_URL not set"))?,
            api_key: std::env::var("VIDEO_STORE_API_KEY")
                .map_err(|_| IndexError::config_error("VIDEO_STORE_API_KEY not set"))?,
            timeout: Duration::from_secs(
                std::env::var("VIDEO_STORE_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(15),
            ),
            max_retries: std::env::var("VIDEO_STORE_MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(3),
        })
    }
}

#[derive(Clone)]
pub struct RestVideoStore {
    http: reqwest::Client,
    config: VideoStoreConfig,
}

impl RestVideoStore {
    pub fn new(config: VideoStoreConfig) -> IndexResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(IndexError::Network)?;
        Ok(Self { http, config })
    }

    pub fn from_env() -> IndexResult<Self> {
        Self::new(VideoStoreConfig::from_env()?)
    }

    async fn with_retry<T, F, Fut>(&self, operation: &str, mut f: F) -> IndexResult<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = IndexResult<T>>,
    {
        let mut attempt = 0;
        loop {
            match f().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    attempt += 1;
                    let delay = Duration::from_millis(200 * 2u64.pow(attempt));
                    warn!(operation, attempt, ?delay, error = %e, "retrying video store call");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn row_url(&self, video_id: &VideoId) -> String {
        format!(
            "{}/rest/v1/videos?id=eq.{}",
            self.config.base_url,
            video_id.as_str()
        )
    }

    fn upsert_url(&self) -> String {
        format!("{}/rest/v1/videos", self.config.base_url)
    }
}

#[async_trait]
impl VideoStore for RestVideoStore {
    async fn get(&self, video_id: &VideoId) -> IndexResult<Option<Video>> {
        debug!(video_id = %video_id, "fetching video row");
        self.with_retry("get_video", || async {
            let resp = self
                .http
                .get(self.row_url(video_id))
                .bearer_auth(&self.config.api_key)
                .send()
                .await?;
            if !resp.status().is_success() {
                return Err(IndexError::RequestFailed(format!(
                    "get_video: {}",
                    resp.status()
                )));
            }
            let rows: Vec<Video> = resp.json().await?;
            Ok(rows.into_iter().next())
        })
        .await
    }

    async fn upsert(&self, video: &Video) -> IndexResult<()> {
        debug!(video_id = %video.id, status = %video.status, "upserting video row");
        self.with_retry("upsert_video", || async {
            let resp = self
                .http
                .post(self.upsert_url())
                .bearer_auth(&self.config.api_key)
                .header("Prefer", "resolution=merge-duplicates")
                .json(video)
                .send()
                .await?;
            if !resp.status().is_success() {
                return Err(IndexError::RequestFailed(format!(
                    "upsert_video: {}",
                    resp.status()
                )));
            }
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_url_filters_by_id() {
        let store = RestVideoStore {
            http: reqwest::Client::new(),
            config: VideoStoreConfig {
                base_url: "https://example.supabase.co".to_string(),
                api_key: "key".to_string(),
                timeout: Duration::from_secs(1),
                max_retries: 0,
            },
        };
        let video_id = VideoId::new();
        assert!(store.row_url(&video_id).contains(&format!("id=eq.{}", video_id.as_str())));
    }
}
