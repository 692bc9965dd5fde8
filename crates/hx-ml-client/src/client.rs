//! REST-backed implementation of the model-serving contracts.
//!
//! Grounded verbatim on `vclip-ml-client/src/client.rs`'s `MlClient`: same
//! `from_env()` defaults (300s timeout, 2 retries), same private
//! `with_retry` exponential-backoff wrapper keyed off `MlError::is_retryable`.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::contracts::{
    ImageEmbedder, TextEmbedder, TranscriptionResult, Transcriber, VisualAnalysisResult,
    VisualAnalyzer,
};
use crate::error::{MlError, MlResult};

#[derive(Debug, Clone)]
pub struct MlClientConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub max_retries: u32,
}

impl MlClientConfig {
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("ML_SERVICE_URL")
                .unwrap_or_else(|_| "http://localhost:8001".to_string()),
            timeout: Duration::from_secs(
                std::env::var("ML_SERVICE_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(300),
            ),
            max_retries: std::env::var("ML_SERVICE_MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(2),
        }
    }
}

impl Default for MlClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8001".to_string(),
            timeout: Duration::from_secs(300),
            max_retries: 2,
        }
    }
}

#[derive(Clone)]
pub struct MlClient {
    http: reqwest::Client,
    config: MlClientConfig,
}

#[derive(Serialize)]
struct AnalyzeRequest<'a> {
    image_path: &'a str,
    context: Option<&'a str>,
    lang: &'a str,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    text: &'a str,
    dim_hint: Option<usize>,
}

#[derive(Serialize)]
struct EmbedImageRequest<'a> {
    path_or_url: &'a str,
}

#[derive(Serialize)]
struct TranscribeRequest<'a> {
    audio_path: &'a str,
    lang_hint: Option<&'a str>,
}

#[derive(Deserialize)]
struct EmbedResponse {
    vector: Vec<f32>,
}

impl MlClient {
    pub fn new(config: MlClientConfig) -> MlResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(MlError::Network)?;
        Ok(Self { http, config })
    }

    pub fn from_env() -> MlResult<Self> {
        Self::new(MlClientConfig::from_env())
    }

    pub async fn health_check(&self) -> MlResult<bool> {
        let resp = self
            .http
            .get(format!("{}/health", self.config.base_url))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Ok(false);
        }
        let body: serde_json::Value = resp.json().await.unwrap_or(serde_json::Value::Null);
        let status = body
            .get("status")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_lowercase();
        Ok(status == "healthy" || status == "ok")
    }

    async fn with_retry<T, F, Fut>(&self, operation: &str, mut f: F) -> MlResult<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = MlResult<T>>,
    {
        let mut attempt = 0;
        loop {
            match f().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    attempt += 1;
                    let delay = Duration::from_millis(500 * 2u64.pow(attempt));
                    warn!(operation, attempt, ?delay, error = %e, "retrying ML service call");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl Transcriber for MlClient {
    async fn transcribe(
        &self,
        audio_path: &str,
        lang_hint: Option<&str>,
    ) -> MlResult<TranscriptionResult> {
        debug!(audio_path, "transcribing audio");
        self.with_retry("transcribe", || async {
            let resp = self
                .http
                .post(format!("{}/transcribe", self.config.base_url))
                .json(&TranscribeRequest {
                    audio_path,
                    lang_hint,
                })
                .send()
                .await?;
            if !resp.status().is_success() {
                return Err(MlError::RequestFailed(format!(
                    "transcribe: {}",
                    resp.status()
                )));
            }
            Ok(resp.json::<TranscriptionResult>().await?)
        })
        .await
    }
}

#[async_trait]
impl VisualAnalyzer for MlClient {
    async fn analyze(
        &self,
        image_path: &str,
        context: Option<&str>,
        lang: &str,
    ) -> MlResult<VisualAnalysisResult> {
        debug!(image_path, "requesting visual analysis");
        let result = self
            .with_retry("analyze", || async {
                let resp = self
                    .http
                    .post(format!("{}/analyze", self.config.base_url))
                    .json(&AnalyzeRequest {
                        image_path,
                        context,
                        lang,
                    })
                    .send()
                    .await?;
                if !resp.status().is_success() {
                    return Err(MlError::RequestFailed(format!(
                        "analyze: {}",
                        resp.status()
                    )));
                }
                resp.json::<VisualAnalysisResult>()
                    .await
                    .map_err(|_| MlError::InvalidResponse("malformed analyze response".to_string()))
            })
            .await;

        // §4.3: a malformed response or exhausted-retry failure is treated
        // as no_content, never propagated as a hard error.
        match result {
            Ok(value) => Ok(value),
            Err(e) => {
                warn!(error = %e, "visual analysis failed soft");
                Ok(VisualAnalysisResult::no_content(e.to_string()))
            }
        }
    }
}

#[async_trait]
impl TextEmbedder for MlClient {
    async fn embed(&self, text: &str, dim_hint: Option<usize>) -> MlResult<Vec<f32>> {
        self.with_retry("embed_text", || async {
            let resp = self
                .http
                .post(format!("{}/embed/text", self.config.base_url))
                .json(&EmbedRequest { text, dim_hint })
                .send()
                .await?;
            if !resp.status().is_success() {
                return Err(MlError::RequestFailed(format!(
                    "embed_text: {}",
                    resp.status()
                )));
            }
            Ok(resp.json::<EmbedResponse>().await?.vector)
        })
        .await
    }
}

#[async_trait]
impl ImageEmbedder for MlClient {
    async fn embed_image(&self, path_or_url: &str) -> MlResult<Vec<f32>> {
        self.with_retry("embed_image", || async {
            let resp = self
                .http
                .post(format!("{}/embed/image", self.config.base_url))
                .json(&EmbedImageRequest { path_or_url })
                .send()
                .await?;
            if !resp.status().is_success() {
                return Err(MlError::RequestFailed(format!(
                    "embed_image: {}",
                    resp.status()
                )));
            }
            Ok(resp.json::<EmbedResponse>().await?.vector)
        })
        .await
    }

    async fn embed_text_for_image_space(&self, text: &str) -> MlResult<Vec<f32>> {
        self.with_retry("embed_text_for_image_space", || async {
            let resp = self
                .http
                .post(format!("{}/embed/clip-text", self.config.base_url))
                .json(&EmbedRequest {
                    text,
                    dim_hint: None,
                })
                .send()
                .await?;
            if !resp.status().is_success() {
                return Err(MlError::RequestFailed(format!(
                    "embed_text_for_image_space: {}",
                    resp.status()
                )));
            }
            Ok(resp.json::<EmbedResponse>().await?.vector)
        })
        .await
    }
}

/// L2-normalize a vector in place (§4.5 "Normalization").
pub fn l2_normalize(vec: &mut [f32]) {
    let norm = vec.iter().map(|x| (*x as f64) * (*x as f64)).sum::<f64>().sqrt();
    if norm > 1e-12 {
        for x in vec.iter_mut() {
            *x = (*x as f64 / norm) as f32;
        }
    }
}

/// SHA-256 hash of embedding input text, used in `EmbeddingMetadata` (§4.5).
pub fn hash_input_text(text: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_match_the_teacher() {
        let config = MlClientConfig::default();
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.timeout, Duration::from_secs(300));
    }

    #[test]
    fn l2_normalize_produces_unit_norm() {
        let mut v = vec![3.0f32, 4.0];
        l2_normalize(&mut v);
        let norm = (v[0] * v[0] + v[1] * v[1]).sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
    }

    #[test]
    fn l2_normalize_leaves_zero_vector_untouched() {
        let mut v = vec![0.0f32, 0.0];
        l2_normalize(&mut v);
        assert_eq!(v, vec![0.0, 0.0]);
    }

    #[test]
    fn hash_input_text_is_stable() {
        assert_eq!(hash_input_text("hello"), hash_input_text("hello"));
        assert_ne!(hash_input_text("hello"), hash_input_text("world"));
    }
}
