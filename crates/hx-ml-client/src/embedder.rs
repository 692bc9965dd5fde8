//! Multi-Channel Embedder (C5, §4.5).
//!
//! Generates per-channel scene vectors through the `TextEmbedder`/
//! `ImageEmbedder` contracts. This layer's retry is on top of whatever retry
//! the concrete client already does internally (`MlClient::with_retry`) —
//! it exists so a channel failure is recorded as a null embedding with a
//! reason instead of aborting the whole scene (§4.5 "never aborts the
//! scene"), which is a different failure contract than the transport-level
//! retry in `client.rs`.

use std::time::{Duration, Instant};

use hx_models::{Channel, EmbeddingMetadata};
use tracing::warn;

use crate::client::{hash_input_text, l2_normalize};
use crate::contracts::{ImageEmbedder, TextEmbedder};

#[derive(Debug, Clone)]
pub struct EmbedderConfig {
    pub transcript_max_length: usize,
    pub visual_max_length: usize,
    pub summary_max_length: usize,
    pub visual_include_tags: bool,
    pub summary_enabled: bool,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub embedding_version: String,
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self {
            transcript_max_length: 1000,
            visual_max_length: 500,
            summary_max_length: 300,
            visual_include_tags: true,
            summary_enabled: false,
            max_retries: 2,
            retry_delay: Duration::from_millis(500),
            embedding_version: "v1".to_string(),
        }
    }
}

impl EmbedderConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(v) = std::env::var("EMBEDDING_TRANSCRIPT_MAX_LENGTH") {
            if let Ok(parsed) = v.parse() {
                config.transcript_max_length = parsed;
            }
        }
        if let Ok(v) = std::env::var("EMBEDDING_VISUAL_MAX_LENGTH") {
            if let Ok(parsed) = v.parse() {
                config.visual_max_length = parsed;
            }
        }
        if let Ok(v) = std::env::var("EMBEDDING_SUMMARY_MAX_LENGTH") {
            if let Ok(parsed) = v.parse() {
                config.summary_max_length = parsed;
            }
        }
        if let Ok(v) = std::env::var("EMBEDDING_VISUAL_INCLUDE_TAGS") {
            config.visual_include_tags = v == "1" || v.eq_ignore_ascii_case("true");
        }
        if let Ok(v) = std::env::var("EMBEDDING_SUMMARY_ENABLED") {
            config.summary_enabled = v == "1" || v.eq_ignore_ascii_case("true");
        }
        if let Ok(v) = std::env::var("EMBEDDING_MAX_RETRIES") {
            if let Ok(parsed) = v.parse() {
                config.max_retries = parsed;
            }
        }
        if let Ok(v) = std::env::var("EMBEDDING_RETRY_DELAY_S") {
            if let Ok(parsed) = v.parse::<u64>() {
                config.retry_delay = Duration::from_secs(parsed);
            }
        }
        if let Ok(v) = std::env::var("EMBEDDING_VERSION") {
            config.embedding_version = v;
        }
        config
    }

    /// Configured max length for a text channel, or `None` for channels with
    /// no text form (`ClipImage`, `Lexical`).
    pub fn max_length_for(&self, channel: Channel) -> Option<usize> {
        match channel {
            Channel::Transcript => Some(self.transcript_max_length),
            Channel::Visual => Some(self.visual_max_length),
            Channel::Summary => Some(self.summary_max_length),
            Channel::ClipImage | Channel::Lexical => None,
        }
    }
}

/// Truncate `text` to at most `max_len` chars, preferring the last sentence
/// boundary (`.`, `!`, `?`) within range so channel text doesn't end
/// mid-sentence; falls back to a hard char-boundary cut when no boundary
/// exists (§4.5 "sentence-boundary-preferred smart-truncation").
pub fn smart_truncate(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        return text.to_string();
    }
    let truncated: String = text.chars().take(max_len).collect();
    if let Some(cut) = truncated.rfind(['.', '!', '?']) {
        if cut > 0 {
            return truncated[..=cut].trim().to_string();
        }
    }
    truncated
}

pub struct ChannelEmbeddingOutcome {
    pub vector: Option<Vec<f32>>,
    pub metadata: EmbeddingMetadata,
}

/// Embed one text channel with bounded retry. Never returns `Err`: empty
/// input or an exhausted retry both come back as `vector: None` with
/// `metadata.error` set, so a single channel failure never aborts the scene.
pub async fn embed_text_channel(
    embedder: &dyn TextEmbedder,
    channel: Channel,
    text: &str,
    language: Option<&str>,
    dim_hint: Option<usize>,
    config: &EmbedderConfig,
) -> ChannelEmbeddingOutcome {
    let input_hash = hash_input_text(text);
    let input_len = text.chars().count();

    if text.trim().is_empty() {
        return ChannelEmbeddingOutcome {
            vector: None,
            metadata: blank_metadata(
                channel,
                "text-embedder",
                input_hash,
                input_len,
                language,
                0,
                Some("empty input".to_string()),
            ),
        };
    }

    let start = Instant::now();
    let mut attempt = 0;
    loop {
        match embedder.embed(text, dim_hint).await {
            Ok(mut vector) => {
                l2_normalize(&mut vector);
                let dims = vector.len();
                return ChannelEmbeddingOutcome {
                    vector: Some(vector),
                    metadata: EmbeddingMetadata {
                        model: "text-embedder".to_string(),
                        dimensions: dims,
                        input_text_hash: input_hash,
                        input_text_length: input_len,
                        language: language.map(|s| s.to_string()),
                        channel,
                        generated_at: chrono::Utc::now(),
                        latency_ms: start.elapsed().as_millis() as u64,
                        error: None,
                    },
                };
            }
            Err(e) if attempt < config.max_retries => {
                attempt += 1;
                let delay = config.retry_delay * 2u32.pow(attempt - 1);
                warn!(?channel, attempt, error = %e, "retrying channel embedding");
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                return ChannelEmbeddingOutcome {
                    vector: None,
                    metadata: blank_metadata(
                        channel,
                        "text-embedder",
                        input_hash,
                        input_len,
                        language,
                        start.elapsed().as_millis() as u64,
                        Some(e.to_string()),
                    ),
                };
            }
        }
    }
}

/// Embed the CLIP image channel with the same bounded-retry discipline.
pub async fn embed_image_channel(
    embedder: &dyn ImageEmbedder,
    image_path: &str,
    config: &EmbedderConfig,
) -> ChannelEmbeddingOutcome {
    let input_hash = hash_input_text(image_path);
    let start = Instant::now();
    let mut attempt = 0;
    loop {
        match embedder.embed_image(image_path).await {
            Ok(mut vector) => {
                l2_normalize(&mut vector);
                let dims = vector.len();
                return ChannelEmbeddingOutcome {
                    vector: Some(vector),
                    metadata: EmbeddingMetadata {
                        model: "clip-image-embedder".to_string(),
                        dimensions: dims,
                        input_text_hash: input_hash,
                        input_text_length: image_path.chars().count(),
                        language: None,
                        channel: Channel::ClipImage,
                        generated_at: chrono::Utc::now(),
                        latency_ms: start.elapsed().as_millis() as u64,
                        error: None,
                    },
                };
            }
            Err(e) if attempt < config.max_retries => {
                attempt += 1;
                let delay = config.retry_delay * 2u32.pow(attempt - 1);
                warn!(attempt, error = %e, "retrying clip image embedding");
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                return ChannelEmbeddingOutcome {
                    vector: None,
                    metadata: blank_metadata(
                        Channel::ClipImage,
                        "clip-image-embedder",
                        input_hash,
                        image_path.chars().count(),
                        None,
                        start.elapsed().as_millis() as u64,
                        Some(e.to_string()),
                    ),
                };
            }
        }
    }
}

fn blank_metadata(
    channel: Channel,
    model: &str,
    input_hash: String,
    input_len: usize,
    language: Option<&str>,
    latency_ms: u64,
    error: Option<String>,
) -> EmbeddingMetadata {
    EmbeddingMetadata {
        model: model.to_string(),
        dimensions: 0,
        input_text_hash: input_hash,
        input_text_length: input_len,
        language: language.map(|s| s.to_string()),
        channel,
        generated_at: chrono::Utc::now(),
        latency_ms,
        error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    use crate::error::{MlError, MlResult};

    struct FlakyEmbedder {
        fail_times: AtomicU32,
        dims: usize,
    }

    #[async_trait]
    impl TextEmbedder for FlakyEmbedder {
        async fn embed(&self, _text: &str, _dim_hint: Option<usize>) -> MlResult<Vec<f32>> {
            if self.fail_times.load(Ordering::SeqCst) > 0 {
                self.fail_times.fetch_sub(1, Ordering::SeqCst);
                return Err(MlError::RequestFailed("simulated failure".to_string()));
            }
            Ok(vec![1.0; self.dims])
        }
    }

    #[test]
    fn smart_truncate_keeps_short_text_untouched() {
        assert_eq!(smart_truncate("hello world", 50), "hello world");
    }

    #[test]
    fn smart_truncate_prefers_sentence_boundary() {
        let text = "First sentence. Second sentence that runs long.";
        let truncated = smart_truncate(text, 20);
        assert_eq!(truncated, "First sentence.");
    }

    #[test]
    fn smart_truncate_falls_back_to_hard_cut_without_boundary() {
        let text = "a".repeat(30);
        let truncated = smart_truncate(&text, 10);
        assert_eq!(truncated.chars().count(), 10);
    }

    #[tokio::test]
    async fn empty_text_yields_null_vector_with_reason() {
        let embedder = FlakyEmbedder {
            fail_times: AtomicU32::new(0),
            dims: 8,
        };
        let config = EmbedderConfig::default();
        let outcome =
            embed_text_channel(&embedder, Channel::Transcript, "   ", None, None, &config).await;
        assert!(outcome.vector.is_none());
        assert_eq!(outcome.metadata.error.as_deref(), Some("empty input"));
    }

    #[tokio::test]
    async fn retries_then_succeeds_within_budget() {
        let embedder = FlakyEmbedder {
            fail_times: AtomicU32::new(1),
            dims: 4,
        };
        let config = EmbedderConfig {
            retry_delay: Duration::from_millis(1),
            ..EmbedderConfig::default()
        };
        let outcome =
            embed_text_channel(&embedder, Channel::Visual, "a scene description", None, None, &config)
                .await;
        assert!(outcome.vector.is_some());
        assert!(outcome.metadata.error.is_none());
    }

    #[tokio::test]
    async fn exhausting_retries_yields_null_vector_with_error() {
        let embedder = FlakyEmbedder {
            fail_times: AtomicU32::new(99),
            dims: 4,
        };
        let config = EmbedderConfig {
            max_retries: 1,
            retry_delay: Duration::from_millis(1),
            ..EmbedderConfig::default()
        };
        let outcome =
            embed_text_channel(&embedder, Channel::Summary, "some summary text", None, None, &config)
                .await;
        assert!(outcome.vector.is_none());
        assert!(outcome.metadata.error.is_some());
    }

    #[test]
    fn max_length_for_excludes_non_text_channels() {
        let config = EmbedderConfig::default();
        assert!(config.max_length_for(Channel::ClipImage).is_none());
        assert!(config.max_length_for(Channel::Lexical).is_none());
        assert!(config.max_length_for(Channel::Transcript).is_some());
    }
}
