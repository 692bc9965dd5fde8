//! Contracts for the model-serving side of the Index Adapter Layer (C14,
//! §4.14): transcription, visual analysis, text embedding, image embedding.
//! Concrete drivers are REST clients in [`crate::client`]; tests mock these
//! traits directly (§10.4).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::MlResult;

/// One segment of a transcribed audio track, with its own no-speech
/// probability (used by the transcription quality gate, §4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub start_s: f64,
    pub end_s: f64,
    pub text: String,
    pub no_speech_prob: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionResult {
    pub text: String,
    pub segments: Vec<TranscriptSegment>,
}

#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(
        &self,
        audio_path: &str,
        lang_hint: Option<&str>,
    ) -> MlResult<TranscriptionResult>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisualAnalysisStatus {
    Ok,
    NoContent,
}

/// Maximum length of the visual description field (§4.3).
pub const MAX_VISUAL_DESCRIPTION_LEN: usize = 500;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisualAnalysisResult {
    pub status: VisualAnalysisStatus,
    pub description: String,
    pub main_entities: Vec<String>,
    pub actions: Vec<String>,
    /// Populated when `status=NoContent` as a result of a timeout/error
    /// rather than a genuinely empty frame (§4.3 "fails soft").
    pub error_tag: Option<String>,
}

impl VisualAnalysisResult {
    pub fn no_content(error_tag: impl Into<String>) -> Self {
        Self {
            status: VisualAnalysisStatus::NoContent,
            description: String::new(),
            main_entities: Vec::new(),
            actions: Vec::new(),
            error_tag: Some(error_tag.into()),
        }
    }
}

#[async_trait]
pub trait VisualAnalyzer: Send + Sync {
    async fn analyze(
        &self,
        image_path: &str,
        context: Option<&str>,
        lang: &str,
    ) -> MlResult<VisualAnalysisResult>;
}

#[async_trait]
pub trait TextEmbedder: Send + Sync {
    /// Embed `text`, returning an L2-normalized vector of the model's fixed
    /// dimension (`dim_hint` is advisory, for adapters that serve multiple
    /// models).
    async fn embed(&self, text: &str, dim_hint: Option<usize>) -> MlResult<Vec<f32>>;
}

#[async_trait]
pub trait ImageEmbedder: Send + Sync {
    async fn embed_image(&self, path_or_url: &str) -> MlResult<Vec<f32>>;
    /// Encode free text into the same vector space as [`Self::embed_image`]
    /// (used for CLIP text→image rerank/retrieval, §4.8/§4.10).
    async fn embed_text_for_image_space(&self, text: &str) -> MlResult<Vec<f32>>;
}
