//! Scene entity, per-channel embeddings, and tag normalization (Data Model §3).

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::ids::{SceneId, VideoId};

/// One retrieval channel. Mirrors the internal fusion keys used throughout
/// C8/C9/C12 (`dense_transcript`, `dense_visual`, `dense_summary`, `lexical`,
/// plus the CLIP image channel used for rerank and person search).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Transcript,
    Visual,
    Summary,
    ClipImage,
    Lexical,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Transcript => "transcript",
            Channel::Visual => "visual",
            Channel::Summary => "summary",
            Channel::ClipImage => "clip_image",
            Channel::Lexical => "lexical",
        }
    }

    /// Dense *text* channels, used by the lookup best-guess absolute
    /// similarity computation (§4.11, §10.5) which explicitly excludes the
    /// lexical (BM25) channel from the max-similarity scan.
    pub fn dense_text_channels() -> &'static [Channel] {
        &[Channel::Transcript, Channel::Visual, Channel::Summary]
    }
}

/// Per-channel embedding vector plus generation metadata (§4.5).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct EmbeddingMetadata {
    pub model: String,
    pub dimensions: usize,
    pub input_text_hash: String,
    pub input_text_length: usize,
    pub language: Option<String>,
    pub channel: Channel,
    pub generated_at: DateTime<Utc>,
    pub latency_ms: u64,
    pub error: Option<String>,
}

/// Nullable per-channel embedding set. A scene must carry at least one
/// non-null channel to be retrievable (§3 invariant on `SceneEmbeddings`).
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct SceneEmbeddings {
    pub transcript: Option<Vec<f32>>,
    pub visual_text: Option<Vec<f32>>,
    pub summary: Option<Vec<f32>>,
    pub clip_image: Option<Vec<f32>>,
}

impl SceneEmbeddings {
    pub fn is_retrievable(&self) -> bool {
        self.transcript.is_some()
            || self.visual_text.is_some()
            || self.summary.is_some()
            || self.clip_image.is_some()
    }

    pub fn channel(&self, channel: Channel) -> Option<&[f32]> {
        match channel {
            Channel::Transcript => self.transcript.as_deref(),
            Channel::Visual => self.visual_text.as_deref(),
            Channel::Summary => self.summary.as_deref(),
            Channel::ClipImage => self.clip_image.as_deref(),
            Channel::Lexical => None,
        }
    }
}

/// A contiguous interval of a video produced by scene detection, with its
/// transcript slice, best keyframe, tags, and per-channel embeddings (§3).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Scene {
    pub id: SceneId,
    pub video_id: VideoId,
    pub index: u32,
    pub start_s: f64,
    pub end_s: f64,
    pub transcript_segment: Option<String>,
    pub visual_summary: Option<String>,
    pub visual_description: Option<String>,
    pub visual_entities: Vec<String>,
    pub visual_actions: Vec<String>,
    pub tags: Vec<String>,
    pub combined_text: Option<String>,
    pub thumbnail_key: Option<String>,
    pub embeddings: SceneEmbeddings,
    pub embedding_metadata: Vec<EmbeddingMetadata>,
    pub embedding_version: String,
    pub created_at: DateTime<Utc>,
}

/// Maximum length of a single tag (§3 invariant (c)).
pub const MAX_TAG_LEN: usize = 30;

/// Normalize tags per §3 invariant (c): lower-cased, trimmed, deduped, each
/// at most `MAX_TAG_LEN` characters, original order preserved for first
/// occurrence.
pub fn normalize_tags(raw: impl IntoIterator<Item = impl Into<String>>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for tag in raw {
        let mut tag: String = tag.into().trim().to_lowercase();
        if tag.is_empty() {
            continue;
        }
        if tag.len() > MAX_TAG_LEN {
            // Truncate on a char boundary, never splitting a multi-byte char.
            let mut cut = MAX_TAG_LEN;
            while !tag.is_char_boundary(cut) {
                cut -= 1;
            }
            tag.truncate(cut);
        }
        if seen.insert(tag.clone()) {
            out.push(tag);
        }
    }
    out
}

impl Scene {
    pub fn new(video_id: VideoId, index: u32, start_s: f64, end_s: f64) -> Self {
        Self {
            id: SceneId::new(),
            video_id,
            index,
            start_s,
            end_s,
            transcript_segment: None,
            visual_summary: None,
            visual_description: None,
            visual_entities: Vec::new(),
            visual_actions: Vec::new(),
            tags: Vec::new(),
            combined_text: None,
            thumbnail_key: None,
            embeddings: SceneEmbeddings::default(),
            embedding_metadata: Vec::new(),
            embedding_version: String::new(),
            created_at: Utc::now(),
        }
    }

    pub fn duration_s(&self) -> f64 {
        self.end_s - self.start_s
    }

    pub fn is_retrievable(&self) -> bool {
        self.embeddings.is_retrievable()
    }
}

/// Mirror of a Scene in the full-text index (§3, §6).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct LexicalSceneDoc {
    pub scene_id: SceneId,
    pub tenant_id: crate::ids::TenantId,
    pub video_id: VideoId,
    pub index: u32,
    pub start_s: f64,
    pub end_s: f64,
    pub transcript_segment: Option<String>,
    pub visual_summary: Option<String>,
    pub visual_description: Option<String>,
    pub combined_text: Option<String>,
    pub tags: Vec<String>,
    pub tags_text: Option<String>,
    pub thumbnail_url: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Language the analyzed text fields should be indexed under.
    pub language: String,
}

impl From<&Scene> for LexicalSceneDoc {
    fn from(scene: &Scene) -> Self {
        Self {
            scene_id: scene.id.clone(),
            tenant_id: crate::ids::TenantId::new(), // caller overwrites with the real tenant
            video_id: scene.video_id.clone(),
            index: scene.index,
            start_s: scene.start_s,
            end_s: scene.end_s,
            transcript_segment: scene.transcript_segment.clone(),
            visual_summary: scene.visual_summary.clone(),
            visual_description: scene.visual_description.clone(),
            combined_text: scene.combined_text.clone(),
            tags: scene.tags.clone(),
            tags_text: if scene.tags.is_empty() {
                None
            } else {
                Some(scene.tags.join(" "))
            },
            thumbnail_url: None,
            created_at: scene.created_at,
            language: "en".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_tags_lowercases_trims_dedupes_and_caps_length() {
        let tags = normalize_tags(vec![
            "  Cooking ",
            "cooking",
            "COOKING",
            &"x".repeat(40),
            "",
        ]);
        assert_eq!(tags, vec!["cooking".to_string(), "x".repeat(MAX_TAG_LEN)]);
    }

    #[test]
    fn scene_is_retrievable_iff_some_channel_present() {
        let mut scene = Scene::new(VideoId::new(), 0, 0.0, 2.0);
        assert!(!scene.is_retrievable());
        scene.embeddings.transcript = Some(vec![0.1, 0.2]);
        assert!(scene.is_retrievable());
    }

    #[test]
    fn duration_is_end_minus_start() {
        let scene = Scene::new(VideoId::new(), 0, 1.5, 4.0);
        assert!((scene.duration_s() - 2.5).abs() < 1e-9);
    }
}
