//! Transient per-request query and result types (§3).

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::ids::{PersonId, SceneId, TenantId, VideoId};
use crate::preference::{FusionMethod, VisualMode};
use crate::scene::Channel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum QueryIntent {
    Lookup,
    Semantic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    Korean,
    English,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Korean => "ko",
            Language::English => "en",
        }
    }
}

/// Resolved visual-intent routing output (§4.7 step 4).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct VisualIntent {
    pub suggested_mode: VisualMode,
    /// Additive adjustment to the visual channel weight, clamped to
    /// `[-0.20, 0.15]` per §4.7.
    pub weight_adjustment: f64,
    pub confidence: f64,
}

/// A resolved person-name prefix parsed from the query text (§4.7 step 1).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PersonPrefix {
    pub person_id: PersonId,
    pub query_embedding: Option<Vec<f32>>,
    /// The remainder of the query text after the name prefix was stripped.
    pub rest: String,
}

/// Finalized plan produced by the Query Planner (C7) after Weight
/// Resolution (C12) has run.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct QueryPlan {
    pub text: String,
    pub language: Language,
    pub intent: QueryIntent,
    pub visual_intent: Option<VisualIntent>,
    pub resolved_weights: HashMap<String, f64>,
    pub fusion_method: FusionMethod,
    pub visual_mode: VisualMode,
    pub person_prefix: Option<PersonPrefix>,
    pub tenant_id: TenantId,
    pub video_id: Option<VideoId>,
    pub limit: usize,
    pub threshold: f64,
}

/// One entry in a per-channel candidate list. Ranks are 1-based and dense
/// within a single channel's list (§3, §4.8).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema)]
pub struct Candidate {
    pub scene_id_idx: usize,
    pub rank: u32,
    pub raw_score: f64,
}

/// A single channel's ordered candidate list, keyed by scene id out of line
/// so candidate lists stay cheap to pass around; see [`crate::candidate`]
/// for the id-carrying variant used across crate boundaries.
pub type CandidateList = Vec<(SceneId, u32, f64)>;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum MatchQuality {
    Supported,
    BestGuess,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ScoreType {
    Rrf,
    MinmaxMean,
    RerankClip,
}

/// Per-channel debug breakdown attached to each fused candidate (§4.9, §6).
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ChannelBreakdown {
    pub rank: Option<u32>,
    pub raw: Option<f64>,
    pub normalized: Option<f64>,
    pub weight: f64,
}

/// Debug fields describing how a rerank pass (if any) affected a candidate.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RerankDebug {
    pub clip_raw: Option<f64>,
    pub clip_normalized: Option<f64>,
    pub clip_weight_used: f64,
}

/// A candidate after fusion (and optional rerank, gating, calibration) — the
/// transient result type carried through C9-C11 (§3).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FusedCandidate {
    pub scene_id: SceneId,
    pub score: f64,
    pub score_type: ScoreType,
    pub per_channel: HashMap<String, ChannelBreakdown>,
    pub display_score: Option<f64>,
    pub match_quality: Option<MatchQuality>,
    pub rerank: Option<RerankDebug>,
    /// Dense rank within the best dense channel the scene appeared in;
    /// used by the RRF tie-break (§4.9).
    pub best_dense_rank: Option<u32>,
    /// Rank within the lexical channel, used by the same tie-break.
    pub lexical_rank: Option<u32>,
}

impl FusedCandidate {
    pub fn channel_weight(&self, channel: Channel) -> f64 {
        self.per_channel
            .get(channel.as_str())
            .map(|c| c.weight)
            .unwrap_or(0.0)
    }
}
