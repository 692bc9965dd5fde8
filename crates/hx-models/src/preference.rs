//! Saved per-tenant search preferences (§3, consumed by C12 as tier 2).

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::ids::TenantId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FusionMethod {
    MinmaxMean,
    Rrf,
}

impl FusionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            FusionMethod::MinmaxMean => "minmax_mean",
            FusionMethod::Rrf => "rrf",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum VisualMode {
    Recall,
    Rerank,
    Skip,
    #[default]
    Auto,
}

impl VisualMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            VisualMode::Recall => "recall",
            VisualMode::Rerank => "rerank",
            VisualMode::Skip => "skip",
            VisualMode::Auto => "auto",
        }
    }
}

/// User-facing channel weight map keyed by the names exposed to callers
/// (`transcript`, `visual`, `summary`, `lexical`) — distinct from the
/// internal fusion keys C12 maps them to (`dense_transcript`, ...).
pub type UserChannelWeights = HashMap<String, f64>;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct UserSearchPreference {
    pub tenant_id: TenantId,
    pub channel_weights: UserChannelWeights,
    pub fusion_method: FusionMethod,
    pub visual_mode: VisualMode,
}
