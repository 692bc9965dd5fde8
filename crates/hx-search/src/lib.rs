//! Query planning, fusion, reranking, gating, and calibration for hybrid
//! video search (C7-C12, §4.7-§4.12).
//!
//! `config`, `error`, `fusion`, `weights`, `rerank`, and `calibration` are
//! I/O-free and deterministic; `candidates` and `query_plan` are the only
//! modules here that talk to adapters (via `hx-index`/`hx-ml-client` trait
//! objects) or carry request-shaped state. `engine::search` is the entry
//! point that runs all of C7-C12 in order and is what callers should use
//! rather than calling the stage functions directly.

pub mod calibration;
pub mod candidates;
pub mod config;
pub mod engine;
pub mod error;
pub mod fusion;
pub mod query_plan;
pub mod rerank;
pub mod visual_intent;
pub mod weights;

pub use calibration::{
    apply_lookup_soft_gating, build_raw_dense_by_id, calibrate_display_scores,
    compute_best_guess_display_scores, neutral_display_score,
};
pub use candidates::{fetch_dense_channels, fetch_lexical_channel, lexical_hit_ids, ChannelQuery};
pub use config::{CalibrationMethod, SearchConfig};
pub use engine::{search, KnownPerson, SearchDebug, SearchRequest, SearchResponse};
pub use error::{DomainError, DomainResult};
pub use fusion::{fuse, minmax_mean_fuse, rrf_fuse, ChannelCandidates};
pub use query_plan::{classify_intent, detect_language, parse_person_prefix, PersonCandidate};
pub use rerank::{rerank_with_clip, RerankOutcome};
pub use visual_intent::analyze as analyze_visual_intent;
pub use weights::{
    apply_weight_guardrails, map_to_fusion_keys, normalize_weights, redistribute_weights,
    resolve_weights, validate_user_weights, WeightResolution, WeightSource,
};
