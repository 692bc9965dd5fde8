//! Reranker (C10, §4.10).
//!
//! Ported from `rerank.py`'s `rerank_with_clip()`: blend min-max normalized
//! base fusion scores with min-max normalized CLIP image-similarity scores,
//! skipping the blend entirely when there are no base candidates, no CLIP
//! scores, or the CLIP score range is too flat to be informative.

use std::collections::HashMap;

use hx_models::{ChannelBreakdown, FusedCandidate, RerankDebug, SceneId, ScoreType};

use crate::config::SearchConfig;

pub struct RerankOutcome {
    pub reranked: Vec<FusedCandidate>,
    pub clip_skipped: bool,
    pub skip_reason: Option<String>,
    pub candidates_scored: usize,
}

pub fn rerank_with_clip(
    base_candidates: Vec<FusedCandidate>,
    clip_scores: &HashMap<SceneId, f64>,
    config: &SearchConfig,
) -> RerankOutcome {
    let eps = 1e-9;

    if base_candidates.is_empty() {
        return RerankOutcome {
            reranked: Vec::new(),
            clip_skipped: true,
            skip_reason: Some("no base candidates to rerank".to_string()),
            candidates_scored: 0,
        };
    }

    if clip_scores.is_empty() {
        return RerankOutcome {
            candidates_scored: 0,
            clip_skipped: true,
            skip_reason: Some("no CLIP scores returned".to_string()),
            reranked: base_candidates,
        };
    }

    let clip_min = clip_scores.values().cloned().fold(f64::INFINITY, f64::min);
    let clip_max = clip_scores
        .values()
        .cloned()
        .fold(f64::NEG_INFINITY, f64::max);
    let clip_range = clip_max - clip_min;

    if clip_range < config.rerank_min_score_range {
        return RerankOutcome {
            candidates_scored: clip_scores.len(),
            clip_skipped: true,
            skip_reason: Some(format!("flat CLIP scores (range={clip_range:.4})")),
            reranked: base_candidates,
        };
    }

    let normalized_clip: HashMap<&SceneId, f64> = clip_scores
        .iter()
        .map(|(id, &score)| (id, (score - clip_min) / (clip_range + eps)))
        .collect();

    let base_scores: Vec<f64> = base_candidates.iter().map(|c| c.score).collect();
    let base_min = base_scores.iter().cloned().fold(f64::INFINITY, f64::min);
    let base_max = base_scores
        .iter()
        .cloned()
        .fold(f64::NEG_INFINITY, f64::max);
    let base_range = base_max - base_min;

    let mut candidates_scored = 0;
    let mut reranked: Vec<FusedCandidate> = base_candidates
        .into_iter()
        .map(|mut candidate| {
            let norm_base = if base_range > eps {
                (candidate.score - base_min) / (base_range + eps)
            } else {
                1.0
            };

            let clip_raw = clip_scores.get(&candidate.scene_id).copied();
            let norm_clip = normalized_clip
                .get(&candidate.scene_id)
                .copied()
                .unwrap_or(0.0);
            if clip_raw.is_some() {
                candidates_scored += 1;
            }

            let blended =
                (1.0 - config.rerank_clip_weight) * norm_base + config.rerank_clip_weight * norm_clip;

            candidate.score = blended;
            candidate.score_type = ScoreType::RerankClip;
            candidate.per_channel.insert(
                "clip_rerank".to_string(),
                ChannelBreakdown {
                    rank: None,
                    raw: clip_raw,
                    normalized: Some(norm_clip),
                    weight: config.rerank_clip_weight,
                },
            );
            candidate.rerank = Some(RerankDebug {
                clip_raw,
                clip_normalized: Some(norm_clip),
                clip_weight_used: config.rerank_clip_weight,
            });

            candidate
        })
        .collect();

    reranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

    RerankOutcome {
        reranked,
        clip_skipped: false,
        skip_reason: None,
        candidates_scored,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: &str, score: f64) -> FusedCandidate {
        FusedCandidate {
            scene_id: SceneId::from_string(id),
            score,
            score_type: ScoreType::MinmaxMean,
            per_channel: HashMap::new(),
            display_score: None,
            match_quality: None,
            rerank: None,
            best_dense_rank: None,
            lexical_rank: None,
        }
    }

    #[test]
    fn empty_base_candidates_skips_with_reason() {
        let outcome = rerank_with_clip(vec![], &HashMap::new(), &SearchConfig::default());
        assert!(outcome.clip_skipped);
        assert!(outcome.reranked.is_empty());
    }

    #[test]
    fn missing_clip_scores_returns_base_unchanged() {
        let base = vec![candidate("a", 0.5)];
        let outcome = rerank_with_clip(base.clone(), &HashMap::new(), &SearchConfig::default());
        assert!(outcome.clip_skipped);
        assert_eq!(outcome.reranked[0].scene_id, base[0].scene_id);
    }

    #[test]
    fn flat_clip_range_is_skipped() {
        let base = vec![candidate("a", 0.2), candidate("b", 0.8)];
        let mut clip_scores = HashMap::new();
        clip_scores.insert(SceneId::from_string("a"), 0.50);
        clip_scores.insert(SceneId::from_string("b"), 0.51);
        let outcome = rerank_with_clip(base, &clip_scores, &SearchConfig::default());
        assert!(outcome.clip_skipped);
    }

    #[test]
    fn blends_and_resorts_by_combined_score() {
        let base = vec![candidate("a", 0.9), candidate("b", 0.1)];
        let mut clip_scores = HashMap::new();
        clip_scores.insert(SceneId::from_string("a"), 0.1);
        clip_scores.insert(SceneId::from_string("b"), 0.9);
        let config = SearchConfig {
            rerank_clip_weight: 0.8,
            ..SearchConfig::default()
        };
        let outcome = rerank_with_clip(base, &clip_scores, &config);
        assert!(!outcome.clip_skipped);
        assert_eq!(outcome.candidates_scored, 2);
        // with an 0.8 CLIP weight, "b" (clip=0.9) should overtake "a" (clip=0.1).
        assert_eq!(outcome.reranked[0].scene_id, SceneId::from_string("b"));
    }
}
