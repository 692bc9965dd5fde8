//! Fusion Engine (C9, §4.9).
//!
//! `fusion.py`'s `rrf_fuse()` only ever merged one dense channel with the
//! lexical channel via a lookup dict; this generalizes the same idea to the
//! full set of dense channels (transcript, visual, summary, clip image) plus
//! lexical, and adds the min-max weighted-mean strategy alongside RRF.

use std::collections::HashMap;

use hx_models::{Channel, ChannelBreakdown, FusedCandidate, SceneId, ScoreType};

use crate::config::SearchConfig;

/// One channel's ranked candidate list going into fusion: `(scene_id, rank, raw_score)`.
/// Ranks are 1-based and dense within the channel.
pub type ChannelCandidates = Vec<(SceneId, u32, f64)>;

pub fn rrf_fuse(
    channels: &HashMap<Channel, ChannelCandidates>,
    weights: &HashMap<Channel, f64>,
    config: &SearchConfig,
) -> Vec<FusedCandidate> {
    let k = config.rrf_k as f64;
    let mut per_scene: HashMap<SceneId, FusedCandidate> = HashMap::new();

    for (&channel, candidates) in channels {
        let weight = weights.get(&channel).copied().unwrap_or(0.0);
        if weight <= 0.0 {
            continue;
        }
        for (scene_id, rank, raw_score) in candidates {
            let rank = *rank;
            let raw_score = *raw_score;
            let entry = per_scene.entry(scene_id.clone()).or_insert_with(|| {
                FusedCandidate {
                    scene_id: scene_id.clone(),
                    score: 0.0,
                    score_type: ScoreType::Rrf,
                    per_channel: HashMap::new(),
                    display_score: None,
                    match_quality: None,
                    rerank: None,
                    best_dense_rank: None,
                    lexical_rank: None,
                }
            });

            let contribution = weight / (k + rank as f64);
            entry.score += contribution;
            entry.per_channel.insert(
                channel.as_str().to_string(),
                ChannelBreakdown {
                    rank: Some(rank),
                    raw: Some(raw_score),
                    normalized: None,
                    weight,
                },
            );

            if channel == Channel::Lexical {
                entry.lexical_rank = Some(entry.lexical_rank.map_or(rank, |r| r.min(rank)));
            } else {
                entry.best_dense_rank = Some(entry.best_dense_rank.map_or(rank, |r| r.min(rank)));
            }
        }
    }

    let mut fused: Vec<FusedCandidate> = per_scene.into_values().collect();
    sort_fused(&mut fused);
    fused
}

pub fn minmax_mean_fuse(
    channels: &HashMap<Channel, ChannelCandidates>,
    weights: &HashMap<Channel, f64>,
    config: &SearchConfig,
) -> Vec<FusedCandidate> {
    let eps = config.fusion_minmax_eps;
    let mut normalized: HashMap<Channel, HashMap<SceneId, (f64, u32)>> = HashMap::new();

    for (&channel, candidates) in channels {
        if candidates.is_empty() {
            continue;
        }
        let min = candidates
            .iter()
            .map(|(_, _, s)| *s)
            .fold(f64::INFINITY, f64::min);
        let max = candidates
            .iter()
            .map(|(_, _, s)| *s)
            .fold(f64::NEG_INFINITY, f64::max);
        let range = max - min;

        let mut per_scene = HashMap::new();
        for (scene_id, rank, raw) in candidates {
            let norm = if range.abs() < eps { 1.0 } else { (*raw - min) / range };
            per_scene.insert(scene_id.clone(), (norm, *rank));
        }
        normalized.insert(channel, per_scene);
    }

    let mut per_scene: HashMap<SceneId, FusedCandidate> = HashMap::new();
    // Fixed-denominator weighted sum (§4.9): a scene missing from a channel
    // contributes 0 for that channel rather than shrinking the denominator,
    // so a single-channel hit never outscores a true multi-channel hit.
    let mut weighted_sums: HashMap<SceneId, f64> = HashMap::new();

    for (&channel, scenes) in &normalized {
        let weight = weights.get(&channel).copied().unwrap_or(0.0);
        if weight <= 0.0 {
            continue;
        }
        let raw_by_scene: HashMap<&SceneId, f64> = channels[&channel]
            .iter()
            .map(|(id, _, raw)| (id, *raw))
            .collect();

        for (scene_id, &(norm, rank)) in scenes {
            let entry = per_scene.entry(scene_id.clone()).or_insert_with(|| {
                FusedCandidate {
                    scene_id: scene_id.clone(),
                    score: 0.0,
                    score_type: ScoreType::MinmaxMean,
                    per_channel: HashMap::new(),
                    display_score: None,
                    match_quality: None,
                    rerank: None,
                    best_dense_rank: None,
                    lexical_rank: None,
                }
            });
            entry.per_channel.insert(
                channel.as_str().to_string(),
                ChannelBreakdown {
                    rank: Some(rank),
                    raw: raw_by_scene.get(scene_id).copied(),
                    normalized: Some(norm),
                    weight,
                },
            );
            if channel == Channel::Lexical {
                entry.lexical_rank = Some(entry.lexical_rank.map_or(rank, |r| r.min(rank)));
            } else {
                entry.best_dense_rank = Some(entry.best_dense_rank.map_or(rank, |r| r.min(rank)));
            }

            *weighted_sums.entry(scene_id.clone()).or_insert(0.0) += weight * norm;
        }
    }

    for (scene_id, weighted_sum) in weighted_sums {
        if let Some(entry) = per_scene.get_mut(&scene_id) {
            entry.score = weighted_sum;
        }
    }

    let mut fused: Vec<FusedCandidate> = per_scene.into_values().collect();
    sort_fused(&mut fused);
    fused
}

pub fn fuse(
    method: hx_models::FusionMethod,
    channels: &HashMap<Channel, ChannelCandidates>,
    weights: &HashMap<Channel, f64>,
    config: &SearchConfig,
) -> Vec<FusedCandidate> {
    match method {
        hx_models::FusionMethod::Rrf => rrf_fuse(channels, weights, config),
        hx_models::FusionMethod::MinmaxMean => minmax_mean_fuse(channels, weights, config),
    }
}

/// Sort descending by score, tie-break `(dense_rank_or_inf, lexical_rank_or_inf, scene_id)`
/// for deterministic ordering across runs (§4.9).
fn sort_fused(fused: &mut [FusedCandidate]) {
    fused.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                a.best_dense_rank
                    .unwrap_or(u32::MAX)
                    .cmp(&b.best_dense_rank.unwrap_or(u32::MAX))
            })
            .then_with(|| {
                a.lexical_rank
                    .unwrap_or(u32::MAX)
                    .cmp(&b.lexical_rank.unwrap_or(u32::MAX))
            })
            .then_with(|| a.scene_id.as_str().cmp(b.scene_id.as_str()))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scene(n: u8) -> SceneId {
        SceneId::from_string(format!("scene-{n}"))
    }

    #[test]
    fn rrf_fuse_combines_weighted_reciprocal_ranks() {
        let mut channels = HashMap::new();
        channels.insert(
            Channel::Transcript,
            vec![(scene(1), 1, 0.9), (scene(2), 2, 0.5)],
        );
        channels.insert(Channel::Lexical, vec![(scene(2), 1, 10.0)]);

        let mut weights = HashMap::new();
        weights.insert(Channel::Transcript, 0.6);
        weights.insert(Channel::Lexical, 0.4);

        let config = SearchConfig::default();
        let fused = rrf_fuse(&channels, &weights, &config);

        assert_eq!(fused.len(), 2);
        // scene 2 gets contributions from both channels, so it should win.
        assert_eq!(fused[0].scene_id, scene(2));
    }

    #[test]
    fn minmax_mean_handles_flat_channel_via_eps_guard() {
        let mut channels = HashMap::new();
        channels.insert(
            Channel::Transcript,
            vec![(scene(1), 1, 0.5), (scene(2), 2, 0.5)],
        );
        let mut weights = HashMap::new();
        weights.insert(Channel::Transcript, 1.0);

        let config = SearchConfig::default();
        let fused = minmax_mean_fuse(&channels, &weights, &config);
        // both get normalized score 1.0 under the flat-range fallback
        assert!(fused.iter().all(|f| (f.score - 1.0).abs() < 1e-9));
    }

    #[test]
    fn minmax_mean_does_not_renormalize_a_single_channel_hit() {
        // A scene that only hits the dense channel must score exactly its
        // dense weight, not 1.0 from renormalizing by its own weight alone.
        let mut channels = HashMap::new();
        channels.insert(
            Channel::Transcript,
            vec![(scene(1), 1, 0.9), (scene(2), 2, 0.1)],
        );
        channels.insert(Channel::Lexical, vec![(scene(2), 1, 10.0), (scene(3), 2, 1.0)]);

        let mut weights = HashMap::new();
        weights.insert(Channel::Transcript, 0.7);
        weights.insert(Channel::Lexical, 0.3);

        let config = SearchConfig::default();
        let fused = minmax_mean_fuse(&channels, &weights, &config);

        let scene1 = fused.iter().find(|f| f.scene_id == scene(1)).unwrap();
        assert!((scene1.score - 0.7).abs() < 1e-9);
    }

    #[test]
    fn zero_weight_channel_is_excluded_from_fusion() {
        let mut channels = HashMap::new();
        channels.insert(Channel::Visual, vec![(scene(1), 1, 0.9)]);
        let mut weights = HashMap::new();
        weights.insert(Channel::Visual, 0.0);

        let config = SearchConfig::default();
        let fused = rrf_fuse(&channels, &weights, &config);
        assert!(fused.is_empty());
    }

    #[test]
    fn sort_breaks_ties_by_dense_rank_then_scene_id() {
        let make = |id: SceneId, dense_rank: u32| FusedCandidate {
            scene_id: id,
            score: 1.0,
            score_type: ScoreType::Rrf,
            per_channel: HashMap::new(),
            display_score: None,
            match_quality: None,
            rerank: None,
            best_dense_rank: Some(dense_rank),
            lexical_rank: None,
        };
        let mut fused = vec![make(scene(2), 2), make(scene(1), 1)];
        sort_fused(&mut fused);
        assert_eq!(fused[0].scene_id, scene(1));
    }
}
