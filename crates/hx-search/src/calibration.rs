//! Gating & Calibration (C11, §4.11).
//!
//! Display-score calibration squashes fused scores into a range that never
//! reads as 100% confident, while never reordering the input. The lookup
//! best-guess override replaces that with a direct linear map of absolute
//! dense-channel similarity when a lookup query's lexical channel came back
//! empty — grounded on `test_lookup_fallback_display.py`'s exact worked
//! numbers. The literal `display_score.py` module wasn't retrievable; only
//! its test suite was, so this is authored from that suite's behavioral
//! contract rather than ported line-by-line.

use std::collections::HashMap;

use hx_models::{Channel, FusedCandidate, SceneId};

use crate::config::{CalibrationMethod, SearchConfig};
use crate::fusion::ChannelCandidates;

const EPS: f64 = 1e-9;

pub fn neutral_display_score(max_cap: f64) -> f64 {
    0.5_f64.min(max_cap)
}

pub fn calibrate_display_scores(
    scores: &[f64],
    method: CalibrationMethod,
    alpha: f64,
    pctl: f64,
    max_cap: f64,
) -> Vec<f64> {
    if scores.is_empty() {
        return Vec::new();
    }

    match method {
        CalibrationMethod::ExpSquash => calibrate_exp_squash(scores, alpha, max_cap),
        CalibrationMethod::PctlCeiling => calibrate_pctl_ceiling(scores, pctl, max_cap),
    }
}

fn calibrate_exp_squash(scores: &[f64], alpha: f64, max_cap: f64) -> Vec<f64> {
    let min = scores.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = scores.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;

    if range.abs() < EPS {
        let neutral = neutral_display_score(max_cap);
        return vec![neutral; scores.len()];
    }

    let denom = 1.0 - (-alpha).exp();
    scores
        .iter()
        .map(|&s| {
            let norm = ((s - min) / range).clamp(0.0, 1.0);
            let squashed = (1.0 - (-alpha * norm).exp()) / denom;
            (squashed * max_cap).clamp(0.0, max_cap)
        })
        .collect()
}

fn calibrate_pctl_ceiling(scores: &[f64], pctl: f64, max_cap: f64) -> Vec<f64> {
    let min = scores.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = scores.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;

    if range.abs() < EPS {
        let neutral = neutral_display_score(max_cap);
        return vec![neutral; scores.len()];
    }

    let normalized: Vec<f64> = scores.iter().map(|&s| (s - min) / range).collect();
    let pctl_value = percentile(&normalized, pctl).max(EPS);
    let below_cap = max_cap * 0.9;

    normalized
        .iter()
        .map(|&n| {
            let mapped = if n <= pctl_value {
                (n / pctl_value) * below_cap
            } else {
                let remaining = (1.0 - pctl_value).max(EPS);
                let fraction_above = ((n - pctl_value) / remaining).clamp(0.0, 1.0);
                below_cap + fraction_above * (max_cap - below_cap)
            };
            mapped.clamp(0.0, max_cap)
        })
        .collect()
}

/// Linear-interpolation percentile over an already-sorted-or-not slice.
fn percentile(values: &[f64], p: f64) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = p.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        sorted[lower]
    } else {
        let frac = rank - lower as f64;
        sorted[lower] + frac * (sorted[upper] - sorted[lower])
    }
}

/// Max dense-channel similarity per scene, explicitly excluding lexical
/// (BM25 scores aren't on the same scale as cosine similarity).
pub fn build_raw_dense_by_id(
    channel_candidates: &HashMap<Channel, ChannelCandidates>,
) -> HashMap<SceneId, f64> {
    let mut max_by_id: HashMap<SceneId, f64> = HashMap::new();
    for channel in Channel::dense_text_channels() {
        let Some(candidates) = channel_candidates.get(channel) else {
            continue;
        };
        for (scene_id, _rank, score) in candidates {
            max_by_id
                .entry(scene_id.clone())
                .and_modify(|best| *best = best.max(*score))
                .or_insert(*score);
        }
    }
    max_by_id
}

/// Lookup best-guess absolute display score: linear map of raw dense
/// similarity from `[floor, ceil]` into `[0, cap]`, clamped at both ends.
pub fn compute_best_guess_display_scores(
    fused_results: &[FusedCandidate],
    raw_dense_by_id: &HashMap<SceneId, f64>,
    floor: f64,
    ceil: f64,
    cap: f64,
) -> HashMap<SceneId, f64> {
    let range = (ceil - floor).max(EPS);
    fused_results
        .iter()
        .map(|candidate| {
            let abs_sim = raw_dense_by_id
                .get(&candidate.scene_id)
                .copied()
                .unwrap_or(floor);
            let normalized = ((abs_sim - floor) / range).clamp(0.0, 1.0);
            (candidate.scene_id.clone(), normalized * cap)
        })
        .collect()
}

/// Soft lexical gating for lookup-intent queries (§4.11): when the lexical
/// channel returned at least `min_hits`, restrict the result set to scenes
/// the lexical channel actually matched. Otherwise fall back to best-guess
/// across all candidates.
pub fn apply_lookup_soft_gating(
    fused: Vec<FusedCandidate>,
    lexical_hit_ids: &std::collections::HashSet<SceneId>,
    config: &SearchConfig,
) -> Vec<FusedCandidate> {
    if !config.enable_lookup_soft_gating {
        return fused;
    }
    if lexical_hit_ids.len() < config.lookup_lexical_min_hits {
        return fused;
    }
    fused
        .into_iter()
        .filter(|c| lexical_hit_ids.contains(&c.scene_id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_scores_returns_empty() {
        let result =
            calibrate_display_scores(&[], CalibrationMethod::ExpSquash, 3.0, 0.9, 0.97);
        assert!(result.is_empty());
    }

    #[test]
    fn flat_distribution_returns_neutral_capped() {
        let scores = vec![0.75, 0.75, 0.75];
        let result =
            calibrate_display_scores(&scores, CalibrationMethod::ExpSquash, 3.0, 0.9, 0.97);
        assert!(result.iter().all(|&r| (r - 0.5).abs() < 0.05));
    }

    #[test]
    fn exp_squash_is_monotonic_and_bounded() {
        let scores = vec![0.92, 0.85, 0.78, 0.65, 0.52, 0.40];
        let result =
            calibrate_display_scores(&scores, CalibrationMethod::ExpSquash, 3.0, 0.9, 0.97);
        for pair in result.windows(2) {
            assert!(pair[0] >= pair[1]);
        }
        assert!(result.iter().all(|&r| r <= 0.97 && r < 1.0));
        assert!(result[0] >= 0.85);
        assert!(result.last().unwrap() < &0.15);
    }

    #[test]
    fn pctl_ceiling_caps_below_one_and_stays_monotonic() {
        let scores = vec![1.0, 0.95, 0.90, 0.85, 0.80];
        let result =
            calibrate_display_scores(&scores, CalibrationMethod::PctlCeiling, 3.0, 0.9, 0.97);
        assert!(result[0] < 1.0 && result[0] <= 0.97);
        for pair in result.windows(2) {
            assert!(pair[0] >= pair[1]);
        }
    }

    #[test]
    fn neutral_respects_low_cap() {
        assert_eq!(neutral_display_score(0.3), 0.3);
        assert_eq!(neutral_display_score(0.97), 0.5);
    }

    #[test]
    fn build_raw_dense_by_id_takes_max_and_ignores_lexical() {
        let mut channels: HashMap<Channel, ChannelCandidates> = HashMap::new();
        channels.insert(
            Channel::Transcript,
            vec![(SceneId::from_string("s1"), 1, 0.75)],
        );
        channels.insert(
            Channel::Visual,
            vec![(SceneId::from_string("s1"), 1, 0.90)],
        );
        channels.insert(
            Channel::Lexical,
            vec![(SceneId::from_string("s1"), 1, 25.5)],
        );
        let raw = build_raw_dense_by_id(&channels);
        assert_eq!(raw[&SceneId::from_string("s1")], 0.90);
    }

    #[test]
    fn best_guess_realistic_scenario_matches_worked_example() {
        let fused = vec![FusedCandidate {
            scene_id: SceneId::from_string("scene_1"),
            score: 0.98,
            score_type: hx_models::ScoreType::MinmaxMean,
            per_channel: HashMap::new(),
            display_score: None,
            match_quality: None,
            rerank: None,
            best_dense_rank: None,
            lexical_rank: None,
        }];
        let mut raw = HashMap::new();
        raw.insert(SceneId::from_string("scene_1"), 0.33);

        let display = compute_best_guess_display_scores(&fused, &raw, 0.20, 0.55, 0.65);
        let score = display[&SceneId::from_string("scene_1")];
        assert!(score > 0.20 && score < 0.30);
    }

    #[test]
    fn best_guess_clamps_below_floor_and_above_ceil() {
        let fused = vec![
            FusedCandidate {
                scene_id: SceneId::from_string("low"),
                score: 1.0,
                score_type: hx_models::ScoreType::MinmaxMean,
                per_channel: HashMap::new(),
                display_score: None,
                match_quality: None,
                rerank: None,
                best_dense_rank: None,
                lexical_rank: None,
            },
            FusedCandidate {
                scene_id: SceneId::from_string("high"),
                score: 1.0,
                score_type: hx_models::ScoreType::MinmaxMean,
                per_channel: HashMap::new(),
                display_score: None,
                match_quality: None,
                rerank: None,
                best_dense_rank: None,
                lexical_rank: None,
            },
        ];
        let mut raw = HashMap::new();
        raw.insert(SceneId::from_string("low"), 0.10);
        raw.insert(SceneId::from_string("high"), 0.80);

        let display = compute_best_guess_display_scores(&fused, &raw, 0.20, 0.55, 0.65);
        assert_eq!(display[&SceneId::from_string("low")], 0.0);
        assert_eq!(display[&SceneId::from_string("high")], 0.65);
    }
}
