//! Weight Resolver (C12, §4.12).
//!
//! Direct port of `weights.py`'s resolution pipeline: 3-tier precedence
//! (request > saved > default), validation, normalization, guardrails
//! (visual cap, lexical floor, renormalize-on-clamp), visual_mode=skip
//! handling, and redistribution when channels are disabled for lack of data.

use std::collections::HashMap;

use hx_models::{Channel, UserChannelWeights, VisualMode};

use crate::error::{DomainError, DomainResult};

pub const USER_CHANNELS: &[&str] = &["transcript", "visual", "summary", "lexical"];

pub fn user_key_to_channel(key: &str) -> Option<Channel> {
    match key {
        "transcript" => Some(Channel::Transcript),
        "visual" => Some(Channel::Visual),
        "summary" => Some(Channel::Summary),
        "lexical" => Some(Channel::Lexical),
        _ => None,
    }
}

#[derive(Debug, Clone)]
pub struct WeightResolution {
    pub weights_requested: Option<UserChannelWeights>,
    pub weights_resolved: UserChannelWeights,
    pub weights_applied: HashMap<Channel, f64>,
    pub source: WeightSource,
    pub weights_clamped: bool,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeightSource {
    Request,
    Saved,
    Default,
}

pub fn normalize_weights(weights: &UserChannelWeights) -> DomainResult<UserChannelWeights> {
    let positive: HashMap<String, f64> = weights
        .iter()
        .filter(|(_, &v)| v > 0.0)
        .map(|(k, &v)| (k.clone(), v))
        .collect();

    if positive.is_empty() {
        return Err(DomainError::AllWeightsZero);
    }

    let total: f64 = positive.values().sum();
    if total <= 0.0 {
        return Err(DomainError::AllWeightsZero);
    }

    Ok(positive.into_iter().map(|(k, v)| (k, v / total)).collect())
}

pub fn validate_user_weights(weights: &UserChannelWeights) -> DomainResult<()> {
    for key in weights.keys() {
        if !USER_CHANNELS.contains(&key.as_str()) {
            return Err(DomainError::InvalidWeight {
                channel: key.clone(),
                reason: format!("unknown channel, allowed: {USER_CHANNELS:?}"),
            });
        }
    }
    for (channel, &weight) in weights {
        if !(0.0..=1.0).contains(&weight) {
            return Err(DomainError::InvalidWeight {
                channel: channel.clone(),
                reason: format!("weight must be in [0, 1], got {weight}"),
            });
        }
    }
    if weights.values().all(|&w| w <= 0.0) {
        return Err(DomainError::AllWeightsZero);
    }
    Ok(())
}

pub fn apply_weight_guardrails(
    weights: &UserChannelWeights,
    max_visual_weight: f64,
    min_lexical_weight: f64,
) -> DomainResult<(UserChannelWeights, bool, Vec<String>)> {
    let mut clamped = weights.clone();
    let mut was_clamped = false;
    let mut warnings = Vec::new();

    if let Some(&visual) = clamped.get("visual") {
        if visual > max_visual_weight {
            clamped.insert("visual".to_string(), max_visual_weight);
            was_clamped = true;
            warnings.push(format!(
                "visual weight clamped from {visual:.2} to {max_visual_weight:.2}"
            ));
        }
    }

    if let Some(&lexical) = clamped.get("lexical") {
        if lexical > 0.0 && lexical < min_lexical_weight {
            clamped.insert("lexical".to_string(), min_lexical_weight);
            was_clamped = true;
            warnings.push(format!(
                "lexical weight boosted from {lexical:.2} to {min_lexical_weight:.2}"
            ));
        }
    }

    if was_clamped {
        clamped = normalize_weights(&clamped)?;
    }

    Ok((clamped, was_clamped, warnings))
}

pub fn map_to_fusion_keys(weights: &UserChannelWeights) -> HashMap<Channel, f64> {
    weights
        .iter()
        .filter_map(|(k, &v)| user_key_to_channel(k).map(|c| (c, v)))
        .collect()
}

pub fn redistribute_weights(
    weights: &HashMap<Channel, f64>,
    disabled: &[Channel],
) -> DomainResult<HashMap<Channel, f64>> {
    let active: HashMap<Channel, f64> = weights
        .iter()
        .filter(|(k, _)| !disabled.contains(k))
        .map(|(&k, &v)| (k, v))
        .collect();

    if active.is_empty() {
        return Err(DomainError::AllChannelsDisabled);
    }

    let total: f64 = active.values().sum();
    Ok(active.into_iter().map(|(k, v)| (k, v / total)).collect())
}

#[allow(clippy::too_many_arguments)]
pub fn resolve_weights(
    request_weights: Option<&UserChannelWeights>,
    saved_weights: Option<&UserChannelWeights>,
    default_weights: &UserChannelWeights,
    use_saved_preferences: bool,
    visual_mode: Option<VisualMode>,
    enable_guardrails: bool,
    max_visual_weight: f64,
    min_lexical_weight: f64,
) -> DomainResult<WeightResolution> {
    let mut warnings = Vec::new();
    let weights_requested = request_weights.cloned();

    let (mut weights, source) = if let Some(requested) = request_weights {
        validate_user_weights(requested)?;
        (requested.clone(), WeightSource::Request)
    } else if use_saved_preferences && saved_weights.is_some() {
        let saved = saved_weights.unwrap();
        match validate_user_weights(saved) {
            Ok(()) => (saved.clone(), WeightSource::Saved),
            Err(_) => (default_weights.clone(), WeightSource::Default),
        }
    } else {
        (default_weights.clone(), WeightSource::Default)
    };

    weights = normalize_weights(&weights)?;

    let mut weights_clamped = false;
    if enable_guardrails {
        let (clamped, was_clamped, clamp_warnings) =
            apply_weight_guardrails(&weights, max_visual_weight, min_lexical_weight)?;
        weights = clamped;
        weights_clamped = was_clamped;
        warnings.extend(clamp_warnings);
    }

    if visual_mode == Some(VisualMode::Skip) {
        if let Some(&visual) = weights.get("visual") {
            if visual > 0.0 {
                weights.insert("visual".to_string(), 0.0);
                weights = normalize_weights(&weights)?;
                warnings.push("visual weight forced to 0 (visual_mode=skip)".to_string());
            }
        }
    }

    let weights_resolved = weights.clone();
    let weights_applied = map_to_fusion_keys(&weights);

    Ok(WeightResolution {
        weights_requested,
        weights_resolved,
        weights_applied,
        source,
        weights_clamped,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weights(pairs: &[(&str, f64)]) -> UserChannelWeights {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn normalize_weights_sums_to_one() {
        let normalized = normalize_weights(&weights(&[("transcript", 2.0), ("visual", 2.0)])).unwrap();
        let total: f64 = normalized.values().sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn normalize_weights_rejects_all_zero() {
        assert!(normalize_weights(&weights(&[("transcript", 0.0)])).is_err());
    }

    #[test]
    fn validate_rejects_unknown_channel() {
        assert!(validate_user_weights(&weights(&[("bogus", 1.0)])).is_err());
    }

    #[test]
    fn guardrails_clamp_visual_and_renormalize() {
        let input = weights(&[("visual", 0.9), ("transcript", 0.1)]);
        let (clamped, was_clamped, _) = apply_weight_guardrails(&input, 0.8, 0.05).unwrap();
        assert!(was_clamped);
        assert!(clamped["visual"] <= 0.8 + 1e-9);
        let total: f64 = clamped.values().sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn guardrails_floor_lexical_when_present_and_positive() {
        let input = weights(&[("lexical", 0.01), ("transcript", 0.99)]);
        let (clamped, was_clamped, _) = apply_weight_guardrails(&input, 0.8, 0.05).unwrap();
        assert!(was_clamped);
        assert!(clamped["lexical"] >= 0.05 - 1e-9);
    }

    #[test]
    fn visual_mode_skip_zeroes_visual_weight() {
        let defaults = weights(&[("transcript", 0.5), ("visual", 0.5)]);
        let resolution = resolve_weights(
            None,
            None,
            &defaults,
            true,
            Some(VisualMode::Skip),
            true,
            0.8,
            0.05,
        )
        .unwrap();
        assert!(!resolution.weights_applied.contains_key(&Channel::Visual));
    }

    #[test]
    fn request_weights_take_precedence_over_saved_and_default() {
        let request = weights(&[("transcript", 1.0)]);
        let saved = weights(&[("visual", 1.0)]);
        let defaults = weights(&[("summary", 1.0)]);
        let resolution =
            resolve_weights(Some(&request), Some(&saved), &defaults, true, None, true, 0.8, 0.05)
                .unwrap();
        assert_eq!(resolution.source, WeightSource::Request);
    }

    #[test]
    fn redistribute_excludes_disabled_channels_and_renormalizes() {
        let mut applied = HashMap::new();
        applied.insert(Channel::Transcript, 0.5);
        applied.insert(Channel::Visual, 0.5);
        let redistributed = redistribute_weights(&applied, &[Channel::Visual]).unwrap();
        assert_eq!(redistributed.len(), 1);
        assert!((redistributed[&Channel::Transcript] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn redistribute_errors_when_all_channels_disabled() {
        let mut applied = HashMap::new();
        applied.insert(Channel::Transcript, 1.0);
        assert!(redistribute_weights(&applied, &[Channel::Transcript]).is_err());
    }
}
