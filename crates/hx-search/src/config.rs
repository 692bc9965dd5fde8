//! Search-time tunables (§6, §10.3), collected into one config struct the
//! way `ApiConfig`/`R2Config`/`MlClientConfig` collect theirs elsewhere in
//! this codebase, each field defaulting to the literal named in §4.

use hx_models::FusionMethod;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationMethod {
    ExpSquash,
    PctlCeiling,
}

#[derive(Debug, Clone)]
pub struct SearchConfig {
    // C8 candidate fetchers
    pub candidate_k_transcript: usize,
    pub candidate_k_visual: usize,
    pub candidate_k_summary: usize,
    pub candidate_k_lexical: usize,
    pub candidate_k_person: usize,
    pub threshold_transcript: f64,
    pub threshold_visual: f64,
    pub threshold_summary: f64,
    pub multi_dense_timeout_s: u64,

    // C9 fusion
    pub fusion_method: FusionMethod,
    pub rrf_k: u32,
    pub fusion_minmax_eps: f64,
    pub fusion_percentile_clip_enabled: bool,
    pub fusion_percentile_clip_lo: f64,
    pub fusion_percentile_clip_hi: f64,

    // C10 rerank
    pub rerank_pool_size: usize,
    pub rerank_clip_weight: f64,
    pub rerank_min_score_range: f64,

    // C11 gating & calibration
    pub enable_display_score_calibration: bool,
    pub display_score_method: CalibrationMethod,
    pub display_score_max_cap: f64,
    pub display_score_alpha: f64,
    pub display_score_pctl: f64,
    pub enable_lookup_soft_gating: bool,
    pub lookup_lexical_min_hits: usize,
    pub enable_lookup_absolute_display_score: bool,
    pub lookup_abs_sim_floor: f64,
    pub lookup_abs_sim_ceil: f64,
    pub lookup_best_guess_max_cap: f64,

    // C12 weight resolver
    pub weight_transcript: f64,
    pub weight_visual: f64,
    pub weight_summary: f64,
    pub weight_lexical: f64,
    pub max_visual_weight: f64,
    pub min_lexical_weight: f64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            candidate_k_transcript: 50,
            candidate_k_visual: 50,
            candidate_k_summary: 50,
            candidate_k_lexical: 50,
            candidate_k_person: 50,
            threshold_transcript: 0.2,
            threshold_visual: 0.2,
            threshold_summary: 0.2,
            multi_dense_timeout_s: 3,

            fusion_method: FusionMethod::MinmaxMean,
            rrf_k: 60,
            fusion_minmax_eps: 1e-9,
            fusion_percentile_clip_enabled: false,
            fusion_percentile_clip_lo: 0.0,
            fusion_percentile_clip_hi: 1.0,

            rerank_pool_size: 100,
            rerank_clip_weight: 0.3,
            rerank_min_score_range: 0.05,

            enable_display_score_calibration: true,
            display_score_method: CalibrationMethod::ExpSquash,
            display_score_max_cap: 0.97,
            display_score_alpha: 3.0,
            display_score_pctl: 0.90,
            enable_lookup_soft_gating: true,
            lookup_lexical_min_hits: 1,
            enable_lookup_absolute_display_score: true,
            lookup_abs_sim_floor: 0.20,
            lookup_abs_sim_ceil: 0.55,
            lookup_best_guess_max_cap: 0.65,

            weight_transcript: 0.4,
            weight_visual: 0.3,
            weight_summary: 0.1,
            weight_lexical: 0.2,
            max_visual_weight: 0.8,
            min_lexical_weight: 0.05,
        }
    }
}

impl SearchConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(v) = std::env::var("SEARCH_FUSION_METHOD") {
            config.fusion_method = match v.to_lowercase().as_str() {
                "rrf" => FusionMethod::Rrf,
                _ => FusionMethod::MinmaxMean,
            };
        }
        if let Ok(v) = std::env::var("SEARCH_RRF_K") {
            if let Ok(parsed) = v.parse() {
                config.rrf_k = parsed;
            }
        }
        if let Ok(v) = std::env::var("SEARCH_DISPLAY_SCORE_METHOD") {
            config.display_score_method = match v.to_lowercase().as_str() {
                "pctl_ceiling" => CalibrationMethod::PctlCeiling,
                _ => CalibrationMethod::ExpSquash,
            };
        }
        if let Ok(v) = std::env::var("SEARCH_DISPLAY_SCORE_MAX_CAP") {
            if let Ok(parsed) = v.parse() {
                config.display_score_max_cap = parsed;
            }
        }
        if let Ok(v) = std::env::var("SEARCH_MAX_VISUAL_WEIGHT") {
            if let Ok(parsed) = v.parse() {
                config.max_visual_weight = parsed;
            }
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_literals_match_the_documented_defaults() {
        let config = SearchConfig::default();
        assert_eq!(config.rrf_k, 60);
        assert_eq!(config.display_score_alpha, 3.0);
        assert_eq!(config.rerank_min_score_range, 0.05);
        assert!(config.display_score_max_cap < 1.0);
    }
}
