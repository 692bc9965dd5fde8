//! Search entry point (C7-C12 composed, §6).
//!
//! `search()` is the single contract callers go through: Query Planner,
//! Weight Resolver, Candidate Fetchers, Fusion Engine, Reranker, and Gating
//! & Calibration run in that fixed order, and the response carries the
//! debug trace (applied weights, their source, any channel dropped for lack
//! of candidates, whether guardrails clamped anything) alongside the ranked
//! results.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use hx_index::{LexicalStore, VectorStore};
use hx_ml_client::{ImageEmbedder, TextEmbedder};
use hx_models::{
    Channel, FusedCandidate, MatchQuality, PersonId, PersonPrefix, QueryIntent, QueryPlan,
    SceneId, TenantId, UserChannelWeights, VideoId, VisualMode,
};

use crate::calibration::{
    apply_lookup_soft_gating, build_raw_dense_by_id, calibrate_display_scores,
    compute_best_guess_display_scores,
};
use crate::candidates::{fetch_dense_channels, fetch_lexical_channel, lexical_hit_ids};
use crate::config::SearchConfig;
use crate::error::DomainResult;
use crate::fusion::fuse;
use crate::query_plan::{classify_intent, detect_language, parse_person_prefix, PersonCandidate};
use crate::rerank::rerank_with_clip;
use crate::visual_intent::analyze as analyze_visual_intent;
use crate::weights::{redistribute_weights, resolve_weights, WeightSource};

/// A tenant's known persons in owned form, since a request crosses an
/// `.await` boundary and can't borrow from the caller's store.
#[derive(Debug, Clone)]
pub struct KnownPerson {
    pub id: PersonId,
    pub display_name: String,
    pub query_embedding: Option<Vec<f32>>,
}

pub struct SearchRequest<'a> {
    pub tenant_id: TenantId,
    pub video_id: Option<VideoId>,
    pub query: String,
    pub limit: usize,
    pub request_weights: Option<UserChannelWeights>,
    pub saved_weights: Option<UserChannelWeights>,
    pub use_saved_preferences: bool,
    /// Caller-forced visual mode; when absent, the Query Planner's own
    /// visual-intent routing picks it.
    pub visual_mode_override: Option<VisualMode>,
    pub known_persons: &'a [KnownPerson],
}

/// Debug trace surfaced alongside the ranked results (§6).
#[derive(Debug, Clone)]
pub struct SearchDebug {
    pub weights_applied: HashMap<Channel, f64>,
    pub weights_source: WeightSource,
    pub channels_disabled: Vec<Channel>,
    pub clamped: bool,
    pub warnings: Vec<String>,
    pub clip_rerank_skipped: bool,
    pub clip_rerank_skip_reason: Option<String>,
}

pub struct SearchResponse {
    pub results: Vec<FusedCandidate>,
    pub plan: QueryPlan,
    pub debug: SearchDebug,
}

#[allow(clippy::too_many_arguments)]
pub async fn search(
    request: SearchRequest<'_>,
    vector_store: Arc<dyn VectorStore>,
    lexical_store: Arc<dyn LexicalStore>,
    text_embedder: Arc<dyn TextEmbedder>,
    image_embedder: Arc<dyn ImageEmbedder>,
    default_weights: &UserChannelWeights,
    config: &SearchConfig,
) -> DomainResult<SearchResponse> {
    // C7: Query Planner — person prefix, then language/intent/visual-intent
    // on whatever text remains after the prefix is stripped.
    let person_candidates: Vec<PersonCandidate<'_>> = request
        .known_persons
        .iter()
        .map(|p| PersonCandidate {
            id: &p.id,
            display_name: &p.display_name,
            query_embedding: p.query_embedding.as_deref(),
        })
        .collect();
    let person_prefix: Option<PersonPrefix> = parse_person_prefix(&request.query, &person_candidates);
    let query_text = match &person_prefix {
        Some(prefix) if !prefix.rest.is_empty() => prefix.rest.clone(),
        Some(_) => request.query.clone(),
        None => request.query.clone(),
    };
    let language = detect_language(&query_text);
    let intent = classify_intent(&query_text);
    let visual_intent = analyze_visual_intent(&query_text);
    let visual_mode = request
        .visual_mode_override
        .unwrap_or(visual_intent.suggested_mode);

    // C12: Weight Resolver, seeded from defaults nudged by the visual-intent
    // weight adjustment before the 3-tier precedence and guardrails run.
    let mut seeded_defaults = default_weights.clone();
    if visual_intent.weight_adjustment != 0.0 {
        if let Some(visual) = seeded_defaults.get_mut("visual") {
            *visual = (*visual + visual_intent.weight_adjustment).max(0.0);
        }
    }

    let resolution = resolve_weights(
        request.request_weights.as_ref(),
        request.saved_weights.as_ref(),
        &seeded_defaults,
        request.use_saved_preferences,
        Some(visual_mode),
        true,
        config.max_visual_weight,
        config.min_lexical_weight,
    )?;

    // C8: Candidate Fetchers.
    let query_vec = text_embedder.embed(&query_text, None).await.ok();

    let mut dense_queries = Vec::new();
    if let Some(vec) = &query_vec {
        for (channel, top_k, threshold) in [
            (Channel::Transcript, config.candidate_k_transcript, config.threshold_transcript),
            (Channel::Visual, config.candidate_k_visual, config.threshold_visual),
            (Channel::Summary, config.candidate_k_summary, config.threshold_summary),
        ] {
            if resolution.weights_applied.get(&channel).copied().unwrap_or(0.0) > 0.0 {
                dense_queries.push((channel, vec.clone(), top_k, threshold));
            }
        }
    }
    if let Some(prefix) = &person_prefix {
        if let Some(person_vec) = &prefix.query_embedding {
            dense_queries.push((
                Channel::Visual,
                person_vec.clone(),
                config.candidate_k_person,
                config.threshold_visual,
            ));
        }
    }

    let mut channel_candidates = fetch_dense_channels(
        Arc::clone(&vector_store),
        dense_queries,
        &request.tenant_id,
        request.video_id.as_ref(),
        config,
    )
    .await;

    let lexical_weight = resolution.weights_applied.get(&Channel::Lexical).copied().unwrap_or(0.0);
    if lexical_weight > 0.0 {
        if let Some(lexical_candidates) = fetch_lexical_channel(
            Arc::clone(&lexical_store),
            &request.tenant_id,
            &query_text,
            language.as_str(),
            config.candidate_k_lexical,
            request.video_id.as_ref(),
            config,
        )
        .await
        {
            channel_candidates.insert(Channel::Lexical, lexical_candidates);
        }
    }

    // A channel the resolver weighted but that came back with nothing (no
    // data, timeout, error) is disabled and its weight redistributed rather
    // than silently treated as a zero contribution in the fixed-denominator
    // fusion sum.
    let disabled_channels: Vec<Channel> = resolution
        .weights_applied
        .keys()
        .filter(|c| !channel_candidates.contains_key(c))
        .copied()
        .collect();
    let weights_for_fusion = if disabled_channels.is_empty() {
        resolution.weights_applied.clone()
    } else {
        redistribute_weights(&resolution.weights_applied, &disabled_channels)
            .unwrap_or_else(|_| resolution.weights_applied.clone())
    };

    // C9: Fusion Engine.
    let mut fused = fuse(config.fusion_method, &channel_candidates, &weights_for_fusion, config);

    // C10: Reranker — only spends a CLIP call when visual intent asked for
    // a rerank pass, and only over the top pool rather than every candidate.
    let (mut clip_rerank_skipped, mut clip_rerank_skip_reason) = (true, None);
    if fused.is_empty() {
        clip_rerank_skip_reason = Some("no base candidates to rerank".to_string());
    } else if visual_mode != VisualMode::Rerank {
        clip_rerank_skip_reason = Some("visual_mode != rerank".to_string());
    } else {
        let pool: Vec<FusedCandidate> = std::mem::take(&mut fused)
            .into_iter()
            .take(config.rerank_pool_size)
            .collect();
        let scene_ids: Vec<SceneId> = pool.iter().map(|c| c.scene_id.clone()).collect();
        match image_embedder.embed_text_for_image_space(&query_text).await {
            Ok(clip_query_vec) => {
                let clip_scores = vector_store
                    .batch_score(Channel::ClipImage, &clip_query_vec, &scene_ids, &request.tenant_id)
                    .await
                    .unwrap_or_default();
                let outcome = rerank_with_clip(pool, &clip_scores, config);
                clip_rerank_skipped = outcome.clip_skipped;
                clip_rerank_skip_reason = outcome.skip_reason;
                fused = outcome.reranked;
            }
            Err(e) => {
                clip_rerank_skip_reason = Some(format!("CLIP text embedding failed: {e}"));
                fused = pool;
            }
        }
    }

    // C11: Gating & Calibration.
    let lexical_hits: HashSet<SceneId> = channel_candidates
        .get(&Channel::Lexical)
        .map(lexical_hit_ids)
        .unwrap_or_default();
    if intent == QueryIntent::Lookup {
        fused = apply_lookup_soft_gating(fused, &lexical_hits, config);
    }

    fused.truncate(request.limit.max(1));

    if config.enable_display_score_calibration {
        let use_best_guess = intent == QueryIntent::Lookup
            && config.enable_lookup_absolute_display_score
            && lexical_hits.is_empty();

        if use_best_guess {
            let raw_dense_by_id = build_raw_dense_by_id(&channel_candidates);
            let display_scores = compute_best_guess_display_scores(
                &fused,
                &raw_dense_by_id,
                config.lookup_abs_sim_floor,
                config.lookup_abs_sim_ceil,
                config.lookup_best_guess_max_cap,
            );
            for candidate in &mut fused {
                candidate.display_score = display_scores.get(&candidate.scene_id).copied();
                candidate.match_quality = Some(MatchQuality::BestGuess);
            }
        } else {
            let scores: Vec<f64> = fused.iter().map(|c| c.score).collect();
            let display_scores = calibrate_display_scores(
                &scores,
                config.display_score_method,
                config.display_score_alpha,
                config.display_score_pctl,
                config.display_score_max_cap,
            );
            for (candidate, display_score) in fused.iter_mut().zip(display_scores) {
                candidate.display_score = Some(display_score);
                candidate.match_quality = Some(MatchQuality::Supported);
            }
        }
    }

    let plan = QueryPlan {
        text: query_text,
        language,
        intent,
        visual_intent: Some(visual_intent),
        resolved_weights: resolution.weights_resolved.clone(),
        fusion_method: config.fusion_method,
        visual_mode,
        person_prefix,
        tenant_id: request.tenant_id,
        video_id: request.video_id,
        limit: request.limit,
        threshold: config.threshold_transcript,
    };

    let debug = SearchDebug {
        weights_applied: weights_for_fusion,
        weights_source: resolution.source,
        channels_disabled: disabled_channels,
        clamped: resolution.weights_clamped,
        warnings: resolution.warnings,
        clip_rerank_skipped,
        clip_rerank_skip_reason,
    };

    Ok(SearchResponse { results: fused, plan, debug })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use hx_index::IndexResult;
    use hx_ml_client::MlResult;
    use hx_models::{LexicalSceneDoc, Scene};

    struct StubVectorStore {
        transcript_hits: Vec<(SceneId, u32, f64)>,
    }

    #[async_trait]
    impl VectorStore for StubVectorStore {
        async fn upsert_scene(&self, _tenant_id: &TenantId, _scene: &Scene) -> IndexResult<()> {
            Ok(())
        }

        async fn nearest(
            &self,
            channel: Channel,
            _query_vec: &[f32],
            _tenant_id: &TenantId,
            _top_k: usize,
            _threshold: f64,
            _video_id: Option<&VideoId>,
        ) -> IndexResult<Vec<(SceneId, u32, f64)>> {
            if channel == Channel::Transcript {
                Ok(self.transcript_hits.clone())
            } else {
                Ok(Vec::new())
            }
        }

        async fn batch_score(
            &self,
            _channel: Channel,
            _query_vec: &[f32],
            _scene_ids: &[SceneId],
            _tenant_id: &TenantId,
        ) -> IndexResult<HashMap<SceneId, f64>> {
            Ok(HashMap::new())
        }

        async fn delete_scenes(&self, _video_id: &VideoId) -> IndexResult<()> {
            Ok(())
        }

        async fn update_person_query_embedding(
            &self,
            _person_id: &PersonId,
            _vec: &[f32],
        ) -> IndexResult<()> {
            Ok(())
        }
    }

    struct EmptyLexicalStore;

    #[async_trait]
    impl LexicalStore for EmptyLexicalStore {
        async fn ensure_index(&self) -> IndexResult<()> {
            Ok(())
        }
        async fn upsert_doc(&self, _doc: &LexicalSceneDoc) -> IndexResult<()> {
            Ok(())
        }
        async fn bulk_upsert(&self, _docs: &[LexicalSceneDoc]) -> IndexResult<()> {
            Ok(())
        }
        async fn delete_by_video(&self, _video_id: &VideoId) -> IndexResult<()> {
            Ok(())
        }
        async fn search(
            &self,
            _tenant_id: &TenantId,
            _query: &str,
            _lang: &str,
            _size: usize,
            _video_id: Option<&VideoId>,
        ) -> IndexResult<Vec<(SceneId, f64, u32)>> {
            Ok(Vec::new())
        }
    }

    struct StubTextEmbedder;

    #[async_trait]
    impl TextEmbedder for StubTextEmbedder {
        async fn embed(&self, _text: &str, _dim_hint: Option<usize>) -> MlResult<Vec<f32>> {
            Ok(vec![0.1, 0.2, 0.3])
        }
    }

    struct StubImageEmbedder;

    #[async_trait]
    impl ImageEmbedder for StubImageEmbedder {
        async fn embed_image(&self, _path_or_url: &str) -> MlResult<Vec<f32>> {
            Ok(vec![0.0; 3])
        }
        async fn embed_text_for_image_space(&self, _text: &str) -> MlResult<Vec<f32>> {
            Ok(vec![0.0; 3])
        }
    }

    fn default_weights() -> UserChannelWeights {
        [
            ("transcript".to_string(), 0.4),
            ("visual".to_string(), 0.3),
            ("summary".to_string(), 0.1),
            ("lexical".to_string(), 0.2),
        ]
        .into_iter()
        .collect()
    }

    #[tokio::test]
    async fn search_runs_the_full_pipeline_and_fills_debug_trace() {
        let hit_scene = SceneId::from_string("scene-1");
        let vector_store = Arc::new(StubVectorStore {
            transcript_hits: vec![(hit_scene.clone(), 1, 0.9)],
        });
        let lexical_store = Arc::new(EmptyLexicalStore);
        let text_embedder = Arc::new(StubTextEmbedder);
        let image_embedder = Arc::new(StubImageEmbedder);
        let config = SearchConfig::default();
        let defaults = default_weights();

        let request = SearchRequest {
            tenant_id: TenantId::new(),
            video_id: None,
            query: "show me the part where they discuss the budget".to_string(),
            limit: 10,
            request_weights: None,
            saved_weights: None,
            use_saved_preferences: false,
            visual_mode_override: None,
            known_persons: &[],
        };

        let response = search(
            request,
            vector_store,
            lexical_store,
            text_embedder,
            image_embedder,
            &defaults,
            &config,
        )
        .await
        .unwrap();

        assert_eq!(response.results.len(), 1);
        assert_eq!(response.results[0].scene_id, hit_scene);
        assert_eq!(response.debug.weights_source, WeightSource::Default);
        assert!(response.debug.weights_applied.contains_key(&Channel::Transcript));
        assert!(response
            .debug
            .channels_disabled
            .contains(&Channel::Lexical));
        assert_eq!(response.plan.intent, QueryIntent::Semantic);
    }

    #[tokio::test]
    async fn lookup_query_with_no_lexical_hits_uses_best_guess_display_score() {
        let hit_scene = SceneId::from_string("scene-1");
        let vector_store = Arc::new(StubVectorStore {
            transcript_hits: vec![(hit_scene.clone(), 1, 0.5)],
        });
        let lexical_store = Arc::new(EmptyLexicalStore);
        let text_embedder = Arc::new(StubTextEmbedder);
        let image_embedder = Arc::new(StubImageEmbedder);
        let config = SearchConfig::default();
        let defaults = default_weights();

        let request = SearchRequest {
            tenant_id: TenantId::new(),
            video_id: None,
            query: "Yuna".to_string(),
            limit: 10,
            request_weights: None,
            saved_weights: None,
            use_saved_preferences: false,
            visual_mode_override: None,
            known_persons: &[],
        };

        let response = search(
            request,
            vector_store,
            lexical_store,
            text_embedder,
            image_embedder,
            &defaults,
            &config,
        )
        .await
        .unwrap();

        assert_eq!(response.plan.intent, QueryIntent::Lookup);
        assert_eq!(
            response.results[0].match_quality,
            Some(MatchQuality::BestGuess)
        );
    }
}
