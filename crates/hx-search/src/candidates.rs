//! Candidate Fetchers (C8, §4.8).
//!
//! Fetches each enabled channel's candidate list concurrently, each bounded
//! by its own timeout so one slow channel can't stall the whole query — the
//! same "fan out, bound each leg independently" shape the ml-client retry
//! helper uses for a single call, generalized here across channels.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use hx_index::{LexicalStore, VectorStore};
use hx_models::{Channel, SceneId, TenantId, VideoId};

use crate::config::SearchConfig;
use crate::fusion::ChannelCandidates;

/// Per-channel query inputs resolved by the Query Planner before fetching.
pub struct ChannelQuery<'a> {
    pub channel: Channel,
    pub query_vec: Option<&'a [f32]>,
    pub top_k: usize,
    pub threshold: f64,
}

pub async fn fetch_dense_channels(
    vector_store: Arc<dyn VectorStore>,
    queries: Vec<(Channel, Vec<f32>, usize, f64)>,
    tenant_id: &TenantId,
    video_id: Option<&VideoId>,
    config: &SearchConfig,
) -> HashMap<Channel, ChannelCandidates> {
    let timeout = Duration::from_secs(config.multi_dense_timeout_s);
    let tasks = queries.into_iter().map(|(channel, vec, top_k, threshold)| {
        let store = Arc::clone(&vector_store);
        let tenant_id = tenant_id.clone();
        let video_id = video_id.cloned();
        async move {
            let fut = store.nearest(channel, &vec, &tenant_id, top_k, threshold, video_id.as_ref());
            match tokio::time::timeout(timeout, fut).await {
                Ok(Ok(hits)) => Some((channel, hits)),
                Ok(Err(e)) => {
                    warn!(?channel, error = %e, "dense channel fetch failed");
                    None
                }
                Err(_) => {
                    warn!(?channel, timeout_s = config.multi_dense_timeout_s, "dense channel fetch timed out");
                    None
                }
            }
        }
    });

    futures::future::join_all(tasks)
        .await
        .into_iter()
        .flatten()
        .collect()
}

pub async fn fetch_lexical_channel(
    lexical_store: Arc<dyn LexicalStore>,
    tenant_id: &TenantId,
    query: &str,
    lang: &str,
    top_k: usize,
    video_id: Option<&VideoId>,
    config: &SearchConfig,
) -> Option<ChannelCandidates> {
    let timeout = Duration::from_secs(config.multi_dense_timeout_s);
    let fut = lexical_store.search(tenant_id, query, lang, top_k, video_id);
    match tokio::time::timeout(timeout, fut).await {
        Ok(Ok(hits)) => Some(
            hits.into_iter()
                .map(|(scene_id, score, rank)| (scene_id, rank, score))
                .collect(),
        ),
        Ok(Err(e)) => {
            warn!(error = %e, "lexical channel fetch failed");
            None
        }
        Err(_) => {
            warn!("lexical channel fetch timed out");
            None
        }
    }
}

pub fn lexical_hit_ids(candidates: &ChannelCandidates) -> std::collections::HashSet<SceneId> {
    candidates.iter().map(|(id, _, _)| id.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lexical_hit_ids_collects_scene_ids() {
        let candidates: ChannelCandidates =
            vec![(SceneId::from_string("a"), 1, 10.0), (SceneId::from_string("b"), 2, 5.0)];
        let ids = lexical_hit_ids(&candidates);
        assert!(ids.contains(&SceneId::from_string("a")));
        assert!(ids.contains(&SceneId::from_string("b")));
    }
}
