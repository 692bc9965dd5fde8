//! Vector-similarity store adapter, talking to a Postgres+pgvector service
//! through its REST/RPC facade.
//!
//! Grounded on `vclip-firestore/src/client.rs`'s REST-client-with-retry
//! idiom (bearer auth, `with_retry`, JSON request/response), retargeted at
//! the RPC-style similarity-search endpoints the original implementation
//! calls per channel (`search_scenes_by_{channel}_embedding`). Per §9's
//! design note on string-typed embedding serialization, the query vector is
//! carried as a typed `&[f32]` all the way to this module and only turned
//! into a JSON number array at the actual HTTP call site — never a
//! bracketed string literal threaded through the domain layer.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use hx_models::{Channel, PersonId, Scene, SceneId, TenantId, VideoId};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::contracts::VectorStore;
use crate::error::{IndexError, IndexResult};

#[derive(Debug, Clone)]
pub struct VectorStoreConfig {
    pub base_url: String,
    pub api_key: String,
    pub timeout: Duration,
    pub max_retries: u32,
}

impl VectorStoreConfig {
    pub fn from_env() -> IndexResult<Self> {
        Ok(Self {
            base_url: std::env::var("VECTOR_STORE_URL")
                .map_err(|_| IndexError::config_error("VECTOR_STORE_URL not set"))?,
            api_key: std::env::var("VECTOR_STORE_API_KEY")
                .map_err(|_| IndexError::config_error("VECTOR_STORE_API_KEY not set"))?,
            timeout: Duration::from_secs(
                std::env::var("VECTOR_STORE_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(15),
            ),
            max_retries: std::env::var("VECTOR_STORE_MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(3),
        })
    }
}

#[derive(Clone)]
pub struct RestVectorStore {
    http: reqwest::Client,
    config: VectorStoreConfig,
}

fn rpc_fn_for_channel(channel: Channel) -> IndexResult<&'static str> {
    match channel {
        Channel::Transcript => Ok("search_scenes_by_transcript_embedding"),
        Channel::Visual => Ok("search_scenes_by_visual_embedding"),
        Channel::Summary => Ok("search_scenes_by_summary_embedding"),
        Channel::ClipImage => Ok("search_scenes_by_clip_embedding"),
        Channel::Lexical => Err(IndexError::Contract(
            "lexical channel is not a vector channel".to_string(),
        )),
    }
}

#[derive(Debug, Deserialize)]
struct NearestRow {
    scene_id: String,
    similarity: f64,
}

impl RestVectorStore {
    pub fn new(config: VectorStoreConfig) -> IndexResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(IndexError::Network)?;
        Ok(Self { http, config })
    }

    pub fn from_env() -> IndexResult<Self> {
        Self::new(VectorStoreConfig::from_env()?)
    }

    async fn with_retry<T, F, Fut>(&self, operation: &str, mut f: F) -> IndexResult<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = IndexResult<T>>,
    {
        let mut attempt = 0;
        loop {
            match f().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    attempt += 1;
                    let delay = Duration::from_millis(200 * 2u64.pow(attempt));
                    warn!(operation, attempt, ?delay, error = %e, "retrying vector store call");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn rpc_url(&self, function: &str) -> String {
        format!("{}/rest/v1/rpc/{}", self.config.base_url, function)
    }
}

#[async_trait]
impl VectorStore for RestVectorStore {
    async fn upsert_scene(&self, tenant_id: &TenantId, scene: &Scene) -> IndexResult<()> {
        debug!(scene_id = %scene.id, "upserting scene row");
        let body = json!({
            "scene_id": scene.id.as_str(),
            "tenant_id": tenant_id.as_str(),
            "video_id": scene.video_id.as_str(),
            "index": scene.index,
            "start_s": scene.start_s,
            "end_s": scene.end_s,
            "transcript_embedding": scene.embeddings.transcript,
            "visual_embedding": scene.embeddings.visual_text,
            "summary_embedding": scene.embeddings.summary,
            "clip_embedding": scene.embeddings.clip_image,
            "embedding_version": scene.embedding_version,
        });
        self.with_retry("upsert_scene", || async {
            let resp = self
                .http
                .post(self.rpc_url("upsert_scene"))
                .bearer_auth(&self.config.api_key)
                .json(&body)
                .send()
                .await?;
            if !resp.status().is_success() {
                return Err(IndexError::RequestFailed(format!(
                    "upsert_scene: {}",
                    resp.status()
                )));
            }
            Ok(())
        })
        .await
    }

    async fn nearest(
        &self,
        channel: Channel,
        query_vec: &[f32],
        tenant_id: &TenantId,
        top_k: usize,
        threshold: f64,
        video_id: Option<&VideoId>,
    ) -> IndexResult<Vec<(SceneId, u32, f64)>> {
        let function = rpc_fn_for_channel(channel)?;
        let body = json!({
            "query_embedding": query_vec,
            "tenant_id": tenant_id.as_str(),
            "match_count": top_k,
            "match_threshold": threshold,
            "video_id": video_id.map(|v| v.as_str()),
        });
        self.with_retry("nearest", || async {
            let resp = self
                .http
                .post(self.rpc_url(function))
                .bearer_auth(&self.config.api_key)
                .json(&body)
                .send()
                .await?;
            if !resp.status().is_success() {
                return Err(IndexError::RequestFailed(format!(
                    "{function}: {}",
                    resp.status()
                )));
            }
            let rows: Vec<NearestRow> = resp.json().await?;
            let mut out = Vec::with_capacity(rows.len());
            for (i, row) in rows.into_iter().enumerate() {
                out.push((SceneId::from_string(row.scene_id), (i + 1) as u32, row.similarity));
            }
            Ok(out)
        })
        .await
    }

    async fn batch_score(
        &self,
        channel: Channel,
        query_vec: &[f32],
        scene_ids: &[SceneId],
        tenant_id: &TenantId,
    ) -> IndexResult<HashMap<SceneId, f64>> {
        if scene_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let function = rpc_fn_for_channel(channel)?;
        let body = json!({
            "query_embedding": query_vec,
            "tenant_id": tenant_id.as_str(),
            "scene_ids": scene_ids.iter().map(|s| s.as_str()).collect::<Vec<_>>(),
        });
        self.with_retry("batch_score", || async {
            let resp = self
                .http
                .post(self.rpc_url(function))
                .bearer_auth(&self.config.api_key)
                .json(&body)
                .send()
                .await?;
            if !resp.status().is_success() {
                return Err(IndexError::RequestFailed(format!(
                    "batch_score {function}: {}",
                    resp.status()
                )));
            }
            let rows: Vec<NearestRow> = resp.json().await?;
            Ok(rows
                .into_iter()
                .map(|r| (SceneId::from_string(r.scene_id), r.similarity))
                .collect())
        })
        .await
    }

    async fn delete_scenes(&self, video_id: &VideoId) -> IndexResult<()> {
        self.with_retry("delete_scenes", || async {
            let resp = self
                .http
                .post(self.rpc_url("delete_scenes_by_video"))
                .bearer_auth(&self.config.api_key)
                .json(&json!({ "video_id": video_id.as_str() }))
                .send()
                .await?;
            if !resp.status().is_success() && resp.status().as_u16() != 404 {
                return Err(IndexError::RequestFailed(format!(
                    "delete_scenes: {}",
                    resp.status()
                )));
            }
            Ok(())
        })
        .await
    }

    async fn update_person_query_embedding(
        &self,
        person_id: &PersonId,
        vec: &[f32],
    ) -> IndexResult<()> {
        self.with_retry("update_person_query_embedding", || async {
            let resp = self
                .http
                .post(self.rpc_url("update_person_query_embedding"))
                .bearer_auth(&self.config.api_key)
                .json(&json!({ "person_id": person_id.as_str(), "query_embedding": vec }))
                .send()
                .await?;
            if !resp.status().is_success() {
                return Err(IndexError::RequestFailed(format!(
                    "update_person_query_embedding: {}",
                    resp.status()
                )));
            }
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn store_against(server: &MockServer) -> RestVectorStore {
        RestVectorStore::new(VectorStoreConfig {
            base_url: server.uri(),
            api_key: "test-key".to_string(),
            timeout: Duration::from_secs(5),
            max_retries: 1,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn nearest_parses_rows_into_ranked_candidates() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/rpc/search_scenes_by_transcript_embedding"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"scene_id": "scene-1", "similarity": 0.91},
                {"scene_id": "scene-2", "similarity": 0.4},
            ])))
            .mount(&server)
            .await;

        let store = store_against(&server);
        let tenant_id = TenantId::from_string("tenant-1");
        let rows = store
            .nearest(Channel::Transcript, &[0.1, 0.2, 0.3], &tenant_id, 10, 0.0, None)
            .await
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], (SceneId::from_string("scene-1"), 1, 0.91));
        assert_eq!(rows[1], (SceneId::from_string("scene-2"), 2, 0.4));
    }

    #[tokio::test]
    async fn upsert_scene_posts_scene_row_and_succeeds_on_200() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/rpc/upsert_scene"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let store = store_against(&server);
        let tenant_id = TenantId::from_string("tenant-1");
        let scene = Scene::new(VideoId::from_string("video-1"), 0, 0.0, 4.0);
        store.upsert_scene(&tenant_id, &scene).await.unwrap();
    }

    #[tokio::test]
    async fn nearest_retries_once_on_server_error_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/rpc/search_scenes_by_visual_embedding"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/rpc/search_scenes_by_visual_embedding"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .mount(&server)
            .await;

        let store = store_against(&server);
        let tenant_id = TenantId::from_string("tenant-1");
        let rows = store
            .nearest(Channel::Visual, &[0.1], &tenant_id, 5, 0.0, None)
            .await
            .unwrap();

        assert!(rows.is_empty());
    }

    #[test]
    fn rpc_function_names_match_channel() {
        assert_eq!(
            rpc_fn_for_channel(Channel::Transcript).unwrap(),
            "search_scenes_by_transcript_embedding"
        );
        assert_eq!(
            rpc_fn_for_channel(Channel::ClipImage).unwrap(),
            "search_scenes_by_clip_embedding"
        );
        assert!(rpc_fn_for_channel(Channel::Lexical).is_err());
    }

    #[test]
    fn rpc_url_is_built_under_rest_v1_rpc() {
        let store = RestVectorStore {
            http: reqwest::Client::new(),
            config: VectorStoreConfig {
                base_url: "https://example.supabase.co".to_string(),
                api_key: "key".to_string(),
                timeout: Duration::from_secs(1),
                max_retries: 0,
            },
        };
        assert_eq!(
            store.rpc_url("search_scenes_by_visual_embedding"),
            "https://example.supabase.co/rest/v1/rpc/search_scenes_by_visual_embedding"
        );
    }
}
