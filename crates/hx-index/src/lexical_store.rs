//! Lexical (BM25) store adapter, talking to an OpenSearch-compatible REST
//! endpoint.
//!
//! Grounded on the same REST-client-with-retry idiom as
//! [`crate::vector_store`], adapted to OpenSearch's `_doc`/`_search`/`_bulk`
//! endpoints the way the original implementation's `opensearch_client.py`
//! does, with field boosts per §4.8 (`tags > transcript > visual
//! description > combined`).

use std::time::Duration;

use async_trait::async_trait;
use hx_models::{LexicalSceneDoc, SceneId, TenantId, VideoId};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::contracts::LexicalStore;
use crate::error::{IndexError, IndexResult};

#[derive(Debug, Clone)]
pub struct LexicalStoreConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub index_name: String,
    pub timeout: Duration,
    pub max_retries: u32,
}

impl LexicalStoreConfig {
    pub fn from_env() -> IndexResult<Self> {
        Ok(Self {
            base_url: std::env::var("LEXICAL_STORE_URL")
                .map_err(|_| IndexError::config_error("LEXICAL_STORE_URL not set"))?,
            api_key: std::env::var("LEXICAL_STORE_API_KEY").ok(),
            index_name: std::env::var("LEXICAL_STORE_INDEX")
                .unwrap_or_else(|_| "scenes".to_string()),
            timeout: Duration::from_secs(
                std::env::var("LEXICAL_STORE_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10),
            ),
            max_retries: std::env::var("LEXICAL_STORE_MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(3),
        })
    }
}

#[derive(Clone)]
pub struct OpenSearchLexicalStore {
    http: reqwest::Client,
    config: LexicalStoreConfig,
}

/// Field boosts applied to the multi-field BM25 query (§4.8).
const BOOST_TAGS: f64 = 3.0;
const BOOST_TRANSCRIPT: f64 = 2.0;
const BOOST_VISUAL_DESCRIPTION: f64 = 1.5;
const BOOST_COMBINED: f64 = 1.0;

#[derive(Deserialize)]
struct SearchResponse {
    hits: SearchHits,
}

#[derive(Deserialize)]
struct SearchHits {
    hits: Vec<SearchHit>,
}

#[derive(Deserialize)]
struct SearchHit {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_score")]
    score: f64,
}

impl OpenSearchLexicalStore {
    pub fn new(config: LexicalStoreConfig) -> IndexResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(IndexError::Network)?;
        Ok(Self { http, config })
    }

    pub fn from_env() -> IndexResult<Self> {
        Self::new(LexicalStoreConfig::from_env()?)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}", self.config.base_url, path);
        let mut req = self.http.request(method, url);
        if let Some(key) = &self.config.api_key {
            req = req.bearer_auth(key);
        }
        req
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
                    warn!(operation, attempt, ?delay, error = %e, "retrying lexical store call");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn doc_body(doc: &LexicalSceneDoc) -> Value {
        json!({
            "tenant_id": doc.tenant_id.as_str(),
            "video_id": doc.video_id.as_str(),
            "index": doc.index,
            "start_s": doc.start_s,
            "end_s": doc.end_s,
            "transcript_segment": doc.transcript_segment,
            "visual_summary": doc.visual_summary,
            "visual_description": doc.visual_description,
            "combined_text": doc.combined_text,
            "tags": doc.tags,
            "tags_text": doc.tags_text,
            "thumbnail_url": doc.thumbnail_url,
            "created_at": doc.created_at,
            "language": doc.language,
        })
    }
}

#[async_trait]
impl LexicalStore for OpenSearchLexicalStore {
    async fn ensure_index(&self) -> IndexResult<()> {
        let resp = self
            .request(reqwest::Method::HEAD, &self.config.index_name.clone())
            .send()
            .await?;
        if resp.status().as_u16() == 404 {
            let create = self
                .request(reqwest::Method::PUT, &self.config.index_name.clone())
                .send()
                .await?;
            if !create.status().is_success() {
                return Err(IndexError::RequestFailed(format!(
                    "ensure_index create: {}",
                    create.status()
                )));
            }
        }
        Ok(())
    }

    async fn upsert_doc(&self, doc: &LexicalSceneDoc) -> IndexResult<()> {
        debug!(scene_id = %doc.scene_id, "upserting lexical doc");
        let path = format!("{}/_doc/{}", self.config.index_name, doc.scene_id.as_str());
        let body = Self::doc_body(doc);
        self.with_retry("upsert_doc", || async {
            let resp = self
                .request(reqwest::Method::PUT, &path)
                .json(&body)
                .send()
                .await?;
            if !resp.status().is_success() {
                return Err(IndexError::RequestFailed(format!(
                    "upsert_doc: {}",
                    resp.status()
                )));
            }
            Ok(())
        })
        .await
    }

    async fn bulk_upsert(&self, docs: &[LexicalSceneDoc]) -> IndexResult<()> {
        if docs.is_empty() {
            return Ok(());
        }
        let mut ndjson = String::new();
        for doc in docs {
            ndjson.push_str(
                &json!({ "index": { "_index": self.config.index_name, "_id": doc.scene_id.as_str() } })
                    .to_string(),
            );
            ndjson.push('\n');
            ndjson.push_str(&Self::doc_body(doc).to_string());
            ndjson.push('\n');
        }
        self.with_retry("bulk_upsert", || async {
            let resp = self
                .request(reqwest::Method::POST, "_bulk")
                .header("content-type", "application/x-ndjson")
                .body(ndjson.clone())
                .send()
                .await?;
            if !resp.status().is_success() {
                return Err(IndexError::RequestFailed(format!(
                    "bulk_upsert: {}",
                    resp.status()
                )));
            }
            Ok(())
        })
        .await
    }

    async fn delete_by_video(&self, video_id: &VideoId) -> IndexResult<()> {
        let path = format!("{}/_delete_by_query", self.config.index_name);
        let body = json!({ "query": { "term": { "video_id": video_id.as_str() } } });
        self.with_retry("delete_by_video", || async {
            let resp = self
                .request(reqwest::Method::POST, &path)
                .json(&body)
                .send()
                .await?;
            if !resp.status().is_success() {
                return Err(IndexError::RequestFailed(format!(
                    "delete_by_video: {}",
                    resp.status()
                )));
            }
            Ok(())
        })
        .await
    }

    async fn search(
        &self,
        tenant_id: &TenantId,
        query: &str,
        lang: &str,
        size: usize,
        video_id: Option<&VideoId>,
    ) -> IndexResult<Vec<(SceneId, f64, u32)>> {
        let fields = [
            format!("tags_text^{BOOST_TAGS}"),
            format!("transcript_segment.{lang}^{BOOST_TRANSCRIPT}"),
            format!("visual_description.{lang}^{BOOST_VISUAL_DESCRIPTION}"),
            format!("combined_text.{lang}^{BOOST_COMBINED}"),
        ];

        let mut filter = vec![json!({ "term": { "tenant_id": tenant_id.as_str() } })];
        if let Some(video_id) = video_id {
            filter.push(json!({ "term": { "video_id": video_id.as_str() } }));
        }

        let body = json!({
            "size": size,
            "query": {
                "bool": {
                    "must": [{
                        "multi_match": {
                            "query": query,
                            "fields": fields,
                        }
                    }],
                    "filter": filter,
                }
            }
        });

        let path = format!("{}/_search", self.config.index_name);
        let rows: SearchResponse = self
            .with_retry("search", || async {
                let resp = self
                    .request(reqwest::Method::POST, &path)
                    .json(&body)
                    .send()
                    .await?;
                if !resp.status().is_success() {
                    return Err(IndexError::RequestFailed(format!(
                        "search: {}",
                        resp.status()
                    )));
                }
                let parsed: SearchResponse = resp.json().await?;
                Ok(parsed)
            })
            .await?;

        Ok(rows
            .hits
            .hits
            .into_iter()
            .enumerate()
            .map(|(i, hit)| (SceneId::from_string(hit.id), hit.score, (i + 1) as u32))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hx_models::VideoId;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn field_boosts_are_ordered_tags_transcript_visual_combined() {
        assert!(BOOST_TAGS > BOOST_TRANSCRIPT);
        assert!(BOOST_TRANSCRIPT > BOOST_VISUAL_DESCRIPTION);
        assert!(BOOST_VISUAL_DESCRIPTION > BOOST_COMBINED);
    }

    fn store_against(server: &MockServer) -> OpenSearchLexicalStore {
        OpenSearchLexicalStore::new(LexicalStoreConfig {
            base_url: server.uri(),
            api_key: None,
            index_name: "scenes".to_string(),
            timeout: Duration::from_secs(5),
            max_retries: 1,
        })
        .unwrap()
    }

    fn sample_doc() -> LexicalSceneDoc {
        LexicalSceneDoc {
            scene_id: SceneId::from_string("scene-1"),
            tenant_id: TenantId::from_string("tenant-1"),
            video_id: VideoId::from_string("video-1"),
            index: 0,
            start_s: 0.0,
            end_s: 4.0,
            transcript_segment: Some("hello".to_string()),
            visual_summary: None,
            visual_description: None,
            combined_text: Some("hello".to_string()),
            tags: vec![],
            tags_text: None,
            thumbnail_url: None,
            created_at: chrono::Utc::now(),
            language: "en".to_string(),
        }
    }

    #[tokio::test]
    async fn search_parses_hits_in_rank_order() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/scenes/_search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "hits": {
                    "hits": [
                        {"_id": "scene-1", "_score": 4.2},
                        {"_id": "scene-2", "_score": 1.1},
                    ]
                }
            })))
            .mount(&server)
            .await;

        let store = store_against(&server);
        let tenant_id = TenantId::from_string("tenant-1");
        let results = store
            .search(&tenant_id, "budget meeting", "en", 10, None)
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0], (SceneId::from_string("scene-1"), 4.2, 1));
        assert_eq!(results[1], (SceneId::from_string("scene-2"), 1.1, 2));
    }

    #[tokio::test]
    async fn upsert_doc_puts_to_doc_endpoint_with_scene_id() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/scenes/_doc/scene-1"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let store = store_against(&server);
        store.upsert_doc(&sample_doc()).await.unwrap();
    }

    #[tokio::test]
    async fn search_retries_once_on_server_error_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/scenes/_search"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/scenes/_search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "hits": { "hits": [] }
            })))
            .mount(&server)
            .await;

        let store = store_against(&server);
        let tenant_id = TenantId::from_string("tenant-1");
        let results = store
            .search(&tenant_id, "budget meeting", "en", 10, None)
            .await
            .unwrap();

        assert!(results.is_empty());
    }
}
