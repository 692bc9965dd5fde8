//! Named contracts for the Index Adapter Layer (C14, §4.14).
//!
//! Concrete drivers live in this crate (`ObjectStore`, `VectorStore`,
//! `LexicalStore`) or in `hx-ml-client` (`Transcriber`, `VisualAnalyzer`,
//! `TextEmbedder`, `ImageEmbedder`). Every trait here is `#[async_trait]`
//! specifically so the Sidecar Builder and Candidate Fetchers can mock them
//! in tests (§10.4).

use std::time::Duration;

use async_trait::async_trait;
use hx_models::{Channel, LexicalSceneDoc, PersonId, Scene, SceneId, TenantId, Video, VideoId};

use crate::error::IndexResult;

/// Relational store for the Video row itself (status, probe metadata, full
/// transcript). Not one of C14's named contracts, but the Sidecar Builder
/// needs somewhere to read and write it; shaped the same way as the other
/// stores here so it drops into the same adapter layer.
#[async_trait]
pub trait VideoStore: Send + Sync {
    async fn get(&self, video_id: &VideoId) -> IndexResult<Option<Video>>;
    async fn upsert(&self, video: &Video) -> IndexResult<()>;
}

/// Blob storage for uploaded videos and derived thumbnails.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> IndexResult<()>;
    async fn get(&self, key: &str) -> IndexResult<Vec<u8>>;
    async fn signed_download_url(&self, key: &str, ttl: Duration) -> IndexResult<String>;
    async fn signed_upload_url(&self, key: &str, ttl: Duration) -> IndexResult<String>;
    async fn delete(&self, key: &str) -> IndexResult<()>;
    async fn exists(&self, key: &str) -> IndexResult<bool>;
}

/// Vector similarity search over scene embeddings, one channel at a time.
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn upsert_scene(&self, tenant_id: &TenantId, scene: &Scene) -> IndexResult<()>;

    async fn nearest(
        &self,
        channel: Channel,
        query_vec: &[f32],
        tenant_id: &TenantId,
        top_k: usize,
        threshold: f64,
        video_id: Option<&VideoId>,
    ) -> IndexResult<Vec<(SceneId, u32, f64)>>;

    async fn batch_score(
        &self,
        channel: Channel,
        query_vec: &[f32],
        scene_ids: &[SceneId],
        tenant_id: &TenantId,
    ) -> IndexResult<std::collections::HashMap<SceneId, f64>>;

    async fn delete_scenes(&self, video_id: &VideoId) -> IndexResult<()>;

    async fn update_person_query_embedding(
        &self,
        person_id: &PersonId,
        vec: &[f32],
    ) -> IndexResult<()>;
}

/// Free-text / BM25 search over the lexical mirror of scenes.
#[async_trait]
pub trait LexicalStore: Send + Sync {
    async fn ensure_index(&self) -> IndexResult<()>;
    async fn upsert_doc(&self, doc: &LexicalSceneDoc) -> IndexResult<()>;
    async fn bulk_upsert(&self, docs: &[LexicalSceneDoc]) -> IndexResult<()>;
    async fn delete_by_video(&self, video_id: &VideoId) -> IndexResult<()>;

    async fn search(
        &self,
        tenant_id: &TenantId,
        query: &str,
        lang: &str,
        size: usize,
        video_id: Option<&VideoId>,
    ) -> IndexResult<Vec<(SceneId, f64, u32)>>;
}
