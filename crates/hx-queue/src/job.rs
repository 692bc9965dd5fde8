//! Job payload carried on the ingestion queue (C13, §4.13).

use hx_models::{TenantId, VideoId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// First-time ingestion of a newly uploaded video.
    Ingest,
    /// Re-run of the sidecar pipeline; clears transcript and scenes first.
    Reprocess,
    /// Bulk export of a tenant's indexed scenes (out of the Sidecar Builder
    /// path, but shares the broker and dedup machinery).
    Export,
    /// Re-embed a person's reference photo into the query-embedding space.
    PersonPhoto,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Ingest => "ingest",
            JobKind::Reprocess => "reprocess",
            JobKind::Export => "export",
            JobKind::PersonPhoto => "person_photo",
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// `{ tenant_id, video_id, kind, transcript_language? }` (§4.13/§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestJob {
    pub job_id: Uuid,
    pub tenant_id: TenantId,
    pub video_id: VideoId,
    pub kind: JobKind,
    pub transcript_language: Option<String>,
}

impl IngestJob {
    pub fn new(tenant_id: TenantId, video_id: VideoId, kind: JobKind) -> Self {
        Self {
            job_id: Uuid::new_v4(),
            tenant_id,
            video_id,
            kind,
            transcript_language: None,
        }
    }

    pub fn with_transcript_language(mut self, lang: impl Into<String>) -> Self {
        self.transcript_language = Some(lang.into());
        self
    }

    /// Fingerprint used for at-most-once-per-fingerprint dedup (§4.13): one
    /// video can have at most one job of a given kind in flight at a time.
    pub fn idempotency_key(&self) -> String {
        format!("{}:{}:{}", self.kind, self.tenant_id, self.video_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idempotency_key_is_scoped_by_kind_tenant_and_video() {
        let tenant = TenantId::new();
        let video = VideoId::new();
        let ingest = IngestJob::new(tenant.clone(), video.clone(), JobKind::Ingest);
        let reprocess = IngestJob::new(tenant, video, JobKind::Reprocess);
        assert_ne!(ingest.idempotency_key(), reprocess.idempotency_key());
    }

    #[test]
    fn kind_round_trips_through_json() {
        let json = serde_json::to_string(&JobKind::PersonPhoto).unwrap();
        assert_eq!(json, "\"person_photo\"");
        let back: JobKind = serde_json::from_str(&json).unwrap();
        assert_eq!(back, JobKind::PersonPhoto);
    }
}
