//! Video entity and processing status (Data Model §3).

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::ids::{TenantId, VideoId};

/// Video processing status.
///
/// Transitions are `Pending -> Processing -> {Ready, Failed}`. Re-entry to
/// `Pending` only happens on explicit reprocess, and must clear the
/// transcript and scenes atomically with the status write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum VideoStatus {
    #[default]
    Pending,
    Processing,
    Ready,
    Failed,
}

impl VideoStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoStatus::Pending => "pending",
            VideoStatus::Processing => "processing",
            VideoStatus::Ready => "ready",
            VideoStatus::Failed => "failed",
        }
    }

    /// Whether `self -> next` is an allowed status transition.
    pub fn can_transition_to(&self, next: VideoStatus) -> bool {
        use VideoStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Processing, Ready)
                | (Processing, Failed)
                | (Ready, Pending) // reprocess
                | (Failed, Pending) // reprocess
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, VideoStatus::Ready | VideoStatus::Failed)
    }
}

impl std::fmt::Display for VideoStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A video uploaded by a tenant, owned end-to-end by the Sidecar Builder
/// after upload (§3, §4.6).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Video {
    pub id: VideoId,
    pub tenant_id: TenantId,
    pub storage_key: String,
    pub filename: Option<String>,
    pub duration_s: f64,
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
    pub status: VideoStatus,
    pub processing_stage: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub queued_at: Option<DateTime<Utc>>,
    pub transcript_language: Option<String>,
    pub full_transcript: Option<String>,
    /// Set when the video's transcript/visuals are rich enough that C6's
    /// cost-control skip policy is expected to engage frequently.
    pub rich_semantics_flag: bool,
}

/// Truncation length the video row's `error` field enforces (§4.13).
pub const MAX_ERROR_MESSAGE_LEN: usize = 500;

impl Video {
    pub fn new(tenant_id: TenantId, storage_key: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: VideoId::new(),
            tenant_id,
            storage_key: storage_key.into(),
            filename: None,
            duration_s: 0.0,
            width: 0,
            height: 0,
            frame_rate: 0.0,
            status: VideoStatus::Pending,
            processing_stage: None,
            error: None,
            created_at: now,
            updated_at: now,
            queued_at: None,
            transcript_language: None,
            full_transcript: None,
            rich_semantics_flag: false,
        }
    }

    /// Record a failure, truncating the message to the storage contract's
    /// 500-char cap (§4.13 "Failure surfacing").
    pub fn fail(&mut self, message: impl Into<String>) {
        let mut message = message.into();
        if message.len() > MAX_ERROR_MESSAGE_LEN {
            message.truncate(MAX_ERROR_MESSAGE_LEN);
        }
        self.status = VideoStatus::Failed;
        self.error = Some(message);
        self.updated_at = Utc::now();
    }

    pub fn mark_ready(&mut self) {
        self.status = VideoStatus::Ready;
        self.error = None;
        self.updated_at = Utc::now();
    }

    pub fn has_audio_track(&self) -> bool {
        // Probed separately at ingest time; placeholder accessor kept for
        // symmetry with the probe result consumed by the Sidecar Builder.
        self.full_transcript.is_some() || self.transcript_language.is_some()
    }
}
