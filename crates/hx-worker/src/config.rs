//! Worker and Sidecar Builder configuration (§4.6, §4.13, §6).
//!
//! Shaped like `vclip-worker/src/config.rs`'s `WorkerConfig`: a flat struct
//! with `Default` plus `from_env()`, every field independently overridable.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Job-layer concurrency (§5 "Job layer: worker concurrency is capped
    /// by the broker's prefetch setting").
    pub max_concurrent_jobs: usize,
    /// Per-scene fan-out bound within one ingest job (§4.6, §5).
    pub max_scene_workers: usize,
    /// Global cap on in-flight external API calls across all scenes of one
    /// job (§4.13 "Scheduling model").
    pub max_api_concurrency: usize,

    /// Hard per-kind time limits (§4.13 "Time limit"): ingest >> export >>
    /// person_photo.
    pub ingest_time_limit: Duration,
    pub export_time_limit: Duration,
    pub person_photo_time_limit: Duration,

    pub shutdown_timeout: Duration,
    pub work_dir: String,

    /// How often the executor scans for orphaned pending jobs, and how
    /// idle a pending job must be before it's eligible for reclaim.
    pub claim_interval: Duration,
    pub claim_min_idle: Duration,

    /// Exponential backoff bounds for transient job-level retries (§4.13).
    pub min_backoff: Duration,
    pub max_backoff: Duration,

    // --- C1/C2 keyframe policy ---
    pub max_keyframes_per_scene: u32,
    pub visual_brightness_threshold: f64,
    pub visual_blur_threshold: f64,

    // --- C6 visual-analysis policy around C3 ---
    pub visual_semantics_enabled: bool,
    pub visual_semantics_min_duration_s: f64,
    pub visual_semantics_transcript_threshold: usize,
    pub visual_semantics_force_on_no_transcript: bool,
    pub visual_semantics_max_frame_retries: u32,

    // --- transcription quality gate ---
    pub transcription_min_chars_for_speech: usize,
    pub transcription_min_speech_char_ratio: f64,
    pub transcription_max_no_speech_prob: f64,
    pub transcription_min_speech_segments_ratio: f64,
    pub transcription_music_markers: Vec<String>,
    pub transcription_banned_phrases: Vec<String>,

    // --- C4 alignment ---
    pub transcript_min_char_floor: usize,
    pub transcript_context_pad_s: f64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 2,
            max_scene_workers: 4,
            max_api_concurrency: 6,

            ingest_time_limit: Duration::from_secs(3600),
            export_time_limit: Duration::from_secs(600),
            person_photo_time_limit: Duration::from_secs(60),

            shutdown_timeout: Duration::from_secs(30),
            work_dir: "/tmp/hx-worker".to_string(),

            claim_interval: Duration::from_secs(60),
            claim_min_idle: Duration::from_secs(1_800),

            min_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),

            max_keyframes_per_scene: 5,
            visual_brightness_threshold: 15.0,
            visual_blur_threshold: 8.0,

            visual_semantics_enabled: true,
            visual_semantics_min_duration_s: 4.0,
            visual_semantics_transcript_threshold: 40,
            visual_semantics_force_on_no_transcript: true,
            visual_semantics_max_frame_retries: 2,

            transcription_min_chars_for_speech: 20,
            transcription_min_speech_char_ratio: 0.3,
            transcription_max_no_speech_prob: 0.6,
            transcription_min_speech_segments_ratio: 0.5,
            transcription_music_markers: vec![
                "[music]".to_string(),
                "[music playing]".to_string(),
                "♪".to_string(),
            ],
            transcription_banned_phrases: vec![
                "thanks for watching".to_string(),
                "subscribe to my channel".to_string(),
            ],

            transcript_min_char_floor: 10,
            transcript_context_pad_s: 1.5,
        }
    }
}

impl WorkerConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(v) = std::env::var("WORKER_MAX_JOBS") {
            if let Ok(parsed) = v.parse() {
                config.max_concurrent_jobs = parsed;
            }
        }
        if let Ok(v) = std::env::var("WORKER_MAX_SCENE_WORKERS") {
            if let Ok(parsed) = v.parse() {
                config.max_scene_workers = parsed;
            }
        }
        if let Ok(v) = std::env::var("WORKER_MAX_API_CONCURRENCY") {
            if let Ok(parsed) = v.parse() {
                config.max_api_concurrency = parsed;
            }
        }
        if let Ok(v) = std::env::var("WORKER_INGEST_TIME_LIMIT_SECS") {
            if let Ok(parsed) = v.parse() {
                config.ingest_time_limit = Duration::from_secs(parsed);
            }
        }
        if let Ok(v) = std::env::var("WORKER_WORK_DIR") {
            config.work_dir = v;
        }
        if let Ok(v) = std::env::var("WORKER_CLAIM_INTERVAL_SECS") {
            if let Ok(parsed) = v.parse() {
                config.claim_interval = Duration::from_secs(parsed);
            }
        }
        if let Ok(v) = std::env::var("WORKER_CLAIM_MIN_IDLE_SECS") {
            if let Ok(parsed) = v.parse() {
                config.claim_min_idle = Duration::from_secs(parsed);
            }
        }
        if let Ok(v) = std::env::var("TRANSCRIPTION_MIN_CHARS_FOR_SPEECH") {
            if let Ok(parsed) = v.parse() {
                config.transcription_min_chars_for_speech = parsed;
            }
        }
        config
    }

    pub fn time_limit_for(&self, kind: hx_queue::JobKind) -> Duration {
        match kind {
            hx_queue::JobKind::Ingest | hx_queue::JobKind::Reprocess => self.ingest_time_limit,
            hx_queue::JobKind::Export => self.export_time_limit,
            hx_queue::JobKind::PersonPhoto => self.person_photo_time_limit,
        }
    }
}
