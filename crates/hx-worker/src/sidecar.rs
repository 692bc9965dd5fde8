//! Sidecar Builder (C6, §4.6): orchestrates ingestion for one video end to
//! end, from a fresh download through scene detection, per-scene visual and
//! transcript analysis, multi-channel embedding, and the final write-out to
//! the object/vector/lexical stores.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use hx_index::contracts::{LexicalStore, ObjectStore, VectorStore, VideoStore};
use hx_media::{
    frame_quality::{ranked_frames, FrameQualityConfig},
    probe_video, scene_detector,
};
use hx_ml_client::contracts::{ImageEmbedder, TextEmbedder, Transcriber, VisualAnalyzer};
use hx_ml_client::contracts::{VisualAnalysisResult, VisualAnalysisStatus};
use hx_ml_client::embedder::{embed_image_channel, embed_text_channel, EmbedderConfig};
use hx_models::{Channel, LexicalSceneDoc, Scene, Video, VideoStatus};
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::quality_gate;
use crate::transcript_aligner::align_scene_transcript;

/// Language-specific metadata/filename labels for the combined-text metadata
/// segment (§4.6 step 4). Unrecognized codes fall back to Korean labels,
/// matching `sidecar_builder.py`'s `labels.get(language, labels["ko"])`.
fn metadata_filename_labels(language: &str) -> (&'static str, &'static str) {
    match language {
        "en" => ("Metadata", "Filename"),
        _ => ("메타데이터", "파일명"),
    }
}

/// Everything the Sidecar Builder needs, wired together at process startup
/// by `main.rs`. Every dependency is a trait object so the orchestration
/// logic can be exercised with fakes in tests.
pub struct SidecarContext {
    pub config: WorkerConfig,
    pub embedder_config: EmbedderConfig,
    pub object_store: Arc<dyn ObjectStore>,
    pub vector_store: Arc<dyn VectorStore>,
    pub lexical_store: Arc<dyn LexicalStore>,
    pub video_store: Arc<dyn VideoStore>,
    pub transcriber: Arc<dyn Transcriber>,
    pub visual_analyzer: Arc<dyn VisualAnalyzer>,
    pub text_embedder: Arc<dyn TextEmbedder>,
    pub image_embedder: Arc<dyn ImageEmbedder>,
    pub api_semaphore: Arc<Semaphore>,
}

/// Run the full ingestion pipeline for one video (§4.6 steps 1-7).
pub async fn run_ingest_job(ctx: &SidecarContext, job: &hx_queue::IngestJob) -> WorkerResult<()> {
    let tenant_id = &job.tenant_id;
    let video_id = &job.video_id;

    let mut video = ctx
        .video_store
        .get(video_id)
        .await?
        .ok_or_else(|| WorkerError::job_failed(format!("video {video_id} not found")))?;

    if let Some(lang) = &job.transcript_language {
        video.transcript_language = Some(lang.clone());
    }

    // Reprocess-safe idempotency: clear any scenes/lexical docs from a prior
    // run before doing anything else.
    ctx.vector_store.delete_scenes(video_id).await?;
    ctx.lexical_store.delete_by_video(video_id).await?;

    video.status = VideoStatus::Processing;
    video.queued_at = Some(chrono::Utc::now());
    ctx.video_store.upsert(&video).await?;

    match run_ingest_job_inner(ctx, tenant_id, &mut video).await {
        Ok(()) => {
            video.mark_ready();
            ctx.video_store.upsert(&video).await?;
            info!(video_id = %video_id, "ingestion completed");
            Ok(())
        }
        Err(e) => {
            // Partial scene rows from the failed run must not survive.
            ctx.vector_store.delete_scenes(video_id).await.ok();
            ctx.lexical_store.delete_by_video(video_id).await.ok();
            video.fail(e.to_string());
            ctx.video_store.upsert(&video).await.ok();
            warn!(video_id = %video_id, error = %e, "ingestion failed");
            Err(e)
        }
    }
}

async fn run_ingest_job_inner(
    ctx: &SidecarContext,
    tenant_id: &hx_models::TenantId,
    video: &mut Video,
) -> WorkerResult<()> {
    let work_dir = tempfile::Builder::new()
        .prefix("hx-worker-")
        .tempdir_in(&ctx.config.work_dir)
        .or_else(|_| tempfile::tempdir())
        .map_err(WorkerError::Io)?;
    let video_path = work_dir.path().join("source.mp4");

    let bytes = ctx.object_store.get(&video.storage_key).await?;
    tokio::fs::write(&video_path, &bytes)
        .await
        .map_err(WorkerError::Io)?;

    // Step 1: probe, transcribe, quality-gate.
    let info = probe_video(&video_path).await?;
    video.duration_s = info.duration_s;
    video.width = info.width;
    video.height = info.height;
    video.frame_rate = info.fps;

    let segments = if info.has_audio {
        let audio_path = work_dir.path().join("audio.wav");
        hx_media::extract_audio_track(&video_path, &audio_path).await?;
        let transcription = ctx
            .transcriber
            .transcribe(
                audio_path.to_string_lossy().as_ref(),
                video.transcript_language.as_deref(),
            )
            .await?;
        let gate = quality_gate::evaluate(&transcription, &ctx.config);
        if gate.has_speech {
            video.full_transcript = Some(transcription.text.clone());
            transcription.segments
        } else {
            info!(video_id = %video.id, reason = ?gate.reason, "transcript rejected by quality gate");
            Vec::new()
        }
    } else {
        Vec::new()
    };

    let language = video.transcript_language.clone().unwrap_or_else(|| "en".to_string());

    // Step 2: detect scenes.
    let scene_detector_config = scene_detector::SceneDetectorConfig::default();
    let intervals = scene_detector::detect_scenes(&video_path, &scene_detector_config).await?;

    // Step 3-6: process scenes concurrently, bounded by max_scene_workers.
    let duration_s = info.duration_s;
    let filename = video.filename.clone();
    let scene_semaphore = Arc::new(Semaphore::new(ctx.config.max_scene_workers));
    let mut handles = Vec::with_capacity(intervals.len());
    for interval in intervals {
        let permit = Arc::clone(&scene_semaphore);
        let video_path = video_path.clone();
        let out_dir = work_dir.path().to_path_buf();
        let segments = segments.clone();
        let language = language.clone();
        let filename = filename.clone();
        let video_id = video.id.clone();
        let ctx_config = ctx.config.clone();
        let embedder_config = ctx.embedder_config.clone();
        let object_store = Arc::clone(&ctx.object_store);
        let visual_analyzer = Arc::clone(&ctx.visual_analyzer);
        let text_embedder = Arc::clone(&ctx.text_embedder);
        let image_embedder = Arc::clone(&ctx.image_embedder);
        let api_semaphore = Arc::clone(&ctx.api_semaphore);
        let tenant_id = tenant_id.clone();

        let handle = tokio::spawn(async move {
            let _permit = permit.acquire_owned().await;
            build_scene(
                video_id,
                interval,
                &video_path,
                &out_dir,
                &segments,
                duration_s,
                &language,
                filename.as_deref(),
                &ctx_config,
                &embedder_config,
                object_store,
                visual_analyzer,
                text_embedder,
                image_embedder,
                api_semaphore,
                tenant_id,
            )
            .await
        });
        handles.push(handle);
    }

    let mut scenes = Vec::with_capacity(handles.len());
    for handle in handles {
        let scene = handle
            .await
            .map_err(|e| WorkerError::processing_failed(format!("scene task panicked: {e}")))??;
        scenes.push(scene);
    }
    scenes.sort_by_key(|s| s.index);

    // Step 6: persist scenes in index order (vector store, lexical store).
    for scene in &scenes {
        ctx.vector_store.upsert_scene(tenant_id, scene).await?;
        let mut doc = LexicalSceneDoc::from(scene);
        doc.tenant_id = tenant_id.clone();
        doc.language = language.clone();
        ctx.lexical_store.upsert_doc(&doc).await?;
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn build_scene(
    video_id: hx_models::VideoId,
    interval: scene_detector::SceneInterval,
    video_path: &Path,
    out_dir: &Path,
    segments: &[hx_ml_client::contracts::TranscriptSegment],
    video_duration_s: f64,
    language: &str,
    filename: Option<&str>,
    config: &WorkerConfig,
    embedder_config: &EmbedderConfig,
    object_store: Arc<dyn ObjectStore>,
    visual_analyzer: Arc<dyn VisualAnalyzer>,
    text_embedder: Arc<dyn TextEmbedder>,
    image_embedder: Arc<dyn ImageEmbedder>,
    api_semaphore: Arc<Semaphore>,
    tenant_id: hx_models::TenantId,
) -> WorkerResult<Scene> {
    let mut scene = Scene::new(video_id.clone(), interval.index, interval.start_s, interval.end_s);

    // C4: transcript alignment.
    scene.transcript_segment = align_scene_transcript(
        segments,
        interval.start_s,
        interval.end_s,
        video_duration_s,
        config.transcript_min_char_floor,
        config.transcript_context_pad_s,
    );

    let transcript_len = scene.transcript_segment.as_deref().map(str::len).unwrap_or(0);
    let meaningful_transcript = transcript_len >= config.visual_semantics_transcript_threshold;

    // C2: extract and rank keyframes.
    let frame_quality_config = FrameQualityConfig {
        max_frames_per_scene: config.max_keyframes_per_scene,
        min_brightness: config.visual_brightness_threshold,
        min_blur_score: config.visual_blur_threshold,
        ..FrameQualityConfig::default()
    };
    let frame_dir = out_dir.join(format!("scene_{}", interval.index));
    tokio::fs::create_dir_all(&frame_dir).await.map_err(WorkerError::Io)?;
    let frames = ranked_frames(
        video_path,
        interval.start_s,
        interval.end_s,
        &frame_dir,
        &frame_quality_config,
    )
    .await?;

    // Visual-analysis policy (§4.6 step 3).
    let should_analyze = if !config.visual_semantics_enabled {
        false
    } else if meaningful_transcript && scene.duration_s() < config.visual_semantics_min_duration_s {
        false
    } else if !meaningful_transcript && config.visual_semantics_force_on_no_transcript {
        true
    } else {
        !frames.is_empty()
    };

    let mut thumbnail_path: Option<PathBuf> = None;
    if should_analyze && !frames.is_empty() {
        let mut attempts = 0u32;
        for frame in &frames {
            if attempts > config.visual_semantics_max_frame_retries {
                break;
            }
            let _permit = api_semaphore.acquire().await;
            let result: VisualAnalysisResult = visual_analyzer
                .analyze(
                    frame.path.to_string_lossy().as_ref(),
                    scene.transcript_segment.as_deref(),
                    language,
                )
                .await
                .unwrap_or_else(|e| VisualAnalysisResult::no_content(e.to_string()));

            if result.status == VisualAnalysisStatus::Ok {
                scene.visual_description = Some(result.description);
                scene.visual_entities = result.main_entities;
                scene.visual_actions = result.actions;
                thumbnail_path = Some(frame.path.clone());
                break;
            }
            attempts += 1;
        }
        if thumbnail_path.is_none() {
            thumbnail_path = frames.first().map(|f| f.path.clone());
        }
    } else if let Some(first) = frames.first() {
        thumbnail_path = Some(first.path.clone());
    }

    // §4.6 step 4: combined_text, audio first, then visual, then filename metadata.
    let mut parts = Vec::new();
    if let Some(transcript) = &scene.transcript_segment {
        parts.push(transcript.clone());
    }
    if let Some(desc) = &scene.visual_description {
        parts.push(desc.clone());
    }

    if embedder_config.summary_enabled && !parts.is_empty() {
        scene.visual_summary = Some(parts.join(" "));
    }

    if let Some(filename) = filename {
        let (metadata_label, filename_label) = metadata_filename_labels(language);
        parts.push(format!("{metadata_label}: {filename_label}: {filename}"));
    }

    scene.combined_text = if parts.is_empty() {
        None
    } else {
        Some(parts.join(" "))
    };

    // §4.6 step 5: embeddings for every enabled channel.
    if let Some(transcript) = scene.transcript_segment.clone() {
        let truncated = hx_ml_client::embedder::smart_truncate(
            &transcript,
            embedder_config.transcript_max_length,
        );
        let outcome = embed_text_channel(
            text_embedder.as_ref(),
            Channel::Transcript,
            &truncated,
            Some(language),
            None,
            embedder_config,
        )
        .await;
        scene.embeddings.transcript = outcome.vector;
        scene.embedding_metadata.push(outcome.metadata);
    }

    if let Some(desc) = scene.visual_description.clone() {
        let visual_text = if embedder_config.visual_include_tags && !scene.tags.is_empty() {
            format!("{} {}", desc, scene.tags.join(" "))
        } else {
            desc
        };
        let truncated = hx_ml_client::embedder::smart_truncate(
            &visual_text,
            embedder_config.visual_max_length,
        );
        let outcome = embed_text_channel(
            text_embedder.as_ref(),
            Channel::Visual,
            &truncated,
            Some(language),
            None,
            embedder_config,
        )
        .await;
        scene.embeddings.visual_text = outcome.vector;
        scene.embedding_metadata.push(outcome.metadata);
    }

    if let Some(summary) = scene.visual_summary.clone() {
        let truncated =
            hx_ml_client::embedder::smart_truncate(&summary, embedder_config.summary_max_length);
        let outcome = embed_text_channel(
            text_embedder.as_ref(),
            Channel::Summary,
            &truncated,
            Some(language),
            None,
            embedder_config,
        )
        .await;
        scene.embeddings.summary = outcome.vector;
        scene.embedding_metadata.push(outcome.metadata);
    }

    if let Some(thumb_path) = &thumbnail_path {
        let outcome = embed_image_channel(
            image_embedder.as_ref(),
            thumb_path.to_string_lossy().as_ref(),
            embedder_config,
        )
        .await;
        scene.embeddings.clip_image = outcome.vector;
        scene.embedding_metadata.push(outcome.metadata);

        let key = hx_index::object_keys::thumbnail_key(tenant_id.as_str(), video_id.as_str(), interval.index);
        if let Ok(bytes) = tokio::fs::read(thumb_path).await {
            object_store.put(&key, bytes, "image/jpeg").await?;
            scene.thumbnail_key = Some(key);
        }
    }

    scene.embedding_version = embedder_config.embedding_version.clone();

    // "at least one non-null channel" invariant; otherwise the scene is kept
    // but unretrievable.
    if !scene.embeddings.is_retrievable() {
        scene.combined_text = Some("no content".to_string());
    }

    Ok(scene)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_scene_signature_compiles() {
        // Smoke test that the module's public surface type-checks; the full
        // orchestration path is covered by integration-style tests against
        // mocked stores elsewhere, since `build_scene` needs a real ffmpeg
        // binary on PATH to do anything meaningful.
        let _ = std::mem::size_of::<SidecarContext>();
    }

    #[test]
    fn metadata_labels_are_localized_by_language_and_default_to_korean() {
        assert_eq!(metadata_filename_labels("en"), ("Metadata", "Filename"));
        assert_eq!(metadata_filename_labels("ko"), ("메타데이터", "파일명"));
        assert_eq!(metadata_filename_labels("fr"), ("메타데이터", "파일명"));
    }
}
