//! Scene Detector (C1, §4.1).
//!
//! Samples the video at a fixed interval, reduces each sample to a small
//! grayscale thumbnail, and looks for content-delta spikes between
//! consecutive samples — the same histogram/hash-delta idea as
//! `vclip-media/src/intelligent/scene_cut.rs`'s `SceneCutDetector`, adapted
//! from per-frame tracker resets to whole-video interval extraction and
//! simplified from a color histogram to mean-luma delta (no OpenCV
//! dependency in this crate).

use std::path::Path;

use image::GenericImageView;
use tracing::{debug, warn};

use crate::command::extract_frame_at;
use crate::error::MediaResult;
use crate::probe::probe_video;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionStrategy {
    /// Rolling-window content delta with a minimum content floor.
    Adaptive,
    /// Fixed content-delta threshold.
    Content,
}

#[derive(Debug, Clone)]
pub struct SceneDetectorConfig {
    pub strategy: DetectionStrategy,
    pub sample_interval_s: f64,
    /// Used by `Content` strategy: absolute delta above which a cut fires.
    pub content_threshold: f64,
    /// Used by `Adaptive` strategy: a cut never fires below this delta even
    /// if it exceeds the rolling mean.
    pub min_content_floor: f64,
    /// Number of preceding samples averaged for the adaptive baseline.
    pub rolling_window: usize,
    /// Multiplier applied to the rolling mean to get the adaptive threshold.
    pub adaptive_multiplier: f64,
    pub min_scene_length_s: f64,
    pub sample_scale_width: u32,
}

impl Default for SceneDetectorConfig {
    fn default() -> Self {
        Self {
            strategy: DetectionStrategy::Adaptive,
            sample_interval_s: 1.0,
            content_threshold: 0.30,
            min_content_floor: 0.15,
            rolling_window: 5,
            adaptive_multiplier: 2.5,
            min_scene_length_s: 2.0,
            sample_scale_width: 64,
        }
    }
}

impl SceneDetectorConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(v) = std::env::var("SCENE_DETECTOR_STRATEGY") {
            config.strategy = match v.to_lowercase().as_str() {
                "content" => DetectionStrategy::Content,
                _ => DetectionStrategy::Adaptive,
            };
        }
        if let Ok(v) = std::env::var("SCENE_DETECTOR_MIN_SCENE_LENGTH_S") {
            if let Ok(parsed) = v.parse() {
                config.min_scene_length_s = parsed;
            }
        }
        config
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SceneInterval {
    pub index: u32,
    pub start_s: f64,
    pub end_s: f64,
}

/// Detect scene boundaries in `video_path`, covering the full duration.
/// Fails only if the video cannot be read.
pub async fn detect_scenes(
    video_path: impl AsRef<Path>,
    config: &SceneDetectorConfig,
) -> MediaResult<Vec<SceneInterval>> {
    let video_path = video_path.as_ref();
    let info = probe_video(video_path).await?;
    let duration_s = info.duration_s;

    if duration_s <= 0.0 {
        return Ok(vec![SceneInterval {
            index: 0,
            start_s: 0.0,
            end_s: 0.0,
        }]);
    }

    let sample_count = (duration_s / config.sample_interval_s).floor() as usize + 1;
    let tmp_dir = tempfile::tempdir()?;

    let mut deltas: Vec<(f64, f64)> = Vec::new(); // (timestamp, content_delta)
    let mut prev_luma: Option<Vec<f32>> = None;

    for i in 0..sample_count {
        let timestamp = (i as f64) * config.sample_interval_s;
        if timestamp >= duration_s {
            break;
        }
        let frame_path = tmp_dir.path().join(format!("sample_{i:05}.jpg"));
        if extract_frame_at(video_path, timestamp, &frame_path, Some(config.sample_scale_width))
            .await
            .is_err()
        {
            warn!(timestamp, "failed to extract sample frame, skipping");
            continue;
        }

        let luma = match image::open(&frame_path) {
            Ok(img) => grayscale_luma_vector(&img),
            Err(e) => {
                warn!(error = %e, "failed to decode sample frame, skipping");
                continue;
            }
        };

        if let Some(prev) = &prev_luma {
            deltas.push((timestamp, mean_abs_delta(prev, &luma)));
        }
        prev_luma = Some(luma);
    }

    let cut_timestamps = find_cuts(&deltas, config);
    debug!(cuts = cut_timestamps.len(), "scene cuts detected");

    Ok(build_intervals(&cut_timestamps, duration_s, config.min_scene_length_s))
}

fn grayscale_luma_vector(img: &image::DynamicImage) -> Vec<f32> {
    let gray = img.to_luma8();
    gray.pixels().map(|p| p.0[0] as f32).collect()
}

fn mean_abs_delta(prev: &[f32], next: &[f32]) -> f64 {
    if prev.len() != next.len() || prev.is_empty() {
        return 0.0;
    }
    let sum: f64 = prev
        .iter()
        .zip(next.iter())
        .map(|(a, b)| ((*a - *b).abs() as f64) / 255.0)
        .sum();
    sum / (prev.len() as f64)
}

fn find_cuts(deltas: &[(f64, f64)], config: &SceneDetectorConfig) -> Vec<f64> {
    let mut cuts = Vec::new();
    match config.strategy {
        DetectionStrategy::Content => {
            for (timestamp, delta) in deltas {
                if *delta >= config.content_threshold {
                    cuts.push(*timestamp);
                }
            }
        }
        DetectionStrategy::Adaptive => {
            for (i, (timestamp, delta)) in deltas.iter().enumerate() {
                let window_start = i.saturating_sub(config.rolling_window);
                let window = &deltas[window_start..i];
                let baseline = if window.is_empty() {
                    0.0
                } else {
                    window.iter().map(|(_, d)| d).sum::<f64>() / (window.len() as f64)
                };
                let threshold = (baseline * config.adaptive_multiplier).max(config.min_content_floor);
                if *delta >= threshold {
                    cuts.push(*timestamp);
                }
            }
        }
    }
    cuts
}

fn build_intervals(cut_timestamps: &[f64], duration_s: f64, min_scene_length_s: f64) -> Vec<SceneInterval> {
    let mut boundaries = vec![0.0];
    boundaries.extend(cut_timestamps.iter().copied());
    boundaries.push(duration_s);
    boundaries.dedup_by(|a, b| (*a - *b).abs() < 1e-6);

    let mut raw_scenes: Vec<(f64, f64)> = boundaries
        .windows(2)
        .map(|w| (w[0], w[1]))
        .filter(|(s, e)| e > s)
        .collect();

    if raw_scenes.is_empty() {
        raw_scenes.push((0.0, duration_s));
    }

    // Merge any scene shorter than the minimum into the preceding scene; the
    // very first scene, if short, merges forward into the next one instead.
    let mut merged: Vec<(f64, f64)> = Vec::with_capacity(raw_scenes.len());
    for (start, end) in raw_scenes {
        if end - start < min_scene_length_s && !merged.is_empty() {
            let last = merged.last_mut().unwrap();
            last.1 = end;
        } else {
            merged.push((start, end));
        }
    }
    if merged.len() > 1 && merged[0].1 - merged[0].0 < min_scene_length_s {
        let (_, first_end) = merged.remove(0);
        merged[0].0 = 0.0;
        let _ = first_end;
    }

    merged
        .into_iter()
        .enumerate()
        .map(|(index, (start_s, end_s))| SceneInterval {
            index: index as u32,
            start_s,
            end_s,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_intervals_with_no_cuts_is_one_scene() {
        let intervals = build_intervals(&[], 42.0, 2.0);
        assert_eq!(intervals.len(), 1);
        assert_eq!(intervals[0].start_s, 0.0);
        assert_eq!(intervals[0].end_s, 42.0);
    }

    #[test]
    fn build_intervals_splits_at_each_cut() {
        let intervals = build_intervals(&[10.0, 20.0], 30.0, 2.0);
        assert_eq!(intervals.len(), 3);
        assert_eq!(intervals[0].start_s, 0.0);
        assert_eq!(intervals[0].end_s, 10.0);
        assert_eq!(intervals[2].end_s, 30.0);
    }

    #[test]
    fn build_intervals_merges_short_tail_segments() {
        let intervals = build_intervals(&[10.0, 10.5], 30.0, 2.0);
        // The [10.0, 10.5] sliver merges into the preceding scene.
        assert_eq!(intervals.len(), 2);
        assert_eq!(intervals[0].end_s, 10.5);
    }

    #[test]
    fn indices_are_contiguous_from_zero() {
        let intervals = build_intervals(&[5.0, 15.0, 25.0], 40.0, 2.0);
        for (i, interval) in intervals.iter().enumerate() {
            assert_eq!(interval.index, i as u32);
        }
    }

    #[test]
    fn content_strategy_fires_above_fixed_threshold() {
        let config = SceneDetectorConfig {
            strategy: DetectionStrategy::Content,
            content_threshold: 0.5,
            ..Default::default()
        };
        let deltas = vec![(1.0, 0.1), (2.0, 0.6), (3.0, 0.2)];
        let cuts = find_cuts(&deltas, &config);
        assert_eq!(cuts, vec![2.0]);
    }
}
