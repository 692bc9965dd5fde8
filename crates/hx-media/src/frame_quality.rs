//! Frame Quality Ranker (C2, §4.2).
//!
//! Extracts up to K evenly spaced frames per scene and scores each by
//! brightness and blur (variance of Laplacian), the same metrics
//! `vclip-media`'s styling pipeline leans on for keyframe selection, here
//! computed directly over decoded pixels instead of via OpenCV.

use std::path::{Path, PathBuf};

use image::GrayImage;
use tracing::debug;

use crate::command::extract_frame_at;
use crate::error::MediaResult;

#[derive(Debug, Clone)]
pub struct FrameQualityConfig {
    pub max_frames_per_scene: u32,
    pub min_brightness: f64,
    pub min_blur_score: f64,
    pub extract_scale_width: u32,
}

impl Default for FrameQualityConfig {
    fn default() -> Self {
        Self {
            max_frames_per_scene: 5,
            min_brightness: 15.0,
            min_blur_score: 8.0,
            extract_scale_width: 480,
        }
    }
}

impl FrameQualityConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(v) = std::env::var("FRAME_QUALITY_MAX_FRAMES_PER_SCENE") {
            if let Ok(parsed) = v.parse() {
                config.max_frames_per_scene = parsed;
            }
        }
        config
    }
}

#[derive(Debug, Clone)]
pub struct RankedFrame {
    pub path: PathBuf,
    pub timestamp_s: f64,
    pub brightness: f64,
    pub blur_score: f64,
    pub score: f64,
}

impl RankedFrame {
    pub fn is_informative(&self, config: &FrameQualityConfig) -> bool {
        self.brightness >= config.min_brightness && self.blur_score >= config.min_blur_score
    }
}

/// Number of evenly spaced frames to sample for a scene of duration `delta_s`.
pub fn frame_count_for_scene(delta_s: f64, config: &FrameQualityConfig) -> u32 {
    let by_duration = (delta_s / 2.0).ceil() as u32;
    by_duration.min(config.max_frames_per_scene).max(1)
}

/// Extract and score frames for a scene window, returning only informative
/// frames sorted descending by score. Empty result means the caller should
/// skip visual analysis for this scene.
pub async fn ranked_frames(
    video_path: impl AsRef<Path>,
    scene_start_s: f64,
    scene_end_s: f64,
    out_dir: impl AsRef<Path>,
    config: &FrameQualityConfig,
) -> MediaResult<Vec<RankedFrame>> {
    let video_path = video_path.as_ref();
    let out_dir = out_dir.as_ref();
    let delta = (scene_end_s - scene_start_s).max(0.0);
    let k = frame_count_for_scene(delta, config);

    let mut frames = Vec::with_capacity(k as usize);
    for i in 0..k {
        // Evenly spaced, including both ends when k > 1.
        let fraction = if k == 1 {
            0.5
        } else {
            (i as f64) / ((k - 1) as f64)
        };
        let timestamp = scene_start_s + fraction * delta;
        let frame_path = out_dir.join(format!("frame_{i:03}_{timestamp:.3}.jpg"));

        if extract_frame_at(video_path, timestamp, &frame_path, Some(config.extract_scale_width))
            .await
            .is_err()
        {
            continue;
        }

        let Ok(img) = image::open(&frame_path) else {
            continue;
        };
        let gray = img.to_luma8();
        let brightness = mean_brightness(&gray);
        let blur_score = laplacian_variance(&gray);
        let score = 0.4 * (1.0 - (brightness - 127.5).abs() / 127.5) + 0.6 * (blur_score / 1000.0).min(1.0);

        frames.push(RankedFrame {
            path: frame_path,
            timestamp_s: timestamp,
            brightness,
            blur_score,
            score,
        });
    }

    let mut informative: Vec<RankedFrame> = frames
        .into_iter()
        .filter(|f| f.is_informative(config))
        .collect();
    informative.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

    debug!(count = informative.len(), k, "ranked informative frames");
    Ok(informative)
}

pub fn best_frame(frames: &[RankedFrame]) -> Option<&RankedFrame> {
    frames.first()
}

fn mean_brightness(gray: &GrayImage) -> f64 {
    if gray.is_empty() {
        return 0.0;
    }
    let sum: u64 = gray.pixels().map(|p| p.0[0] as u64).sum();
    sum as f64 / (gray.width() as f64 * gray.height() as f64)
}

/// Variance of the 3x3 Laplacian response, a standard blur proxy: sharp
/// images have high-variance edge responses, blurry ones are flat.
fn laplacian_variance(gray: &GrayImage) -> f64 {
    let (w, h) = gray.dimensions();
    if w < 3 || h < 3 {
        return 0.0;
    }

    let mut responses = Vec::with_capacity(((w - 2) * (h - 2)) as usize);
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let center = gray.get_pixel(x, y).0[0] as f64;
            let up = gray.get_pixel(x, y - 1).0[0] as f64;
            let down = gray.get_pixel(x, y + 1).0[0] as f64;
            let left = gray.get_pixel(x - 1, y).0[0] as f64;
            let right = gray.get_pixel(x + 1, y).0[0] as f64;
            let laplacian = up + down + left + right - 4.0 * center;
            responses.push(laplacian);
        }
    }

    if responses.is_empty() {
        return 0.0;
    }
    let mean = responses.iter().sum::<f64>() / (responses.len() as f64);
    let variance = responses.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (responses.len() as f64);
    variance
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_count_respects_configured_max_and_floor() {
        let config = FrameQualityConfig {
            max_frames_per_scene: 5,
            ..Default::default()
        };
        assert_eq!(frame_count_for_scene(0.5, &config), 1);
        assert_eq!(frame_count_for_scene(4.0, &config), 2);
        assert_eq!(frame_count_for_scene(100.0, &config), 5);
    }

    #[test]
    fn laplacian_variance_is_zero_for_flat_image() {
        let flat = GrayImage::from_pixel(10, 10, image::Luma([128]));
        assert_eq!(laplacian_variance(&flat), 0.0);
    }

    #[test]
    fn laplacian_variance_is_positive_for_checkerboard() {
        let mut img = GrayImage::new(10, 10);
        for y in 0..10 {
            for x in 0..10 {
                let v = if (x + y) % 2 == 0 { 255 } else { 0 };
                img.put_pixel(x, y, image::Luma([v]));
            }
        }
        assert!(laplacian_variance(&img) > 0.0);
    }

    #[test]
    fn mean_brightness_of_uniform_image_equals_its_value() {
        let img = GrayImage::from_pixel(4, 4, image::Luma([200]));
        assert_eq!(mean_brightness(&img), 200.0);
    }
}
