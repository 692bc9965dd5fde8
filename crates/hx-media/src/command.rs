//! FFmpeg command builder and runner.
//!
//! Grounded on `vclip-media/src/command.rs`'s `FfmpegCommand`/`FfmpegRunner`,
//! trimmed to the subset this crate needs: single-frame extraction.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::debug;

use crate::error::{MediaError, MediaResult};

#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    input: PathBuf,
    output: PathBuf,
    input_args: Vec<String>,
    output_args: Vec<String>,
}

impl FfmpegCommand {
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            input_args: Vec::new(),
            output_args: Vec::new(),
        }
    }

    pub fn input_arg(mut self, arg: impl Into<String>) -> Self {
        self.input_args.push(arg.into());
        self
    }

    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    pub fn seek(self, seconds: f64) -> Self {
        self.input_arg("-ss").input_arg(format!("{:.3}", seconds))
    }

    pub fn video_filter(self, filter: impl Into<String>) -> Self {
        self.output_arg("-vf").output_arg(filter)
    }

    pub fn single_frame(self) -> Self {
        self.output_arg("-vframes").output_arg("1")
    }

    pub fn build_args(&self) -> Vec<String> {
        let mut args = vec!["-y".to_string(), "-v".to_string(), "error".to_string()];
        args.extend(self.input_args.clone());
        args.push("-i".to_string());
        args.push(self.input.to_string_lossy().to_string());
        args.extend(self.output_args.clone());
        args.push(self.output.to_string_lossy().to_string());
        args
    }
}

pub struct FfmpegRunner;

impl Default for FfmpegRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl FfmpegRunner {
    pub fn new() -> Self {
        Self
    }

    pub async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<()> {
        which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)?;

        let args = cmd.build_args();
        debug!(args = %args.join(" "), "running ffmpeg");

        let output = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !output.status.success() {
            return Err(MediaError::ffmpeg_failed(
                "ffmpeg exited with non-zero status",
                Some(String::from_utf8_lossy(&output.stderr).to_string()),
            ));
        }

        Ok(())
    }
}

/// Extract a single frame at `timestamp_s` as a JPEG, optionally scaled down
/// to `scale_width` (preserving aspect ratio).
pub async fn extract_frame_at(
    video_path: impl AsRef<Path>,
    timestamp_s: f64,
    out_path: impl AsRef<Path>,
    scale_width: Option<u32>,
) -> MediaResult<()> {
    let mut cmd = FfmpegCommand::new(video_path, out_path)
        .seek(timestamp_s)
        .single_frame();
    if let Some(width) = scale_width {
        cmd = cmd.video_filter(format!("scale={}:-2", width));
    }
    FfmpegRunner::new().run(&cmd).await
}

/// Extract the audio track as a 16kHz mono WAV, the input shape most
/// transcription services expect.
pub async fn extract_audio_track(
    video_path: impl AsRef<Path>,
    out_path: impl AsRef<Path>,
) -> MediaResult<()> {
    let cmd = FfmpegCommand::new(video_path, out_path)
        .output_arg("-vn")
        .output_arg("-ac")
        .output_arg("1")
        .output_arg("-ar")
        .output_arg("16000");
    FfmpegRunner::new().run(&cmd).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_args_places_seek_before_input_and_filter_after() {
        let cmd = FfmpegCommand::new("in.mp4", "out.jpg")
            .seek(12.5)
            .single_frame()
            .video_filter("scale=320:-2");
        let args = cmd.build_args();
        let i_pos = args.iter().position(|a| a == "-i").unwrap();
        let ss_pos = args.iter().position(|a| a == "-ss").unwrap();
        let vf_pos = args.iter().position(|a| a == "-vf").unwrap();
        assert!(ss_pos < i_pos);
        assert!(vf_pos > i_pos);
    }
}
