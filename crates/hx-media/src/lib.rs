//! Scene detection and keyframe quality ranking over local video files
//! (C1, C2; §4.1, §4.2).

pub mod command;
pub mod error;
pub mod frame_quality;
pub mod probe;
pub mod scene_detector;

pub use command::extract_audio_track;
pub use error::{MediaError, MediaResult};
pub use frame_quality::{
    best_frame, frame_count_for_scene, ranked_frames, FrameQualityConfig, RankedFrame,
};
pub use probe::{probe_video, VideoInfo};
pub use scene_detector::{detect_scenes, DetectionStrategy, SceneDetectorConfig, SceneInterval};
