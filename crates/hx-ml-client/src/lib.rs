//! Clients for the external model-serving stack: audio transcription,
//! frame-level visual analysis, and text/image embedding (C3, C5, §4.3-§4.5).

pub mod client;
pub mod contracts;
pub mod embedder;
pub mod error;

pub use client::{hash_input_text, l2_normalize, MlClient, MlClientConfig};
pub use contracts::{
    ImageEmbedder, TextEmbedder, TranscriptSegment, TranscriptionResult, Transcriber,
    VisualAnalysisResult, VisualAnalysisStatus, VisualAnalyzer, MAX_VISUAL_DESCRIPTION_LEN,
};
pub use embedder::{
    embed_image_channel, embed_text_channel, smart_truncate, ChannelEmbeddingOutcome,
    EmbedderConfig,
};
pub use error::{MlError, MlResult};
