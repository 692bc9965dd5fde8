//! Shared data models for the Heimdex video search core.
//!
//! Every entity named in the Data Model section is defined here: videos,
//! scenes, per-channel embeddings, persons, saved search preferences, and
//! the transient query/candidate types that flow through the search
//! pipeline. Adapters and orchestration crates depend on this crate rather
//! than redefine these shapes.

pub mod ids;
pub mod person;
pub mod preference;
pub mod query;
pub mod scene;
pub mod video;

pub use ids::{PersonId, SceneId, TenantId, VideoId};
pub use person::{Person, PersonStatus};
pub use preference::{FusionMethod, UserChannelWeights, UserSearchPreference, VisualMode};
pub use query::{
    Candidate, CandidateList, ChannelBreakdown, FusedCandidate, Language, MatchQuality,
    PersonPrefix, QueryIntent, QueryPlan, RerankDebug, ScoreType, VisualIntent,
};
pub use scene::{
    normalize_tags, Channel, EmbeddingMetadata, LexicalSceneDoc, Scene, SceneEmbeddings,
    MAX_TAG_LEN,
};
pub use video::{Video, VideoStatus, MAX_ERROR_MESSAGE_LEN};
