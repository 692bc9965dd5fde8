//! Index Adapter Layer (C14, §4.14): named contracts over the object
//! store, vector store, and lexical store, plus their concrete REST/S3
//! drivers. The transcription/visual-analysis/embedding contracts live in
//! `hx-ml-client` instead, since their concrete drivers call model-serving
//! endpoints rather than storage endpoints.

pub mod contracts;
pub mod error;
pub mod lexical_store;
pub mod object_store;
pub mod vector_store;
pub mod video_store;

pub use contracts::{LexicalStore, ObjectStore, VectorStore, VideoStore};
pub use error::{IndexError, IndexResult};
pub use lexical_store::{LexicalStoreConfig, OpenSearchLexicalStore};
pub use object_store::{keys as object_keys, ObjectStoreConfig, S3ObjectStore};
pub use vector_store::{RestVectorStore, VectorStoreConfig};
pub use video_store::{RestVideoStore, VideoStoreConfig};
