//! facetag-core — Face re-identification across a stream of images.
//!
//! Prepares detected face regions into 112×112 aligned crops, normalizes them
//! into the embedding model's input tensor, and resolves the resulting
//! embeddings against an in-memory identity registry.

pub mod alignment;
pub mod pipeline;
pub mod recognizer;
pub mod registry;
pub mod tensor;
pub mod types;

use std::path::PathBuf;

pub use alignment::{AlignmentError, Preprocessor, ResizeFilter};
pub use pipeline::{FaceOutcome, FacePipeline, PipelineError};
pub use recognizer::{Embedder, EmbedderError, OnnxEmbedder};
pub use registry::{EuclideanMatcher, Matcher, Registry, RegistryError, SharedRegistry};
pub use tensor::{FaceTensor, TensorError};
pub use types::{BoundingBox, Detection, Embedding, Identity, Orientation, Resolution};

/// Side length of the aligned face crop the embedding model consumes.
pub const ALIGNED_SIZE: u32 = 112;

/// Dimensionality of the face embedding produced by the model.
pub const EMBEDDING_DIM: usize = 192;

/// Maximum Euclidean distance (exclusive) at which two embeddings are the same identity.
pub const DEFAULT_DISTANCE_THRESHOLD: f32 = 1.0;

/// Default directory for model files: `$XDG_DATA_HOME/facetag/models`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("facetag")
        .join("models")
}
