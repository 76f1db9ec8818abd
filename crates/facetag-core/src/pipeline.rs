//! Per-face identification pipeline.
//!
//! prepare (orient, crop, resize) → normalize → embed → resolve against the
//! shared registry. Failures are reported per face so one bad detection never
//! costs its siblings.

use crate::alignment::{AlignmentError, Preprocessor};
use crate::recognizer::{Embedder, EmbedderError};
use crate::registry::{RegistryError, SharedRegistry};
use crate::tensor::{self, FaceTensor, TensorError};
use crate::types::{Detection, Resolution};
use image::RgbImage;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("alignment: {0}")]
    Alignment(#[from] AlignmentError),
    #[error("tensor: {0}")]
    Tensor(#[from] TensorError),
    #[error("embedder: {0}")]
    Embedder(#[from] EmbedderError),
    #[error("registry: {0}")]
    Registry(#[from] RegistryError),
}

impl PipelineError {
    /// Bad input geometry or a failed inference: skip the face and carry on.
    /// Anything else means the pipeline itself is miswired.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, PipelineError::Alignment(_) | PipelineError::Embedder(_))
    }
}

/// Result for one detection of an image.
#[derive(Debug)]
pub struct FaceOutcome {
    /// Position of the detection in the detector's output.
    pub index: usize,
    pub detection: Detection,
    pub result: Result<Resolution, PipelineError>,
}

/// Geometry and normalization for one detection, without touching the model.
pub fn prepare_tensor(
    preprocessor: &Preprocessor,
    image: &RgbImage,
    detection: &Detection,
) -> Result<FaceTensor, PipelineError> {
    let aligned = preprocessor.prepare_face(image, detection.orientation, &detection.bbox)?;
    Ok(tensor::normalize(&aligned)?)
}

/// Runs detections through alignment, the embedder, and the shared registry.
pub struct FacePipeline<E: Embedder> {
    preprocessor: Preprocessor,
    embedder: E,
    registry: Arc<SharedRegistry>,
}

impl<E: Embedder> FacePipeline<E> {
    pub fn new(preprocessor: Preprocessor, embedder: E, registry: Arc<SharedRegistry>) -> Self {
        Self {
            preprocessor,
            embedder,
            registry,
        }
    }

    pub fn registry(&self) -> &Arc<SharedRegistry> {
        &self.registry
    }

    /// Resolve a single detected face to an identity.
    pub fn identify_face(
        &mut self,
        image: &RgbImage,
        detection: &Detection,
    ) -> Result<Resolution, PipelineError> {
        let tensor = prepare_tensor(&self.preprocessor, image, detection)?;
        let embedding = self.embedder.embed(&tensor)?;
        Ok(self.registry.lookup_or_register(&embedding)?)
    }

    /// Resolve every detection of one image, in detector order.
    pub fn tag_image(&mut self, image: &RgbImage, detections: &[Detection]) -> Vec<FaceOutcome> {
        detections
            .iter()
            .enumerate()
            .map(|(index, detection)| {
                let result = self.identify_face(image, detection);
                if let Err(err) = &result {
                    tracing::warn!(
                        face = index,
                        error = %err,
                        recoverable = err.is_recoverable(),
                        "skipping face"
                    );
                }
                FaceOutcome {
                    index,
                    detection: *detection,
                    result,
                }
            })
            .collect()
    }
}
