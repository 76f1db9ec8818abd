//! Face embedding providers.
//!
//! The pipeline only depends on the [`Embedder`] contract: a normalized
//! 112×112×3 tensor in, a 192-dimensional embedding out. [`OnnxEmbedder`]
//! implements it for MobileFaceNet exported to ONNX.

use crate::tensor::FaceTensor;
use crate::types::Embedding;
use crate::EMBEDDING_DIM;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EmbedderError {
    #[error("model file not found: {0} — export MobileFaceNet to ONNX and set FACETAG_MODEL_PATH")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Produces a face embedding from a normalized face tensor.
pub trait Embedder {
    fn embed(&mut self, tensor: &FaceTensor) -> Result<Embedding, EmbedderError>;
}

impl<E: Embedder + ?Sized> Embedder for Box<E> {
    fn embed(&mut self, tensor: &FaceTensor) -> Result<Embedding, EmbedderError> {
        (**self).embed(tensor)
    }
}

/// MobileFaceNet embedder via ONNX Runtime.
pub struct OnnxEmbedder {
    session: Session,
    model_version: String,
}

impl OnnxEmbedder {
    /// Load the ONNX model from the given path.
    pub fn load(model_path: &str, intra_threads: usize) -> Result<Self, EmbedderError> {
        let path = Path::new(model_path);
        if !path.exists() {
            return Err(EmbedderError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(intra_threads.max(1))?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = model_path,
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded embedding model"
        );

        let model_version = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "unknown".to_string());

        Ok(Self { session, model_version })
    }

    pub fn model_version(&self) -> &str {
        &self.model_version
    }
}

impl Embedder for OnnxEmbedder {
    fn embed(&mut self, tensor: &FaceTensor) -> Result<Embedding, EmbedderError> {
        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(tensor.view())?])?;

        let (_, raw_data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| EmbedderError::InferenceFailed(format!("embedding extraction: {e}")))?;

        // Raw output on purpose: the distance threshold is calibrated on
        // un-normalized MobileFaceNet embeddings.
        let values: Vec<f32> = raw_data.to_vec();
        check_output(&values)?;

        Ok(Embedding {
            values,
            model_version: Some(self.model_version.clone()),
        })
    }
}

fn check_output(values: &[f32]) -> Result<(), EmbedderError> {
    if values.len() != EMBEDDING_DIM {
        return Err(EmbedderError::InferenceFailed(format!(
            "expected {EMBEDDING_DIM}-dim embedding, got {}",
            values.len()
        )));
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err(EmbedderError::InferenceFailed(
            "embedding contains non-finite values".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_missing_model() {
        let err = OnnxEmbedder::load("/nonexistent/mobile_face_net.onnx", 1)
            .err()
            .expect("missing model must fail");
        assert!(matches!(err, EmbedderError::ModelNotFound(p) if p.ends_with("mobile_face_net.onnx")));
    }

    #[test]
    fn test_check_output_dimension() {
        assert!(check_output(&[0.0; EMBEDDING_DIM]).is_ok());
        assert!(matches!(
            check_output(&[0.0; 512]),
            Err(EmbedderError::InferenceFailed(_))
        ));
    }

    #[test]
    fn test_check_output_non_finite() {
        let mut values = vec![0.1; EMBEDDING_DIM];
        values[17] = f32::NAN;
        assert!(check_output(&values).is_err());
    }

    #[test]
    fn test_boxed_embedder_delegates() {
        struct Constant;
        impl Embedder for Constant {
            fn embed(&mut self, _tensor: &FaceTensor) -> Result<Embedding, EmbedderError> {
                Ok(Embedding::new(vec![0.25; EMBEDDING_DIM]))
            }
        }

        let face = image::RgbImage::new(112, 112);
        let tensor = crate::tensor::normalize(&face).unwrap();
        let mut boxed: Box<dyn Embedder> = Box::new(Constant);
        let embedding = boxed.embed(&tensor).unwrap();
        assert_eq!(embedding.dim(), EMBEDDING_DIM);
    }
}
