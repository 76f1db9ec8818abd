//! Concurrent tagging of manifest images.
//!
//! One task per image: decoding and alignment run on the blocking pool,
//! embeddings come from the engine thread, and every resolution goes through
//! the shared registry's lock. Failures are recorded per face or per image and
//! never stop the run.

use crate::engine::EngineHandle;
use crate::manifest::ImageEntry;
use crate::report::{FaceReport, ImageReport};
use facetag_core::pipeline::prepare_tensor;
use facetag_core::{FaceTensor, PipelineError, Preprocessor, SharedRegistry};
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Tag all images, at most `max_concurrent` in flight; reports keep manifest order.
pub async fn tag_images(
    images: &[ImageEntry],
    preprocessor: Preprocessor,
    engine: EngineHandle,
    registry: Arc<SharedRegistry>,
    max_concurrent: usize,
) -> Vec<ImageReport> {
    let semaphore = Arc::new(Semaphore::new(max_concurrent.max(1)));

    let tasks: Vec<_> = images
        .iter()
        .cloned()
        .map(move |entry| {
            let semaphore = Arc::clone(&semaphore);
            let engine = engine.clone();
            let registry = Arc::clone(&registry);
            tokio::spawn(async move {
                // The semaphore is never closed.
                let _permit = semaphore.acquire_owned().await.ok();
                tag_image(entry, preprocessor, &engine, &registry).await
            })
        })
        .collect();

    let mut reports = Vec::with_capacity(tasks.len());
    for (task, entry) in tasks.into_iter().zip(images) {
        match task.await {
            Ok(report) => reports.push(report),
            Err(err) => {
                tracing::error!(path = %entry.path.display(), error = %err, "tagging task failed");
                reports.push(ImageReport::failed(entry.path.clone(), format!("task failed: {err}")));
            }
        }
    }
    reports
}

/// Tag the faces of one image.
pub async fn tag_image(
    entry: ImageEntry,
    preprocessor: Preprocessor,
    engine: &EngineHandle,
    registry: &SharedRegistry,
) -> ImageReport {
    let path = entry.path.clone();
    let detections = entry.detections();

    let prepared = tokio::task::spawn_blocking({
        let path = path.clone();
        move || -> Result<Vec<Result<FaceTensor, PipelineError>>, String> {
            let image = image::open(&path).map_err(|e| format!("failed to decode image: {e}"))?;
            let image = image.to_rgb8();
            Ok(detections
                .iter()
                .map(|d| prepare_tensor(&preprocessor, &image, d))
                .collect())
        }
    })
    .await;

    let tensors = match prepared {
        Ok(Ok(tensors)) => tensors,
        Ok(Err(err)) => {
            tracing::warn!(path = %path.display(), error = %err, "skipping image");
            return ImageReport::failed(path, err);
        }
        Err(err) => {
            tracing::error!(path = %path.display(), error = %err, "preprocessing task failed");
            return ImageReport::failed(path, format!("preprocessing task failed: {err}"));
        }
    };

    let mut faces = Vec::with_capacity(tensors.len());
    for (index, (face, tensor)) in entry.faces.iter().zip(tensors).enumerate() {
        let confidence = face.confidence;
        let outcome = match tensor {
            Ok(tensor) => match engine.embed(tensor).await {
                Ok(embedding) => registry
                    .lookup_or_register(&embedding)
                    .map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            },
            Err(e) => Err(e.to_string()),
        };

        faces.push(match outcome {
            Ok(resolution) => FaceReport::resolved(index, confidence, resolution),
            Err(err) => {
                tracing::warn!(path = %path.display(), face = index, error = %err, "skipping face");
                FaceReport::failed(index, confidence, err)
            }
        });
    }

    tracing::debug!(
        path = %path.display(),
        faces = faces.len(),
        labels = ?faces.iter().filter_map(|f| f.label.as_deref()).collect::<Vec<_>>(),
        "image tagged"
    );

    ImageReport {
        path,
        faces,
        error: None,
    }
}
