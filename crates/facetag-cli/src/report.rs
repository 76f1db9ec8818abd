//! Tagging report: which identities appear in which images.

use chrono::{DateTime, Utc};
use facetag_core::Resolution;
use serde::Serialize;
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub model: String,
    pub threshold: f32,
    pub images: Vec<ImageReport>,
    /// Registered identities in registration order, with the images they appear in.
    pub identities: Vec<IdentityReport>,
    /// Images where no face resolved to an identity.
    pub untagged: Vec<PathBuf>,
    pub summary: Summary,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageReport {
    pub path: PathBuf,
    pub faces: Vec<FaceReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FaceReport {
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance: Option<f32>,
    pub is_new: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IdentityReport {
    pub label: String,
    pub images: Vec<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub images: usize,
    pub failed_images: usize,
    pub faces: usize,
    pub failed_faces: usize,
    pub identities: usize,
}

impl ImageReport {
    pub fn failed(path: PathBuf, error: String) -> Self {
        Self {
            path,
            faces: Vec::new(),
            error: Some(error),
        }
    }

    /// Labels of the faces that resolved, in detector order.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.faces.iter().filter_map(|f| f.label.as_deref())
    }
}

impl FaceReport {
    pub fn resolved(index: usize, confidence: Option<f32>, resolution: Resolution) -> Self {
        Self {
            index,
            confidence,
            label: Some(resolution.label),
            distance: resolution.distance,
            is_new: resolution.is_new,
            error: None,
        }
    }

    pub fn failed(index: usize, confidence: Option<f32>, error: String) -> Self {
        Self {
            index,
            confidence,
            label: None,
            distance: None,
            is_new: false,
            error: Some(error),
        }
    }
}

impl Report {
    /// Assemble the report; `labels` are the registry's labels in registration order.
    pub fn build(
        run_id: Uuid,
        started_at: DateTime<Utc>,
        model: String,
        threshold: f32,
        images: Vec<ImageReport>,
        labels: Vec<String>,
    ) -> Self {
        let identities: Vec<IdentityReport> = labels
            .into_iter()
            .map(|label| {
                let mut paths: Vec<PathBuf> = Vec::new();
                for image in &images {
                    if image.labels().any(|l| l == label) && !paths.contains(&image.path) {
                        paths.push(image.path.clone());
                    }
                }
                IdentityReport { label, images: paths }
            })
            .collect();

        let untagged = images
            .iter()
            .filter(|i| i.labels().next().is_none())
            .map(|i| i.path.clone())
            .collect();

        let summary = Summary {
            images: images.len(),
            failed_images: images.iter().filter(|i| i.error.is_some()).count(),
            faces: images.iter().map(|i| i.faces.len()).sum(),
            failed_faces: images
                .iter()
                .flat_map(|i| &i.faces)
                .filter(|f| f.error.is_some())
                .count(),
            identities: identities.len(),
        };

        Self {
            run_id,
            started_at,
            finished_at: Utc::now(),
            model,
            threshold,
            images,
            identities,
            untagged,
            summary,
        }
    }
}
