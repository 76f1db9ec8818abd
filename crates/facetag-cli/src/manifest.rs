//! Detection manifest: the images to tag and what the external detector found in them.

use facetag_core::{BoundingBox, Detection, Orientation};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("failed to read manifest {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid manifest: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub images: Vec<ImageEntry>,
}

/// One source image and its detected faces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageEntry {
    pub path: PathBuf,
    /// Clockwise rotation that presents the image upright.
    #[serde(default)]
    pub rotation_degrees: f32,
    #[serde(default)]
    pub mirrored: bool,
    #[serde(default)]
    pub faces: Vec<FaceEntry>,
}

/// A detector box, in the image's rotated-then-mirrored frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceEntry {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
    #[serde(default)]
    pub confidence: Option<f32>,
    /// Per-face override of the image rotation.
    #[serde(default)]
    pub rotation_degrees: Option<f32>,
    /// Per-face override of the image mirror flag.
    #[serde(default)]
    pub mirrored: Option<bool>,
}

impl ImageEntry {
    pub fn orientation(&self) -> Orientation {
        Orientation::new(self.rotation_degrees, self.mirrored)
    }

    pub fn detections(&self) -> Vec<Detection> {
        self.faces.iter().map(|f| f.detection(self.orientation())).collect()
    }
}

impl FaceEntry {
    pub fn detection(&self, image_orientation: Orientation) -> Detection {
        Detection {
            bbox: BoundingBox::new(self.left, self.top, self.right, self.bottom),
            orientation: Orientation::new(
                self.rotation_degrees.unwrap_or(image_orientation.rotation_degrees),
                self.mirrored.unwrap_or(image_orientation.mirrored),
            ),
        }
    }
}

impl Manifest {
    /// Read a manifest file; relative image paths resolve against its directory.
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let text = std::fs::read_to_string(path).map_err(|source| ManifestError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_json(&text, base_dir)
    }

    pub fn from_json(text: &str, base_dir: &Path) -> Result<Self, ManifestError> {
        let mut manifest: Manifest = serde_json::from_str(text)?;
        for image in &mut manifest.images {
            if image.path.is_relative() {
                image.path = base_dir.join(&image.path);
            }
        }
        Ok(manifest)
    }

    pub fn face_count(&self) -> usize {
        self.images.iter().map(|i| i.faces.len()).sum()
    }
}
