use serde::{Deserialize, Serialize};

/// Axis-aligned face region in source-image pixel space, as reported by the detector.
///
/// Coordinates are edges, not origin + size: a box covering pixels 10..20
/// horizontally has `left = 10.0`, `right = 20.0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl BoundingBox {
    pub fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self { left, top, right, bottom }
    }

    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    /// Grow the box by `padding` pixels on every side.
    pub fn expand(&self, padding: u32) -> Self {
        let p = padding as f32;
        Self {
            left: self.left - p,
            top: self.top - p,
            right: self.right + p,
            bottom: self.bottom + p,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.left.is_finite() && self.top.is_finite() && self.right.is_finite() && self.bottom.is_finite()
    }
}

/// How the raw image must be transformed to present the face upright.
///
/// Applied as "rotate clockwise, then mirror horizontally". Detector boxes are
/// expressed in the frame produced by that sequence.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Orientation {
    /// Clockwise rotation in degrees. Usually 0/90/180/270, any finite value is accepted.
    pub rotation_degrees: f32,
    /// Flip horizontally about the vertical center axis after rotating.
    pub mirrored: bool,
}

impl Orientation {
    pub fn new(rotation_degrees: f32, mirrored: bool) -> Self {
        Self { rotation_degrees, mirrored }
    }

    /// Identity orientation: no rotation, no mirror.
    pub fn upright() -> Self {
        Self::default()
    }
}

/// One detected face: where it is and how its image is oriented.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub orientation: Orientation,
}

/// Face embedding vector (192-dimensional for MobileFaceNet).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding (e.g., "mobile_face_net").
    pub model_version: Option<String>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values, model_version: None }
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }

    /// Compute Euclidean distance between two embeddings.
    ///
    /// Dimensions beyond the shorter vector are ignored; callers check
    /// dimensionality first.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// A registered identity: its label and the embedding it was registered with.
///
/// The representative embedding is never updated after registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub label: String,
    pub embedding: Embedding,
}

/// Outcome of resolving an embedding against the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub label: String,
    /// Distance to the nearest registered identity before this call, if any existed.
    pub distance: Option<f32>,
    /// Whether this call registered a new identity.
    pub is_new: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_euclidean_distance_identical() {
        let a = Embedding::new(vec![0.3, -0.2, 0.9]);
        assert_eq!(a.euclidean_distance(&a), 0.0);
    }

    #[test]
    fn test_euclidean_distance_3_4_5() {
        let a = Embedding::new(vec![0.0, 0.0]);
        let b = Embedding::new(vec![3.0, 4.0]);
        assert!((a.euclidean_distance(&b) - 5.0).abs() < 1e-6);
        assert!((b.euclidean_distance(&a) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_bbox_expand() {
        let b = BoundingBox::new(10.0, 20.0, 30.0, 50.0).expand(5);
        assert_eq!(b, BoundingBox::new(5.0, 15.0, 35.0, 55.0));
        assert_eq!(b.width(), 30.0);
        assert_eq!(b.height(), 40.0);
    }

    #[test]
    fn test_bbox_expand_zero_is_noop() {
        let b = BoundingBox::new(1.5, 2.5, 3.5, 4.5);
        assert_eq!(b.expand(0), b);
    }

    #[test]
    fn test_bbox_non_finite() {
        assert!(!BoundingBox::new(f32::NAN, 0.0, 1.0, 1.0).is_finite());
        assert!(BoundingBox::new(0.0, 0.0, 1.0, 1.0).is_finite());
    }
}
