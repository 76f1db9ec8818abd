//! Model input normalization.
//!
//! MobileFaceNet takes a `[1, 112, 112, 3]` NHWC float tensor with every
//! channel mapped through `(v - 128) / 128`.

use crate::ALIGNED_SIZE;
use image::RgbImage;
use ndarray::{Array4, ArrayView4};
use thiserror::Error;

const IMAGE_MEAN: f32 = 128.0;
const IMAGE_STD: f32 = 128.0;
const CHANNELS: usize = 3;

/// Number of floats in one face tensor: 112 × 112 × 3.
pub const TENSOR_LEN: usize = ALIGNED_SIZE as usize * ALIGNED_SIZE as usize * CHANNELS;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TensorError {
    #[error("aligned face must be {expected}x{expected}, got {width}x{height} — resize before normalizing")]
    WrongSize { expected: u32, width: u32, height: u32 },
}

/// Normalized model input for one face.
///
/// Layout is row, then column, then channel (R, G, B), so the flat slice is
/// exactly the sequence the model reads.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceTensor {
    data: Array4<f32>,
}

impl FaceTensor {
    /// NHWC view, `[1, 112, 112, 3]`.
    pub fn view(&self) -> ArrayView4<'_, f32> {
        self.data.view()
    }

    /// Flat values in row-major, column, channel order.
    pub fn as_slice(&self) -> &[f32] {
        // Built with `zeros`, so always in standard layout.
        self.data.as_slice().unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }
}

/// Convert an aligned 112×112 RGB face into the model's input tensor.
pub fn normalize(face: &RgbImage) -> Result<FaceTensor, TensorError> {
    if face.width() != ALIGNED_SIZE || face.height() != ALIGNED_SIZE {
        return Err(TensorError::WrongSize {
            expected: ALIGNED_SIZE,
            width: face.width(),
            height: face.height(),
        });
    }

    let size = ALIGNED_SIZE as usize;
    let mut data = Array4::<f32>::zeros((1, size, size, CHANNELS));

    for (x, y, pixel) in face.enumerate_pixels() {
        for c in 0..CHANNELS {
            data[[0, y as usize, x as usize, c]] = (pixel[c] as f32 - IMAGE_MEAN) / IMAGE_STD;
        }
    }

    Ok(FaceTensor { data })
}
