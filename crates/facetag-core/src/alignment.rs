//! Face alignment: orientation correction, crop, and resize.
//!
//! Turns a detected face region into the 112×112 RGB crop the embedding
//! model consumes. The source is rotated clockwise and then mirrored, the
//! (optionally padded) bounding box is cut out of the oriented frame with a
//! white background wherever the box leaves the image, and the crop is
//! stretched to the square input size.

use crate::types::{BoundingBox, Orientation};
use crate::ALIGNED_SIZE;
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Fill color for crop areas that fall outside the source image.
pub const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);

/// Rotations within this many degrees of a right angle are treated as exact.
const RIGHT_ANGLE_EPSILON: f32 = 1e-3;

/// Upper bound on either side of a crop, in pixels.
const MAX_CROP_SIDE: f32 = 16_384.0;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AlignmentError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("invalid region: {0}")]
    InvalidRegion(String),
}

/// Interpolation used when stretching the crop to the model input size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResizeFilter {
    Nearest,
    #[default]
    Triangle,
    CatmullRom,
    Gaussian,
    Lanczos3,
}

impl ResizeFilter {
    fn filter_type(self) -> FilterType {
        match self {
            ResizeFilter::Nearest => FilterType::Nearest,
            ResizeFilter::Triangle => FilterType::Triangle,
            ResizeFilter::CatmullRom => FilterType::CatmullRom,
            ResizeFilter::Gaussian => FilterType::Gaussian,
            ResizeFilter::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

impl FromStr for ResizeFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "nearest" => Ok(ResizeFilter::Nearest),
            "triangle" | "bilinear" => Ok(ResizeFilter::Triangle),
            "catmull-rom" | "catmullrom" => Ok(ResizeFilter::CatmullRom),
            "gaussian" => Ok(ResizeFilter::Gaussian),
            "lanczos3" => Ok(ResizeFilter::Lanczos3),
            other => Err(format!(
                "unknown resize filter '{other}' (expected nearest, triangle, catmull-rom, gaussian or lanczos3)"
            )),
        }
    }
}

impl fmt::Display for ResizeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResizeFilter::Nearest => "nearest",
            ResizeFilter::Triangle => "triangle",
            ResizeFilter::CatmullRom => "catmull-rom",
            ResizeFilter::Gaussian => "gaussian",
            ResizeFilter::Lanczos3 => "lanczos3",
        };
        f.write_str(name)
    }
}

/// Geometric preparation settings shared by every face of a run.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Preprocessor {
    /// Pixels added to every side of the detector's box before cropping.
    pub padding: u32,
    pub filter: ResizeFilter,
}

impl Preprocessor {
    pub fn new(padding: u32, filter: ResizeFilter) -> Self {
        Self { padding, filter }
    }

    /// Produce the aligned 112×112 face for one detection.
    ///
    /// `bbox` must be expressed in the rotated-then-mirrored frame.
    pub fn prepare_face(
        &self,
        image: &RgbImage,
        orientation: Orientation,
        bbox: &BoundingBox,
    ) -> Result<RgbImage, AlignmentError> {
        let oriented = orient(image, orientation)?;
        let cropped = crop_with_background(&oriented, &bbox.expand(self.padding))?;

        tracing::trace!(
            src_width = image.width(),
            src_height = image.height(),
            rotation = orientation.rotation_degrees,
            mirrored = orientation.mirrored,
            crop_width = cropped.width(),
            crop_height = cropped.height(),
            "face region prepared"
        );

        Ok(resize_to_aligned(&cropped, self.filter))
    }
}

fn check_input(image: &RgbImage) -> Result<(), AlignmentError> {
    if image.width() == 0 || image.height() == 0 {
        return Err(AlignmentError::InvalidInput(format!(
            "source image is empty ({}x{})",
            image.width(),
            image.height()
        )));
    }
    Ok(())
}

/// Rotate clockwise by `orientation.rotation_degrees`, then mirror if requested.
///
/// Right angles are exact pixel permutations; 90° and 270° swap width and
/// height. Any other angle grows the canvas to the rotated bounds and fills
/// the uncovered corners with [`BACKGROUND`].
pub fn orient(image: &RgbImage, orientation: Orientation) -> Result<RgbImage, AlignmentError> {
    check_input(image)?;

    let degrees = orientation.rotation_degrees;
    if !degrees.is_finite() {
        return Err(AlignmentError::InvalidInput(format!(
            "rotation is not a finite angle: {degrees}"
        )));
    }

    let rotated = rotate_clockwise(image, degrees.rem_euclid(360.0));
    if orientation.mirrored {
        Ok(imageops::flip_horizontal(&rotated))
    } else {
        Ok(rotated)
    }
}

fn rotate_clockwise(image: &RgbImage, degrees: f32) -> RgbImage {
    let quarters = (degrees / 90.0).round();
    if (degrees - quarters * 90.0).abs() < RIGHT_ANGLE_EPSILON {
        // rem_euclid may yield 360.0 for tiny negative inputs, hence the % 4.
        match quarters as u32 % 4 {
            0 => image.clone(),
            1 => imageops::rotate90(image),
            2 => imageops::rotate180(image),
            _ => imageops::rotate270(image),
        }
    } else {
        rotate_arbitrary(image, degrees)
    }
}

/// Rotate about the image center by an arbitrary angle with bilinear sampling.
fn rotate_arbitrary(image: &RgbImage, degrees: f32) -> RgbImage {
    let (w, h) = (image.width() as f32, image.height() as f32);
    let (sin, cos) = degrees.to_radians().sin_cos();

    // Rotated bounds, rounded out; the epsilon absorbs trig noise.
    let out_w = (w * cos.abs() + h * sin.abs() - 1e-3).ceil().max(1.0) as u32;
    let out_h = (w * sin.abs() + h * cos.abs() - 1e-3).ceil().max(1.0) as u32;

    let (cx, cy) = (w / 2.0, h / 2.0);
    let (ocx, ocy) = (out_w as f32 / 2.0, out_h as f32 / 2.0);

    RgbImage::from_fn(out_w, out_h, |ox, oy| {
        let dx = ox as f32 + 0.5 - ocx;
        let dy = oy as f32 + 0.5 - ocy;
        // Inverse of the clockwise rotation (y axis points down).
        let sx = cos * dx + sin * dy + cx;
        let sy = -sin * dx + cos * dy + cy;
        sample_bilinear(image, sx - 0.5, sy - 0.5)
    })
}

fn sample_bilinear(image: &RgbImage, x: f32, y: f32) -> Rgb<u8> {
    let x0 = x.floor() as i64;
    let y0 = y.floor() as i64;
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let at = |px: i64, py: i64| -> [f32; 3] {
        let inside = px >= 0
            && py >= 0
            && px < i64::from(image.width())
            && py < i64::from(image.height());
        let p = if inside {
            image.get_pixel(px as u32, py as u32).0
        } else {
            BACKGROUND.0
        };
        [p[0] as f32, p[1] as f32, p[2] as f32]
    };

    let tl = at(x0, y0);
    let tr = at(x0 + 1, y0);
    let bl = at(x0, y0 + 1);
    let br = at(x0 + 1, y0 + 1);

    let mut out = [0u8; 3];
    for c in 0..3 {
        let val = tl[c] * (1.0 - fx) * (1.0 - fy)
            + tr[c] * fx * (1.0 - fy)
            + bl[c] * (1.0 - fx) * fy
            + br[c] * fx * fy;
        out[c] = val.round().clamp(0.0, 255.0) as u8;
    }
    Rgb(out)
}

/// Cut `region` out of `image`, filling anything outside the image with [`BACKGROUND`].
///
/// The output is `ceil(width) × ceil(height)` anchored at
/// `(floor(left), floor(top))`. The region only has to overlap the image;
/// a region with no positive-area overlap is rejected.
pub fn crop_with_background(image: &RgbImage, region: &BoundingBox) -> Result<RgbImage, AlignmentError> {
    check_input(image)?;

    if !region.is_finite() {
        return Err(AlignmentError::InvalidRegion(format!(
            "box has non-finite coordinates: {region:?}"
        )));
    }

    let (w, h) = (image.width() as f32, image.height() as f32);
    let visible_w = region.right.min(w) - region.left.max(0.0);
    let visible_h = region.bottom.min(h) - region.top.max(0.0);
    if visible_w <= 0.0 || visible_h <= 0.0 {
        return Err(AlignmentError::InvalidRegion(format!(
            "box ({}, {})-({}, {}) has no area inside the {}x{} image",
            region.left,
            region.top,
            region.right,
            region.bottom,
            image.width(),
            image.height()
        )));
    }

    let crop_w = region.width().ceil();
    let crop_h = region.height().ceil();
    if crop_w > MAX_CROP_SIDE || crop_h > MAX_CROP_SIDE {
        return Err(AlignmentError::InvalidRegion(format!(
            "box {crop_w}x{crop_h} exceeds the {MAX_CROP_SIDE} pixel crop limit"
        )));
    }

    let mut canvas = RgbImage::from_pixel(crop_w as u32, crop_h as u32, BACKGROUND);
    imageops::replace(
        &mut canvas,
        image,
        -(region.left.floor() as i64),
        -(region.top.floor() as i64),
    );
    Ok(canvas)
}

/// Stretch to 112×112 with independent horizontal and vertical scale factors.
pub fn resize_to_aligned(image: &RgbImage, filter: ResizeFilter) -> RgbImage {
    if image.width() == ALIGNED_SIZE && image.height() == ALIGNED_SIZE {
        return image.clone();
    }
    imageops::resize(image, ALIGNED_SIZE, ALIGNED_SIZE, filter.filter_type())
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLACK: Rgb<u8> = Rgb([0, 0, 0]);

    /// Each pixel encodes its own coordinates so permutations can be checked exactly.
    fn coordinate_image(w: u32, h: u32) -> RgbImage {
        RgbImage::from_fn(w, h, |x, y| Rgb([x as u8, y as u8, 7]))
    }

    fn gradient_image(w: u32, h: u32) -> RgbImage {
        RgbImage::from_fn(w, h, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
        })
    }

    #[test]
    fn test_orient_upright_is_unchanged() {
        let img = coordinate_image(4, 3);
        let out = orient(&img, Orientation::upright()).unwrap();
        assert_eq!(out, img);
    }

    #[test]
    fn test_rotate_90_swaps_dimensions_clockwise() {
        // 2x1 [A, B] rotated clockwise becomes 1x2 with A on top.
        let img = coordinate_image(2, 1);
        let out = orient(&img, Orientation::new(90.0, false)).unwrap();
        assert_eq!(out.dimensions(), (1, 2));
        assert_eq!(out.get_pixel(0, 0), img.get_pixel(0, 0));
        assert_eq!(out.get_pixel(0, 1), img.get_pixel(1, 0));
    }

    #[test]
    fn test_rotate_180_and_270() {
        let img = coordinate_image(3, 2);
        let r180 = orient(&img, Orientation::new(180.0, false)).unwrap();
        assert_eq!(r180.dimensions(), (3, 2));
        assert_eq!(r180.get_pixel(0, 0), img.get_pixel(2, 1));

        let r270 = orient(&img, Orientation::new(270.0, false)).unwrap();
        assert_eq!(r270.dimensions(), (2, 3));
        // Counter-clockwise quarter turn: top-left comes from the top-right.
        assert_eq!(r270.get_pixel(0, 0), img.get_pixel(2, 0));
    }

    #[test]
    fn test_rotation_degrees_are_reduced_modulo_360() {
        let img = coordinate_image(3, 2);
        let r90 = orient(&img, Orientation::new(90.0, false)).unwrap();
        assert_eq!(orient(&img, Orientation::new(450.0, false)).unwrap(), r90);
        assert_eq!(orient(&img, Orientation::new(-270.0, false)).unwrap(), r90);
        assert_eq!(orient(&img, Orientation::new(360.0, false)).unwrap(), img);
    }

    #[test]
    fn test_rotate_then_mirror_order() {
        // Rotating 90° clockwise and then mirroring is a transpose.
        // Mirroring first would give the anti-transpose instead.
        let img = coordinate_image(3, 2);
        let out = orient(&img, Orientation::new(90.0, true)).unwrap();
        assert_eq!(out.dimensions(), (2, 3));
        for y in 0..3 {
            for x in 0..2 {
                assert_eq!(out.get_pixel(x, y), img.get_pixel(y, x), "at ({x}, {y})");
            }
        }
    }

    #[test]
    fn test_mirror_only() {
        let img = coordinate_image(3, 2);
        let out = orient(&img, Orientation::new(0.0, true)).unwrap();
        assert_eq!(out.get_pixel(0, 0), img.get_pixel(2, 0));
        assert_eq!(out.get_pixel(2, 1), img.get_pixel(0, 1));
    }

    #[test]
    fn test_arbitrary_rotation_expands_canvas_with_background() {
        let img = RgbImage::from_pixel(100, 100, Rgb([100, 100, 100]));
        let out = orient(&img, Orientation::new(45.0, false)).unwrap();
        // 100 * (cos 45 + sin 45) ≈ 141.42 → 142
        assert_eq!(out.dimensions(), (142, 142));
        assert_eq!(*out.get_pixel(0, 0), BACKGROUND);
        assert_eq!(*out.get_pixel(141, 141), BACKGROUND);
        assert_eq!(*out.get_pixel(71, 71), Rgb([100, 100, 100]));
    }

    #[test]
    fn test_non_finite_rotation_is_invalid_input() {
        let img = coordinate_image(2, 2);
        let err = orient(&img, Orientation::new(f32::NAN, false)).unwrap_err();
        assert!(matches!(err, AlignmentError::InvalidInput(_)));
    }

    #[test]
    fn test_empty_source_is_invalid_input() {
        let img = RgbImage::new(0, 0);
        let err = Preprocessor::default()
            .prepare_face(&img, Orientation::upright(), &BoundingBox::new(0.0, 0.0, 1.0, 1.0))
            .unwrap_err();
        assert!(matches!(err, AlignmentError::InvalidInput(_)));
    }

    #[test]
    fn test_crop_inside_copies_pixels() {
        let img = coordinate_image(10, 10);
        let out = crop_with_background(&img, &BoundingBox::new(2.0, 3.0, 6.0, 8.0)).unwrap();
        assert_eq!(out.dimensions(), (4, 5));
        assert_eq!(out.get_pixel(0, 0), img.get_pixel(2, 3));
        assert_eq!(out.get_pixel(3, 4), img.get_pixel(5, 7));
    }

    #[test]
    fn test_crop_pads_top_left_with_white() {
        let img = RgbImage::from_pixel(100, 100, BLACK);
        let out = crop_with_background(&img, &BoundingBox::new(-10.0, -10.0, 40.0, 40.0)).unwrap();
        assert_eq!(out.dimensions(), (50, 50));
        assert_eq!(*out.get_pixel(0, 0), BACKGROUND);
        assert_eq!(*out.get_pixel(9, 9), BACKGROUND);
        assert_eq!(*out.get_pixel(5, 30), BACKGROUND);
        assert_eq!(*out.get_pixel(30, 5), BACKGROUND);
        assert_eq!(*out.get_pixel(10, 10), BLACK);
        assert_eq!(*out.get_pixel(49, 49), BLACK);
    }

    #[test]
    fn test_crop_pads_bottom_right_with_white() {
        let img = RgbImage::from_pixel(100, 100, BLACK);
        let out = crop_with_background(&img, &BoundingBox::new(80.0, 80.0, 120.0, 120.0)).unwrap();
        assert_eq!(out.dimensions(), (40, 40));
        assert_eq!(*out.get_pixel(19, 19), BLACK);
        assert_eq!(*out.get_pixel(20, 20), BACKGROUND);
        assert_eq!(*out.get_pixel(39, 0), BACKGROUND);
        assert_eq!(*out.get_pixel(0, 39), BACKGROUND);
    }

    #[test]
    fn test_crop_fractional_box_rounds_out() {
        let img = coordinate_image(30, 30);
        let out = crop_with_background(&img, &BoundingBox::new(10.5, 10.5, 20.2, 20.2)).unwrap();
        assert_eq!(out.dimensions(), (10, 10));
        assert_eq!(out.get_pixel(0, 0), img.get_pixel(10, 10));
    }

    #[test]
    fn test_crop_outside_image_is_invalid_region() {
        let img = coordinate_image(10, 10);
        for region in [
            BoundingBox::new(20.0, 20.0, 30.0, 30.0),
            BoundingBox::new(-30.0, 0.0, -5.0, 5.0),
            BoundingBox::new(10.0, 0.0, 15.0, 5.0),
        ] {
            let err = crop_with_background(&img, &region).unwrap_err();
            assert!(matches!(err, AlignmentError::InvalidRegion(_)), "{region:?}");
        }
    }

    #[test]
    fn test_crop_degenerate_boxes_are_invalid_region() {
        let img = coordinate_image(10, 10);
        for region in [
            BoundingBox::new(5.0, 2.0, 5.0, 8.0),
            BoundingBox::new(2.0, 5.0, 8.0, 5.0),
            BoundingBox::new(8.0, 2.0, 2.0, 8.0),
            BoundingBox::new(0.0, 0.0, f32::INFINITY, 5.0),
        ] {
            let err = crop_with_background(&img, &region).unwrap_err();
            assert!(matches!(err, AlignmentError::InvalidRegion(_)), "{region:?}");
        }
    }

    #[test]
    fn test_resize_is_non_uniform() {
        let img = gradient_image(200, 50);
        for filter in [ResizeFilter::Nearest, ResizeFilter::Triangle, ResizeFilter::Lanczos3] {
            let out = resize_to_aligned(&img, filter);
            assert_eq!(out.dimensions(), (ALIGNED_SIZE, ALIGNED_SIZE));
        }
    }

    #[test]
    fn test_scenario_400x300_crop_then_resize() {
        let img = gradient_image(400, 300);
        let bbox = BoundingBox::new(100.0, 50.0, 300.0, 250.0);

        let cropped = crop_with_background(&img, &bbox).unwrap();
        assert_eq!(cropped.dimensions(), (200, 200));
        assert_eq!(cropped.get_pixel(0, 0), img.get_pixel(100, 50));

        let aligned = Preprocessor::default()
            .prepare_face(&img, Orientation::upright(), &bbox)
            .unwrap();
        assert_eq!(aligned.dimensions(), (ALIGNED_SIZE, ALIGNED_SIZE));
    }

    #[test]
    fn test_padding_expands_crop() {
        let img = RgbImage::from_pixel(400, 300, BLACK);
        let bbox = BoundingBox::new(100.0, 50.0, 300.0, 250.0);
        let pre = Preprocessor::new(10, ResizeFilter::Nearest);
        let cropped = crop_with_background(&img, &bbox.expand(pre.padding)).unwrap();
        assert_eq!(cropped.dimensions(), (220, 220));

        // Padding past the edge still produces a full-size crop.
        let edge = BoundingBox::new(0.0, 0.0, 50.0, 50.0).expand(pre.padding);
        let cropped = crop_with_background(&img, &edge).unwrap();
        assert_eq!(cropped.dimensions(), (70, 70));
        assert_eq!(*cropped.get_pixel(0, 0), BACKGROUND);
        assert_eq!(*cropped.get_pixel(10, 10), BLACK);
    }

    #[test]
    fn test_box_is_interpreted_in_rotated_frame() {
        // 300x100 rotated 90° is 100x300; this box exists only in the rotated frame.
        let img = gradient_image(300, 100);
        let bbox = BoundingBox::new(0.0, 200.0, 100.0, 300.0);
        assert!(crop_with_background(&img, &bbox).is_err());

        let aligned = Preprocessor::default()
            .prepare_face(&img, Orientation::new(90.0, false), &bbox)
            .unwrap();
        assert_eq!(aligned.dimensions(), (ALIGNED_SIZE, ALIGNED_SIZE));
    }

    #[test]
    fn test_prepare_face_is_deterministic() {
        let img = gradient_image(180, 140);
        let bbox = BoundingBox::new(20.0, 10.0, 150.0, 130.0);
        let pre = Preprocessor::new(4, ResizeFilter::CatmullRom);
        let orientation = Orientation::new(30.0, true);
        let a = pre.prepare_face(&img, orientation, &bbox).unwrap();
        let b = pre.prepare_face(&img, orientation, &bbox).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_resize_filter_parse_and_display() {
        assert_eq!("nearest".parse::<ResizeFilter>(), Ok(ResizeFilter::Nearest));
        assert_eq!("Bilinear".parse::<ResizeFilter>(), Ok(ResizeFilter::Triangle));
        assert_eq!("catmull-rom".parse::<ResizeFilter>(), Ok(ResizeFilter::CatmullRom));
        assert!("cubic".parse::<ResizeFilter>().is_err());
        for f in [
            ResizeFilter::Nearest,
            ResizeFilter::Triangle,
            ResizeFilter::CatmullRom,
            ResizeFilter::Gaussian,
            ResizeFilter::Lanczos3,
        ] {
            assert_eq!(f.to_string().parse::<ResizeFilter>(), Ok(f));
        }
    }
}
