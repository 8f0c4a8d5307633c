//! Applying a raw segmentation mask to an image's alpha channel

use crate::error::{OverlayError, Result};
use image::{DynamicImage, RgbaImage};
use ndarray::ArrayViewD;
use serde::{Deserialize, Serialize};

/// Post-scaling value above which a pixel is foreground
pub const MASK_THRESHOLD: f32 = 127.0;

/// Flat mask buffer with its tensor shape
///
/// Accepted shapes are `[H, W]`, `[C, H, W]` and `[N, C, H, W]`; height and
/// width are always the last two dimensions and only the first plane is read.
#[derive(Debug, Clone, PartialEq)]
pub struct MaskTensor {
    data: Vec<f32>,
    shape: Vec<usize>,
}

impl MaskTensor {
    /// # Errors
    /// - Rank outside 2..=4
    /// - Zero-sized height or width
    /// - Buffer length does not match the shape
    pub fn new(data: Vec<f32>, shape: Vec<usize>) -> Result<Self> {
        if !(2..=4).contains(&shape.len()) {
            return Err(OverlayError::inference(format!(
                "Unsupported mask rank {} (shape {shape:?}), expected 2, 3 or 4 dimensions",
                shape.len()
            )));
        }

        let expected: usize = shape.iter().product();
        if expected == 0 {
            return Err(OverlayError::inference(format!("Empty mask shape {shape:?}")));
        }
        if expected != data.len() {
            return Err(OverlayError::inference(format!(
                "Mask buffer has {} values but shape {shape:?} needs {expected}",
                data.len()
            )));
        }

        Ok(Self { data, shape })
    }

    /// Copy a model output tensor
    ///
    /// # Errors
    /// - See [`MaskTensor::new`]
    pub fn from_ndarray(view: &ArrayViewD<'_, f32>) -> Result<Self> {
        Self::new(view.iter().copied().collect(), view.shape().to_vec())
    }

    #[must_use]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    #[must_use]
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Mask height (second to last dimension)
    #[must_use]
    pub fn height(&self) -> usize {
        self.shape.len().checked_sub(2).and_then(|i| self.shape.get(i)).copied().unwrap_or(0)
    }

    /// Mask width (last dimension)
    #[must_use]
    pub fn width(&self) -> usize {
        self.shape.last().copied().unwrap_or(0)
    }

    /// Raw value at mask coordinates in the first plane
    #[must_use]
    pub fn value_at(&self, x: usize, y: usize) -> f32 {
        self.data.get(y * self.width() + x).copied().unwrap_or(0.0)
    }
}

/// Hard-threshold a raw mask value into an alpha value
///
/// Values up to 1.0 are probabilities and are scaled by 255 first.
///
/// ```
/// use pilgrimage_overlay::mask::binarize;
///
/// assert_eq!(binarize(0.6), 255);
/// assert_eq!(binarize(0.49), 0);
/// assert_eq!(binarize(200.0), 255);
/// ```
#[must_use]
pub fn binarize(value: f32) -> u8 {
    let scaled = if value <= 1.0 {
        (value * 255.0).floor()
    } else {
        value
    };
    if scaled > MASK_THRESHOLD {
        255
    } else {
        0
    }
}

/// Write the binarized mask into the alpha channel of `image`
///
/// The mask is sampled nearest-neighbour at the image's native resolution.
/// RGB values are left untouched.
///
/// # Errors
/// - Image has zero width or height
#[tracing::instrument(skip_all, fields(mask = ?mask.shape()))]
pub fn apply_mask(image: &DynamicImage, mask: &MaskTensor) -> Result<RgbaImage> {
    let mut rgba = image.to_rgba8();
    let (width, height) = rgba.dimensions();
    if width == 0 || height == 0 {
        return Err(OverlayError::inference("Cannot apply a mask to an empty image"));
    }

    let mask_width = mask.width();
    let mask_height = mask.height();
    let image_width = width as usize;
    let image_height = height as usize;

    for (x, y, pixel) in rgba.enumerate_pixels_mut() {
        let mask_x = x as usize * mask_width / image_width;
        let mask_y = y as usize * mask_height / image_height;
        pixel.0[3] = binarize(mask.value_at(mask_x, mask_y));
    }

    Ok(rgba)
}

/// Foreground/background split of a cut-out
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaskStatistics {
    pub total_pixels: usize,
    pub foreground_pixels: usize,
    pub background_pixels: usize,
    pub foreground_ratio: f32,
}

impl MaskStatistics {
    /// Count opaque pixels of a binarized cut-out
    #[must_use]
    pub fn from_alpha(image: &RgbaImage) -> Self {
        let total_pixels = image.width() as usize * image.height() as usize;
        let foreground_pixels = image.pixels().filter(|p| p.0[3] > 0).count();
        let foreground_ratio = if total_pixels == 0 {
            0.0
        } else {
            foreground_pixels as f32 / total_pixels as f32
        };

        Self {
            total_pixels,
            foreground_pixels,
            background_pixels: total_pixels - foreground_pixels,
            foreground_ratio,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use ndarray::Array4;

    #[test]
    fn test_binarize_only_produces_binary_alpha() {
        let mut previous = 0u8;
        for step in 0..=1000 {
            let value = step as f32 / 1000.0;
            let alpha = binarize(value);
            assert!(alpha == 0 || alpha == 255);
            assert!(alpha >= previous, "threshold must be monotonic at {value}");
            previous = alpha;
        }
    }

    #[test]
    fn test_binarize_threshold_boundaries() {
        assert_eq!(binarize(0.6), 255);
        // floor(0.5 * 255) = 127 is not above the threshold
        assert_eq!(binarize(0.5), 0);
        assert_eq!(binarize(0.51), 255);
        assert_eq!(binarize(127.0), 0);
        assert_eq!(binarize(128.0), 255);
        assert_eq!(binarize(f32::NAN), 0);
    }

    #[test]
    fn test_mask_shape_validation() {
        assert!(MaskTensor::new(vec![0.0; 4], vec![2, 2]).is_ok());
        assert!(MaskTensor::new(vec![0.0; 4], vec![1, 2, 2]).is_ok());
        assert!(MaskTensor::new(vec![0.0; 4], vec![1, 1, 2, 2]).is_ok());
        assert!(MaskTensor::new(vec![0.0; 4], vec![4]).is_err());
        assert!(MaskTensor::new(vec![0.0; 4], vec![1, 1, 1, 2, 2]).is_err());
        assert!(MaskTensor::new(vec![0.0; 3], vec![2, 2]).is_err());
        assert!(MaskTensor::new(vec![], vec![0, 2]).is_err());
    }

    #[test]
    fn test_dimensions_are_last_two_axes() {
        let mask = MaskTensor::new(vec![0.0; 2 * 3 * 5], vec![2, 3, 5]).unwrap();
        assert_eq!(mask.height(), 3);
        assert_eq!(mask.width(), 5);
    }

    #[test]
    fn test_apply_mask_upscales_nearest_neighbour() {
        // 2x2 mask: left column foreground, right column background
        let mask = MaskTensor::new(vec![0.9, 0.1, 0.8, 0.0], vec![1, 1, 2, 2]).unwrap();
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(6, 4, Rgb([10, 20, 30])));

        let cutout = apply_mask(&image, &mask).unwrap();
        assert_eq!(cutout.dimensions(), (6, 4));
        for (x, _, pixel) in cutout.enumerate_pixels() {
            let expected = if x < 3 { 255 } else { 0 };
            assert_eq!(pixel.0, [10, 20, 30, expected]);
        }
    }

    #[test]
    fn test_apply_mask_downscales_with_floor_mapping() {
        let mut data = vec![0.0f32; 16];
        // mask (x=2, y=2) in a 4x4 grid maps to image pixel (1, 1) of a 2x2 image
        data[2 * 4 + 2] = 1.0;
        let mask = MaskTensor::new(data, vec![4, 4]).unwrap();
        let image = DynamicImage::ImageRgb8(RgbImage::new(2, 2));

        let cutout = apply_mask(&image, &mask).unwrap();
        assert_eq!(cutout.get_pixel(1, 1).0[3], 255);
        assert_eq!(cutout.get_pixel(0, 0).0[3], 0);
        assert_eq!(cutout.get_pixel(1, 0).0[3], 0);
    }

    #[test]
    fn test_from_ndarray_and_statistics() {
        let mut array = Array4::<f32>::zeros((1, 1, 4, 4));
        array[[0, 0, 0, 0]] = 1.0;
        array[[0, 0, 3, 3]] = 250.0;
        let mask = MaskTensor::from_ndarray(&array.view().into_dyn()).unwrap();
        assert_eq!(mask.shape(), &[1, 1, 4, 4]);

        let image = DynamicImage::ImageRgb8(RgbImage::new(4, 4));
        let cutout = apply_mask(&image, &mask).unwrap();
        let stats = MaskStatistics::from_alpha(&cutout);
        assert_eq!(stats.total_pixels, 16);
        assert_eq!(stats.foreground_pixels, 2);
        assert_eq!(stats.background_pixels, 14);
    }
}
