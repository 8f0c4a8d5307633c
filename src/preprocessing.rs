//! Model input preparation
//!
//! The anime IS-Net export takes a fixed 1024x1024 RGB input normalised with
//! ImageNet statistics in NCHW layout. The source is stretched to the input
//! size; the mask is mapped back to native resolution by the mask applicator.

use crate::error::{OverlayError, Result};
use image::{imageops::FilterType, DynamicImage, RgbImage};
use ndarray::Array4;
use serde::{Deserialize, Serialize};

/// Model input contract
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreprocessingConfig {
    /// Input size `[width, height]`
    pub target_size: [u32; 2],
    /// Per-channel mean (RGB) applied after scaling to 0..1
    pub normalization_mean: [f32; 3],
    /// Per-channel standard deviation (RGB)
    pub normalization_std: [f32; 3],
}

impl PreprocessingConfig {
    /// Contract of the IS-Net anime segmentation model
    #[must_use]
    pub fn isnet_anime() -> Self {
        Self {
            target_size: [1024, 1024],
            normalization_mean: [0.485, 0.456, 0.406],
            normalization_std: [0.229, 0.224, 0.225],
        }
    }
}

impl Default for PreprocessingConfig {
    fn default() -> Self {
        Self::isnet_anime()
    }
}

/// Resize and normalise `image` into a `[1, 3, H, W]` tensor
///
/// # Errors
/// - Empty input image
/// - Zero target size
pub fn preprocess(image: &DynamicImage, config: &PreprocessingConfig) -> Result<Array4<f32>> {
    let [target_width, target_height] = config.target_size;
    if target_width == 0 || target_height == 0 {
        return Err(OverlayError::invalid_config("Model input size must be non-zero"));
    }
    if image.width() == 0 || image.height() == 0 {
        return Err(OverlayError::inference("Cannot preprocess an empty image"));
    }

    let rgb = image.to_rgb8();
    let resized = if rgb.dimensions() == (target_width, target_height) {
        rgb
    } else {
        image::imageops::resize(&rgb, target_width, target_height, FilterType::Triangle)
    };

    Ok(to_tensor(&resized, config))
}

#[allow(clippy::indexing_slicing)]
fn to_tensor(image: &RgbImage, config: &PreprocessingConfig) -> Array4<f32> {
    let (width, height) = image.dimensions();
    let mut tensor = Array4::<f32>::zeros((1, 3, height as usize, width as usize));

    // Safe: tensor allocated from the image dimensions
    for (x, y, pixel) in image.enumerate_pixels() {
        for channel in 0..3 {
            let value = f32::from(pixel.0[channel]) / 255.0;
            tensor[[0, channel, y as usize, x as usize]] = (value
                - config.normalization_mean[channel])
                / config.normalization_std[channel];
        }
    }

    tensor
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_output_shape_is_nchw_at_model_size() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(300, 100, Rgb([255, 0, 0])));
        let tensor = preprocess(&image, &PreprocessingConfig::isnet_anime()).unwrap();
        assert_eq!(tensor.shape(), &[1, 3, 1024, 1024]);
    }

    #[test]
    fn test_imagenet_normalisation() {
        let config = PreprocessingConfig {
            target_size: [4, 4],
            ..PreprocessingConfig::isnet_anime()
        };
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb([255, 0, 255])));
        let tensor = preprocess(&image, &config).unwrap();

        let red = (1.0 - 0.485) / 0.229;
        let green = (0.0 - 0.456) / 0.224;
        let blue = (1.0 - 0.406) / 0.225;
        assert!((tensor[[0, 0, 2, 1]] - red).abs() < 1e-5);
        assert!((tensor[[0, 1, 2, 1]] - green).abs() < 1e-5);
        assert!((tensor[[0, 2, 2, 1]] - blue).abs() < 1e-5);
    }

    #[test]
    fn test_empty_image_is_rejected() {
        let image = DynamicImage::ImageRgb8(RgbImage::new(0, 0));
        assert!(preprocess(&image, &PreprocessingConfig::default()).is_err());
    }
}
