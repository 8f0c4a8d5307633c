//! Tight bounding box of the non-transparent pixels of a cut-out

use image::{imageops, RgbaImage};
use serde::{Deserialize, Serialize};

/// Padding added on every side of the detected content
pub const DEFAULT_PADDING: u32 = 5;

/// Integer rectangle in cut-out pixel space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    #[must_use]
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Box covering a whole image
    #[must_use]
    pub fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    #[must_use]
    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    /// Copy the boxed region out of `image`
    #[must_use]
    pub fn crop(&self, image: &RgbaImage) -> RgbaImage {
        imageops::crop_imm(image, self.x, self.y, self.width, self.height).to_image()
    }
}

/// Find the padded extent of all pixels with alpha > 0
///
/// Padding is clamped to `[0, dimension - 1]` on each axis. Returns `None`
/// when no pixel is visible.
#[must_use]
pub fn find_content_bounds(image: &RgbaImage, padding: u32) -> Option<BoundingBox> {
    let (width, height) = image.dimensions();
    let mut min_x = u32::MAX;
    let mut min_y = u32::MAX;
    let mut max_x = 0u32;
    let mut max_y = 0u32;
    let mut found = false;

    for (x, y, pixel) in image.enumerate_pixels() {
        if pixel.0[3] > 0 {
            found = true;
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }
    }

    if !found {
        return None;
    }

    let min_x = min_x.saturating_sub(padding);
    let min_y = min_y.saturating_sub(padding);
    let max_x = max_x.saturating_add(padding).min(width - 1);
    let max_y = max_y.saturating_add(padding).min(height - 1);

    Some(BoundingBox::new(
        min_x,
        min_y,
        max_x - min_x + 1,
        max_y - min_y + 1,
    ))
}

/// [`find_content_bounds`], falling back to the full image when the cut-out
/// is entirely transparent
#[must_use]
pub fn content_bounds_or_full(image: &RgbaImage, padding: u32) -> BoundingBox {
    find_content_bounds(image, padding).unwrap_or_else(|| {
        log::warn!(
            "No visible pixels in {}x{} cut-out, using full image bounds",
            image.width(),
            image.height()
        );
        BoundingBox::full(image.width(), image.height())
    })
}
