//! Decoding user-supplied images and encoding rendered output
//!
//! Decoding happens once per upload; after that every pane draw reads the
//! cached RGBA pixels.

use crate::error::{OverlayError, Result};
use image::{DynamicImage, ImageFormat, RgbaImage};
use std::path::Path;
use std::sync::Arc;

/// Immutable decoded bitmap with its natural size
///
/// Cloning shares the pixel buffer.
#[derive(Debug, Clone)]
pub struct SourceImage {
    pixels: Arc<RgbaImage>,
}

impl SourceImage {
    /// Wrap an already decoded image
    ///
    /// # Errors
    /// - Image has a zero dimension
    pub fn from_dynamic(image: &DynamicImage) -> Result<Self> {
        Self::from_rgba(image.to_rgba8())
    }

    /// # Errors
    /// - Image has a zero dimension
    pub fn from_rgba(pixels: RgbaImage) -> Result<Self> {
        if pixels.width() == 0 || pixels.height() == 0 {
            return Err(OverlayError::invalid_config(format!(
                "Image must not be empty, got {}x{}",
                pixels.width(),
                pixels.height()
            )));
        }
        Ok(Self {
            pixels: Arc::new(pixels),
        })
    }

    /// Decode encoded image bytes, detecting the format from content
    ///
    /// # Errors
    /// - Unknown or corrupt image data
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let image = image::load_from_memory(bytes)?;
        Self::from_dynamic(&image)
    }

    /// Load an image file
    ///
    /// Falls back to content sniffing when the extension is missing or wrong.
    ///
    /// # Errors
    /// - File missing or unreadable
    /// - Unknown or corrupt image data
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(OverlayError::file_io_error(
                "read image file",
                path,
                &std::io::Error::new(std::io::ErrorKind::NotFound, "file does not exist"),
            ));
        }

        match image::open(path) {
            Ok(image) => Self::from_dynamic(&image),
            Err(e) => {
                log::debug!(
                    "Extension-based loading failed for {}: {e}. Attempting content-based detection.",
                    path.display()
                );
                let data = std::fs::read(path)
                    .map_err(|io_err| OverlayError::file_io_error("read image data", path, &io_err))?;
                Self::decode(&data)
            },
        }
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// Natural width / height
    #[must_use]
    pub fn aspect_ratio(&self) -> f64 {
        f64::from(self.width()) / f64::from(self.height())
    }

    #[must_use]
    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    /// Copy into a [`DynamicImage`] for collaborators that take one
    #[must_use]
    pub fn to_dynamic(&self) -> DynamicImage {
        DynamicImage::ImageRgba8(self.pixels.as_ref().clone())
    }
}

/// Encode RGBA pixels as PNG
///
/// # Errors
/// - PNG encoding failure (e.g. zero-sized image)
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    image
        .write_to(&mut std::io::Cursor::new(&mut buffer), ImageFormat::Png)
        .map_err(|e| OverlayError::internal(format!("Failed to encode PNG: {e}")))?;
    Ok(buffer)
}

/// Write encoded bytes to `path`, creating parent directories
///
/// # Errors
/// - Directory creation or write failure
pub fn write_bytes<P: AsRef<Path>>(path: P, bytes: &[u8]) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| OverlayError::file_io_error("create output directory", parent, &e))?;
    }
    std::fs::write(path, bytes).map_err(|e| OverlayError::file_io_error("write output file", path, &e))
}
