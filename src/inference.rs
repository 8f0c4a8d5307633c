//! Segmentation backend abstraction

use crate::error::Result;
use crate::mask::MaskTensor;
use crate::preprocessing::PreprocessingConfig;
use crate::progress::ProgressReporter;
use ndarray::Array4;

// Use instant crate for cross-platform time compatibility
use instant::Duration;

/// A swappable segmentation model
///
/// `load` is idempotent: once loaded it returns `Ok(None)` without touching
/// the model again. `infer` takes the preprocessed `[1, 3, H, W]` input and
/// returns the model's first output as a mask.
pub trait SegmentationBackend: Send {
    /// Short backend name for logs
    fn name(&self) -> &'static str;

    /// Load the model, returning the load time when work was done
    ///
    /// # Errors
    /// - Model file missing, unreadable or invalid (`ModelLoad`)
    fn load(&mut self, reporter: &dyn ProgressReporter) -> Result<Option<Duration>>;

    /// Run the model on a preprocessed input
    ///
    /// # Errors
    /// - Backend not loaded
    /// - Inference failure or unusable output (`Inference`)
    fn infer(&mut self, input: &Array4<f32>) -> Result<MaskTensor>;

    fn is_loaded(&self) -> bool;

    /// Input contract of the loaded model
    fn preprocessing_config(&self) -> PreprocessingConfig {
        PreprocessingConfig::isnet_anime()
    }
}
