//! Progress reporting for model loading and character extraction
//!
//! Keeps progress concerns out of the extraction pipeline so the CLI and
//! tests can observe stages without the library printing anything itself.

use instant::Instant;
use serde::{Deserialize, Serialize};

/// Stages of a local extraction run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtractionStage {
    /// Reading the model and building the inference session
    ModelLoading,
    /// Resizing and normalising the screenshot
    Preprocessing,
    /// Running the segmentation model
    Inference,
    /// Writing the mask into the alpha channel
    MaskApplication,
    /// Scanning the cut-out for its bounding box
    BoundsDetection,
    Completed,
}

impl ExtractionStage {
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::ModelLoading => "Loading segmentation model",
            Self::Preprocessing => "Preprocessing screenshot",
            Self::Inference => "Running segmentation",
            Self::MaskApplication => "Applying mask",
            Self::BoundsDetection => "Detecting character bounds",
            Self::Completed => "Extraction completed",
        }
    }

    #[must_use]
    pub fn progress_percentage(&self) -> u8 {
        match self {
            Self::ModelLoading => 5,
            Self::Preprocessing => 30,
            Self::Inference => 40,
            Self::MaskApplication => 85,
            Self::BoundsDetection => 95,
            Self::Completed => 100,
        }
    }
}

/// Progress update with timing information
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    pub stage: ExtractionStage,
    /// Progress percentage (0-100)
    pub progress: u8,
    pub description: String,
    /// Elapsed time since the operation started (milliseconds)
    pub elapsed_ms: u64,
}

impl ProgressUpdate {
    #[must_use]
    pub fn new(stage: ExtractionStage, start_time: Instant) -> Self {
        Self {
            progress: stage.progress_percentage(),
            description: stage.description().to_string(),
            elapsed_ms: start_time.elapsed().as_millis() as u64,
            stage,
        }
    }

    /// Progress update with a custom message, e.g. a model path
    #[must_use]
    pub fn with_description(stage: ExtractionStage, description: String, start_time: Instant) -> Self {
        Self {
            progress: stage.progress_percentage(),
            elapsed_ms: start_time.elapsed().as_millis() as u64,
            stage,
            description,
        }
    }
}

/// Timing breakdown of one extraction
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionTimings {
    /// Model load time, only on the run that loaded it
    pub model_load_ms: Option<u64>,
    pub preprocessing_ms: u64,
    pub inference_ms: u64,
    pub postprocessing_ms: u64,
    pub total_ms: u64,
}

/// Receives progress from long-running operations
pub trait ProgressReporter: Send + Sync {
    fn report_progress(&self, update: ProgressUpdate);

    fn report_completion(&self, timings: &ExtractionTimings);

    fn report_error(&self, stage: ExtractionStage, error: &str);
}

/// Discards all progress updates
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpProgressReporter;

impl ProgressReporter for NoOpProgressReporter {
    fn report_progress(&self, _update: ProgressUpdate) {}

    fn report_completion(&self, _timings: &ExtractionTimings) {}

    fn report_error(&self, _stage: ExtractionStage, _error: &str) {}
}

/// Logs progress through the `log` facade
#[derive(Debug, Clone, Copy)]
pub struct ConsoleProgressReporter {
    verbose: bool,
}

impl ConsoleProgressReporter {
    #[must_use]
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl ProgressReporter for ConsoleProgressReporter {
    fn report_progress(&self, update: ProgressUpdate) {
        if self.verbose {
            log::info!(
                "[{}%] {} ({}ms elapsed)",
                update.progress,
                update.description,
                update.elapsed_ms
            );
        } else {
            log::info!("[{}%] {}", update.progress, update.description);
        }
    }

    fn report_completion(&self, timings: &ExtractionTimings) {
        log::info!("Extraction completed in {}ms", timings.total_ms);
        if self.verbose {
            if let Some(load) = timings.model_load_ms {
                log::info!("  model load: {load}ms");
            }
            log::info!("  preprocessing: {}ms", timings.preprocessing_ms);
            log::info!("  inference: {}ms", timings.inference_ms);
            log::info!("  postprocessing: {}ms", timings.postprocessing_ms);
        }
    }

    fn report_error(&self, stage: ExtractionStage, error: &str) {
        log::error!("Error during {}: {error}", stage.description());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_percentages_increase() {
        let stages = [
            ExtractionStage::ModelLoading,
            ExtractionStage::Preprocessing,
            ExtractionStage::Inference,
            ExtractionStage::MaskApplication,
            ExtractionStage::BoundsDetection,
            ExtractionStage::Completed,
        ];
        for pair in stages.windows(2) {
            assert!(pair[0].progress_percentage() < pair[1].progress_percentage());
        }
    }

    #[test]
    fn test_progress_update_uses_stage_defaults() {
        let update = ProgressUpdate::new(ExtractionStage::Inference, Instant::now());
        assert_eq!(update.progress, 40);
        assert_eq!(update.description, "Running segmentation");

        let custom = ProgressUpdate::with_description(
            ExtractionStage::ModelLoading,
            "Loading model.onnx".into(),
            Instant::now(),
        );
        assert_eq!(custom.description, "Loading model.onnx");
    }
}
