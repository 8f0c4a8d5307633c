//! Deterministic segmentation backend for tests, benchmarks and dry runs
//!
//! Produces a soft circular mask (or a caller-supplied mask) without a model
//! file. Clones share the call history, so a test can keep a handle after
//! moving the backend into an extractor.

use crate::error::{OverlayError, Result};
use crate::inference::SegmentationBackend;
use crate::mask::MaskTensor;
use crate::preprocessing::PreprocessingConfig;
use crate::progress::{ExtractionStage, ProgressReporter, ProgressUpdate};
use instant::{Duration, Instant};
use ndarray::Array4;
use std::sync::{Arc, Mutex};

/// Mock segmentation backend
#[derive(Debug, Clone)]
pub struct MockSegmentationBackend {
    loaded: bool,
    preprocessing: PreprocessingConfig,
    fixed_mask: Option<MaskTensor>,
    delay: Option<Duration>,
    fail_load: bool,
    fail_inference: bool,
    call_history: Arc<Mutex<Vec<String>>>,
}

impl MockSegmentationBackend {
    /// Mock with a 64x64 model input and a circular mask
    #[must_use]
    pub fn new() -> Self {
        Self {
            loaded: false,
            preprocessing: PreprocessingConfig {
                target_size: [64, 64],
                ..PreprocessingConfig::isnet_anime()
            },
            fixed_mask: None,
            delay: None,
            fail_load: false,
            fail_inference: false,
            call_history: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Model input size reported through [`SegmentationBackend::preprocessing_config`]
    #[must_use]
    pub fn with_input_size(mut self, width: u32, height: u32) -> Self {
        self.preprocessing.target_size = [width, height];
        self
    }

    /// Always return `mask` from inference
    #[must_use]
    pub fn with_mask(mut self, mask: MaskTensor) -> Self {
        self.fixed_mask = Some(mask);
        self
    }

    /// Sleep this long inside `load` and `infer`
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    #[must_use]
    pub fn failing_load() -> Self {
        Self {
            fail_load: true,
            ..Self::new()
        }
    }

    #[must_use]
    pub fn failing_inference() -> Self {
        Self {
            fail_inference: true,
            ..Self::new()
        }
    }

    /// Method names in call order, shared across clones
    #[must_use]
    pub fn call_history(&self) -> Vec<String> {
        self.call_history
            .lock()
            .map(|history| history.clone())
            .unwrap_or_default()
    }

    /// Number of `load` calls that actually loaded
    #[must_use]
    pub fn load_count(&self) -> usize {
        self.call_history()
            .iter()
            .filter(|call| call.as_str() == "load")
            .count()
    }

    fn record_call(&self, method: &str) {
        if let Ok(mut history) = self.call_history.lock() {
            history.push(method.to_string());
        }
    }

    fn simulate_work(&self) {
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
    }

    /// Soft disc centred in the mask, radius a third of the short side
    fn circular_mask(width: usize, height: usize) -> Result<MaskTensor> {
        let center_x = width as f32 / 2.0;
        let center_y = height as f32 / 2.0;
        let radius = (width.min(height) as f32 / 3.0).max(1.0);

        let mut data = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                let dx = x as f32 + 0.5 - center_x;
                let dy = y as f32 + 0.5 - center_y;
                let distance = (dx * dx + dy * dy).sqrt();
                data.push(((radius - distance) / radius * 2.0).clamp(0.0, 1.0));
            }
        }
        MaskTensor::new(data, vec![1, 1, height, width])
    }
}

impl Default for MockSegmentationBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SegmentationBackend for MockSegmentationBackend {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn load(&mut self, reporter: &dyn ProgressReporter) -> Result<Option<Duration>> {
        if self.loaded {
            return Ok(None);
        }

        let start = Instant::now();
        self.record_call("load");
        reporter.report_progress(ProgressUpdate::new(ExtractionStage::ModelLoading, start));
        self.simulate_work();

        if self.fail_load {
            return Err(OverlayError::model_load("Mock backend failed to load"));
        }

        self.loaded = true;
        Ok(Some(start.elapsed()))
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<MaskTensor> {
        self.record_call("infer");

        if !self.loaded {
            return Err(OverlayError::inference("Mock backend not loaded"));
        }
        self.simulate_work();
        if self.fail_inference {
            return Err(OverlayError::inference("Mock backend inference failed"));
        }

        if let Some(mask) = &self.fixed_mask {
            return Ok(mask.clone());
        }

        let (_, _, height, width) = input.dim();
        Self::circular_mask(width, height)
    }

    fn is_loaded(&self) -> bool {
        self.loaded
    }

    fn preprocessing_config(&self) -> PreprocessingConfig {
        self.preprocessing.clone()
    }
}
