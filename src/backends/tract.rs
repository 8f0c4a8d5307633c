//! Tract segmentation backend
//!
//! Pure Rust inference with no native dependencies. Slower than ONNX Runtime
//! but portable to any target the crate builds for.

use crate::error::{OverlayError, Result};
use crate::inference::SegmentationBackend;
use crate::mask::MaskTensor;
use crate::models::ModelManager;
use crate::preprocessing::PreprocessingConfig;
use crate::progress::{ExtractionStage, ProgressReporter, ProgressUpdate};
use instant::{Duration, Instant};
use ndarray::Array4;
use tract_onnx::prelude::*;

type TractModel = RunnableModel<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Tract backend
#[derive(Debug)]
pub struct TractBackend {
    model: Option<TractModel>,
    model_manager: ModelManager,
    preprocessing: PreprocessingConfig,
}

impl TractBackend {
    #[must_use]
    pub fn new(model_manager: ModelManager) -> Self {
        Self {
            model: None,
            model_manager,
            preprocessing: PreprocessingConfig::isnet_anime(),
        }
    }

    fn build_model(&self, model_data: Vec<u8>) -> Result<TractModel> {
        let [width, height] = self.preprocessing.target_size;
        onnx()
            .model_for_read(&mut std::io::Cursor::new(model_data))
            .map_err(|e| OverlayError::model_load(format!("Failed to load ONNX model: {e}")))?
            .with_input_fact(
                0,
                f32::fact([1, 3, height as usize, width as usize]).into(),
            )
            .map_err(|e| OverlayError::model_load(format!("Failed to set input shape: {e}")))?
            .into_optimized()
            .map_err(|e| OverlayError::model_load(format!("Failed to optimize model: {e}")))?
            .into_runnable()
            .map_err(|e| OverlayError::model_load(format!("Failed to create runnable model: {e}")))
    }
}

impl SegmentationBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn load(&mut self, reporter: &dyn ProgressReporter) -> Result<Option<Duration>> {
        if self.model.is_some() {
            return Ok(None);
        }

        let start = Instant::now();
        reporter.report_progress(ProgressUpdate::with_description(
            ExtractionStage::ModelLoading,
            format!(
                "Loading {} with Tract",
                self.model_manager.spec().source.display_name()
            ),
            start,
        ));

        let model_data = self.model_manager.load_model()?;
        log::debug!("Creating Tract model from {} bytes of ONNX data", model_data.len());
        self.model = Some(self.build_model(model_data)?);

        let elapsed = start.elapsed();
        log::info!("Tract backend ready in {}ms", elapsed.as_millis());
        Ok(Some(elapsed))
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<MaskTensor> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| OverlayError::inference("Tract model not loaded"))?;

        let start = Instant::now();
        log::debug!("Running Tract inference on input {:?}", input.shape());

        let input_tensor = Tensor::from(input.clone());
        let outputs = model
            .run(tvec![input_tensor.into()])
            .map_err(|e| OverlayError::inference(format!("Tract inference failed: {e}")))?;

        let output = outputs
            .into_iter()
            .next()
            .ok_or_else(|| OverlayError::inference("Model produced no outputs"))?
            .into_arc_tensor();
        let view = output
            .to_array_view::<f32>()
            .map_err(|e| OverlayError::inference(format!("Failed to convert output tensor: {e}")))?;

        let mask = MaskTensor::from_ndarray(&view)?;
        log::debug!(
            "Tract inference completed in {}ms, mask shape {:?}",
            start.elapsed().as_millis(),
            mask.shape()
        );
        Ok(mask)
    }

    fn is_loaded(&self) -> bool {
        self.model.is_some()
    }

    fn preprocessing_config(&self) -> PreprocessingConfig {
        self.preprocessing.clone()
    }
}
