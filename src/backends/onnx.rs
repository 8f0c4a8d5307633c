//! ONNX Runtime segmentation backend
//!
//! Runs the IS-Net anime model through ONNX Runtime with optional CUDA or
//! `CoreML` acceleration.

use crate::config::{ExecutionProvider, ExtractionConfig};
use crate::error::{OverlayError, Result};
use crate::inference::SegmentationBackend;
use crate::mask::MaskTensor;
use crate::models::ModelManager;
use crate::progress::{ExtractionStage, ProgressReporter, ProgressUpdate};
use instant::{Duration, Instant};
use ndarray::Array4;
use ort::execution_providers::{
    CUDAExecutionProvider, CoreMLExecutionProvider, ExecutionProvider as OrtExecutionProvider,
    ExecutionProviderDispatch,
};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Value;

/// ONNX Runtime backend
#[derive(Debug)]
pub struct OnnxBackend {
    session: Option<Session>,
    model_manager: ModelManager,
    execution_provider: ExecutionProvider,
    intra_threads: usize,
}

impl OnnxBackend {
    #[must_use]
    pub fn new(model_manager: ModelManager, config: &ExtractionConfig) -> Self {
        Self {
            session: None,
            model_manager,
            execution_provider: config.execution_provider,
            intra_threads: config.intra_threads,
        }
    }

    /// Execution providers with availability status and description
    #[must_use]
    pub fn list_providers() -> Vec<(String, bool, String)> {
        let cuda_available =
            OrtExecutionProvider::is_available(&CUDAExecutionProvider::default()).unwrap_or(false);
        let coreml_available =
            OrtExecutionProvider::is_available(&CoreMLExecutionProvider::default())
                .unwrap_or(false);

        vec![
            (
                "CPU".to_string(),
                true,
                "Always available, uses CPU for inference".to_string(),
            ),
            (
                "CUDA".to_string(),
                cuda_available,
                "NVIDIA GPU acceleration (requires CUDA toolkit and compatible GPU)".to_string(),
            ),
            (
                "CoreML".to_string(),
                coreml_available,
                "Apple Silicon GPU acceleration (macOS only)".to_string(),
            ),
        ]
    }

    fn requested_providers(&self) -> Vec<ExecutionProviderDispatch> {
        let cuda = CUDAExecutionProvider::default();
        let coreml = CoreMLExecutionProvider::default();
        let cuda_available = OrtExecutionProvider::is_available(&cuda).unwrap_or(false);
        let coreml_available = OrtExecutionProvider::is_available(&coreml).unwrap_or(false);

        let mut providers = Vec::new();
        match self.execution_provider {
            ExecutionProvider::Auto => {
                if cuda_available {
                    providers.push(cuda.build());
                }
                if coreml_available {
                    providers.push(coreml.with_subgraphs(true).build());
                }
                if providers.is_empty() {
                    log::info!("No hardware acceleration available, using CPU");
                }
            },
            ExecutionProvider::Cpu => {},
            ExecutionProvider::Cuda => {
                if cuda_available {
                    providers.push(cuda.build());
                } else {
                    log::warn!("CUDA execution provider requested but not available, falling back to CPU");
                }
            },
            ExecutionProvider::CoreMl => {
                if coreml_available {
                    providers.push(coreml.with_subgraphs(true).build());
                } else {
                    log::warn!("CoreML execution provider requested but not available, falling back to CPU");
                }
            },
        }
        providers
    }

    fn build_session(&self, model_data: &[u8]) -> Result<Session> {
        let mut builder = Session::builder()
            .map_err(|e| OverlayError::model_load(format!("Failed to create session builder: {e}")))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| OverlayError::model_load(format!("Failed to set optimization level: {e}")))?;

        let providers = self.requested_providers();
        if !providers.is_empty() {
            log::info!("Hardware acceleration enabled with {} provider(s)", providers.len());
            builder = builder.with_execution_providers(providers).map_err(|e| {
                OverlayError::model_load(format!("Failed to set execution providers: {e}"))
            })?;
        }

        let intra_threads = if self.intra_threads > 0 {
            self.intra_threads
        } else {
            std::thread::available_parallelism()
                .map(std::num::NonZero::get)
                .unwrap_or(4)
        };

        builder
            .with_intra_threads(intra_threads)
            .map_err(|e| OverlayError::model_load(format!("Failed to set intra threads: {e}")))?
            .commit_from_memory(model_data)
            .map_err(|e| OverlayError::model_load(format!("Failed to create session from model data: {e}")))
    }
}

impl SegmentationBackend for OnnxBackend {
    fn name(&self) -> &'static str {
        "onnx"
    }

    fn load(&mut self, reporter: &dyn ProgressReporter) -> Result<Option<Duration>> {
        if self.session.is_some() {
            return Ok(None);
        }

        let start = Instant::now();
        reporter.report_progress(ProgressUpdate::with_description(
            ExtractionStage::ModelLoading,
            format!(
                "Loading {} with ONNX Runtime",
                self.model_manager.spec().source.display_name()
            ),
            start,
        ));

        let model_data = self.model_manager.load_model()?;
        let session = self.build_session(&model_data)?;
        self.session = Some(session);

        let elapsed = start.elapsed();
        log::info!(
            "ONNX session ready in {:.0}ms (provider: {})",
            elapsed.as_secs_f64() * 1000.0,
            self.execution_provider
        );
        Ok(Some(elapsed))
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<MaskTensor> {
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| OverlayError::inference("ONNX session not loaded"))?;

        let start = Instant::now();
        log::debug!("Running ONNX inference on input {:?}", input.dim());

        let input_value = Value::from_array(input.clone())
            .map_err(|e| OverlayError::inference(format!("Failed to convert input tensor: {e}")))?;

        let outputs = session
            .run(ort::inputs![input_value])
            .map_err(|e| OverlayError::inference(format!("ONNX inference failed: {e}")))?;

        let keys: Vec<_> = outputs.keys().collect();
        let first_key = keys
            .first()
            .ok_or_else(|| OverlayError::inference("Model produced no outputs"))?;
        let output = outputs
            .get(first_key)
            .ok_or_else(|| OverlayError::inference("First output tensor not found"))?
            .try_extract_array::<f32>()
            .map_err(|e| OverlayError::inference(format!("Failed to extract output tensor: {e}")))?;

        let mask = MaskTensor::from_ndarray(&output)?;
        log::debug!(
            "ONNX inference completed in {:.2}ms, mask shape {:?}",
            start.elapsed().as_secs_f64() * 1000.0,
            mask.shape()
        );
        Ok(mask)
    }

    fn is_loaded(&self) -> bool {
        self.session.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ModelSpec;
    use crate::progress::NoOpProgressReporter;

    #[test]
    fn test_missing_model_is_model_load_error() {
        let manager = ModelManager::new(ModelSpec::from_path("/nonexistent/isnet.onnx"));
        let mut backend = OnnxBackend::new(manager, &ExtractionConfig::default());
        let err = backend.load(&NoOpProgressReporter).unwrap_err();
        assert!(matches!(err, OverlayError::ModelLoad(_)));
        assert!(!backend.is_loaded());
    }

    #[test]
    fn test_infer_before_load_fails() {
        let manager = ModelManager::new(ModelSpec::from_path("/nonexistent/isnet.onnx"));
        let mut backend = OnnxBackend::new(manager, &ExtractionConfig::default());
        let input = Array4::<f32>::zeros((1, 3, 8, 8));
        assert!(matches!(
            backend.infer(&input),
            Err(OverlayError::Inference(_))
        ));
    }

    #[test]
    fn test_cpu_is_always_listed() {
        let providers = OnnxBackend::list_providers();
        assert!(providers.iter().any(|(name, available, _)| name == "CPU" && *available));
    }
}
