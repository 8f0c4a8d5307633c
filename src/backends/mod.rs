//! Segmentation backend implementations
//!
//! - ONNX Runtime backend (high performance, GPU acceleration)
//! - Tract backend (pure Rust, no external dependencies)
//! - Mock backend (deterministic masks for tests and dry runs)

#[cfg(feature = "onnx")]
pub mod onnx;

#[cfg(feature = "tract")]
pub mod tract;

pub mod mock;

#[cfg(feature = "onnx")]
pub use self::onnx::OnnxBackend;

#[cfg(feature = "tract")]
pub use self::tract::TractBackend;

pub use self::mock::MockSegmentationBackend;

use crate::config::ExtractionConfig;
use crate::error::{OverlayError, Result};
use crate::inference::SegmentationBackend;
use crate::models::ModelManager;
use serde::{Deserialize, Serialize};

/// Available segmentation backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendType {
    Onnx,
    Tract,
    Mock,
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Onnx => write!(f, "onnx"),
            Self::Tract => write!(f, "tract"),
            Self::Mock => write!(f, "mock"),
        }
    }
}

impl std::str::FromStr for BackendType {
    type Err = OverlayError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "onnx" => Ok(Self::Onnx),
            "tract" => Ok(Self::Tract),
            "mock" => Ok(Self::Mock),
            other => Err(OverlayError::invalid_config(format!(
                "Unknown backend '{other}' (expected onnx, tract or mock)"
            ))),
        }
    }
}

/// Backends compiled into this build
#[must_use]
pub fn available_backends() -> Vec<BackendType> {
    let mut backends = Vec::new();
    #[cfg(feature = "onnx")]
    backends.push(BackendType::Onnx);
    #[cfg(feature = "tract")]
    backends.push(BackendType::Tract);
    backends.push(BackendType::Mock);
    backends
}

/// Construct a backend for `config.model`
///
/// # Errors
/// - Requested backend not compiled in
pub fn create_backend(
    backend_type: BackendType,
    config: &ExtractionConfig,
    model_manager: ModelManager,
) -> Result<Box<dyn SegmentationBackend>> {
    log::debug!("Creating {backend_type} backend");
    match backend_type {
        #[cfg(feature = "onnx")]
        BackendType::Onnx => Ok(Box::new(OnnxBackend::new(model_manager, config))),
        #[cfg(feature = "tract")]
        BackendType::Tract => Ok(Box::new(TractBackend::new(model_manager))),
        BackendType::Mock => {
            let _ = (config, model_manager);
            Ok(Box::new(MockSegmentationBackend::new()))
        },
        #[allow(unreachable_patterns)]
        other => Err(OverlayError::invalid_config(format!(
            "Backend '{other}' is not enabled in this build"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ModelSpec;

    #[test]
    fn test_backend_type_parsing() {
        assert_eq!("ONNX".parse::<BackendType>().unwrap(), BackendType::Onnx);
        assert_eq!("tract".parse::<BackendType>().unwrap(), BackendType::Tract);
        assert!("tflite".parse::<BackendType>().is_err());
    }

    #[test]
    fn test_mock_backend_is_always_available() {
        assert!(available_backends().contains(&BackendType::Mock));
        let backend = create_backend(
            BackendType::Mock,
            &ExtractionConfig::default(),
            ModelManager::new(ModelSpec::default()),
        )
        .unwrap();
        assert_eq!(backend.name(), "mock");
        assert!(!backend.is_loaded());
    }
}
