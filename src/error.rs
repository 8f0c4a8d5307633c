//! Error types for overlay composition, extraction and generation

use thiserror::Error;

/// Result type alias for overlay operations
pub type Result<T> = std::result::Result<T, OverlayError>;

/// Which of the two source slots an operation needed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputSlot {
    /// Anime screenshot (top pane)
    Screenshot,
    /// Real-world photo (bottom pane)
    Photo,
    /// Locally extracted cut-out
    Cutout,
}

impl std::fmt::Display for InputSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Screenshot => write!(f, "screenshot"),
            Self::Photo => write!(f, "photo"),
            Self::Cutout => write!(f, "cutout"),
        }
    }
}

/// Failure kinds reported by the generative collaborator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    /// No API key configured; raised before any network call
    #[error("API key is required")]
    MissingKey,

    /// The provider refused the prompt through its safety filters
    #[error("Blocked by safety filters: {0}")]
    SafetyBlocked(String),

    /// No candidates were returned
    #[error("No image generated. The model might have refused the request.")]
    EmptyResponse,

    /// Candidates only contained text parts
    #[error("Model returned text instead of image: {0}")]
    TextOnly(String),

    /// The provider returned an explicit error object
    #[error("Provider error: {0}")]
    Provider(String),

    /// Connection, timeout or body decoding failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// The returned payload was not a decodable image
    #[error("Invalid image in response: {0}")]
    InvalidImage(String),
}

/// Comprehensive error types for overlay operations
#[derive(Error, Debug)]
pub enum OverlayError {
    /// A required image is absent
    #[error("Missing input: {0} has not been provided")]
    MissingInput(InputSlot),

    /// Segmentation model failed to initialize
    #[error("Model load error: {0}")]
    ModelLoad(String),

    /// Segmentation produced no usable mask
    #[error("Inference error: {0}")]
    Inference(String),

    /// Generative call failed
    #[error("Generation failed: {0}")]
    Generation(#[from] GenerationError),

    /// A long-running operation is already in flight
    #[error("Operation already in progress: {0}")]
    Busy(&'static str),

    /// Input/output errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decode/encode errors
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Model download failures
    #[error("Network error: {0}")]
    Network(String),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl OverlayError {
    /// Create a new missing input error
    #[must_use]
    pub fn missing(slot: InputSlot) -> Self {
        Self::MissingInput(slot)
    }

    /// Create a new model load error
    pub fn model_load<S: Into<String>>(msg: S) -> Self {
        Self::ModelLoad(msg.into())
    }

    /// Create a new inference error
    pub fn inference<S: Into<String>>(msg: S) -> Self {
        Self::Inference(msg.into())
    }

    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Create network error with operation context
    pub fn network_error<E: std::fmt::Display>(operation: &str, error: E) -> Self {
        Self::Network(format!("{operation}: {error}"))
    }

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<std::path::Path>>(
        operation: &str,
        path: P,
        error: &std::io::Error,
    ) -> Self {
        Self::Io(std::io::Error::new(
            error.kind(),
            format!(
                "Failed to {} '{}': {}",
                operation,
                path.as_ref().display(),
                error
            ),
        ))
    }

    /// Create configuration error with valid ranges
    pub fn config_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
        recommended: Option<T>,
    ) -> Self {
        let recommendation = match recommended {
            Some(rec) => format!(" Recommended: {rec}"),
            None => String::new(),
        };

        Self::InvalidConfig(format!(
            "Invalid {parameter}: {value} (valid range: {valid_range}).{recommendation}"
        ))
    }

    /// Whether the user can fix this by supplying an image
    #[must_use]
    pub fn is_missing_input(&self) -> bool {
        matches!(self, Self::MissingInput(_))
    }
}
