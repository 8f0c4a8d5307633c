#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unused_async)]

//! # Pilgrimage Overlay Library
//!
//! Builds "anime pilgrimage" comparison images: an anime screenshot in the
//! top pane and the real-world location photo in the bottom pane, stacked
//! on one canvas.
//!
//! The anime character can be cut out of the screenshot with a local
//! segmentation model (ONNX Runtime or Tract) and overlaid on the photo,
//! where it can be dragged, scaled and faded. Alternatively a generative
//! image model can blend the character into the photo.
//!
//! ## Features
//!
//! - **Two-pane layout**: Cover-fit cropping, configurable pane height, margin and background
//! - **Local extraction**: IS-Net anime segmentation with padded bounding boxes
//! - **Multiple Backends**: ONNX Runtime (GPU acceleration) and Tract (Pure Rust)
//! - **Generative compositing**: Gemini image generation behind a swappable trait
//! - **Interaction model**: Frame-coalesced drag and throttled slider updates
//! - **Exports**: Comparison canvas, photo composite and cropped cut-out as PNG
//! - **Model Management**: Automatic downloading and caching of models from `HuggingFace`
//! - **CLI Integration**: Optional command-line interface (enable with `cli` feature)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pilgrimage_overlay::{
//!     backends::{create_backend, BackendType},
//!     CharacterExtractor, ModelManager, OverlayConfig, OverlaySession, SourceImage,
//! };
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = OverlayConfig::builder().margin(20).build()?;
//! let backend = create_backend(
//!     BackendType::Onnx,
//!     &config.extraction,
//!     ModelManager::new(config.extraction.model.clone()),
//! )?;
//!
//! let mut session = OverlaySession::new(config.clone())?
//!     .with_extractor(CharacterExtractor::new(backend, config.extraction.padding));
//! session.set_screenshot(SourceImage::open("screenshot.png")?)?;
//! session.set_photo(SourceImage::open("photo.jpg")?)?;
//!
//! session.extract().await?;
//! session.set_scale(1.2)?;
//! session.export_comparison()?.save_to_dir("out")?;
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `onnx` (default): ONNX Runtime backend with GPU acceleration support
//! - `tract` (default): Pure Rust backend (WASM compatible)
//! - `cli` (default): Command-line interface and progress bars
//! - `tracing-json`: JSON log output for the CLI
//! - `webp-support`: WebP decoding of uploaded images
//!
//! ### Library-Only Usage
//!
//! ```toml
//! [dependencies]
//! pilgrimage-overlay = { version = "0.1", default-features = false, features = ["tract"] }
//! ```

pub mod backends;
pub mod bounds;
pub mod cache;
#[cfg(feature = "cli")]
pub mod cli;
pub mod compositor;
pub mod config;
pub mod download;
pub mod error;
pub mod extractor;
pub mod generative;
pub mod geometry;
pub mod image_io;
pub mod inference;
pub mod interaction;
pub mod mask;
pub mod models;
pub mod preferences;
pub mod preprocessing;
pub mod progress;
pub mod session;
pub mod tracing_config;

pub use backends::{available_backends, create_backend, BackendType, MockSegmentationBackend};
pub use bounds::{find_content_bounds, BoundingBox, DEFAULT_PADDING};
pub use cache::{format_size, CachedModelInfo, ModelCache};
pub use compositor::{
    compose_on_photo, ActiveTab, Compositor, Cutout, Frame, HintPane, RenderMode, RenderModeKind,
    Scene,
};
pub use config::{
    Captions, ExecutionProvider, ExtractionConfig, GenerationConfig, Language, LayoutConfig,
    OverlayConfig, OverlayConfigBuilder,
};
pub use download::ModelDownloader;
pub use error::{GenerationError, InputSlot, OverlayError, Result};
pub use extractor::{CharacterExtractor, Extraction};
pub use generative::{GeminiClient, GenerativeBackend, ImageGenerator, MockGenerativeBackend};
pub use geometry::{
    fit_cover, overlay_placement, pane_geometry, CoverFit, OverlayTransform, PaneGeometry, Rect,
};
pub use image_io::SourceImage;
pub use inference::SegmentationBackend;
pub use interaction::{
    ControlChange, ControlThrottles, DisplaySize, DragController, PointerDown, PointerPosition,
    Throttle, UploadSource,
};
pub use mask::{apply_mask, MaskStatistics, MaskTensor};
pub use models::{ModelManager, ModelSource, ModelSpec};
pub use preferences::{PreferenceStore, Preferences};
pub use progress::{
    ConsoleProgressReporter, ExtractionStage, ExtractionTimings, NoOpProgressReporter,
    ProgressReporter, ProgressUpdate,
};
pub use session::{Export, ExportKind, OverlaySession, SessionStatus};
pub use tracing_config::{TracingConfig, TracingFormat};

/// Render the static comparison for two encoded images
///
/// No extraction or generation is involved: the screenshot fills the top
/// pane and the cover-cropped photo the bottom pane.
///
/// # Errors
/// - Either image cannot be decoded
/// - Invalid layout configuration
pub fn render_comparison_from_bytes(
    screenshot: &[u8],
    photo: &[u8],
    config: &OverlayConfig,
) -> Result<Frame> {
    let mut session = OverlaySession::new(config.clone())?;
    session.set_screenshot(SourceImage::decode(screenshot)?)?;
    Ok(session.set_photo(SourceImage::decode(photo)?)?.clone())
}
