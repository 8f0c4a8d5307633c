//! Session-scoped state and orchestration
//!
//! [`OverlaySession`] exclusively owns the source images, the cut-out, the
//! generated result and the overlay transform. Every mutation that changes
//! what is visible re-renders synchronously and keeps the latest [`Frame`].
//! Failed extraction or generation leaves all of that untouched and only
//! updates [`SessionStatus`].

use crate::compositor::{compose_on_photo, ActiveTab, Compositor, Cutout, Frame, RenderMode, Scene};
use crate::config::{Captions, Language, OverlayConfig};
use crate::error::{InputSlot, OverlayError, Result};
use crate::extractor::CharacterExtractor;
use crate::generative::ImageGenerator;
use crate::geometry::OverlayTransform;
use crate::image_io::{encode_png, write_bytes, SourceImage};
use crate::interaction::{ControlChange, DisplaySize, DragController};
use crate::progress::{NoOpProgressReporter, ProgressReporter};
use image::{Rgba, RgbaImage};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::instrument;

/// Prefix of every exported file name
pub const EXPORT_PREFIX: &str = "pilgrimage-overlay";

/// User-visible state of the long-running operations
#[derive(Debug, Clone, PartialEq)]
pub enum SessionStatus {
    Idle,
    LoadingModel,
    ModelReady,
    Extracting,
    Extracted { foreground_ratio: f64 },
    Generating,
    Generated,
    /// Last operation failed; the message is shown verbatim
    Failed(String),
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Ready"),
            Self::LoadingModel => write!(f, "Loading segmentation model..."),
            Self::ModelReady => write!(f, "Model loaded"),
            Self::Extracting => write!(f, "Extracting character..."),
            Self::Extracted { foreground_ratio } => write!(
                f,
                "Extraction succeeded ({:.1}% foreground), drag to adjust position",
                foreground_ratio * 100.0
            ),
            Self::Generating => write!(f, "Generating composite..."),
            Self::Generated => write!(f, "Composite generated"),
            Self::Failed(message) => write!(f, "Failed: {message}"),
        }
    }
}

/// The three downloadable images
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    /// Full two-pane canvas
    Comparison,
    /// Photo at natural resolution with the overlay
    PhotoComposite,
    /// Cut-out cropped to its bounding box
    Cutout,
}

impl ExportKind {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Comparison => "comparison",
            Self::PhotoComposite => "composite",
            Self::Cutout => "cutout",
        }
    }

    /// `[pilgrimage-overlay][<kind>][<base36 millis>].png`
    #[must_use]
    pub fn file_name(self, unix_millis: u64) -> String {
        format!(
            "[{EXPORT_PREFIX}][{}][{}].png",
            self.label(),
            to_base36(unix_millis)
        )
    }
}

fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

/// An encoded-on-demand export
#[derive(Debug, Clone)]
pub struct Export {
    pub kind: ExportKind,
    pub file_name: String,
    pub image: RgbaImage,
}

impl Export {
    fn new(kind: ExportKind, image: RgbaImage) -> Self {
        let millis = u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or_default();
        Self {
            kind,
            file_name: kind.file_name(millis),
            image,
        }
    }

    /// # Errors
    /// - PNG encoding failure
    pub fn encode_png(&self) -> Result<Vec<u8>> {
        encode_png(&self.image)
    }

    /// Write as PNG into `dir` under [`Export::file_name`]
    ///
    /// # Errors
    /// - Encoding or write failure
    pub fn save_to_dir<P: AsRef<Path>>(&self, dir: P) -> Result<PathBuf> {
        let path = dir.as_ref().join(&self.file_name);
        write_bytes(&path, &self.encode_png()?)?;
        log::info!("Saved {} export to {}", self.kind.label(), path.display());
        Ok(path)
    }
}

/// Owned state of one compositing session
pub struct OverlaySession {
    config: OverlayConfig,
    compositor: Compositor,
    screenshot: Option<SourceImage>,
    photo: Option<SourceImage>,
    cutout: Option<Cutout>,
    transform: OverlayTransform,
    ai_result: Option<SourceImage>,
    tab: ActiveTab,
    status: SessionStatus,
    frame: Option<Frame>,
    extractor: Option<CharacterExtractor>,
    generator: Option<ImageGenerator>,
    reporter: Arc<dyn ProgressReporter>,
}

impl std::fmt::Debug for OverlaySession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverlaySession")
            .field("has_screenshot", &self.screenshot.is_some())
            .field("has_photo", &self.photo.is_some())
            .field("has_cutout", &self.cutout.is_some())
            .field("has_ai_result", &self.ai_result.is_some())
            .field("transform", &self.transform)
            .field("tab", &self.tab)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

impl OverlaySession {
    /// # Errors
    /// - Invalid configuration
    pub fn new(config: OverlayConfig) -> Result<Self> {
        config.validate()?;
        let compositor = Compositor::new(config.layout.clone(), Captions::for_language(config.language));
        Ok(Self {
            config,
            compositor,
            screenshot: None,
            photo: None,
            cutout: None,
            transform: OverlayTransform::default(),
            ai_result: None,
            tab: ActiveTab::default(),
            status: SessionStatus::Idle,
            frame: None,
            extractor: None,
            generator: None,
            reporter: Arc::new(NoOpProgressReporter),
        })
    }

    #[must_use]
    pub fn with_extractor(mut self, extractor: CharacterExtractor) -> Self {
        self.extractor = Some(extractor);
        self
    }

    #[must_use]
    pub fn with_generator(mut self, generator: ImageGenerator) -> Self {
        self.generator = Some(generator);
        self
    }

    #[must_use]
    pub fn with_progress_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    #[must_use]
    pub fn config(&self) -> &OverlayConfig {
        &self.config
    }

    #[must_use]
    pub fn status(&self) -> &SessionStatus {
        &self.status
    }

    #[must_use]
    pub fn transform(&self) -> &OverlayTransform {
        &self.transform
    }

    #[must_use]
    pub fn tab(&self) -> ActiveTab {
        self.tab
    }

    #[must_use]
    pub fn screenshot(&self) -> Option<&SourceImage> {
        self.screenshot.as_ref()
    }

    #[must_use]
    pub fn photo(&self) -> Option<&SourceImage> {
        self.photo.as_ref()
    }

    #[must_use]
    pub fn cutout(&self) -> Option<&Cutout> {
        self.cutout.as_ref()
    }

    #[must_use]
    pub fn ai_result(&self) -> Option<&SourceImage> {
        self.ai_result.as_ref()
    }

    #[must_use]
    pub fn has_cutout(&self) -> bool {
        self.cutout.is_some()
    }

    /// Latest rendered frame
    #[must_use]
    pub fn frame(&self) -> Option<&Frame> {
        self.frame.as_ref()
    }

    /// Whether an extraction or generation is in flight
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.extractor.as_ref().is_some_and(CharacterExtractor::is_busy)
            || self.generator.as_ref().is_some_and(ImageGenerator::is_busy)
    }

    fn scene(&self) -> Scene<'_> {
        Scene {
            screenshot: self.screenshot.as_ref(),
            photo: self.photo.as_ref(),
            cutout: self.cutout.as_ref(),
            transform: self.transform,
            ai_result: self.ai_result.as_ref(),
            tab: self.tab,
        }
    }

    /// Mode the next render will use
    ///
    /// # Errors
    /// - `MissingInput` when no image has been supplied
    pub fn render_mode(&self) -> Result<RenderMode<'_>> {
        self.scene().render_mode()
    }

    /// Render the current state and keep it as the latest frame
    ///
    /// # Errors
    /// - `MissingInput` when no image has been supplied
    /// - `InvalidConfig` when the layout exceeds the canvas size limit
    pub fn render(&mut self) -> Result<&Frame> {
        let frame = {
            let mode = self.scene().render_mode()?;
            self.compositor.render(&mode)?
        };
        Ok(self.frame.insert(frame))
    }

    fn render_if_visible(&mut self) -> Result<Option<&Frame>> {
        if self.screenshot.is_none() && self.photo.is_none() {
            return Ok(None);
        }
        self.render().map(Some)
    }

    /// Replace the screenshot; the cut-out and generated result derived from
    /// the old one are dropped
    ///
    /// # Errors
    /// - Rendering failure
    pub fn set_screenshot(&mut self, image: SourceImage) -> Result<&Frame> {
        log::info!("Screenshot set ({}x{})", image.width(), image.height());
        self.screenshot = Some(image);
        self.cutout = None;
        self.ai_result = None;
        self.tab = ActiveTab::Local;
        self.render()
    }

    /// Replace the photo; a generated result made from the old one is dropped
    ///
    /// # Errors
    /// - Rendering failure
    pub fn set_photo(&mut self, image: SourceImage) -> Result<&Frame> {
        log::info!("Photo set ({}x{})", image.width(), image.height());
        self.photo = Some(image);
        self.ai_result = None;
        self.render()
    }

    /// Fill `slot` with a decoded image
    ///
    /// # Errors
    /// - `InvalidConfig` for the cut-out slot, which only extraction fills
    pub fn set_source(&mut self, slot: InputSlot, image: SourceImage) -> Result<&Frame> {
        match slot {
            InputSlot::Screenshot => self.set_screenshot(image),
            InputSlot::Photo => self.set_photo(image),
            InputSlot::Cutout => Err(OverlayError::invalid_config(
                "The cut-out is produced by extraction and cannot be uploaded",
            )),
        }
    }

    /// Switch between the local and generated result
    ///
    /// # Errors
    /// - Rendering failure
    pub fn set_tab(&mut self, tab: ActiveTab) -> Result<Option<&Frame>> {
        self.tab = tab;
        self.render_if_visible()
    }

    /// # Errors
    /// - Rendering failure
    pub fn set_margin(&mut self, margin: u32) -> Result<Option<&Frame>> {
        self.config.layout.margin = margin;
        self.compositor.set_layout(self.config.layout.clone());
        self.render_if_visible()
    }

    /// # Errors
    /// - Rendering failure
    pub fn set_background(&mut self, color: Rgba<u8>) -> Result<Option<&Frame>> {
        self.config.layout.background = color;
        self.compositor.set_layout(self.config.layout.clone());
        self.render_if_visible()
    }

    /// Switch caption language
    ///
    /// # Errors
    /// - Rendering failure
    pub fn set_language(&mut self, language: Language) -> Result<Option<&Frame>> {
        self.config.language = language;
        self.compositor.set_captions(Captions::for_language(language));
        self.render_if_visible()
    }

    /// Overlay scale; ignored without a cut-out
    ///
    /// # Errors
    /// - Rendering failure
    pub fn set_scale(&mut self, scale: f64) -> Result<Option<&Frame>> {
        if self.cutout.is_none() {
            return Ok(None);
        }
        self.transform.set_scale(scale);
        self.render().map(Some)
    }

    /// Overlay opacity; ignored without a cut-out
    ///
    /// # Errors
    /// - Rendering failure
    pub fn set_opacity(&mut self, opacity: f64) -> Result<Option<&Frame>> {
        if self.cutout.is_none() {
            return Ok(None);
        }
        self.transform.set_opacity(opacity);
        self.render().map(Some)
    }

    /// Move the overlay centre (photo pixels); ignored without a cut-out
    ///
    /// # Errors
    /// - Rendering failure
    pub fn set_overlay_center(&mut self, center_x: f64, center_y: f64) -> Result<Option<&Frame>> {
        if self.cutout.is_none() {
            return Ok(None);
        }
        self.transform.center_x = center_x;
        self.transform.center_y = center_y;
        self.render().map(Some)
    }

    /// Apply a (throttled) control change
    ///
    /// # Errors
    /// - Rendering failure
    pub fn apply_control(&mut self, change: ControlChange) -> Result<Option<&Frame>> {
        match change {
            ControlChange::Margin(margin) => self.set_margin(margin),
            ControlChange::Background(color) => self.set_background(color),
            ControlChange::Scale(scale) => self.set_scale(scale),
            ControlChange::Opacity(opacity) => self.set_opacity(opacity),
        }
    }

    /// Run one animation frame of a drag
    ///
    /// # Errors
    /// - Rendering failure
    pub fn drag_frame(
        &mut self,
        drag: &mut DragController,
        surface: DisplaySize,
    ) -> Result<Option<&Frame>> {
        let Some(photo_size) = self.photo.as_ref().map(|p| (p.width(), p.height())) else {
            return Ok(None);
        };
        match drag.animation_frame(surface, photo_size) {
            Some((x, y)) => self.set_overlay_center(x, y),
            None => Ok(None),
        }
    }

    /// Load the segmentation model ahead of extraction
    ///
    /// # Errors
    /// - No extractor configured
    /// - `Busy` or `ModelLoad` from the extractor
    pub async fn load_model(&mut self) -> Result<()> {
        let extractor = self.require_extractor()?;
        let previous = std::mem::replace(&mut self.status, SessionStatus::LoadingModel);
        match extractor.load(Arc::clone(&self.reporter)).await {
            Ok(()) => {
                self.status = SessionStatus::ModelReady;
                Ok(())
            },
            Err(e) => Err(self.fail(e, previous)),
        }
    }

    /// Extract the character from the screenshot and overlay it on the photo
    ///
    /// On success the overlay is reset to scale 1.0 at the photo centre,
    /// keeping the current opacity.
    ///
    /// # Errors
    /// - `MissingInput` for either image
    /// - No extractor configured
    /// - `Busy`, `ModelLoad` or `Inference` from the extractor
    #[instrument(skip(self))]
    pub async fn extract(&mut self) -> Result<&Frame> {
        let screenshot = self
            .screenshot
            .as_ref()
            .ok_or(OverlayError::MissingInput(InputSlot::Screenshot))?
            .to_dynamic();
        let (photo_width, photo_height) = self
            .photo
            .as_ref()
            .map(|p| (p.width(), p.height()))
            .ok_or(OverlayError::MissingInput(InputSlot::Photo))?;
        let extractor = self.require_extractor()?;

        let previous = std::mem::replace(&mut self.status, SessionStatus::Extracting);
        match extractor
            .extract(Arc::new(screenshot), Arc::clone(&self.reporter))
            .await
        {
            Ok(extraction) => {
                self.status = SessionStatus::Extracted {
                    foreground_ratio: f64::from(extraction.statistics.foreground_ratio),
                };
                self.cutout = Some(Cutout::from(extraction));
                self.transform =
                    OverlayTransform::centered_on(photo_width, photo_height, self.transform.opacity);
                self.tab = ActiveTab::Local;
                self.render()
            },
            Err(e) => Err(self.fail(e, previous)),
        }
    }

    /// Ask the generative backend to composite the screenshot into the photo
    ///
    /// # Errors
    /// - `MissingInput` for either image
    /// - No generator configured
    /// - `Generation(MissingKey)` before any request for a blank key
    /// - `Busy` or any other `Generation` failure
    #[instrument(skip(self, api_key))]
    pub async fn generate(&mut self, api_key: &str) -> Result<&Frame> {
        let screenshot = self
            .screenshot
            .as_ref()
            .ok_or(OverlayError::MissingInput(InputSlot::Screenshot))?
            .to_dynamic();
        let photo = self
            .photo
            .as_ref()
            .ok_or(OverlayError::MissingInput(InputSlot::Photo))?
            .to_dynamic();
        let generator = self
            .generator
            .clone()
            .ok_or_else(|| OverlayError::invalid_config("No generative backend configured"))?;

        let previous = std::mem::replace(&mut self.status, SessionStatus::Generating);
        let prompt = self.config.generation.prompt.clone();
        let generated = generator
            .generate(api_key, &screenshot, &photo, &prompt)
            .await
            .and_then(|image| SourceImage::from_dynamic(&image));

        match generated {
            Ok(result) => {
                log::info!("Generated composite {}x{}", result.width(), result.height());
                self.ai_result = Some(result);
                self.tab = ActiveTab::Ai;
                self.status = SessionStatus::Generated;
                self.render()
            },
            Err(e) => Err(self.fail(e, previous)),
        }
    }

    fn require_extractor(&self) -> Result<CharacterExtractor> {
        self.extractor
            .clone()
            .ok_or_else(|| OverlayError::invalid_config("No segmentation backend configured"))
    }

    /// Record a failure; a rejected concurrent call keeps the running status
    fn fail(&mut self, error: OverlayError, previous: SessionStatus) -> OverlayError {
        if matches!(error, OverlayError::Busy(_)) {
            self.status = previous;
        } else {
            log::warn!("Operation failed: {error}");
            self.status = SessionStatus::Failed(error.to_string());
        }
        error
    }

    /// The full two-pane canvas as currently displayed
    ///
    /// # Errors
    /// - `MissingInput` when no image has been supplied
    pub fn export_comparison(&mut self) -> Result<Export> {
        let image = self.render()?.image.clone();
        Ok(Export::new(ExportKind::Comparison, image))
    }

    /// The photo at natural resolution with the current overlay
    ///
    /// While the generated result is displayed, that result is exported.
    ///
    /// # Errors
    /// - `MissingInput(Photo)`
    pub fn export_photo_composite(&self) -> Result<Export> {
        let photo = self
            .photo
            .as_ref()
            .ok_or(OverlayError::MissingInput(InputSlot::Photo))?;

        if let Ok(RenderMode::AiOverlay { result, .. }) = self.render_mode() {
            return Ok(Export::new(ExportKind::PhotoComposite, result.pixels().clone()));
        }

        let screenshot_width = self.screenshot.as_ref().map_or(photo.width(), SourceImage::width);
        let overlay = self.cutout.as_ref().map(|cutout| (cutout, &self.transform));
        Ok(Export::new(
            ExportKind::PhotoComposite,
            compose_on_photo(photo, overlay, screenshot_width),
        ))
    }

    /// The cut-out cropped to its bounding box
    ///
    /// # Errors
    /// - `MissingInput(Cutout)`
    pub fn export_cutout(&self) -> Result<Export> {
        let cutout = self
            .cutout
            .as_ref()
            .ok_or(OverlayError::MissingInput(InputSlot::Cutout))?;
        Ok(Export::new(ExportKind::Cutout, cutout.bounds.crop(&cutout.image)))
    }

    /// Drop all images and results, keeping configuration and collaborators
    pub fn reset(&mut self) {
        self.screenshot = None;
        self.photo = None;
        self.cutout = None;
        self.ai_result = None;
        self.transform = OverlayTransform::default();
        self.tab = ActiveTab::default();
        self.status = SessionStatus::Idle;
        self.frame = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::MockSegmentationBackend;
    use crate::compositor::RenderModeKind;
    use crate::error::GenerationError;
    use crate::generative::MockGenerativeBackend;
    use image::DynamicImage;

    fn solid(width: u32, height: u32, color: [u8; 4]) -> SourceImage {
        SourceImage::from_rgba(RgbaImage::from_pixel(width, height, Rgba(color))).unwrap()
    }

    fn session() -> OverlaySession {
        let config = OverlayConfig::builder().pane_height(90).build().unwrap();
        OverlaySession::new(config)
            .unwrap()
            .with_extractor(CharacterExtractor::new(Box::new(MockSegmentationBackend::new()), 5))
    }

    fn with_images() -> OverlaySession {
        let mut session = session();
        session.set_screenshot(solid(160, 90, [200, 0, 0, 255])).unwrap();
        session.set_photo(solid(320, 180, [0, 0, 200, 255])).unwrap();
        session
    }

    #[test]
    fn test_base36_file_names() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
        assert_eq!(
            ExportKind::Cutout.file_name(1_700_000_000_000),
            format!("[pilgrimage-overlay][cutout][{}].png", to_base36(1_700_000_000_000))
        );
    }

    #[test]
    fn test_render_without_images_is_missing_input() {
        let mut session = session();
        assert!(matches!(
            session.render(),
            Err(OverlayError::MissingInput(InputSlot::Screenshot))
        ));
        assert!(session.set_margin(10).unwrap().is_none());
    }

    #[test]
    fn test_sliders_ignored_without_cutout() {
        let mut session = with_images();
        assert!(session.set_scale(2.0).unwrap().is_none());
        assert!(session.set_opacity(0.1).unwrap().is_none());
        assert_eq!(session.transform().scale, 1.0);
    }

    #[tokio::test]
    async fn test_extract_resets_transform_and_renders_overlay() {
        let mut session = with_images();
        session.transform.opacity = 0.7;

        let mode = session.extract().await.unwrap().mode;
        assert_eq!(mode, RenderModeKind::LocalOverlay);
        assert_eq!(session.transform().center_x, 160.0);
        assert_eq!(session.transform().center_y, 90.0);
        assert_eq!(session.transform().scale, 1.0);
        assert_eq!(session.transform().opacity, 0.7);
        match session.status() {
            SessionStatus::Extracted { foreground_ratio } => {
                assert!(*foreground_ratio > 0.0 && *foreground_ratio <= 1.0);
            },
            other => panic!("unexpected status {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_extract_requires_both_images() {
        let mut session = session();
        session.set_screenshot(solid(16, 9, [0, 0, 0, 255])).unwrap();
        assert!(matches!(
            session.extract().await,
            Err(OverlayError::MissingInput(InputSlot::Photo))
        ));
    }

    #[tokio::test]
    async fn test_failed_extraction_keeps_previous_cutout() {
        let mut session = with_images();
        session.extract().await.unwrap();
        let bounds = session.cutout().unwrap().bounds;

        session.extractor = Some(CharacterExtractor::new(
            Box::new(MockSegmentationBackend::failing_inference()),
            5,
        ));
        let err = session.extract().await.unwrap_err();
        assert!(matches!(err, OverlayError::Inference(_)));
        assert_eq!(session.cutout().unwrap().bounds, bounds);
        assert!(matches!(session.status(), SessionStatus::Failed(_)));
    }

    #[tokio::test]
    async fn test_new_screenshot_clears_cutout() {
        let mut session = with_images();
        session.extract().await.unwrap();
        assert!(session.has_cutout());

        let frame = session.set_screenshot(solid(160, 90, [1, 2, 3, 255])).unwrap();
        assert_eq!(frame.mode, RenderModeKind::StaticPlaceholder);
        assert!(!session.has_cutout());
    }

    #[tokio::test]
    async fn test_generate_switches_to_ai_tab() {
        let result = DynamicImage::ImageRgba8(RgbaImage::from_pixel(64, 36, Rgba([9, 9, 9, 255])));
        let backend = MockGenerativeBackend::returning(&result).unwrap();
        let mut session = with_images().with_generator(ImageGenerator::new(Arc::new(backend)));

        session.extract().await.unwrap();
        let frame = session.generate("key").await.unwrap();
        assert_eq!(frame.mode, RenderModeKind::AiOverlay);
        assert_eq!(session.tab(), ActiveTab::Ai);

        let frame = session.set_tab(ActiveTab::Local).unwrap().unwrap();
        assert_eq!(frame.mode, RenderModeKind::LocalOverlay);
    }

    #[tokio::test]
    async fn test_generation_failure_is_surfaced_verbatim() {
        let backend = MockGenerativeBackend::failing(GenerationError::SafetyBlocked(
            "{\"blockReason\":\"SAFETY\"}".into(),
        ));
        let mut session = with_images().with_generator(ImageGenerator::new(Arc::new(backend)));

        let err = session.generate("key").await.unwrap_err();
        assert!(matches!(
            err,
            OverlayError::Generation(GenerationError::SafetyBlocked(_))
        ));
        assert!(session.ai_result().is_none());
        match session.status() {
            SessionStatus::Failed(message) => assert!(message.contains("Blocked by safety filters")),
            other => panic!("unexpected status {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_exports() {
        let mut session = with_images();
        assert!(matches!(
            session.export_cutout(),
            Err(OverlayError::MissingInput(InputSlot::Cutout))
        ));

        session.extract().await.unwrap();
        let comparison = session.export_comparison().unwrap();
        let frame = session.frame().unwrap();
        assert_eq!(
            comparison.image.dimensions(),
            (frame.geometry.canvas_width, frame.geometry.canvas_height)
        );
        assert!(comparison.file_name.contains("[comparison]"));

        let composite = session.export_photo_composite().unwrap();
        assert_eq!(composite.image.dimensions(), (320, 180));

        let cutout = session.export_cutout().unwrap();
        let bounds = session.cutout().unwrap().bounds;
        assert_eq!(cutout.image.dimensions(), (bounds.width, bounds.height));
    }

    #[test]
    fn test_photo_composite_without_cutout_is_photo() {
        let mut session = session();
        session.set_photo(solid(30, 20, [5, 6, 7, 255])).unwrap();
        let export = session.export_photo_composite().unwrap();
        assert_eq!(&export.image, session.photo().unwrap().pixels());
    }

    #[tokio::test]
    async fn test_drag_frame_moves_overlay() {
        use crate::interaction::PointerPosition;

        let mut session = with_images();
        session.extract().await.unwrap();
        let surface = DisplaySize::new(160.0, 180.0);
        let mut drag = DragController::new();
        drag.pointer_down(PointerPosition::new(10.0, 10.0), surface, Some(session.transform()));
        drag.pointer_move(PointerPosition::new(20.0, 10.0));

        assert!(session.drag_frame(&mut drag, surface).unwrap().is_some());
        assert_eq!(session.transform().center_x, 160.0 + 10.0 * 2.0);
        assert!(session.drag_frame(&mut drag, surface).unwrap().is_none());
    }

    #[test]
    fn test_reset_clears_state() {
        let mut session = with_images();
        session.reset();
        assert!(session.screenshot().is_none());
        assert!(session.frame().is_none());
        assert_eq!(session.status(), &SessionStatus::Idle);
    }
}
