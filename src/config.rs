//! Configuration types for layout, extraction and generation

use crate::error::{OverlayError, Result};
use crate::models::ModelSpec;
use image::Rgba;
use serde::{Deserialize, Serialize};

/// Default height of each pane in output pixels
pub const DEFAULT_PANE_HEIGHT: u32 = 1080;

/// Default canvas background (#EEEEEE)
pub const DEFAULT_BACKGROUND: Rgba<u8> = Rgba([0xEE, 0xEE, 0xEE, 0xFF]);

/// Default Gemini REST endpoint (model name and method are appended)
pub const DEFAULT_GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Default image-capable Gemini model
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-3-pro-image-preview";

/// Default instruction sent alongside the two images
pub const DEFAULT_PROMPT: &str = "Take the anime character from the first image and place them naturally \
into the real-world photo from the second image. Keep the character's anime art style, match the \
position and scale they have in the original scene, and adjust lighting and shadows so the character \
blends into the photo. Output a single image with the same framing as the photo.";

/// Interface language, persisted as a BCP 47 tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Language {
    #[default]
    #[serde(rename = "zh-CN")]
    ChineseSimplified,
    #[serde(rename = "en-US")]
    English,
}

impl Language {
    #[must_use]
    pub fn tag(self) -> &'static str {
        match self {
            Self::ChineseSimplified => "zh-CN",
            Self::English => "en-US",
        }
    }

    /// The other language, as toggled by the language switch
    #[must_use]
    pub fn toggled(self) -> Self {
        match self {
            Self::ChineseSimplified => Self::English,
            Self::English => Self::ChineseSimplified,
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

impl std::str::FromStr for Language {
    type Err = OverlayError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "zh-cn" | "zh" => Ok(Self::ChineseSimplified),
            "en-us" | "en" => Ok(Self::English),
            other => Err(OverlayError::invalid_config(format!(
                "Unsupported language '{other}' (expected zh-CN or en-US)"
            ))),
        }
    }
}

/// Captions drawn into an empty pane while waiting for an upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Captions {
    pub upload_screenshot: String,
    pub upload_photo: String,
}

impl Captions {
    /// Caption table for `language`
    ///
    /// The canvas font is an 8x8 ASCII bitmap, so both languages draw the
    /// ASCII captions.
    #[must_use]
    pub fn for_language(language: Language) -> Self {
        match language {
            Language::ChineseSimplified | Language::English => Self::default(),
        }
    }
}

impl Default for Captions {
    fn default() -> Self {
        Self {
            upload_screenshot: "Click or drag to upload screenshot".to_string(),
            upload_photo: "Click or drag to upload photo".to_string(),
        }
    }
}

/// Execution provider options for ONNX Runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ExecutionProvider {
    /// Auto-detect best available provider (CUDA > `CoreML` > CPU)
    #[default]
    Auto,
    Cpu,
    Cuda,
    CoreMl,
}

impl std::fmt::Display for ExecutionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda => write!(f, "cuda"),
            Self::CoreMl => write!(f, "coreml"),
        }
    }
}

impl std::str::FromStr for ExecutionProvider {
    type Err = OverlayError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "cpu" => Ok(Self::Cpu),
            "cuda" => Ok(Self::Cuda),
            "coreml" => Ok(Self::CoreMl),
            other => Err(OverlayError::invalid_config(format!(
                "Unknown execution provider '{other}' (expected auto, cpu, cuda or coreml)"
            ))),
        }
    }
}

/// Fixed two-pane layout parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutConfig {
    /// Height of each pane in canvas pixels
    pub pane_height: u32,
    /// Border around and between the panes
    pub margin: u32,
    /// Canvas fill colour, visible in the margins
    #[serde(with = "hex_color")]
    pub background: Rgba<u8>,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            pane_height: DEFAULT_PANE_HEIGHT,
            margin: 0,
            background: DEFAULT_BACKGROUND,
        }
    }
}

impl LayoutConfig {
    /// # Errors
    /// - Pane height is zero
    pub fn validate(&self) -> Result<()> {
        if self.pane_height == 0 {
            return Err(OverlayError::config_value_error(
                "pane height",
                self.pane_height,
                "> 0",
                Some(DEFAULT_PANE_HEIGHT),
            ));
        }
        Ok(())
    }
}

/// Parse `#RRGGBB` or `#RRGGBBAA` (leading `#` optional)
///
/// # Errors
/// - Wrong length or non-hex digits
pub fn parse_hex_color(value: &str) -> Result<Rgba<u8>> {
    let hex = value.trim().trim_start_matches('#');
    if !matches!(hex.len(), 6 | 8) || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(OverlayError::invalid_config(format!(
            "Invalid colour '{value}' (expected #RRGGBB or #RRGGBBAA)"
        )));
    }

    let channel = |i: usize| {
        hex.get(i..i + 2)
            .and_then(|pair| u8::from_str_radix(pair, 16).ok())
            .unwrap_or(0xFF)
    };
    Ok(Rgba([channel(0), channel(2), channel(4), if hex.len() == 8 { channel(6) } else { 0xFF }]))
}

/// Format as `#RRGGBB`, or `#RRGGBBAA` when not opaque
#[must_use]
pub fn format_hex_color(color: Rgba<u8>) -> String {
    let [r, g, b, a] = color.0;
    if a == 0xFF {
        format!("#{r:02X}{g:02X}{b:02X}")
    } else {
        format!("#{r:02X}{g:02X}{b:02X}{a:02X}")
    }
}

mod hex_color {
    use image::Rgba;
    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(color: &Rgba<u8>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::format_hex_color(*color))
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Rgba<u8>, D::Error> {
        let value = String::deserialize(d)?;
        super::parse_hex_color(&value).map_err(serde::de::Error::custom)
    }
}

/// Local character extraction settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionConfig {
    pub model: ModelSpec,
    pub execution_provider: ExecutionProvider,
    /// Padding added around the detected character, in cut-out pixels
    pub padding: u32,
    /// Number of intra-op threads for inference (0 = auto)
    pub intra_threads: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            model: ModelSpec::default(),
            execution_provider: ExecutionProvider::default(),
            padding: crate::bounds::DEFAULT_PADDING,
            intra_threads: 0,
        }
    }
}

/// Generative compositing settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub endpoint: String,
    pub model_name: String,
    pub prompt: String,
    pub timeout_secs: u64,
    /// JPEG quality used when uploading the two source images
    pub jpeg_quality: u8,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_GEMINI_ENDPOINT.to_string(),
            model_name: DEFAULT_GEMINI_MODEL.to_string(),
            prompt: DEFAULT_PROMPT.to_string(),
            timeout_secs: 180,
            jpeg_quality: 90,
        }
    }
}

/// Complete session configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct OverlayConfig {
    pub layout: LayoutConfig,
    pub extraction: ExtractionConfig,
    pub generation: GenerationConfig,
    pub language: Language,
}

impl OverlayConfig {
    /// Create a configuration builder
    ///
    /// ```rust
    /// use pilgrimage_overlay::OverlayConfig;
    ///
    /// let config = OverlayConfig::builder()
    ///     .pane_height(720)
    ///     .margin(20)
    ///     .background_hex("#FFFFFF")
    ///     .unwrap()
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(config.layout.pane_height, 720);
    /// ```
    #[must_use]
    pub fn builder() -> OverlayConfigBuilder {
        OverlayConfigBuilder::default()
    }

    /// Validate all configuration parameters
    ///
    /// # Errors
    /// - Pane height is zero
    /// - JPEG quality above 100
    /// - Empty generation model name or endpoint
    pub fn validate(&self) -> Result<()> {
        self.layout.validate()?;

        if self.generation.jpeg_quality > 100 {
            return Err(OverlayError::config_value_error(
                "JPEG quality",
                self.generation.jpeg_quality,
                "0-100",
                Some(90),
            ));
        }

        if self.generation.model_name.trim().is_empty() {
            return Err(OverlayError::invalid_config("Generation model name is empty"));
        }

        if self.generation.endpoint.trim().is_empty() {
            return Err(OverlayError::invalid_config("Generation endpoint is empty"));
        }

        Ok(())
    }
}

/// Builder for [`OverlayConfig`]
#[derive(Debug, Default)]
pub struct OverlayConfigBuilder {
    config: OverlayConfig,
}

impl OverlayConfigBuilder {
    #[must_use]
    pub fn pane_height(mut self, height: u32) -> Self {
        self.config.layout.pane_height = height;
        self
    }

    #[must_use]
    pub fn margin(mut self, margin: u32) -> Self {
        self.config.layout.margin = margin;
        self
    }

    #[must_use]
    pub fn background(mut self, color: Rgba<u8>) -> Self {
        self.config.layout.background = color;
        self
    }

    /// Set the background from a hex string
    ///
    /// # Errors
    /// - Malformed colour
    pub fn background_hex(mut self, value: &str) -> Result<Self> {
        self.config.layout.background = parse_hex_color(value)?;
        Ok(self)
    }

    #[must_use]
    pub fn model(mut self, model: ModelSpec) -> Self {
        self.config.extraction.model = model;
        self
    }

    #[must_use]
    pub fn execution_provider(mut self, provider: ExecutionProvider) -> Self {
        self.config.extraction.execution_provider = provider;
        self
    }

    #[must_use]
    pub fn padding(mut self, padding: u32) -> Self {
        self.config.extraction.padding = padding;
        self
    }

    #[must_use]
    pub fn intra_threads(mut self, threads: usize) -> Self {
        self.config.extraction.intra_threads = threads;
        self
    }

    #[must_use]
    pub fn prompt<S: Into<String>>(mut self, prompt: S) -> Self {
        self.config.generation.prompt = prompt.into();
        self
    }

    #[must_use]
    pub fn generation_model<S: Into<String>>(mut self, model: S) -> Self {
        self.config.generation.model_name = model.into();
        self
    }

    #[must_use]
    pub fn endpoint<S: Into<String>>(mut self, endpoint: S) -> Self {
        self.config.generation.endpoint = endpoint.into();
        self
    }

    #[must_use]
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.config.generation.timeout_secs = secs;
        self
    }

    #[must_use]
    pub fn jpeg_quality(mut self, quality: u8) -> Self {
        self.config.generation.jpeg_quality = quality;
        self
    }

    #[must_use]
    pub fn language(mut self, language: Language) -> Self {
        self.config.language = language;
        self
    }

    /// Build the configuration
    ///
    /// # Errors
    /// - Any value rejected by [`OverlayConfig::validate`]
    pub fn build(self) -> Result<OverlayConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
