//! Generative compositing through the Gemini image API
//!
//! The anime screenshot and the photo are uploaded as JPEG inline data with a
//! text prompt; the first inline image of the first candidate is the result.

use crate::config::GenerationConfig;
use crate::error::{GenerationError, OverlayError, Result};
use crate::extractor::BusyFlag;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

const HARM_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

/// A service that turns two images and a prompt into one composite image
#[async_trait]
pub trait GenerativeBackend: Send + Sync {
    /// Returns the base64-encoded bytes of the generated image
    async fn generate(
        &self,
        api_key: &str,
        character: &DynamicImage,
        background: &DynamicImage,
        prompt: &str,
    ) -> std::result::Result<String, GenerationError>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<RequestContent<'a>>,
    safety_settings: Vec<SafetySetting>,
    generation_config: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct RequestContent<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum RequestPart<'a> {
    Text {
        text: &'a str,
    },
    #[serde(rename_all = "camelCase")]
    Image {
        inline_data: InlineData,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    #[serde(default)]
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
struct SafetySetting {
    category: &'static str,
    threshold: &'static str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<serde_json::Value>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponsePart {
    text: Option<String>,
    inline_data: Option<InlineData>,
}

/// Classify a `generateContent` response body
///
/// Checks, in order: an explicit `error` object, no candidates with prompt
/// feedback (safety block), no candidates at all, and a first candidate
/// without inline image data.
///
/// # Errors
/// - See [`GenerationError`]
pub fn parse_response(body: &str) -> std::result::Result<String, GenerationError> {
    let response: GenerateContentResponse = serde_json::from_str(body)
        .map_err(|e| GenerationError::Transport(format!("Invalid response body: {e}")))?;

    if let Some(error) = response.error {
        return Err(GenerationError::Provider(
            error.message.unwrap_or_else(|| "API Error".to_string()),
        ));
    }

    let Some(candidate) = response.candidates.into_iter().next() else {
        return Err(match response.prompt_feedback {
            Some(feedback) => GenerationError::SafetyBlocked(feedback.to_string()),
            None => GenerationError::EmptyResponse,
        });
    };

    let parts = candidate.content.map(|c| c.parts).unwrap_or_default();
    let mut text = Vec::new();
    for part in parts {
        if let Some(inline) = part.inline_data {
            return Ok(inline.data);
        }
        if let Some(t) = part.text {
            text.push(t);
        }
    }

    Err(GenerationError::TextOnly(text.join("\n")))
}

/// Encode an image as base64 JPEG for upload
///
/// # Errors
/// - JPEG encoding failure
pub fn encode_jpeg_base64(image: &DynamicImage, quality: u8) -> Result<String> {
    let rgb = image.to_rgb8();
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, quality.clamp(1, 100)).encode_image(&rgb)?;
    Ok(BASE64.encode(bytes))
}

/// HTTP client for the Gemini `generateContent` endpoint
#[derive(Debug, Clone)]
pub struct GeminiClient {
    client: reqwest::Client,
    endpoint: String,
    model_name: String,
    jpeg_quality: u8,
}

impl GeminiClient {
    /// # Errors
    /// - Failed to create HTTP client
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| OverlayError::network_error("Failed to create HTTP client", e))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model_name: config.model_name.clone(),
            jpeg_quality: config.jpeg_quality,
        })
    }

    /// Request URL without the API key
    #[must_use]
    pub fn request_url(&self) -> String {
        format!("{}/{}:generateContent", self.endpoint, self.model_name)
    }

    fn build_request<'a>(
        prompt: &'a str,
        character: String,
        background: String,
    ) -> GenerateContentRequest<'a> {
        let image_part = |data| RequestPart::Image {
            inline_data: InlineData {
                mime_type: "image/jpeg".to_string(),
                data,
            },
        };

        GenerateContentRequest {
            contents: vec![RequestContent {
                parts: vec![
                    RequestPart::Text { text: prompt },
                    image_part(character),
                    image_part(background),
                ],
            }],
            safety_settings: HARM_CATEGORIES
                .iter()
                .map(|category| SafetySetting {
                    category,
                    threshold: "BLOCK_NONE",
                })
                .collect(),
            generation_config: serde_json::Map::new(),
        }
    }
}

#[async_trait]
impl GenerativeBackend for GeminiClient {
    #[instrument(skip_all, fields(model = %self.model_name))]
    async fn generate(
        &self,
        api_key: &str,
        character: &DynamicImage,
        background: &DynamicImage,
        prompt: &str,
    ) -> std::result::Result<String, GenerationError> {
        if api_key.trim().is_empty() {
            return Err(GenerationError::MissingKey);
        }

        let encode = |image: &DynamicImage| {
            encode_jpeg_base64(image, self.jpeg_quality)
                .map_err(|e| GenerationError::Transport(format!("Failed to encode image: {e}")))
        };
        let request = Self::build_request(prompt, encode(character)?, encode(background)?);

        log::info!("Requesting composite from {}", self.request_url());
        let response = self
            .client
            .post(self.request_url())
            .query(&[("key", api_key.trim())])
            .json(&request)
            .send()
            .await
            .map_err(|e| GenerationError::Transport(e.without_url().to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| GenerationError::Transport(e.without_url().to_string()))?;
        log::debug!("Gemini responded with {status} ({} bytes)", body.len());

        match parse_response(&body) {
            Err(GenerationError::Transport(_)) if !status.is_success() => {
                Err(GenerationError::Provider(format!("HTTP {status}")))
            },
            other => other,
        }
    }
}

/// Single-flight wrapper turning a [`GenerativeBackend`] response into an image
#[derive(Clone)]
pub struct ImageGenerator {
    backend: Arc<dyn GenerativeBackend>,
    busy: BusyFlag,
}

impl std::fmt::Debug for ImageGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageGenerator")
            .field("busy", &self.busy.is_busy())
            .finish_non_exhaustive()
    }
}

impl ImageGenerator {
    #[must_use]
    pub fn new(backend: Arc<dyn GenerativeBackend>) -> Self {
        Self {
            backend,
            busy: BusyFlag::new(),
        }
    }

    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.busy.is_busy()
    }

    /// Generate and decode a composite image
    ///
    /// # Errors
    /// - `Generation(MissingKey)` for an empty key, before any request
    /// - `Busy` while another generation runs
    /// - Any [`GenerationError`] from the backend or while decoding
    pub async fn generate(
        &self,
        api_key: &str,
        character: &DynamicImage,
        background: &DynamicImage,
        prompt: &str,
    ) -> Result<DynamicImage> {
        if api_key.trim().is_empty() {
            return Err(GenerationError::MissingKey.into());
        }
        let _guard = self
            .busy
            .try_acquire()
            .ok_or(OverlayError::Busy("image generation"))?;

        let encoded = self
            .backend
            .generate(api_key, character, background, prompt)
            .await?;
        decode_base64_image(&encoded).map_err(OverlayError::from)
    }
}

/// Decode base64 image bytes returned by the provider
///
/// # Errors
/// - Invalid base64 or undecodable image
pub fn decode_base64_image(encoded: &str) -> std::result::Result<DynamicImage, GenerationError> {
    let bytes = BASE64
        .decode(encoded.trim())
        .map_err(|e| GenerationError::InvalidImage(e.to_string()))?;
    image::load_from_memory(&bytes).map_err(|e| GenerationError::InvalidImage(e.to_string()))
}

/// Scriptable [`GenerativeBackend`] for tests and offline runs
#[derive(Debug, Clone)]
pub struct MockGenerativeBackend {
    outcome: std::result::Result<String, GenerationError>,
    delay: Option<Duration>,
    calls: Arc<std::sync::atomic::AtomicUsize>,
}

impl MockGenerativeBackend {
    /// Always return `image` (PNG encoded)
    ///
    /// # Errors
    /// - PNG encoding failure
    pub fn returning(image: &DynamicImage) -> Result<Self> {
        let mut bytes = Vec::new();
        image.write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)?;
        Ok(Self::returning_base64(BASE64.encode(bytes)))
    }

    /// Always return the given base64 payload
    #[must_use]
    pub fn returning_base64(data: String) -> Self {
        Self {
            outcome: Ok(data),
            delay: None,
            calls: Arc::default(),
        }
    }

    /// Always fail with `error`
    #[must_use]
    pub fn failing(error: GenerationError) -> Self {
        Self {
            outcome: Err(error),
            delay: None,
            calls: Arc::default(),
        }
    }

    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of requests that reached the backend, shared across clones
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerativeBackend for MockGenerativeBackend {
    async fn generate(
        &self,
        api_key: &str,
        _character: &DynamicImage,
        _background: &DynamicImage,
        _prompt: &str,
    ) -> std::result::Result<String, GenerationError> {
        if api_key.trim().is_empty() {
            return Err(GenerationError::MissingKey);
        }
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.outcome.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn sample(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([90, 60, 30])))
    }

    #[test]
    fn test_parse_inline_image() {
        let body = r#"{"candidates":[{"content":{"parts":[{"text":"here you go"},{"inlineData":{"mimeType":"image/png","data":"QUJD"}}]}}]}"#;
        assert_eq!(parse_response(body).unwrap(), "QUJD");
    }

    #[test]
    fn test_parse_provider_error() {
        let body = r#"{"error":{"code":400,"message":"API key not valid","status":"INVALID_ARGUMENT"}}"#;
        assert_eq!(
            parse_response(body).unwrap_err(),
            GenerationError::Provider("API key not valid".into())
        );
        assert_eq!(
            parse_response(r#"{"error":{}}"#).unwrap_err(),
            GenerationError::Provider("API Error".into())
        );
    }

    #[test]
    fn test_parse_safety_block_is_distinct_from_empty() {
        let blocked = parse_response(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#).unwrap_err();
        assert!(matches!(blocked, GenerationError::SafetyBlocked(ref f) if f.contains("SAFETY")));

        let empty = parse_response(r#"{"candidates":[]}"#).unwrap_err();
        assert_eq!(empty, GenerationError::EmptyResponse);
    }

    #[test]
    fn test_parse_text_only() {
        let body = r#"{"candidates":[{"content":{"parts":[{"text":"I cannot do that"}]}}]}"#;
        assert_eq!(
            parse_response(body).unwrap_err(),
            GenerationError::TextOnly("I cannot do that".into())
        );
    }

    #[test]
    fn test_parse_malformed_body() {
        assert!(matches!(
            parse_response("<html>bad gateway</html>"),
            Err(GenerationError::Transport(_))
        ));
    }

    #[test]
    fn test_request_payload_shape() {
        let request = GeminiClient::build_request("compose", "AAA".into(), "BBB".into());
        let json = serde_json::to_value(&request).unwrap();

        let parts = &json["contents"][0]["parts"];
        assert_eq!(parts[0]["text"], "compose");
        assert_eq!(parts[1]["inlineData"]["mimeType"], "image/jpeg");
        assert_eq!(parts[1]["inlineData"]["data"], "AAA");
        assert_eq!(parts[2]["inlineData"]["data"], "BBB");
        assert_eq!(json["safetySettings"].as_array().unwrap().len(), 4);
        assert_eq!(json["safetySettings"][0]["threshold"], "BLOCK_NONE");
        assert!(json["generationConfig"].as_object().unwrap().is_empty());
    }

    #[test]
    fn test_request_url() {
        let client = GeminiClient::new(&GenerationConfig::default()).unwrap();
        assert_eq!(
            client.request_url(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-3-pro-image-preview:generateContent"
        );
    }

    #[tokio::test]
    async fn test_gemini_client_rejects_empty_key_without_network() {
        let config = GenerationConfig {
            endpoint: "http://127.0.0.1:9".to_string(),
            ..GenerationConfig::default()
        };
        let client = GeminiClient::new(&config).unwrap();
        let err = client
            .generate("  ", &sample(4, 4), &sample(4, 4), "prompt")
            .await
            .unwrap_err();
        assert_eq!(err, GenerationError::MissingKey);
    }

    #[tokio::test]
    async fn test_generator_decodes_result() {
        let backend = MockGenerativeBackend::returning(&sample(12, 8)).unwrap();
        let generator = ImageGenerator::new(Arc::new(backend.clone()));

        let image = generator
            .generate("key", &sample(4, 4), &sample(4, 4), "prompt")
            .await
            .unwrap();
        assert_eq!((image.width(), image.height()), (12, 8));
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn test_generator_missing_key_makes_no_call() {
        let backend = MockGenerativeBackend::returning_base64("QUJD".into());
        let generator = ImageGenerator::new(Arc::new(backend.clone()));

        let err = generator
            .generate("", &sample(4, 4), &sample(4, 4), "prompt")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OverlayError::Generation(GenerationError::MissingKey)
        ));
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_generator_rejects_concurrent_calls() {
        let backend = MockGenerativeBackend::returning(&sample(2, 2))
            .unwrap()
            .with_delay(Duration::from_millis(50));
        let generator = ImageGenerator::new(Arc::new(backend.clone()));
        let (a, b) = (sample(2, 2), sample(2, 2));

        let (first, second) = tokio::join!(
            generator.generate("key", &a, &b, "p"),
            generator.generate("key", &a, &b, "p"),
        );
        assert!(first.is_ok());
        assert!(matches!(second, Err(OverlayError::Busy(_))));
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn test_generator_invalid_payload() {
        let generator =
            ImageGenerator::new(Arc::new(MockGenerativeBackend::returning_base64("QUJD".into())));
        let err = generator
            .generate("key", &sample(2, 2), &sample(2, 2), "p")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OverlayError::Generation(GenerationError::InvalidImage(_))
        ));
    }

    #[test]
    fn test_jpeg_encoding_round_trips() {
        let encoded = encode_jpeg_base64(&sample(16, 16), 90).unwrap();
        let decoded = decode_base64_image(&encoded).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (16, 16));
    }
}
