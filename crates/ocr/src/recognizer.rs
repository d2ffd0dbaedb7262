use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use billscan_core::{ErrorClass, ErrorKind};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OcrError {
    #[error("Image decode error: {0}")]
    ImageDecode(String),
    #[error("OCR engine error: {0}")]
    Engine(String),
    #[error("OCR returned no text")]
    EmptyText,
    #[error("OCR backend unavailable: {0}")]
    Unavailable(String),
}

impl ErrorClass for OcrError {
    fn kind(&self) -> ErrorKind {
        match self {
            OcrError::Unavailable(_) => ErrorKind::BackendUnavailable,
            _ => ErrorKind::OcrError,
        }
    }
}

/// Abstraction over an OCR backend.
/// Implementations accept PNG/JPEG image bytes and return the recognized text.
#[async_trait]
pub trait OcrBackend: Send + Sync {
    async fn recognize(&self, image_bytes: &[u8]) -> Result<String, OcrError>;
}

#[async_trait]
impl<T: OcrBackend + ?Sized> OcrBackend for Box<T> {
    async fn recognize(&self, image_bytes: &[u8]) -> Result<String, OcrError> {
        (**self).recognize(image_bytes).await
    }
}

// ── Mock backend (always available, used for tests) ───────────────────────────

/// Returns a pre-set string, so the extraction pipeline can be exercised
/// without a cloud account or Tesseract install.
pub struct MockRecognizer {
    pub text: String,
}

impl MockRecognizer {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

#[async_trait]
impl OcrBackend for MockRecognizer {
    async fn recognize(&self, _image_bytes: &[u8]) -> Result<String, OcrError> {
        if self.text.trim().is_empty() {
            return Err(OcrError::EmptyText);
        }
        Ok(self.text.clone())
    }
}

// ── Google Cloud Vision (REST) ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    pub endpoint: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// `DOCUMENT_TEXT_DETECTION` suits dense bills better than `TEXT_DETECTION`.
    pub feature: String,
    pub language_hints: Vec<String>,
    pub timeout_secs: u64,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://vision.googleapis.com".to_string(),
            api_key_env: "GOOGLE_VISION_API_KEY".to_string(),
            feature: "DOCUMENT_TEXT_DETECTION".to_string(),
            language_hints: vec!["en".to_string(), "hi".to_string()],
            timeout_secs: 60,
        }
    }
}

pub struct GoogleVisionRecognizer {
    client: reqwest::Client,
    url: String,
    api_key: String,
    feature: String,
    language_hints: Vec<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AnnotateRequest<'a> {
    requests: [AnnotateImageRequest<'a>; 1],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AnnotateImageRequest<'a> {
    image: VisionImage,
    features: [VisionFeature<'a>; 1],
    image_context: ImageContext<'a>,
}

#[derive(Serialize)]
struct VisionImage {
    content: String,
}

#[derive(Serialize)]
struct VisionFeature<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ImageContext<'a> {
    language_hints: &'a [String],
}

#[derive(Deserialize)]
struct AnnotateResponse {
    #[serde(default)]
    responses: Vec<AnnotateImageResponse>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnnotateImageResponse {
    full_text_annotation: Option<TextAnnotation>,
    error: Option<VisionStatus>,
}

#[derive(Deserialize)]
struct TextAnnotation {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct VisionStatus {
    #[serde(default)]
    message: String,
}

impl GoogleVisionRecognizer {
    pub fn new(config: &VisionConfig, api_key: impl Into<String>) -> Result<Self, OcrError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| OcrError::Engine(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            url: format!("{}/v1/images:annotate", config.endpoint.trim_end_matches('/')),
            api_key: api_key.into(),
            feature: config.feature.clone(),
            language_hints: config.language_hints.clone(),
        })
    }

    /// Read the API key from the configured environment variable.
    pub fn from_env(config: &VisionConfig) -> Result<Self, OcrError> {
        let key = std::env::var(&config.api_key_env)
            .map_err(|_| OcrError::Unavailable(format!("{} not set", config.api_key_env)))?;
        Self::new(config, key)
    }
}

#[async_trait]
impl OcrBackend for GoogleVisionRecognizer {
    async fn recognize(&self, image_bytes: &[u8]) -> Result<String, OcrError> {
        let body = AnnotateRequest {
            requests: [AnnotateImageRequest {
                image: VisionImage { content: BASE64_STANDARD.encode(image_bytes) },
                features: [VisionFeature { kind: &self.feature }],
                image_context: ImageContext { language_hints: &self.language_hints },
            }],
        };

        let response = self
            .client
            .post(&self.url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                let e = e.without_url();
                if e.is_timeout() {
                    OcrError::Unavailable("request timed out".to_string())
                } else if e.is_connect() {
                    OcrError::Unavailable(format!("connection failed: {e}"))
                } else {
                    OcrError::Unavailable(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = format!("Vision API returned {status}: {}", body.trim());
            return Err(if is_outage_status(status) {
                OcrError::Unavailable(message)
            } else {
                OcrError::Engine(message)
            });
        }

        let parsed: AnnotateResponse = response
            .json()
            .await
            .map_err(|e| OcrError::Engine(format!("Invalid Vision API response: {e}")))?;

        let first = parsed
            .responses
            .into_iter()
            .next()
            .ok_or_else(|| OcrError::Engine("Vision API returned no responses".to_string()))?;

        if let Some(err) = first.error.filter(|e| !e.message.is_empty()) {
            return Err(OcrError::Engine(err.message));
        }

        let text = first.full_text_annotation.map(|a| a.text).unwrap_or_default();
        if text.trim().is_empty() {
            return Err(OcrError::EmptyText);
        }
        Ok(text)
    }
}

/// Auth failures, throttling and server errors are outages, not content problems.
fn is_outage_status(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::UNAUTHORIZED
        || status == reqwest::StatusCode::FORBIDDEN
        || status == reqwest::StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
}

// ── Tesseract backend (optional, gated behind `tesseract` feature) ─────────────

#[cfg(feature = "tesseract")]
pub mod tesseract_backend {
    use super::{OcrBackend, OcrError};
    use async_trait::async_trait;
    use leptess::LepTess;

    pub struct TesseractRecognizer {
        data_path: Option<String>,
        lang: String,
    }

    impl TesseractRecognizer {
        pub fn new(data_path: Option<String>, lang: &str) -> Self {
            Self { data_path, lang: lang.to_string() }
        }

        fn recognize_blocking(
            data_path: Option<&str>,
            lang: &str,
            image_bytes: &[u8],
        ) -> Result<String, OcrError> {
            let mut lt = LepTess::new(data_path, lang).map_err(|e| OcrError::Engine(e.to_string()))?;
            lt.set_image_from_mem(image_bytes)
                .map_err(|e| OcrError::ImageDecode(e.to_string()))?;
            lt.get_utf8_text().map_err(|e| OcrError::Engine(e.to_string()))
        }
    }

    #[async_trait]
    impl OcrBackend for TesseractRecognizer {
        async fn recognize(&self, image_bytes: &[u8]) -> Result<String, OcrError> {
            let data_path = self.data_path.clone();
            let lang = self.lang.clone();
            let bytes = image_bytes.to_vec();
            let text = tokio::task::spawn_blocking(move || {
                Self::recognize_blocking(data_path.as_deref(), &lang, &bytes)
            })
            .await
            .map_err(|e| OcrError::Engine(format!("Tesseract task failed: {e}")))??;

            if text.trim().is_empty() {
                return Err(OcrError::EmptyText);
            }
            Ok(text)
        }
    }
}
