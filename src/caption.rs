use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use image::{DynamicImage, ImageOutputFormat, RgbImage};
use log::{debug, info};
use reqwest::StatusCode;
use std::time::Instant;

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

const API_KEY_HEADER: &str = "x-goog-api-key";

const CAPTION_PROMPT: &str =
    "Write a single short sentence that captions this image. Reply with the caption only.";

const JPEG_QUALITY: u8 = 85;

#[derive(Debug, thiserror::Error)]
pub enum CaptionError {
    #[error("model {0} is not available")]
    UnknownModel(String),
    #[error("failed to encode image: {0}")]
    Encode(#[from] image::ImageError),
    #[error("encode task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    #[error("request failed: {0}")]
    Http(reqwest::Error),
    #[error("API error {status}: {body}")]
    Api { status: StatusCode, body: String },
    #[error("invalid response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("no caption in response")]
    Empty,
}

impl From<reqwest::Error> for CaptionError {
    fn from(err: reqwest::Error) -> Self {
        // Error text must never show request URLs.
        CaptionError::Http(err.without_url())
    }
}

/// Turns a decoded RGB bitmap into a caption.
///
/// Implementations are built once at start and shared read-only by all
/// requests.
#[async_trait]
pub trait Captioner: Send + Sync {
    fn model_id(&self) -> &str;

    async fn caption(&self, image: RgbImage) -> Result<String, CaptionError>;
}

/// Captioner backed by a hosted Gemini vision model.
pub struct GeminiCaptioner {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
}

impl GeminiCaptioner {
    /// Checks that `model` is served for this key before handing out a
    /// handle, so the server never starts without a working model.
    pub async fn load(api_key: &str, model: &str) -> Result<Self, CaptionError> {
        Self::load_from(API_BASE, api_key, model).await
    }

    pub(crate) async fn load_from(
        api_base: &str,
        api_key: &str,
        model: &str,
    ) -> Result<Self, CaptionError> {
        let client = reqwest::Client::new();
        let url = format!("{api_base}/models/{model}");

        let response = client
            .get(&url)
            .header(API_KEY_HEADER, api_key)
            .send()
            .await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(CaptionError::UnknownModel(model.to_string()));
        }
        if !status.is_success() {
            let body = response.text().await?;
            return Err(CaptionError::Api {
                status,
                body: truncate(&body),
            });
        }

        info!("caption model {model} loaded");
        Ok(Self {
            client,
            api_base: api_base.to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        })
    }
}

fn encode_jpeg(image: RgbImage) -> Result<Vec<u8>, CaptionError> {
    let mut jpeg_bytes = Vec::new();
    DynamicImage::ImageRgb8(image).write_to(
        &mut std::io::Cursor::new(&mut jpeg_bytes),
        ImageOutputFormat::Jpeg(JPEG_QUALITY),
    )?;
    Ok(jpeg_bytes)
}

#[async_trait]
impl Captioner for GeminiCaptioner {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn caption(&self, image: RgbImage) -> Result<String, CaptionError> {
        let start = Instant::now();

        let jpeg_bytes = tokio::task::spawn_blocking(move || encode_jpeg(image)).await??;
        let image_base64 = general_purpose::STANDARD.encode(&jpeg_bytes);

        let url = format!("{}/models/{}:generateContent", self.api_base, self.model);
        let payload = serde_json::json!({
            "contents": [{
                "parts": [
                    { "text": CAPTION_PROMPT },
                    {
                        "inline_data": {
                            "mime_type": "image/jpeg",
                            "data": image_base64
                        }
                    }
                ]
            }]
        });

        debug!("sending caption request to {}", self.model);
        let response = self
            .client
            .post(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(&payload)
            .send()
            .await?;
        let status = response.status();
        let response_text = response.text().await?;

        if !status.is_success() {
            return Err(CaptionError::Api {
                status,
                body: truncate(&response_text),
            });
        }

        let result: serde_json::Value = serde_json::from_str(&response_text)?;
        let caption = extract_caption(&result)?;

        info!(
            "caption from {} in {}ms: {caption}",
            self.model,
            start.elapsed().as_millis()
        );
        Ok(caption)
    }
}

fn extract_caption(result: &serde_json::Value) -> Result<String, CaptionError> {
    let caption = result["candidates"][0]["content"]["parts"][0]["text"]
        .as_str()
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .ok_or(CaptionError::Empty)?;
    Ok(caption.to_string())
}

fn truncate(body: &str) -> String {
    body.chars().take(500).collect()
}
