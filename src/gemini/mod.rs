//! # Gemini Image Generation Client
//!
//! Sends a composed outfit request to the Gemini `generateContent` endpoint and
//! pulls the generated image out of the response.
//!
//! ## Request Layout
//!
//! A single user turn whose parts are every encoded image, in the order the
//! instruction text references them (`[IMAGE_1]`, `[IMAGE_2]`, ...), followed by
//! exactly one text part carrying the instruction.
//!
//! ## Response Handling
//!
//! Only the first candidate is inspected. Its parts are scanned for the first
//! inline payload, which is returned as `data:image/png;base64,<data>`. The
//! service-reported MIME type is not used: the model is expected to return PNG.
//!
//! ## Failure Modes
//!
//! - No API key configured: `MissingCredential`, before any network activity
//! - Connection errors, non-success statuses, unparseable bodies: `TransportFailure`
//! - No candidate, or no inline image in it: `NoImageReturned`
//!
//! Each call is exactly one round trip. Retrying is left to the caller.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::Client;
use tracing::{error, info};

use crate::config::Config;
use crate::error::GenerationError;
use crate::models::{
    GeminiContent, GeminiGenerationConfig, GeminiInlineData, GeminiPart, GeminiRequest,
    GeminiResponse, GenerationRequest, RequestPart,
};
use crate::traits::GenerationBackend;

/// MIME type stamped on every returned image
pub const RESULT_MIME: &str = "image/png";

/// HTTP client for the Gemini generation endpoint
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: Option<String>,
    endpoint: String,
}

impl GeminiClient {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("outfit-studio/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let endpoint = format!(
            "{}/models/{}:generateContent",
            config.api_base.trim_end_matches('/'),
            config.model
        );

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            endpoint,
        })
    }

    fn api_key(&self) -> Result<&str, GenerationError> {
        self.api_key.as_deref().ok_or(GenerationError::MissingCredential)
    }
}

#[async_trait]
impl GenerationBackend for GeminiClient {
    fn preflight(&self) -> Result<(), GenerationError> {
        self.api_key().map(|_| ())
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let api_key = self.api_key()?;
        let body = build_request(request);

        info!(
            "Sending generation request with {} image parts",
            request.image_count()
        );

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerationError::TransportFailure(e.into()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            error!("Gemini API error: {} {}", status, detail);
            return Err(GenerationError::TransportFailure(anyhow!(
                "Gemini API returned {status}: {detail}"
            )));
        }

        let parsed: GeminiResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::TransportFailure(e.into()))?;

        extract_image(parsed)
    }
}

/// Maps request parts onto the Gemini wire format, preserving order
pub fn build_request(request: &GenerationRequest) -> GeminiRequest {
    let parts = request
        .parts
        .iter()
        .map(|part| match part {
            RequestPart::InlineImage(block) => GeminiPart {
                inline_data: Some(GeminiInlineData {
                    mime_type: block.mime_type.clone(),
                    data: block.data.clone(),
                }),
                ..GeminiPart::default()
            },
            RequestPart::Text(text) => GeminiPart {
                text: Some(text.clone()),
                ..GeminiPart::default()
            },
        })
        .collect();

    GeminiRequest {
        contents: vec![GeminiContent {
            role: Some("user".to_string()),
            parts,
        }],
        generation_config: Some(GeminiGenerationConfig {
            response_modalities: vec!["IMAGE".to_string(), "TEXT".to_string()],
        }),
    }
}

/// Returns the first inline image of the first candidate as a PNG data URL
pub fn extract_image(response: GeminiResponse) -> Result<String, GenerationError> {
    response
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .and_then(|content| content.parts.into_iter().find_map(|part| part.inline_data))
        .map(|inline| format!("data:{RESULT_MIME};base64,{}", inline.data))
        .ok_or(GenerationError::NoImageReturned)
}

/// Splits a base64 `data:` URL into its MIME type and decoded bytes
pub fn decode_data_url(url: &str) -> Result<(String, Vec<u8>)> {
    let rest = url.strip_prefix("data:").context("not a data URL")?;
    let (mime_type, data) = rest
        .split_once(";base64,")
        .context("data URL is not base64 encoded")?;
    let bytes = STANDARD.decode(data).context("invalid base64 payload")?;

    Ok((mime_type.to_string(), bytes))
}
