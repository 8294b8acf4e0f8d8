//! Turns uploaded bytes and preset URLs into base64 blocks

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use tracing::debug;

use crate::error::GenerationError;
use crate::models::{EncodedBlock, ImageSource};
use crate::traits::{FetchedImage, ImageFetcher};

/// MIME type assumed for downloads that do not declare one
pub const DEFAULT_REMOTE_MIME: &str = "image/jpeg";

/// Downloads preset images over HTTP
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("outfit-studio/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl ImageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedImage, GenerationError> {
        let failure = |reason: String| GenerationError::FetchFailure {
            url: url.to_string(),
            reason,
        };

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| failure(e.to_string()))?;

        if !response.status().is_success() {
            return Err(failure(format!("HTTP {}", response.status())));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        let bytes = response.bytes().await.map_err(|e| failure(e.to_string()))?;

        Ok(FetchedImage {
            bytes: bytes.to_vec(),
            content_type,
        })
    }
}

/// Encodes one image source per call. Nothing is cached, a URL used twice is downloaded twice.
#[derive(Clone)]
pub struct ImageEncoder {
    fetcher: Arc<dyn ImageFetcher>,
}

impl ImageEncoder {
    pub fn new(fetcher: Arc<dyn ImageFetcher>) -> Self {
        Self { fetcher }
    }

    pub async fn encode(&self, source: &ImageSource) -> Result<EncodedBlock, GenerationError> {
        match source {
            ImageSource::Uploaded { bytes, mime_type } => Ok(EncodedBlock {
                data: STANDARD.encode(bytes),
                mime_type: mime_type.clone(),
            }),
            ImageSource::Remote { url } => {
                debug!("Fetching preset image {}", url);
                let fetched = self.fetcher.fetch(url).await?;

                let mime_type = fetched
                    .content_type
                    .as_deref()
                    .map(str::trim)
                    .filter(|value| !value.is_empty())
                    .unwrap_or(DEFAULT_REMOTE_MIME)
                    .to_string();

                Ok(EncodedBlock {
                    data: STANDARD.encode(&fetched.bytes),
                    mime_type,
                })
            }
        }
    }
}
