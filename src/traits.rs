//! Async seams between the orchestration layer and the outside world

use anyhow::Result;
use async_trait::async_trait;

use crate::error::GenerationError;
use crate::models::{GenerationRequest, QuotaRecord};

/// Raw response of a remote image download
#[derive(Debug, Clone)]
pub struct FetchedImage {
    pub bytes: Vec<u8>,
    /// Value of the `Content-Type` header, if any
    pub content_type: Option<String>,
}

/// Downloads preset images
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    /// Fetch the body of `url`
    ///
    /// # Returns
    /// * `Result<FetchedImage, GenerationError>` - The body, or `FetchFailure` on
    ///   transport errors and non-success statuses
    async fn fetch(&self, url: &str) -> Result<FetchedImage, GenerationError>;
}

/// Remote multimodal model producing the composite image
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Cheap local check run before any asset is fetched
    fn preflight(&self) -> Result<(), GenerationError> {
        Ok(())
    }

    /// Send one request and return the produced image as a `data:` URL
    ///
    /// # Arguments
    /// * `request` - Ordered image parts followed by the instruction text
    ///
    /// # Returns
    /// * `Result<String, GenerationError>` - `data:image/png;base64,...` on success
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError>;
}

/// Storage for the single quota record
#[async_trait]
pub trait QuotaStore: Send + Sync {
    async fn read(&self) -> Result<Option<QuotaRecord>>;

    /// Replace the stored record as one value
    async fn write(&self, record: &QuotaRecord) -> Result<()>;
}
