//! Error taxonomy for the generation pipeline

use thiserror::Error;

/// Coarse error category, cheap to copy into [`crate::models::GenerationState`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    MissingCredential,
    MissingProfileImage,
    QuotaExhausted,
    AlreadyInFlight,
    FetchFailure,
    TransportFailure,
    NoImageReturned,
    Storage,
    Io,
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("API key not found")]
    MissingCredential,

    #[error("no profile image set")]
    MissingProfileImage,

    #[error("daily limit of {limit} generations reached")]
    QuotaExhausted { limit: u32 },

    #[error("a generation is already in progress")]
    AlreadyInFlight,

    #[error("failed to fetch image {url}: {reason}")]
    FetchFailure { url: String, reason: String },

    #[error("generation request failed: {0}")]
    TransportFailure(#[source] anyhow::Error),

    #[error("no image generated")]
    NoImageReturned,

    #[error("quota storage error: {0}")]
    Storage(#[source] anyhow::Error),

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl GenerationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingCredential => ErrorKind::MissingCredential,
            Self::MissingProfileImage => ErrorKind::MissingProfileImage,
            Self::QuotaExhausted { .. } => ErrorKind::QuotaExhausted,
            Self::AlreadyInFlight => ErrorKind::AlreadyInFlight,
            Self::FetchFailure { .. } => ErrorKind::FetchFailure,
            Self::TransportFailure(_) => ErrorKind::TransportFailure,
            Self::NoImageReturned => ErrorKind::NoImageReturned,
            Self::Storage(_) => ErrorKind::Storage,
            Self::Io { .. } => ErrorKind::Io,
        }
    }

    /// Short message suitable for showing to the user
    pub fn user_message(&self) -> String {
        match self {
            Self::MissingCredential => "API key not found. Set GEMINI_API_KEY and try again.".to_string(),
            Self::MissingProfileImage => "Please upload a profile photo first.".to_string(),
            Self::QuotaExhausted { .. } => "Daily limit reached. Please come back tomorrow!".to_string(),
            Self::AlreadyInFlight => "A generation is already running.".to_string(),
            Self::NoImageReturned => "No image generated. Please try again.".to_string(),
            Self::TransportFailure(_) | Self::FetchFailure { .. } => {
                "Failed to generate outfit. Please try again.".to_string()
            }
            Self::Storage(_) | Self::Io { .. } => self.to_string(),
        }
    }
}
