//! Virtual outfit try-on: resolves a profile photo and wardrobe slots into a
//! single multimodal Gemini request, with a locally persisted daily quota.

pub mod config;
pub mod countdown;
pub mod database;
pub mod encoder;
pub mod error;
pub mod gemini;
pub mod models;
pub mod outfit_studio;
pub mod presets;
pub mod prompt;
pub mod quota;
pub mod resolver;
pub mod traits;

pub use error::{ErrorKind, GenerationError};
pub use outfit_studio::OutfitStudio;
