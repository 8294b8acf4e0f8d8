//! Environment-driven configuration

use tracing::warn;

pub const DEFAULT_MODEL: &str = "gemini-3-pro-image-preview";
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_DATABASE_URL: &str = "sqlite:database/outfit.db";

/// Generations allowed per calendar day
pub const DAILY_LIMIT: u32 = 10;

/// Initial countdown shown while a generation runs, in seconds
pub const INITIAL_ESTIMATE_SECS: u32 = 20;

#[derive(Debug, Clone)]
pub struct Config {
    /// `GEMINI_API_KEY`, falling back to `API_KEY`
    pub api_key: Option<String>,
    pub model: String,
    pub api_base: String,
    pub database_url: String,
}

impl Config {
    /// Reads the process environment. Call after `dotenvy::dotenv()`.
    pub fn from_env() -> Self {
        let api_key = non_empty_var("GEMINI_API_KEY").or_else(|| non_empty_var("API_KEY"));

        if api_key.is_none() {
            warn!("GEMINI_API_KEY not set - generation requests will be refused");
        }

        Self {
            api_key,
            model: non_empty_var("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            api_base: non_empty_var("GEMINI_API_BASE")
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            database_url: non_empty_var("QUOTA_DATABASE_URL")
                .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
