use std::path::PathBuf;

use log::{debug, warn};

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_DATABASE: &str = "./storyforge.db";

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Runtime settings, resolved once at startup and handed down by reference.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    /// Credential for the story model. `None` disables the model path entirely.
    pub api_key: Option<String>,
    /// Alternate OpenAI-compatible endpoint (e.g. a hosted connection proxy).
    pub base_url: Option<String>,
    pub model: String,
    pub database: Database,
}

/// Where stories are kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Database {
    File(PathBuf),
    InMemory,
}

impl Default for Database {
    fn default() -> Self {
        Database::File(PathBuf::from(DEFAULT_DATABASE))
    }
}

impl Settings {
    /// Read settings from the process environment, loading `.env` first if present.
    pub fn from_env() -> Self {
        match dotenvy::dotenv() {
            Ok(path) => debug!("Loaded environment from {}", path.display()),
            Err(e) => debug!("No .env file loaded: {e}"),
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_blank = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let api_key = non_blank("OPENAI_API_KEY")
            .or_else(|| non_blank("CHOREO_OPENAI_CONNECTION_OPENAI_API_KEY"));

        Self {
            api_key,
            base_url: non_blank("CHOREO_OPENAI_CONNECTION_SERVICEURL"),
            model: non_blank("STORY_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            database: non_blank("DATABASE_URL")
                .and_then(|url| {
                    let database = Database::parse(&url);
                    if database.is_none() {
                        warn!(
                            "DATABASE_URL is not a SQLite location; using {DEFAULT_DATABASE} instead"
                        );
                    }
                    database
                })
                .unwrap_or_default(),
        }
    }

    /// Whether the model-backed generator may be attempted at all.
    pub fn has_llm(&self) -> bool {
        self.api_key.is_some()
    }

    pub fn llm_base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)
    }
}

impl Database {
    /// Accepts a bare path, `sqlite://path`, `sqlite:///path` or `:memory:`.
    /// Any other `scheme://` URL is refused.
    pub fn parse(url: &str) -> Option<Self> {
        if url.contains("://") && !url.starts_with("sqlite://") {
            return None;
        }
        let path = url
            .strip_prefix("sqlite:///")
            .or_else(|| url.strip_prefix("sqlite://"))
            .unwrap_or(url);

        if path == ":memory:" {
            Some(Database::InMemory)
        } else {
            Some(Database::File(PathBuf::from(path)))
        }
    }
}
