//! Runtime configuration.
//!
//! Everything except credentials can come from an optional TOML file; every
//! field has a default so an empty (or absent) file is valid. Credentials are
//! only read from the environment.

use serde::{Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    time::Duration,
};
use thiserror::Error;
use url::Url;

use crate::{
    persistence::DEFAULT_MEMORY_SESSIONS,
    providers::{Deepseek, OpenAI},
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub models: ModelsConfig,
    pub research: ResearchConfig,
    pub weather: WeatherConfig,
    pub storage: StorageConfig,
    pub prompt: PromptConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelsConfig {
    /// Model used when the request carries image attachments.
    pub vision_model: String,
    /// Model used for text-only requests.
    pub text_model: String,
    pub openai_base_url: Url,
    pub deepseek_base_url: Url,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            vision_model: "gpt-4o".to_string(),
            text_model: "deepseek-chat".to_string(),
            openai_base_url: OpenAI::default_base_url(),
            deepseek_base_url: Deepseek::default_base_url(),
            temperature: 0.7,
            max_tokens: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResearchConfig {
    pub max_depth: u32,
    pub max_links_per_depth: usize,
    pub max_duration_secs: u64,
    /// Upper bound for a single search or extract call. Unset means unbounded.
    pub step_timeout_secs: Option<u64>,
    /// Pause after a failed search, clipped to the remaining budget.
    pub retry_backoff_ms: u64,
    pub firecrawl_base_url: Url,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            max_depth: 3,
            max_links_per_depth: 5,
            max_duration_secs: 120,
            step_timeout_secs: None,
            retry_backoff_ms: 500,
            firecrawl_base_url: Url::parse("https://api.firecrawl.dev/").expect("static URL is valid"),
        }
    }
}

impl ResearchConfig {
    pub fn max_duration(&self) -> Duration {
        Duration::from_secs(self.max_duration_secs)
    }

    pub fn step_timeout(&self) -> Option<Duration> {
        self.step_timeout_secs.map(Duration::from_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WeatherConfig {
    pub base_url: Url,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            base_url: Url::parse("https://api.open-meteo.com/v1/").expect("static URL is valid"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    /// Directory for JSON transcripts. Unset keeps transcripts in memory.
    pub dir: Option<PathBuf>,
    /// Sessions kept when transcripts live in memory.
    pub memory_sessions: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: None,
            memory_sessions: DEFAULT_MEMORY_SESSIONS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PromptConfig {
    pub system: String,
    /// Appended when images are sent to a vision-capable model.
    pub vision_hint: String,
    /// Appended when images were sent but no vision model is available.
    pub no_vision_hint: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            system: "You are an AI assistant. Give short, clear answers to the user's questions.\n\n\
                When the user only sends a greeting (\"hello\", \"hi\", ...), reply with a polite \
                greeting and nothing else.\n\n\
                When the user asks for it you can look up the weather for a location and run \
                in-depth web research on a topic."
                .to_string(),
            vision_hint: "The user sent images. Analyze them and describe the objects, colors, \
                composition and notable details."
                .to_string(),
            no_vision_hint: "The user sent images but image analysis is not available right now. \
                Tell the user that image analysis requires an OpenAI API key."
                .to_string(),
        }
    }
}

/// Credentials read from the process environment.
#[derive(Clone, Default)]
pub struct Credentials {
    pub openai_api_key: Option<String>,
    pub deepseek_api_key: Option<String>,
    pub firecrawl_api_key: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("openai_api_key", &self.openai_api_key.as_ref().map(|_| "<redacted>"))
            .field("deepseek_api_key", &self.deepseek_api_key.as_ref().map(|_| "<redacted>"))
            .field("firecrawl_api_key", &self.firecrawl_api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

pub const FIRECRAWL_API_KEY_NAME: &str = "FIRECRAWL_API_KEY";

impl Credentials {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds credentials from an arbitrary lookup; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        Self {
            openai_api_key: get(OpenAI::API_KEY_NAME),
            deepseek_api_key: get(Deepseek::API_KEY_NAME),
            firecrawl_api_key: get(FIRECRAWL_API_KEY_NAME),
        }
    }
}

impl Config {
    /// Loads the file at `path`, or the defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }
}
