//! Iterative web research.
//!
//! [`ResearchAgent`] runs depth-bounded search → extract → analyze rounds
//! against a [`WebResearch`] backend and reports every step to a
//! [`crate::progress::ProgressSink`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod firecrawl;
pub mod machine;
pub mod state;

pub use firecrawl::FirecrawlClient;
pub use machine::ResearchAgent;
pub use state::{ResearchLimits, ResearchReport, ResearchState};

/// One result of a web search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub url: String,
    pub title: Option<String>,
}

#[derive(Debug, Error)]
pub enum WebResearchError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("unexpected response: {0}")]
    Decode(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("search backend not configured: {0}")]
    NotConfigured(String),
}

impl From<reqwest::Error> for WebResearchError {
    fn from(err: reqwest::Error) -> Self {
        WebResearchError::Request(err.to_string())
    }
}

/// Search and content extraction over the public web.
#[async_trait]
pub trait WebResearch: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, WebResearchError>;

    /// Returns the readable text of `url`. An empty string means nothing usable.
    async fn extract(&self, url: &str) -> Result<String, WebResearchError>;
}
