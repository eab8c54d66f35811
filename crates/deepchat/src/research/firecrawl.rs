//! Firecrawl v1 client for search and scrape.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, instrument};
use url::Url;

use super::{SearchHit, WebResearch, WebResearchError};
use crate::outbound::CLIENT;

const SEARCH_LIMIT: u32 = 10;

#[derive(Clone)]
pub struct FirecrawlClient {
    client: Client,
    base_url: Url,
    api_key: Option<String>,
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    limit: u32,
}

#[derive(Serialize)]
struct ScrapeRequest<'a> {
    url: &'a str,
    formats: [&'a str; 1],
}

impl FirecrawlClient {
    pub fn new(base_url: Url, api_key: Option<String>) -> Self {
        Self {
            client: CLIENT.clone(),
            base_url,
            api_key,
        }
    }

    async fn post<B: Serialize>(&self, path: &str, body: &B) -> Result<Value, WebResearchError> {
        let key = self.api_key.as_deref().ok_or_else(|| {
            WebResearchError::NotConfigured(format!(
                "{} is not set",
                crate::config::FIRECRAWL_API_KEY_NAME
            ))
        })?;
        let url = self
            .base_url
            .join(path)
            .map_err(|e| WebResearchError::NotConfigured(e.to_string()))?;

        let resp = self
            .client
            .post(url)
            .bearer_auth(key)
            .json(body)
            .send()
            .await?;

        let status = resp.status();
        let bytes = resp.bytes().await?;
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(WebResearchError::Unauthorized(error_message(&bytes, status)));
        }
        if !status.is_success() {
            return Err(WebResearchError::Request(error_message(&bytes, status)));
        }
        serde_json::from_slice(&bytes).map_err(|e| WebResearchError::Decode(e.to_string()))
    }
}

fn error_message(body: &[u8], status: StatusCode) -> String {
    serde_json::from_slice::<Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| format!("HTTP {}: {}", status.as_u16(), String::from_utf8_lossy(body)))
}

/// Accepts a bare array or an object holding the list under `data`,
/// `results` or `items`. Entries without a URL are skipped.
pub(crate) fn decode_search(body: &Value) -> Result<Vec<SearchHit>, WebResearchError> {
    let items = match body {
        Value::Array(items) => items,
        Value::Object(map) => ["data", "results", "items"]
            .iter()
            .find_map(|k| map.get(*k).and_then(Value::as_array))
            .ok_or_else(|| WebResearchError::Decode("search response has no result list".into()))?,
        _ => return Err(WebResearchError::Decode("search response is not a list".into())),
    };

    Ok(items
        .iter()
        .filter_map(|item| {
            let url = item.get("url").and_then(Value::as_str)?;
            let title = item
                .get("title")
                .or_else(|| item.pointer("/metadata/title"))
                .and_then(Value::as_str)
                .map(str::to_string);
            Some(SearchHit {
                url: url.to_string(),
                title,
            })
        })
        .collect())
}

/// Pulls the page text out of a scrape response; empty when none is present.
pub(crate) fn decode_scrape(body: &Value) -> String {
    let doc = match body {
        Value::Array(items) => items.first(),
        Value::Object(map) => map
            .get("data")
            .map(|d| match d {
                Value::Array(items) => items.first().unwrap_or(d),
                _ => d,
            })
            .or(Some(body)),
        _ => None,
    };
    doc.and_then(|d| {
        ["markdown", "content", "text"]
            .iter()
            .find_map(|k| d.get(*k).and_then(Value::as_str))
    })
    .unwrap_or_default()
    .to_string()
}

#[async_trait]
impl WebResearch for FirecrawlClient {
    #[instrument(name = "firecrawl.search", skip_all, fields(query = %query))]
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, WebResearchError> {
        let body = self
            .post(
                "v1/search",
                &SearchRequest {
                    query,
                    limit: SEARCH_LIMIT,
                },
            )
            .await?;
        let hits = decode_search(&body)?;
        debug!(results = hits.len(), "search returned");
        Ok(hits)
    }

    #[instrument(name = "firecrawl.scrape", skip_all, fields(url = %url))]
    async fn extract(&self, url: &str) -> Result<String, WebResearchError> {
        let body = self
            .post(
                "v1/scrape",
                &ScrapeRequest {
                    url,
                    formats: ["markdown"],
                },
            )
            .await?;
        Ok(decode_scrape(&body))
    }
}
