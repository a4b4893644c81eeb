use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashSet;
use tracing::{debug, warn};

use super::configuration::Configuration;
use crate::error::{ReportError, Result};

pub const MAX_CITATIONS: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub content: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub title: String,
    pub author: String,
    pub year: String,
}

/// Web and scholarly search used to ground the research stage.
#[async_trait]
pub trait WebSearch: Send + Sync {
    async fn search(&self, query: &str, num_results: u32) -> Result<SearchResponse>;

    async fn scholar(&self, query: &str) -> Result<Vec<Citation>>;
}

pub struct SerperClient {
    api_key: String,
    base_url: String,
    client: Client,
}

impl SerperClient {
    pub fn new(api_key: String, base_url: String) -> Self {
        Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }

    pub fn from_config(config: &Configuration) -> Self {
        Self::new(config.serper_api_key.clone(), config.serper_base_url.clone())
    }

    async fn post(&self, endpoint: &str, body: Value) -> Result<Value> {
        let response = self
            .client
            .post(format!("{}/{endpoint}", self.base_url))
            .header("X-API-KEY", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ReportError::Upstream {
                service: "Serper",
                message: format!("{status}: {body}"),
            });
        }
        Ok(response.json::<Value>().await?)
    }
}

#[async_trait]
impl WebSearch for SerperClient {
    async fn search(&self, query: &str, num_results: u32) -> Result<SearchResponse> {
        debug!(query, num_results, "serper web search");
        let data = self
            .post("search", json!({ "q": query, "num": num_results }))
            .await?;
        Ok(parse_organic(&data))
    }

    async fn scholar(&self, query: &str) -> Result<Vec<Citation>> {
        debug!(query, "serper scholar search");
        let data = self.post("scholar", json!({ "q": query })).await?;
        Ok(parse_scholar(&data))
    }
}

fn field(entry: &Value, key: &str) -> String {
    match &entry[key] {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn parse_organic(data: &Value) -> SearchResponse {
    let results = data["organic"]
        .as_array()
        .map(|entries| {
            entries
                .iter()
                .map(|entry| SearchResult {
                    title: field(entry, "title"),
                    url: field(entry, "link"),
                    content: field(entry, "snippet"),
                })
                .collect()
        })
        .unwrap_or_default();
    SearchResponse { results }
}

fn parse_scholar(data: &Value) -> Vec<Citation> {
    data["organic"]
        .as_array()
        .map(|entries| {
            entries
                .iter()
                .take(MAX_CITATIONS)
                .map(|entry| {
                    let publication = field(entry, "publicationInfo");
                    let author = publication
                        .split(" - ")
                        .next()
                        .unwrap_or_default()
                        .trim()
                        .to_string();
                    Citation {
                        title: field(entry, "title"),
                        author,
                        year: field(entry, "year"),
                    }
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Citation lookup is optional: failures are logged and yield no citations.
pub async fn fetch_citations(search: &dyn WebSearch, query: &str) -> Vec<Citation> {
    match search.scholar(query).await {
        Ok(mut citations) => {
            citations.truncate(MAX_CITATIONS);
            citations
        }
        Err(e) => {
            warn!(error = %e, "citations cannot be fetched, continuing without them");
            Vec::new()
        }
    }
}

/// Deduplicate by URL, keeping first occurrence, and format for a prompt.
pub fn deduplicate_and_format_sources(search_response: &SearchResponse) -> String {
    let mut seen = HashSet::new();
    let mut formatted_text = String::from("Sources:\n\n");
    for source in &search_response.results {
        if !seen.insert(source.url.as_str()) {
            continue;
        }
        formatted_text.push_str(&format!("Source {}:\n===\n", source.title));
        formatted_text.push_str(&format!("URL: {}\n===\n", source.url));
        formatted_text.push_str(&format!(
            "Most relevant content from source: {}\n===\n",
            source.content
        ));
    }
    formatted_text.trim().to_string()
}

pub fn format_sources(search_results: &SearchResponse) -> String {
    search_results
        .results
        .iter()
        .map(|source| format!("* {} : {}", source.title, source.url))
        .collect::<Vec<String>>()
        .join("\n")
}

pub fn format_citations(citations: &[Citation]) -> String {
    citations
        .iter()
        .map(|c| format!("* {} ({}), {}", c.title, c.year, c.author))
        .collect::<Vec<_>>()
        .join("\n")
}
