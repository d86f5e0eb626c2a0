//! Tavily search API backend.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{SearchBackend, SearchResult};
use crate::error::SearchError;
use crate::security::SecretValue;

const DEFAULT_ENDPOINT: &str = "https://api.tavily.com/search";

pub struct TavilyBackend {
    client: reqwest::Client,
    api_key: SecretValue,
    endpoint: String,
    search_depth: String,
}

impl TavilyBackend {
    pub fn new(api_key: SecretValue) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            search_depth: "basic".to_string(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_search_depth(mut self, depth: impl Into<String>) -> Self {
        self.search_depth = depth.into();
        self
    }
}

#[derive(Serialize)]
struct TavilyRequest<'a> {
    query: &'a str,
    max_results: usize,
    search_depth: &'a str,
}

#[derive(Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyHit>,
}

#[derive(Deserialize)]
struct TavilyHit {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: String,
    score: Option<f64>,
}

impl From<TavilyHit> for SearchResult {
    fn from(hit: TavilyHit) -> Self {
        SearchResult {
            title: hit.title,
            url: hit.url,
            content: hit.content,
            score: hit.score,
        }
    }
}

fn parse_response(body: &str) -> Result<Vec<SearchResult>, SearchError> {
    let parsed: TavilyResponse =
        serde_json::from_str(body).map_err(|err| SearchError::Malformed(err.to_string()))?;
    Ok(parsed.results.into_iter().map(SearchResult::from).collect())
}

fn error_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        let message = value
            .get("detail")
            .and_then(|detail| detail.get("error").or(Some(detail)))
            .and_then(Value::as_str)
            .or_else(|| value.get("error").and_then(Value::as_str));
        if let Some(message) = message {
            return message.to_string();
        }
    }
    body.chars().take(512).collect()
}

#[async_trait]
impl SearchBackend for TavilyBackend {
    fn name(&self) -> &'static str {
        "tavily"
    }

    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchResult>, SearchError> {
        let request = TavilyRequest {
            query,
            max_results,
            search_depth: &self.search_depth,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.api_key.expose())
            .json(&request)
            .send()
            .await
            .map_err(|err| SearchError::Transport(err.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| SearchError::Transport(err.to_string()))?;

        if !status.is_success() {
            return Err(SearchError::Http {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        parse_response(&body)
    }
}
