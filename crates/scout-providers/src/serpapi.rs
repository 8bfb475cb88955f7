use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, error};

use scout_core::{Error, SearchProvider};

const DEFAULT_BASE_URL: &str = "https://serpapi.com";
const DEFAULT_ENGINE: &str = "google";

/// Appended to every research query to bias results toward reference material.
pub const RESEARCH_SUFFIX: &str = " research paper";

/// Google search through SerpAPI.
///
/// The API key is passed per call and ends up in the query string, so
/// transport errors are stripped of their URL before being surfaced.
pub struct SerpApiSearch {
    client: Client,
    base_url: String,
    engine: String,
    query_suffix: String,
}

impl Default for SerpApiSearch {
    fn default() -> Self {
        Self::new()
    }
}

impl SerpApiSearch {
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(30))
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self::with_client(client)
    }

    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            engine: DEFAULT_ENGINE.to_string(),
            query_suffix: RESEARCH_SUFFIX.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_engine(mut self, engine: impl Into<String>) -> Self {
        self.engine = engine.into();
        self
    }

    pub fn with_query_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.query_suffix = suffix.into();
        self
    }

    /// Issue one search for the literal query `q`.
    async fn request(&self, q: &str, num_results: usize, api_key: &str) -> Result<Vec<String>, Error> {
        if api_key.trim().is_empty() {
            return Err(Error::auth("SerpAPI key is empty"));
        }

        debug!(engine = %self.engine, query = %q, num = num_results, "SerpAPI request");

        let url = format!("{}/search.json", self.base_url);
        let num = num_results.to_string();
        let response = self
            .client
            .get(&url)
            .query(&[
                ("engine", self.engine.as_str()),
                ("q", q),
                ("api_key", api_key),
                ("num", num.as_str()),
            ])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::timeout(format!("SerpAPI did not answer: {}", e.without_url()))
                } else {
                    Error::network(e.without_url().to_string())
                }
            })?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| Error::network(e.without_url().to_string()))?;

        if !(200..300).contains(&status) {
            error!(status, body = %body, "SerpAPI request failed");
            return Err(parse_error(status, &body));
        }

        let parsed: SerpApiResponse = serde_json::from_str(&body)?;
        extract_links(parsed, num_results)
    }
}

#[async_trait]
impl SearchProvider for SerpApiSearch {
    fn name(&self) -> &str {
        "serpapi"
    }

    async fn search(
        &self,
        query: &str,
        num_results: usize,
        api_key: &str,
    ) -> Result<Vec<String>, Error> {
        if num_results == 0 {
            return Ok(Vec::new());
        }
        let q = format!("{}{}", query, self.query_suffix);
        let links = self.request(&q, num_results, api_key).await?;
        debug!(results = links.len(), "SerpAPI results");
        Ok(links)
    }

    async fn probe(&self, api_key: &str) -> Result<(), Error> {
        self.request("test", 1, api_key).await.map(|_| ())
    }
}

#[derive(Debug, Deserialize)]
struct SerpApiResponse {
    #[serde(default)]
    organic_results: Option<Vec<OrganicResult>>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OrganicResult {
    #[serde(default)]
    link: Option<String>,
}

/// Pull result links out of a successful response, in rank order.
fn extract_links(response: SerpApiResponse, limit: usize) -> Result<Vec<String>, Error> {
    match response.organic_results {
        Some(results) => Ok(results
            .into_iter()
            .filter_map(|r| r.link)
            .take(limit)
            .collect()),
        None => {
            // A 200 with an error and no results is normally "no results for
            // this query"; credential problems still have to surface.
            if let Some(message) = response.error {
                let err = classify_message(200, message);
                if err.is_credential_error() {
                    return Err(err);
                }
                debug!(error = %err, "SerpAPI returned no organic results");
            }
            Ok(Vec::new())
        }
    }
}

fn parse_error(status: u16, body: &str) -> Error {
    match serde_json::from_str::<SerpApiResponse>(body) {
        Ok(SerpApiResponse {
            error: Some(message),
            ..
        }) => classify_message(status, message),
        _ => Error::from_status(status, body.to_string()),
    }
}

fn classify_message(status: u16, message: String) -> Error {
    let lower = message.to_lowercase();
    if lower.contains("invalid api key") || lower.contains("api key is missing") {
        Error::auth(message)
    } else if lower.contains("run out of searches") || lower.contains("rate limit") {
        Error::rate_limit(message)
    } else {
        Error::from_status(status, message)
    }
}
