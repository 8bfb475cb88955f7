//! Web tools for fetching pages and extracting their text.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use scraper::Html;
use tracing::{debug, trace};

use scout_core::{Error, FetchError, PageFetcher};

/// Desktop browser identity sent with every page request.
pub const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

// =============================================================================
// Fetch Configuration
// =============================================================================

/// Configuration for page fetching
#[derive(Clone, Debug)]
pub struct FetchConfig {
    /// Whole-request timeout, body included
    pub timeout: Duration,
    /// User-Agent header value
    pub user_agent: String,
    /// Honour HTTP(S)_PROXY from the environment
    pub use_system_proxy: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            user_agent: BROWSER_USER_AGENT.to_string(),
            use_system_proxy: true,
        }
    }
}

impl FetchConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn without_proxy(mut self) -> Self {
        self.use_system_proxy = false;
        self
    }
}

// =============================================================================
// Web Fetcher
// =============================================================================

pub struct WebFetcher {
    client: Client,
}

impl WebFetcher {
    pub fn new(config: FetchConfig) -> Result<Self, Error> {
        let mut builder = Client::builder()
            .user_agent(config.user_agent)
            .timeout(config.timeout);
        if !config.use_system_proxy {
            builder = builder.no_proxy();
        }
        let client = builder
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for WebFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let response = self.client.get(url).send().await.map_err(classify)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        if let Some(content_type) = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
        {
            if !is_textual(content_type) {
                return Err(FetchError::UnsupportedContent(content_type.to_string()));
            }
        }

        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout
            } else {
                FetchError::Decode(describe(e))
            }
        })?;

        debug!(url = %url, bytes = body.len(), "Fetched page");
        Ok(body)
    }
}

/// Whether a Content-Type header names something we can read as text.
fn is_textual(content_type: &str) -> bool {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    mime.is_empty()
        || mime.starts_with("text/")
        || mime.contains("html")
        || mime.contains("xml")
        || mime.contains("json")
}

fn classify(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout
    } else {
        FetchError::Network(describe(err))
    }
}

/// Render a reqwest error with its source chain, which is where the useful
/// detail (DNS failure, connection refused) lives.
fn describe(err: reqwest::Error) -> String {
    let err = err.without_url();
    let mut message = err.to_string();
    let mut source = std::error::Error::source(&err);
    while let Some(inner) = source {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        source = inner.source();
    }
    message
}

// =============================================================================
// Text Extraction
// =============================================================================

/// Flatten an HTML document into plain text.
///
/// Script and style elements are dropped with everything inside them. Every
/// remaining text node is trimmed, empty ones are skipped, and the rest are
/// joined with single spaces. Malformed markup is parsed best-effort and never
/// fails.
pub fn extract_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut parts: Vec<&str> = Vec::new();

    for node in document.root_element().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|el| matches!(el.name(), "script" | "style"))
        });
        if hidden {
            continue;
        }
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            parts.push(trimmed);
        }
    }

    let text = parts.join(" ");
    trace!(chars = text.chars().count(), "Extracted page text");
    text
}
