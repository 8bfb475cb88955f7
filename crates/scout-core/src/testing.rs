//! Test utilities shared across the workspace.
//! Only compiled when running tests or with the `testing` feature.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use crate::error::{Error, FetchError};
use crate::fetch::PageFetcher;
use crate::provider::{CompletionRequest, CompletionResponse, FinishReason, Provider, Usage};
use crate::search::SearchProvider;

/// A mock provider that returns pre-configured responses.
pub struct MockProvider {
    responses: Mutex<Vec<Result<String, Error>>>,
    /// Captured `(api_key, request)` pairs (for assertion).
    pub captured_requests: Mutex<Vec<(String, CompletionRequest)>>,
    pub name: String,
    pub default_model: Option<String>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(Vec::new()),
            captured_requests: Mutex::new(Vec::new()),
            name: "mock".to_string(),
            default_model: None,
        }
    }

    /// Queue a response to be returned by the next complete() call.
    /// Responses are returned in FIFO order (first queued = first returned).
    pub fn queue_response(&self, content: &str) {
        self.responses
            .lock()
            .unwrap()
            .insert(0, Ok(content.to_string()));
    }

    /// Queue an error for the next complete() call.
    pub fn queue_error(&self, error: Error) {
        self.responses.lock().unwrap().insert(0, Err(error));
    }

    /// Get the number of captured requests.
    pub fn request_count(&self) -> usize {
        self.captured_requests.lock().unwrap().len()
    }

    /// Get the last captured prompt.
    pub fn last_prompt(&self) -> Option<String> {
        self.captured_requests
            .lock()
            .unwrap()
            .last()
            .map(|(_, request)| request.prompt.clone())
    }

    /// Get the key used by the last call.
    pub fn last_api_key(&self) -> Option<String> {
        self.captured_requests
            .lock()
            .unwrap()
            .last()
            .map(|(key, _)| key.clone())
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn default_model(&self) -> Option<&str> {
        self.default_model.as_deref()
    }

    async fn complete(
        &self,
        api_key: &str,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, Error> {
        self.captured_requests
            .lock()
            .unwrap()
            .push((api_key.to_string(), request));
        match self.responses.lock().unwrap().pop() {
            Some(Ok(text)) if text.is_empty() => Err(Error::empty_response("mock returned no text")),
            Some(Ok(text)) => Ok(CompletionResponse {
                text,
                usage: Usage::new(0, 0),
                model: "mock-model".to_string(),
                finish_reason: FinishReason::Stop,
            }),
            Some(Err(e)) => Err(e),
            None => Err(Error::Unknown("No mock response queued".to_string())),
        }
    }
}

/// A mock search provider returning a fixed result list or error.
pub struct MockSearchProvider {
    result: Result<Vec<String>, Error>,
    /// Captured `(query, num_results, api_key)` triples.
    pub captured_queries: Mutex<Vec<(String, usize, String)>>,
}

impl MockSearchProvider {
    pub fn with_urls<I, S>(urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            result: Ok(urls.into_iter().map(Into::into).collect()),
            captured_queries: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(error: Error) -> Self {
        Self {
            result: Err(error),
            captured_queries: Mutex::new(Vec::new()),
        }
    }

    pub fn last_query(&self) -> Option<(String, usize, String)> {
        self.captured_queries.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl SearchProvider for MockSearchProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn search(
        &self,
        query: &str,
        num_results: usize,
        api_key: &str,
    ) -> Result<Vec<String>, Error> {
        self.captured_queries.lock().unwrap().push((
            query.to_string(),
            num_results,
            api_key.to_string(),
        ));
        self.result
            .clone()
            .map(|urls| urls.into_iter().take(num_results).collect())
    }
}

/// A mock fetcher serving canned bodies per URL.
///
/// Unknown URLs fail with a network error. A per-URL delay can be set to make
/// completion order differ from request order.
#[derive(Default)]
pub struct MockFetcher {
    pages: HashMap<String, (Duration, Result<String, FetchError>)>,
    /// URLs in the order fetches were started.
    pub requested: Mutex<Vec<String>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(self, url: &str, body: &str) -> Self {
        self.with_delayed_page(url, body, Duration::ZERO)
    }

    pub fn with_delayed_page(mut self, url: &str, body: &str, delay: Duration) -> Self {
        self.pages
            .insert(url.to_string(), (delay, Ok(body.to_string())));
        self
    }

    pub fn with_failure(mut self, url: &str, error: FetchError) -> Self {
        self.pages.insert(url.to_string(), (Duration::ZERO, Err(error)));
        self
    }

    pub fn request_count(&self) -> usize {
        self.requested.lock().unwrap().len()
    }
}

#[async_trait]
impl PageFetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        self.requested.lock().unwrap().push(url.to_string());
        match self.pages.get(url) {
            Some((delay, result)) => {
                if !delay.is_zero() {
                    tokio::time::sleep(*delay).await;
                }
                result.clone()
            }
            None => Err(FetchError::Network(format!("no route to {}", url))),
        }
    }
}
