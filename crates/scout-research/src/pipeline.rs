//! The research pipeline: search, fetch, extract, assemble, summarize.

use std::fmt;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use scout_core::{CompletionRequest, Error, PageFetcher, Provider, SearchProvider};
use scout_tools::extract_text;

use crate::prompt::{combine_blocks, format_block, render_prompt, truncate_chars};
use crate::query::{ResearchResult, SearchQuery, SourceOutcome, SourceStatus};

/// Upper bound on simultaneous page fetches per run.
pub const DEFAULT_MAX_CONCURRENT_FETCHES: usize = 10;

#[derive(Error, Debug)]
pub enum ResearchError {
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Search failed: {0}")]
    Search(#[source] Error),

    #[error("Generation failed: {0}")]
    Generation(#[source] Error),

    #[error("Research cancelled")]
    Cancelled,
}

impl ResearchError {
    pub fn is_credential_error(&self) -> bool {
        match self {
            ResearchError::Search(e) | ResearchError::Generation(e) => e.is_credential_error(),
            _ => false,
        }
    }
}

/// Per-request credentials for the two external services.
#[derive(Clone)]
pub struct ApiKeys {
    pub search: String,
    pub generation: String,
}

impl ApiKeys {
    pub fn new(search: impl Into<String>, generation: impl Into<String>) -> Self {
        Self {
            search: search.into(),
            generation: generation.into(),
        }
    }
}

impl fmt::Debug for ApiKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiKeys")
            .field("search", &"<redacted>")
            .field("generation", &"<redacted>")
            .finish()
    }
}

/// Drives one research request end to end.
///
/// The pipeline holds no per-request state; a single instance can serve any
/// number of concurrent runs, each with its own keys.
pub struct ResearchPipeline {
    search: Arc<dyn SearchProvider>,
    fetcher: Arc<dyn PageFetcher>,
    generator: Arc<dyn Provider>,
    max_concurrent_fetches: usize,
    model: Option<String>,
}

impl ResearchPipeline {
    pub fn new(
        search: Arc<dyn SearchProvider>,
        fetcher: Arc<dyn PageFetcher>,
        generator: Arc<dyn Provider>,
    ) -> Self {
        Self {
            search,
            fetcher,
            generator,
            max_concurrent_fetches: DEFAULT_MAX_CONCURRENT_FETCHES,
            model: None,
        }
    }

    pub fn with_max_concurrent_fetches(mut self, limit: usize) -> Self {
        self.max_concurrent_fetches = limit.max(1);
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Run a research request.
    ///
    /// Search and generation failures end the run. Fetch failures only drop
    /// that source's content; the URL stays in `sources`. Cancelling `cancel`
    /// abandons whichever stage is in flight, dropping outstanding fetches.
    pub async fn run(
        &self,
        query: &SearchQuery,
        keys: &ApiKeys,
        cancel: &CancellationToken,
    ) -> Result<ResearchResult, ResearchError> {
        let mut urls = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ResearchError::Cancelled),
            result = self.search.search(query.text(), query.result_count(), &keys.search) => {
                result.map_err(ResearchError::Search)?
            }
        };
        urls.truncate(query.result_count());

        debug!(
            provider = self.search.name(),
            query = %query.text(),
            results = urls.len(),
            "Search complete"
        );

        let width = self.max_concurrent_fetches.min(urls.len()).max(1);
        let limit = query.content_limit();
        let reads: Vec<(SourceOutcome, Option<String>)> = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ResearchError::Cancelled),
            reads = stream::iter(urls.clone())
                .map(|url| async move { self.read_source(&url, limit).await })
                .buffered(width)
                .collect::<Vec<_>>() => reads,
        };

        let mut outcomes = Vec::with_capacity(reads.len());
        let mut blocks = Vec::new();
        for (outcome, block) in reads {
            outcomes.push(outcome);
            blocks.extend(block);
        }

        let content = combine_blocks(&blocks);
        let prompt = render_prompt(query.prompt_template(), query.text(), &content);

        let mut request = CompletionRequest::new(prompt);
        if let Some(model) = &self.model {
            request = request.with_model(model.clone());
        }

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ResearchError::Cancelled),
            result = self.generator.complete(&keys.generation, request) => {
                result.map_err(ResearchError::Generation)?
            }
        };

        info!(
            sources = urls.len(),
            included = blocks.len(),
            summary_chars = response.text.chars().count(),
            "Research complete"
        );

        Ok(ResearchResult {
            summary: response.text,
            sources: urls,
            outcomes,
        })
    }

    /// Fetch one URL and turn it into a labelled block. Never fails.
    async fn read_source(&self, url: &str, limit: usize) -> (SourceOutcome, Option<String>) {
        let outcome = |status| SourceOutcome {
            url: url.to_string(),
            status,
        };

        let body = match self.fetcher.fetch(url).await {
            Ok(body) => body,
            Err(e) => {
                warn!(url = %url, kind = e.kind(), error = %e, "Skipping source");
                return (outcome(SourceStatus::Failed(e)), None);
            }
        };

        let text = extract_text(&body);
        if text.is_empty() {
            debug!(url = %url, "Source has no text");
            return (outcome(SourceStatus::Empty), None);
        }

        let kept = truncate_chars(&text, limit);
        let chars = kept.chars().count();
        (
            outcome(SourceStatus::Included { chars }),
            Some(format_block(url, kept)),
        )
    }
}
