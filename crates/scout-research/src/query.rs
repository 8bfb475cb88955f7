use serde::Serialize;

use scout_core::FetchError;

use crate::pipeline::ResearchError;

/// One research request. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    text: String,
    result_count: usize,
    content_limit: usize,
    prompt_template: String,
}

impl SearchQuery {
    /// Build a query.
    ///
    /// `result_count` must be positive; `content_limit` is the maximum number
    /// of characters kept per source.
    pub fn new(
        text: impl Into<String>,
        result_count: usize,
        content_limit: usize,
        prompt_template: impl Into<String>,
    ) -> Result<Self, ResearchError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(ResearchError::InvalidQuery("query text is empty".to_string()));
        }
        if result_count == 0 {
            return Err(ResearchError::InvalidQuery(
                "result count must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            text,
            result_count,
            content_limit,
            prompt_template: prompt_template.into(),
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn result_count(&self) -> usize {
        self.result_count
    }

    pub fn content_limit(&self) -> usize {
        self.content_limit
    }

    pub fn prompt_template(&self) -> &str {
        &self.prompt_template
    }
}

/// What happened to one search result during the fetch stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceStatus {
    /// Text was extracted and a block of `chars` characters went into the prompt.
    Included { chars: usize },
    /// The page was fetched but had no visible text.
    Empty,
    /// The page could not be fetched.
    Failed(FetchError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceOutcome {
    pub url: String,
    pub status: SourceStatus,
}

impl SourceOutcome {
    pub fn is_included(&self) -> bool {
        matches!(self.status, SourceStatus::Included { .. })
    }
}

/// The answer to a research request.
///
/// `sources` lists every URL that was attempted, in search order, whether or
/// not its fetch succeeded. Per-source detail is in `outcomes`, which is not
/// part of the serialized form.
#[derive(Debug, Clone, Serialize)]
pub struct ResearchResult {
    pub summary: String,
    pub sources: Vec<String>,
    #[serde(skip)]
    pub outcomes: Vec<SourceOutcome>,
}

impl ResearchResult {
    /// URLs whose content made it into the prompt.
    pub fn included_sources(&self) -> impl Iterator<Item = &str> {
        self.outcomes
            .iter()
            .filter(|o| o.is_included())
            .map(|o| o.url.as_str())
    }
}
