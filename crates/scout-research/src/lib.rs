//! Search, scrape and summarize pipeline for scout.
//!
//! This crate provides:
//! - `SearchQuery` / `ResearchResult`, the pipeline's input and output
//! - Prompt assembly: content truncation, labelled blocks, placeholder substitution
//! - `ResearchPipeline`, which drives search, fetch, extraction and summarization

mod pipeline;
mod prompt;
mod query;

pub use pipeline::{ApiKeys, ResearchError, ResearchPipeline, DEFAULT_MAX_CONCURRENT_FETCHES};
pub use prompt::{
    combine_blocks, format_block, render_prompt, truncate_chars, CONTENT_PLACEHOLDER,
    DEFAULT_PROMPT_TEMPLATE, QUERY_PLACEHOLDER,
};
pub use query::{ResearchResult, SearchQuery, SourceOutcome, SourceStatus};
