//! scout-core: Core types and traits for scout
//!
//! This crate provides the error taxonomy and the three collaborator seams
//! (generation, search, page fetching) that the research pipeline is built on.

pub mod error;
pub mod fetch;
pub mod provider;
pub mod search;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::{Error, FetchError};
pub use fetch::PageFetcher;
pub use provider::{CompletionRequest, CompletionResponse, FinishReason, Provider, Usage};
pub use search::SearchProvider;

pub type Result<T> = std::result::Result<T, Error>;
