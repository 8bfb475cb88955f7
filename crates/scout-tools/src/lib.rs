//! scout-tools: Web access for scout
//!
//! - Fetch: retrieve raw page bodies with a bounded timeout and a browser user agent
//! - Extract: flatten HTML into plain text for language-model consumption

pub mod web;

pub use web::{extract_text, FetchConfig, WebFetcher, BROWSER_USER_AGENT};
