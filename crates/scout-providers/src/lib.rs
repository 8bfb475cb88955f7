//! scout-providers: External service adapters for scout
//!
//! This crate implements the `Provider` trait for Gemini and the
//! `SearchProvider` trait for SerpAPI.

pub mod gemini;
pub mod serpapi;

pub use gemini::GeminiProvider;
pub use serpapi::SerpApiSearch;
