use async_trait::async_trait;

use crate::error::FetchError;

/// Retrieves the raw body of a page.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}
