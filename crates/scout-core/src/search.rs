use async_trait::async_trait;

use crate::error::Error;

/// A web search backend returning result URLs in rank order.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Provider name for logging.
    fn name(&self) -> &str;

    /// Search for `query` and return at most `num_results` URLs.
    ///
    /// An absent result list is an empty `Vec`, not an error. Credential and
    /// quota failures must surface as [`Error::Auth`] or [`Error::RateLimit`].
    async fn search(
        &self,
        query: &str,
        num_results: usize,
        api_key: &str,
    ) -> Result<Vec<String>, Error>;

    /// Minimal call used to check that a key is accepted.
    async fn probe(&self, api_key: &str) -> Result<(), Error> {
        self.search("test", 1, api_key).await.map(|_| ())
    }
}
