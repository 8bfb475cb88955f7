use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Error;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: None,
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl Usage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    /// Generated text. Providers guarantee this is non-empty.
    pub text: String,
    pub usage: Usage,
    pub model: String,
    pub finish_reason: FinishReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
    Other,
}

/// A generative text backend.
///
/// Implementations hold no credentials: the API key travels with every call,
/// so one provider instance can serve concurrent requests made with different keys.
#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;

    /// Get the default model, if one is configured.
    fn default_model(&self) -> Option<&str>;

    /// Generate text for a prompt.
    ///
    /// A missing or empty text payload is an [`Error::EmptyResponse`], never a success.
    async fn complete(
        &self,
        api_key: &str,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, Error>;

    /// Minimal call used to check that a key is accepted.
    async fn probe(&self, api_key: &str) -> Result<(), Error> {
        self.complete(api_key, CompletionRequest::new("test"))
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completion_request_builder() {
        let request = CompletionRequest::new("Hello")
            .with_model("gemini-2.5-pro")
            .with_temperature(0.7)
            .with_max_tokens(1000);

        assert_eq!(request.prompt, "Hello");
        assert_eq!(request.model, Some("gemini-2.5-pro".to_string()));
        assert_eq!(request.temperature, Some(0.7));
        assert_eq!(request.max_tokens, Some(1000));
    }

    #[test]
    fn test_completion_request_skips_unset_fields() {
        let json = serde_json::to_value(CompletionRequest::new("Hi")).unwrap();
        assert_eq!(json, serde_json::json!({ "prompt": "Hi" }));
    }
}
