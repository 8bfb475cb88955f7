use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, trace};

use scout_core::{CompletionRequest, CompletionResponse, Error, FinishReason, Provider, Usage};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-2.5-flash";
const API_KEY_HEADER: &str = "x-goog-api-key";

pub struct GeminiProvider {
    client: Client,
    base_url: String,
    default_model: Option<String>,
}

impl Default for GeminiProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl GeminiProvider {
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(30))
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self::with_client(client)
    }

    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            default_model: None,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }

    fn resolve_model(&self, request: &CompletionRequest) -> String {
        request
            .model
            .clone()
            .or_else(|| self.default_model.clone())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string())
    }

    fn build_request(&self, request: &CompletionRequest) -> GeminiRequest {
        let has_config = request.temperature.is_some() || request.max_tokens.is_some();
        GeminiRequest {
            contents: vec![GeminiContent {
                role: Some("user".to_string()),
                parts: vec![GeminiPart::text(&request.prompt)],
            }],
            generation_config: has_config.then(|| GeminiGenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.max_tokens,
            }),
        }
    }

    fn parse_response(
        &self,
        response: GeminiResponse,
        model: &str,
    ) -> Result<CompletionResponse, Error> {
        let Some(candidate) = response.candidates.and_then(|c| c.into_iter().next()) else {
            let reason = response
                .prompt_feedback
                .and_then(|f| f.block_reason)
                .map(|r| format!("prompt blocked: {}", r))
                .unwrap_or_else(|| "no candidates".to_string());
            return Err(Error::empty_response(format!(
                "Empty response from AI model ({})",
                reason
            )));
        };

        let text = candidate
            .content
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter(|part| !part.thought.unwrap_or(false))
                    .filter_map(|part| part.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            let reason = candidate.finish_reason.as_deref().unwrap_or("no text");
            return Err(Error::empty_response(format!(
                "Empty response from AI model ({})",
                reason
            )));
        }

        let finish_reason = match candidate.finish_reason.as_deref() {
            Some("STOP") | None => FinishReason::Stop,
            Some("MAX_TOKENS") => FinishReason::Length,
            Some("SAFETY") | Some("RECITATION") => FinishReason::ContentFilter,
            Some(_) => FinishReason::Other,
        };

        let usage = response
            .usage_metadata
            .map(|u| {
                Usage::new(
                    u.prompt_token_count.unwrap_or(0),
                    u.candidates_token_count.unwrap_or(0),
                )
            })
            .unwrap_or_default();

        Ok(CompletionResponse {
            text,
            usage,
            model: model.to_string(),
            finish_reason,
        })
    }

    fn parse_error(&self, status: u16, body: &str) -> Error {
        #[derive(Deserialize)]
        struct ErrorResponse {
            error: ErrorDetail,
        }

        #[derive(Deserialize)]
        struct ErrorDetail {
            message: String,
            #[serde(default)]
            status: Option<String>,
        }

        match serde_json::from_str::<ErrorResponse>(body) {
            // Gemini reports a bad key as 400 INVALID_ARGUMENT with this wording.
            Ok(err) if err.error.message.contains("API key not valid") => {
                Error::auth(err.error.message)
            }
            Ok(err) if err.error.status.as_deref() == Some("RESOURCE_EXHAUSTED") => {
                Error::rate_limit(err.error.message)
            }
            Ok(err) => Error::from_status(status, err.error.message),
            Err(_) => Error::from_status(status, body.to_string()),
        }
    }
}

#[async_trait]
impl Provider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn default_model(&self) -> Option<&str> {
        self.default_model.as_deref()
    }

    async fn complete(
        &self,
        api_key: &str,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, Error> {
        if api_key.trim().is_empty() {
            return Err(Error::auth("Gemini API key is empty"));
        }

        let model = self.resolve_model(&request);
        let api_request = self.build_request(&request);

        debug!(model = %model, prompt_chars = request.prompt.chars().count(), "Gemini request");
        trace!(request = %serde_json::to_string(&api_request).unwrap_or_default(), "Gemini request payload");

        let url = format!("{}/models/{}:generateContent", self.base_url, model);

        let response = self
            .client
            .post(&url)
            .header(API_KEY_HEADER, api_key)
            .json(&api_request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::timeout(format!("Gemini did not answer: {}", e.without_url()))
                } else {
                    Error::network(e.without_url().to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!(status = status.as_u16(), body = %error_text, "Gemini request failed");
            return Err(self.parse_error(status.as_u16(), &error_text));
        }

        let response_text = response
            .text()
            .await
            .map_err(|e| Error::serialization(e.without_url().to_string()))?;

        trace!(response = %response_text, "Gemini response payload");

        let api_response: GeminiResponse = serde_json::from_str(&response_text)?;
        let parsed = self.parse_response(api_response, &model)?;

        debug!(
            model = %parsed.model,
            finish_reason = ?parsed.finish_reason,
            content_len = parsed.text.len(),
            prompt_tokens = parsed.usage.prompt_tokens,
            completion_tokens = parsed.usage.completion_tokens,
            "Gemini response"
        );

        Ok(parsed)
    }
}

// ── Gemini API types ─────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GeminiGenerationConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    /// Set on reasoning parts, which are not part of the answer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    thought: Option<bool>,
}

impl GeminiPart {
    fn text(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
            thought: None,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

// ── Response types ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Option<Vec<GeminiCandidate>>,
    #[serde(default)]
    usage_metadata: Option<GeminiUsageMetadata>,
    #[serde(default)]
    prompt_feedback: Option<GeminiPromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsageMetadata {
    #[serde(default)]
    prompt_token_count: Option<u32>,
    #[serde(default)]
    candidates_token_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Path;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use std::net::SocketAddr;

    fn response_from(value: Value) -> GeminiResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_provider_creation() {
        let provider = GeminiProvider::new();
        assert_eq!(provider.name(), "gemini");
        assert_eq!(provider.default_model(), None);
        assert_eq!(provider.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn test_provider_with_custom_url() {
        let provider = GeminiProvider::new().with_base_url("https://custom.proxy.com/v1beta/");
        assert_eq!(provider.base_url, "https://custom.proxy.com/v1beta");
    }

    #[test]
    fn test_resolve_model() {
        let provider = GeminiProvider::new();
        let request = CompletionRequest::new("Hello");
        assert_eq!(provider.resolve_model(&request), "gemini-2.5-flash");

        let provider = provider.with_default_model("gemini-2.5-pro");
        assert_eq!(provider.resolve_model(&request), "gemini-2.5-pro");

        let request = request.with_model("gemini-2.0-flash");
        assert_eq!(provider.resolve_model(&request), "gemini-2.0-flash");
    }

    #[test]
    fn test_build_request_basic() {
        let provider = GeminiProvider::new();
        let api_request = provider.build_request(&CompletionRequest::new("Summarize graphene"));
        let json = serde_json::to_value(&api_request).unwrap();

        assert_eq!(
            json,
            json!({ "contents": [{ "role": "user", "parts": [{ "text": "Summarize graphene" }] }] })
        );
    }

    #[test]
    fn test_build_request_generation_config() {
        let provider = GeminiProvider::new();
        let request = CompletionRequest::new("Hi").with_max_tokens(256);
        let json = serde_json::to_value(provider.build_request(&request)).unwrap();
        assert_eq!(json["generationConfig"], json!({ "maxOutputTokens": 256 }));
    }

    #[test]
    fn test_parse_response_text() {
        let provider = GeminiProvider::new();
        let response = response_from(json!({
            "candidates": [{
                "content": { "role": "model", "parts": [{ "text": "Hello" }, { "text": " there" }] },
                "finishReason": "STOP"
            }],
            "usageMetadata": { "promptTokenCount": 10, "candidatesTokenCount": 5 }
        }));

        let parsed = provider.parse_response(response, "gemini-2.5-flash").unwrap();
        assert_eq!(parsed.text, "Hello there");
        assert_eq!(parsed.finish_reason, FinishReason::Stop);
        assert_eq!(parsed.usage, Usage::new(10, 5));
        assert_eq!(parsed.model, "gemini-2.5-flash");
    }

    #[test]
    fn test_parse_response_skips_thought_parts() {
        let provider = GeminiProvider::new();
        let response = response_from(json!({
            "candidates": [{
                "content": { "parts": [{ "text": "pondering", "thought": true }, { "text": "Answer" }] },
                "finishReason": "MAX_TOKENS"
            }]
        }));

        let parsed = provider.parse_response(response, "m").unwrap();
        assert_eq!(parsed.text, "Answer");
        assert_eq!(parsed.finish_reason, FinishReason::Length);
    }

    #[test]
    fn test_parse_response_missing_text_is_error() {
        let provider = GeminiProvider::new();
        let response = response_from(json!({
            "candidates": [{ "content": { "parts": [] }, "finishReason": "SAFETY" }]
        }));

        let err = provider.parse_response(response, "m").unwrap_err();
        assert!(matches!(err, Error::EmptyResponse(_)));
        assert!(err.to_string().contains("SAFETY"));
    }

    #[test]
    fn test_parse_response_empty_text_is_error() {
        let provider = GeminiProvider::new();
        let response = response_from(json!({
            "candidates": [{ "content": { "parts": [{ "text": "" }] } }]
        }));

        let err = provider.parse_response(response, "m").unwrap_err();
        assert!(matches!(err, Error::EmptyResponse(_)));
    }

    #[test]
    fn test_parse_response_blocked_prompt() {
        let provider = GeminiProvider::new();
        let response = response_from(json!({ "promptFeedback": { "blockReason": "SAFETY" } }));

        let err = provider.parse_response(response, "m").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("Empty response from AI model"));
        assert!(msg.contains("prompt blocked: SAFETY"));
    }

    #[test]
    fn test_parse_error_invalid_key() {
        let provider = GeminiProvider::new();
        let body = r#"{"error": {"code": 400, "message": "API key not valid. Please pass a valid API key.", "status": "INVALID_ARGUMENT"}}"#;
        let err = provider.parse_error(400, body);
        assert!(err.is_auth_error());
        assert!(err.to_string().contains("API key not valid"));
    }

    #[test]
    fn test_parse_error_quota() {
        let provider = GeminiProvider::new();
        let body = r#"{"error": {"message": "Quota exceeded", "status": "RESOURCE_EXHAUSTED"}}"#;
        let err = provider.parse_error(429, body);
        assert!(err.is_credential_error());
        assert!(err.is_retryable());
    }

    #[test]
    fn test_parse_error_unstructured_body() {
        let provider = GeminiProvider::new();
        let err = provider.parse_error(502, "Bad Gateway");
        assert_eq!(err, Error::api(502, "Bad Gateway"));
    }

    #[tokio::test]
    async fn test_empty_key_rejected_without_request() {
        let provider = GeminiProvider::new().with_base_url("http://127.0.0.1:9");
        let err = provider
            .complete("  ", CompletionRequest::new("Hi"))
            .await
            .unwrap_err();
        assert!(err.is_auth_error());
    }

    async fn serve(router: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        addr
    }

    async fn fake_generate(
        Path(call): Path<String>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> (StatusCode, Json<Value>) {
        let key = headers
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if key != "good-key" {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": { "message": "API key not valid.", "status": "INVALID_ARGUMENT" } })),
            );
        }
        let prompt = body["contents"][0]["parts"][0]["text"].as_str().unwrap_or_default();
        if prompt == "silence" {
            return (StatusCode::OK, Json(json!({ "candidates": [{ "content": { "parts": [] } }] })));
        }
        (
            StatusCode::OK,
            Json(json!({
                "candidates": [{
                    "content": { "parts": [{ "text": format!("{} -> {}", call, prompt) }] },
                    "finishReason": "STOP"
                }]
            })),
        )
    }

    async fn local_provider() -> GeminiProvider {
        let addr = serve(Router::new().route("/models/:call", post(fake_generate))).await;
        let client = Client::builder().no_proxy().build().unwrap();
        GeminiProvider::with_client(client).with_base_url(format!("http://{}", addr))
    }

    #[tokio::test]
    async fn test_complete_against_local_server() {
        let provider = local_provider().await;
        let response = provider
            .complete("good-key", CompletionRequest::new("graphene"))
            .await
            .unwrap();
        assert_eq!(response.text, "gemini-2.5-flash:generateContent -> graphene");
    }

    #[tokio::test]
    async fn test_complete_bad_key_is_credential_error() {
        let provider = local_provider().await;
        let err = provider
            .complete("bad-key", CompletionRequest::new("graphene"))
            .await
            .unwrap_err();
        assert!(err.is_credential_error());
        assert!(provider.probe("bad-key").await.is_err());
        assert!(provider.probe("good-key").await.is_ok());
    }

    #[tokio::test]
    async fn test_complete_empty_payload_fails() {
        let provider = local_provider().await;
        let err = provider
            .complete("good-key", CompletionRequest::new("silence"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::EmptyResponse(_)));
    }
}
