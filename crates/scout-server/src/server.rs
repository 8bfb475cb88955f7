//! HTTP surface: landing page, generation, key checks and research.

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::rejection::{FormRejection, JsonRejection};
use axum::extract::{Form, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use scout_core::{CompletionRequest, Error, PageFetcher, Provider, SearchProvider};
use scout_providers::{GeminiProvider, SerpApiSearch};
use scout_research::{ApiKeys, ResearchError, ResearchPipeline, ResearchResult, SearchQuery};
use scout_tools::{FetchConfig, WebFetcher};

use crate::config::Config;

const EMBEDDED_LANDING_PAGE: &str = include_str!("../assets/index.html");

/// Shared handler state. Cloned per request; everything inside is `Arc`.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    search: Arc<dyn SearchProvider>,
    generator: Arc<dyn Provider>,
    pipeline: Arc<ResearchPipeline>,
    landing_page: Arc<str>,
    shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        config: Config,
        search: Arc<dyn SearchProvider>,
        fetcher: Arc<dyn PageFetcher>,
        generator: Arc<dyn Provider>,
        shutdown: CancellationToken,
    ) -> Self {
        let pipeline = ResearchPipeline::new(search.clone(), fetcher, generator.clone())
            .with_max_concurrent_fetches(config.fetch.max_concurrent);
        let landing_page = load_landing_page(&config);
        Self {
            config: Arc::new(config),
            search,
            generator,
            pipeline: Arc::new(pipeline),
            landing_page,
            shutdown,
        }
    }

    /// Build the production adapters described by `config`.
    pub fn from_config(config: Config, shutdown: CancellationToken) -> Result<Self> {
        let search = SerpApiSearch::with_timeout(Duration::from_secs(config.serpapi.timeout_secs))
            .with_base_url(config.serpapi.base_url.clone())
            .with_engine(config.serpapi.engine.clone())
            .with_query_suffix(config.serpapi.query_suffix.clone());

        let fetcher = WebFetcher::new(
            FetchConfig::default()
                .with_timeout(config.fetch.timeout())
                .with_user_agent(config.fetch.user_agent.clone()),
        )
        .context("Failed to create page fetcher")?;

        let generator = GeminiProvider::with_timeout(Duration::from_secs(config.gemini.timeout_secs))
            .with_base_url(config.gemini.base_url.clone())
            .with_default_model(config.gemini.model.clone());

        Ok(Self::new(
            config,
            Arc::new(search),
            Arc::new(fetcher),
            Arc::new(generator),
            shutdown,
        ))
    }

    fn gemini_key(&self, given: Option<String>) -> Result<String, ApiError> {
        pick_key(
            given,
            self.config.credentials.gemini_api_key.as_deref(),
            "geminiApiKey",
        )
    }

    fn serpapi_key(&self, given: Option<String>) -> Result<String, ApiError> {
        pick_key(
            given,
            self.config.credentials.serpapi_key.as_deref(),
            "serpApiKey",
        )
    }
}

fn load_landing_page(config: &Config) -> Arc<str> {
    if let Some(path) = &config.server.landing_page {
        match std::fs::read_to_string(path) {
            Ok(page) => return page.into(),
            Err(e) => warn!(
                path = %path.display(),
                error = %e,
                "Could not read landing page, serving the built-in one"
            ),
        }
    }
    EMBEDDED_LANDING_PAGE.into()
}

/// A request key wins over the configured default; blank values count as absent.
fn pick_key(given: Option<String>, fallback: Option<&str>, field: &str) -> Result<String, ApiError> {
    given
        .filter(|k| !k.trim().is_empty())
        .or_else(|| fallback.map(str::to_string))
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest(format!("Missing {}", field)))
}

pub fn router(state: AppState) -> Router {
    let cors = if state.config.server.allow_any_origin {
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
    };

    Router::new()
        .route("/", get(landing_page))
        .route("/generate", post(generate))
        .route("/test-api-keys", post(test_api_keys))
        .route("/search", post(search))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Serve until Ctrl-C or SIGTERM. In-flight research runs are cancelled
/// when the signal arrives.
pub async fn serve(state: AppState, bind: &str) -> Result<()> {
    let addr: SocketAddr = bind
        .parse()
        .with_context(|| format!("Invalid bind address: {}", bind))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!(addr = %listener.local_addr()?, "Listening");

    let shutdown = state.shutdown.clone();
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            info!("Shutting down");
            shutdown.cancel();
        })
        .await
        .context("Server error")
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Research(ResearchError),
    Generation(Error),
    Cancelled,
}

impl ApiError {
    fn kind(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Cancelled => "cancelled",
            ApiError::Generation(e) if e.is_credential_error() => "credential",
            ApiError::Generation(_) => "generation",
            ApiError::Research(e) if e.is_credential_error() => "credential",
            ApiError::Research(ResearchError::InvalidQuery(_)) => "bad_request",
            ApiError::Research(ResearchError::Search(_)) => "search",
            ApiError::Research(ResearchError::Generation(_)) => "generation",
            ApiError::Research(ResearchError::Cancelled) => "cancelled",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::Research(ResearchError::InvalidQuery(_)) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Cancelled | ApiError::Research(ResearchError::Cancelled) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ApiError::Research(_) | ApiError::Generation(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn detail(&self) -> String {
        match self {
            ApiError::BadRequest(message) => message.clone(),
            ApiError::Research(e) => e.to_string(),
            ApiError::Generation(e) => e.to_string(),
            ApiError::Cancelled => "Request cancelled".to_string(),
        }
    }
}

impl From<ResearchError> for ApiError {
    fn from(e: ResearchError) -> Self {
        match e {
            ResearchError::Cancelled => ApiError::Cancelled,
            other => ApiError::Research(other),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<FormRejection> for ApiError {
    fn from(rejection: FormRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let kind = self.kind();
        let detail = self.detail();
        if status.is_server_error() {
            warn!(kind, detail = %detail, "Request failed");
        }
        (status, Json(json!({ "detail": detail, "kind": kind }))).into_response()
    }
}

// =============================================================================
// Handlers
// =============================================================================

async fn landing_page(State(state): State<AppState>) -> Html<String> {
    Html(state.landing_page.to_string())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    #[serde(default)]
    input: String,
    prompt: String,
    #[serde(default)]
    section: String,
    #[serde(default)]
    gemini_api_key: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    status: &'static str,
    content: String,
    section: String,
}

async fn generate(
    State(state): State<AppState>,
    req: Result<Json<GenerateRequest>, JsonRejection>,
) -> Result<Json<GenerateResponse>, ApiError> {
    let Json(req) = req?;
    debug!(section = %req.section, input_chars = req.input.chars().count(), "Generate request");
    let key = state.gemini_key(req.gemini_api_key)?;
    let request = CompletionRequest::new(req.prompt);

    let response = tokio::select! {
        biased;
        _ = state.shutdown.cancelled() => return Err(ApiError::Cancelled),
        result = state.generator.complete(&key, request) => result.map_err(ApiError::Generation)?,
    };

    Ok(Json(GenerateResponse {
        status: "success",
        content: response.text,
        section: req.section,
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyCheckRequest {
    #[serde(default)]
    serp_api_key: String,
    #[serde(default)]
    gemini_api_key: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyCheckResponse {
    serp_api: bool,
    gemini_api: bool,
}

async fn test_api_keys(
    State(state): State<AppState>,
    req: Result<Json<KeyCheckRequest>, JsonRejection>,
) -> Result<Json<KeyCheckResponse>, ApiError> {
    let Json(req) = req?;
    let (serp, gemini) = tokio::join!(
        state.search.probe(&req.serp_api_key),
        state.generator.probe(&req.gemini_api_key),
    );

    if let Err(e) = &serp {
        info!(provider = state.search.name(), error = %e, "Key check failed");
    }
    if let Err(e) = &gemini {
        info!(provider = state.generator.name(), error = %e, "Key check failed");
    }

    Ok(Json(KeyCheckResponse {
        serp_api: serp.is_ok(),
        gemini_api: gemini.is_ok(),
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchForm {
    query: String,
    #[serde(default, deserialize_with = "blank_as_none")]
    num_websites: Option<usize>,
    #[serde(default, deserialize_with = "blank_as_none")]
    content_limit: Option<usize>,
    #[serde(default)]
    prompt_template: Option<String>,
    #[serde(default)]
    serp_api_key: Option<String>,
    #[serde(default)]
    gemini_api_key: Option<String>,
}

/// Browsers submit cleared number inputs as `field=`; treat that as absent.
fn blank_as_none<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: fmt::Display,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value.parse().map(Some).map_err(de::Error::custom),
    }
}

async fn search(
    State(state): State<AppState>,
    form: Result<Form<SearchForm>, FormRejection>,
) -> Result<Json<ResearchResult>, ApiError> {
    let Form(form) = form?;
    let defaults = &state.config.research;
    let keys = ApiKeys::new(
        state.serpapi_key(form.serp_api_key)?,
        state.gemini_key(form.gemini_api_key)?,
    );
    let template = form
        .prompt_template
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| defaults.prompt_template.clone());
    let query = SearchQuery::new(
        form.query,
        form.num_websites.unwrap_or(defaults.num_websites),
        form.content_limit.unwrap_or(defaults.content_limit),
        template,
    )?;

    info!(query = %query.text(), results = query.result_count(), "Research request");

    // Dropping this future on client disconnect drops every in-flight fetch with it.
    let cancel = state.shutdown.child_token();
    let result = state.pipeline.run(&query, &keys, &cancel).await?;

    info!(
        sources = result.sources.len(),
        included = result.included_sources().count(),
        "Research complete"
    );
    Ok(Json(result))
}
