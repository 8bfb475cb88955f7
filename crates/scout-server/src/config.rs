use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use scout_research::{DEFAULT_MAX_CONCURRENT_FETCHES, DEFAULT_PROMPT_TEMPLATE};
use scout_tools::BROWSER_USER_AGENT;

/// Environment variables that seed the default credentials.
pub const GEMINI_KEY_VAR: &str = "GEMINI_API_KEY";
pub const SERPAPI_KEY_VAR: &str = "SERPAPI_KEY";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub credentials: CredentialsConfig,
    pub gemini: GeminiConfig,
    pub serpapi: SerpApiConfig,
    pub fetch: FetchSettings,
    pub research: ResearchDefaults,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to listen on
    pub bind: String,

    /// HTML file served at `/`; the built-in page is used when unset
    pub landing_page: Option<PathBuf>,

    /// Send permissive CORS headers
    pub allow_any_origin: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8000".to_string(),
            landing_page: None,
            allow_any_origin: true,
        }
    }
}

/// Fallback keys for requests that do not carry their own.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialsConfig {
    pub gemini_api_key: Option<String>,
    pub serpapi_key: Option<String>,
}

impl fmt::Debug for CredentialsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialsConfig")
            .field("gemini_api_key", &redact(&self.gemini_api_key))
            .field("serpapi_key", &redact(&self.serpapi_key))
            .finish()
    }
}

fn redact(key: &Option<String>) -> &'static str {
    match key {
        Some(_) => "<set>",
        None => "<unset>",
    }
}

impl CredentialsConfig {
    /// Fill unset keys from `GEMINI_API_KEY` / `SERPAPI_KEY`.
    fn fill_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let present = |value: Option<String>| value.filter(|v| !v.trim().is_empty());
        if present(self.gemini_api_key.clone()).is_none() {
            self.gemini_api_key = present(lookup(GEMINI_KEY_VAR));
        }
        if present(self.serpapi_key.clone()).is_none() {
            self.serpapi_key = present(lookup(SERPAPI_KEY_VAR));
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            model: "gemini-2.5-flash".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerpApiConfig {
    pub base_url: String,
    pub engine: String,
    /// Appended to every research query
    pub query_suffix: String,
    pub timeout_secs: u64,
}

impl Default for SerpApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://serpapi.com".to_string(),
            engine: "google".to_string(),
            query_suffix: scout_providers::serpapi::RESEARCH_SUFFIX.to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchSettings {
    pub timeout_secs: u64,
    pub user_agent: String,
    /// Most pages fetched at once within one request
    pub max_concurrent: usize,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            user_agent: BROWSER_USER_AGENT.to_string(),
            max_concurrent: DEFAULT_MAX_CONCURRENT_FETCHES,
        }
    }
}

impl FetchSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Defaults for `/search` form fields the client leaves out.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResearchDefaults {
    pub num_websites: usize,
    pub content_limit: usize,
    pub prompt_template: String,
}

impl Default for ResearchDefaults {
    fn default() -> Self {
        Self {
            num_websites: 10,
            content_limit: 1000,
            prompt_template: DEFAULT_PROMPT_TEMPLATE.to_string(),
        }
    }
}

impl Config {
    /// Load defaults, then the TOML file, then `SCOUT_*` environment
    /// variables, then fall back to the provider key variables for credentials.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(p) => {
                if !p.exists() {
                    anyhow::bail!("Config file not found: {}", p.display());
                }
                Some(p.to_path_buf())
            }
            None => Self::config_path().filter(|p| p.exists()),
        };

        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(file) = &file {
            figment = figment.merge(Toml::file(file));
        }
        figment = figment.merge(Env::prefixed("SCOUT_").split("__"));

        let mut config = Self::from_figment(figment)?;
        config.credentials.fill_from(|var| std::env::var(var).ok());
        Ok(config)
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        figment.extract().context("Invalid configuration")
    }

    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("scout").join("config.toml"))
    }

    /// Copy suitable for display, with credentials masked.
    pub fn redacted(&self) -> Self {
        let mask = |key: &Option<String>| key.as_ref().map(|_| "********".to_string());
        let mut copy = self.clone();
        copy.credentials = CredentialsConfig {
            gemini_api_key: mask(&self.credentials.gemini_api_key),
            serpapi_key: mask(&self.credentials.serpapi_key),
        };
        copy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml: &str) -> Config {
        let figment = Figment::from(Serialized::defaults(Config::default())).merge(Toml::string(toml));
        Config::from_figment(figment).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.bind, "127.0.0.1:8000");
        assert_eq!(config.fetch.timeout(), Duration::from_secs(10));
        assert_eq!(config.fetch.user_agent, BROWSER_USER_AGENT);
        assert_eq!(config.serpapi.query_suffix, " research paper");
        assert_eq!(config.research.num_websites, 10);
        assert_eq!(config.research.content_limit, 1000);
        assert_eq!(config.gemini.timeout_secs, 30);
        assert!(config.credentials.gemini_api_key.is_none());
    }

    #[test]
    fn test_parse_partial_config() {
        let config = parse(
            r#"
            [server]
            bind = "0.0.0.0:9000"

            [credentials]
            serpapi_key = "serp-from-file"

            [gemini]
            model = "gemini-2.5-pro"

            [research]
            content_limit = 250
            "#,
        );

        assert_eq!(config.server.bind, "0.0.0.0:9000");
        assert!(config.server.allow_any_origin);
        assert_eq!(config.credentials.serpapi_key.as_deref(), Some("serp-from-file"));
        assert_eq!(config.gemini.model, "gemini-2.5-pro");
        assert_eq!(config.gemini.base_url, GeminiConfig::default().base_url);
        assert_eq!(config.research.content_limit, 250);
        assert_eq!(config.research.num_websites, 10);
    }

    #[test]
    fn test_credentials_fill_from_env() {
        let mut creds = CredentialsConfig {
            gemini_api_key: Some("from-file".to_string()),
            serpapi_key: Some("   ".to_string()),
        };
        creds.fill_from(|var| match var {
            GEMINI_KEY_VAR => Some("gemini-env".to_string()),
            SERPAPI_KEY_VAR => Some("serp-env".to_string()),
            _ => None,
        });

        assert_eq!(creds.gemini_api_key.as_deref(), Some("from-file"));
        assert_eq!(creds.serpapi_key.as_deref(), Some("serp-env"));
    }

    #[test]
    fn test_credentials_ignore_empty_env() {
        let mut creds = CredentialsConfig::default();
        creds.fill_from(|_| Some(String::new()));
        assert!(creds.gemini_api_key.is_none());
        assert!(creds.serpapi_key.is_none());
    }

    #[test]
    fn test_secrets_never_displayed() {
        let mut config = Config::default();
        config.credentials.gemini_api_key = Some("AIza-secret".to_string());
        config.credentials.serpapi_key = Some("serp-secret".to_string());

        let debug = format!("{:?}", config);
        assert!(!debug.contains("secret"));

        let shown = toml::to_string_pretty(&config.redacted()).unwrap();
        assert!(!shown.contains("secret"));
        assert!(shown.contains("********"));
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let err = Config::load(Some(Path::new("/definitely/not/here.toml"))).unwrap_err();
        assert!(err.to_string().contains("Config file not found"));
    }
}
