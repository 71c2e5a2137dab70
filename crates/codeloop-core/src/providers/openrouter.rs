//! OpenRouter provider (OpenAI-compatible Chat Completions).

use anyhow::Result;
use reqwest::header::{HeaderMap, HeaderValue};

use crate::providers::chat_completions::{ChatCompletionsClient, ChatCompletionsConfig};
use crate::providers::{ChatMessage, ProviderStream, resolve_api_key, resolve_base_url};

const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// OpenRouter API configuration.
#[derive(Debug, Clone)]
pub struct OpenRouterConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    /// Backend-level stop sequences forwarded to the completion request.
    pub stop: Vec<String>,
}

impl OpenRouterConfig {
    /// Creates a new config from environment.
    ///
    /// Authentication resolution order:
    /// 1. `config_api_key` parameter (from config file)
    /// 2. `OPENROUTER_API_KEY` environment variable
    ///
    /// Environment variables:
    /// - `OPENROUTER_API_KEY` (fallback if not in config)
    /// - `OPENROUTER_BASE_URL` (optional)
    /// - `OPENROUTER_SITE_URL` (optional, attribution header)
    /// - `OPENROUTER_APP_NAME` (optional, attribution header)
    ///
    /// # Errors
    /// Returns an error if no API key is available or a URL is malformed.
    pub fn from_env(
        model: String,
        stop: Vec<String>,
        config_base_url: Option<&str>,
        config_api_key: Option<&str>,
    ) -> Result<Self> {
        let api_key = resolve_api_key(config_api_key, "OPENROUTER_API_KEY", "openrouter")?;
        let base_url = resolve_base_url(
            config_base_url,
            "OPENROUTER_BASE_URL",
            DEFAULT_BASE_URL,
            "OpenRouter",
        )?;

        Ok(Self {
            api_key,
            base_url,
            model,
            stop,
        })
    }
}

/// OpenRouter client.
pub struct OpenRouterClient {
    inner: ChatCompletionsClient,
}

impl OpenRouterClient {
    pub fn new(config: OpenRouterConfig) -> Self {
        let inner = ChatCompletionsClient::new(ChatCompletionsConfig {
            api_key: config.api_key,
            base_url: config.base_url,
            model: config.model,
            stop: config.stop,
            extra_headers: build_openrouter_headers(),
        });

        Self { inner }
    }

    /// Opens a streaming completion request for the given conversation.
    ///
    /// # Errors
    /// Returns an error if the streaming call cannot be established.
    pub async fn send_messages_stream(&self, messages: &[ChatMessage]) -> Result<ProviderStream> {
        self.inner.send_messages_stream(messages).await
    }
}

/// Optional OpenRouter attribution headers (app leaderboard).
fn build_openrouter_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();

    if let Ok(site_url) = std::env::var("OPENROUTER_SITE_URL")
        && let Ok(value) = HeaderValue::from_str(site_url.trim())
    {
        headers.insert("HTTP-Referer", value);
    }

    if let Ok(app_name) = std::env::var("OPENROUTER_APP_NAME")
        && let Ok(value) = HeaderValue::from_str(app_name.trim())
    {
        headers.insert("X-Title", value);
    }

    headers
}
