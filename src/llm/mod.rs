// src/llm/mod.rs

mod ollama;
mod openai;

pub use ollama::OllamaClient;
pub use openai::{OpenAiClient, DEFAULT_OPENAI_API_URL};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::info;

use crate::config::WatcherConfig;
use crate::data_model::{GenerationResult, ProviderKind};
use crate::error::{Result, WatcherError};
use crate::schema::OutputSchema;

/// Everything a provider needs for one generation call.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub model: String,
    pub prompt: String,
    pub format: Option<OutputSchema>,
    pub options: Option<Map<String, Value>>,
}

/// A text-generation backend. Implementations perform exactly one request per
/// call and never retry; retrying is the watch loop's business.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult>;
}

/// Maps the provider tag stored on each document to a configured backend.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<ProviderKind, Arc<dyn GenerationProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: ProviderKind, provider: Arc<dyn GenerationProvider>) {
        self.providers.insert(kind, provider);
    }

    pub fn with(mut self, kind: ProviderKind, provider: Arc<dyn GenerationProvider>) -> Self {
        self.register(kind, provider);
        self
    }

    pub fn get(&self, kind: ProviderKind) -> Option<Arc<dyn GenerationProvider>> {
        self.providers.get(&kind).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Builds a client for every provider the configuration has an endpoint
    /// or credential for.
    pub fn from_config(config: &WatcherConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.request_timeout_secs);
        let mut registry = ProviderRegistry::new();

        if let Some(url) = config.ollama_api.as_deref().filter(|u| !u.is_empty()) {
            info!(url = %url, "Ollama provider enabled");
            registry.register(
                ProviderKind::Ollama,
                Arc::new(OllamaClient::new(url, timeout)?),
            );
        }

        if let Some(key) = config.openai_api_key.as_deref().filter(|k| !k.is_empty()) {
            info!(url = %config.openai_api_url, "OpenAI provider enabled");
            registry.register(
                ProviderKind::OpenAi,
                Arc::new(OpenAiClient::new(
                    &config.openai_api_url,
                    Some(key.to_string()),
                    timeout,
                )?),
            );
        }

        if registry.is_empty() {
            return Err(WatcherError::ConfigError(
                "Neither Ollama API URL nor OpenAI API key is set, llm will not work".to_string(),
            ));
        }
        Ok(registry)
    }
}

pub(crate) fn build_http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| WatcherError::ConfigError(format!("Failed to build HTTP client: {}", e)))
}

/// Translates a transport failure into the error taxonomy.
pub(crate) fn transport_error(
    err: reqwest::Error,
    provider: &str,
    model: &str,
    timeout: Duration,
) -> WatcherError {
    if err.is_timeout() {
        WatcherError::TimeoutError {
            provider: provider.to_string(),
            model: model.to_string(),
            timeout_secs: timeout.as_secs(),
        }
    } else {
        WatcherError::provider(
            provider,
            model,
            err.status().map(|s| s.as_u16()),
            format!("request failed: {}", err),
        )
    }
}

/// Turns the model's raw text into a result, honouring the requested format.
pub(crate) fn finish_generation(
    text: String,
    request: &GenerationRequest,
    provider: &str,
) -> Result<GenerationResult> {
    match &request.format {
        Some(schema) => schema
            .parse_output(&text, provider, &request.model)
            .map(GenerationResult::Structured),
        None => Ok(GenerationResult::Text(text)),
    }
}
