// src/llm/ollama.rs

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::debug;

use super::{build_http_client, finish_generation, transport_error, GenerationProvider, GenerationRequest};
use crate::data_model::GenerationResult;
use crate::error::{Result, WatcherError};

const PROVIDER: &str = "ollama";

/// Client for a local Ollama server's `/api/generate` endpoint.
pub struct OllamaClient {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: Option<String>,
    error: Option<String>,
}

impl OllamaClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(OllamaClient {
            http: build_http_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    fn request_body(&self, request: &GenerationRequest) -> Value {
        let mut body = Map::new();
        body.insert("model".into(), json!(request.model));
        body.insert("prompt".into(), json!(request.prompt));
        body.insert("stream".into(), json!(false));
        if let Some(schema) = &request.format {
            body.insert("format".into(), schema.as_json_schema().clone());
        }
        if let Some(options) = &request.options {
            body.insert("options".into(), Value::Object(options.clone()));
        }
        Value::Object(body)
    }
}

#[async_trait]
impl GenerationProvider for OllamaClient {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult> {
        let model = request.model.as_str();
        let url = format!("{}/api/generate", self.base_url);
        let body = self.request_body(request);
        debug!(provider = PROVIDER, model, url = %url, "Ollama request: {}", body);

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(e, PROVIDER, model, self.timeout))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| transport_error(e, PROVIDER, model, self.timeout))?;
        debug!(provider = PROVIDER, model, status = status.as_u16(), "Ollama response: {}", text);

        if !status.is_success() {
            return Err(WatcherError::provider(
                PROVIDER,
                model,
                Some(status.as_u16()),
                format!("Failed to generate from Ollama: {} / url: {}", text, url),
            ));
        }

        let parsed: GenerateResponse = serde_json::from_str(&text).map_err(|e| {
            WatcherError::provider(PROVIDER, model, Some(status.as_u16()), format!("invalid response body: {}", e))
        })?;
        match (parsed.response, parsed.error) {
            (_, Some(error)) => Err(WatcherError::provider(
                PROVIDER,
                model,
                Some(status.as_u16()),
                error,
            )),
            (Some(generated), None) => finish_generation(generated, request, PROVIDER),
            (None, None) => Err(WatcherError::provider(
                PROVIDER,
                model,
                Some(status.as_u16()),
                "response has no 'response' field",
            )),
        }
    }
}
