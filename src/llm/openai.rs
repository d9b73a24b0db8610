// src/llm/openai.rs

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::debug;

use super::{build_http_client, finish_generation, transport_error, GenerationProvider, GenerationRequest};
use crate::data_model::GenerationResult;
use crate::error::{Result, WatcherError};

pub const DEFAULT_OPENAI_API_URL: &str = "https://api.openai.com/v1";

const PROVIDER: &str = "openai";
/// Body keys owned by the client; document options may not override them.
const RESERVED_KEYS: &[&str] = &["model", "messages", "stream", "response_format"];

/// Client for any OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
    refusal: Option<String>,
}

impl OpenAiClient {
    pub fn new(base_url: &str, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        Ok(OpenAiClient {
            http: build_http_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
            timeout,
        })
    }

    fn request_body(&self, request: &GenerationRequest) -> Value {
        let mut body = Map::new();
        if let Some(options) = &request.options {
            for (key, value) in options {
                if !RESERVED_KEYS.contains(&key.as_str()) {
                    body.insert(key.clone(), value.clone());
                }
            }
        }
        body.insert("model".into(), json!(request.model));
        body.insert(
            "messages".into(),
            json!([{ "role": "user", "content": request.prompt }]),
        );
        body.insert("stream".into(), json!(false));
        if let Some(schema) = &request.format {
            body.insert(
                "response_format".into(),
                json!({
                    "type": "json_schema",
                    "json_schema": {
                        "name": "generate_output",
                        "schema": schema.as_json_schema(),
                        "strict": false
                    }
                }),
            );
        }
        Value::Object(body)
    }
}

#[async_trait]
impl GenerationProvider for OpenAiClient {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult> {
        let model = request.model.as_str();
        let api_key = self.api_key.as_deref().ok_or_else(|| WatcherError::AuthError {
            provider: PROVIDER.to_string(),
            model: model.to_string(),
            message: "no API key configured".to_string(),
        })?;

        let url = format!("{}/chat/completions", self.base_url);
        let body = self.request_body(request);
        debug!(provider = PROVIDER, model, url = %url, "OpenAI request: {}", body);

        let response = self
            .http
            .post(&url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(e, PROVIDER, model, self.timeout))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| transport_error(e, PROVIDER, model, self.timeout))?;
        debug!(provider = PROVIDER, model, status = status.as_u16(), "OpenAI response: {}", text);

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(WatcherError::AuthError {
                provider: PROVIDER.to_string(),
                model: model.to_string(),
                message: format!("HTTP {}: {}", status.as_u16(), text),
            });
        }
        if !status.is_success() {
            return Err(WatcherError::provider(
                PROVIDER,
                model,
                Some(status.as_u16()),
                format!("Failed to generate from OpenAI: {} / url: {}", text, url),
            ));
        }

        let parsed: ChatCompletionResponse = serde_json::from_str(&text).map_err(|e| {
            WatcherError::provider(PROVIDER, model, Some(status.as_u16()), format!("invalid response body: {}", e))
        })?;
        let message = parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message)
            .ok_or_else(|| WatcherError::provider(PROVIDER, model, Some(status.as_u16()), "response has no choices"))?;

        match (message.content, message.refusal) {
            (Some(content), _) => finish_generation(content, request, PROVIDER),
            (None, Some(refusal)) => Err(WatcherError::provider(
                PROVIDER,
                model,
                Some(status.as_u16()),
                format!("model refused: {}", refusal),
            )),
            (None, None) => Err(WatcherError::provider(
                PROVIDER,
                model,
                Some(status.as_u16()),
                "response message has no content",
            )),
        }
    }
}
