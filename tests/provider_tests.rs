use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use llm_watcher::data_model::GenerationResult;
use llm_watcher::error::WatcherError;
use llm_watcher::llm::{GenerationProvider, GenerationRequest, OllamaClient, OpenAiClient};
use llm_watcher::schema::OutputSchema;

fn request(format: Option<serde_json::Value>) -> GenerationRequest {
    GenerationRequest {
        model: "test-model".to_string(),
        prompt: "Rate 1-10: I love it!".to_string(),
        format: format.map(|f| OutputSchema::from_format(&f).unwrap()),
        options: None,
    }
}

fn chat_completion(content: &str) -> serde_json::Value {
    json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }]
    })
}

#[tokio::test]
async fn openai_structured_output_round_trip() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({
            "model": "test-model",
            "messages": [{"role": "user", "content": "Rate 1-10: I love it!"}],
            "response_format": {"type": "json_schema"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_completion("{\"scale\": 5}")))
        .expect(1)
        .mount(&server)
        .await;

    let client = OpenAiClient::new(
        &format!("{}/v1", server.uri()),
        Some("sk-test".to_string()),
        Duration::from_secs(5),
    )
    .unwrap();
    let result = client
        .generate(&request(Some(json!({"scale": "integer"}))))
        .await
        .unwrap();

    match result {
        GenerationResult::Structured(fields) => assert_eq!(fields["scale"], 5),
        other => panic!("Expected structured result, got {:?}", other),
    }
}

#[tokio::test]
async fn openai_free_text_without_format() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_completion("A solid 9.")))
        .mount(&server)
        .await;

    let client = OpenAiClient::new(&server.uri(), Some("k".into()), Duration::from_secs(5)).unwrap();
    let result = client.generate(&request(None)).await.unwrap();
    assert_eq!(result, GenerationResult::Text("A solid 9.".to_string()));
}

#[tokio::test]
async fn openai_rejected_key_is_auth_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": {"message": "Incorrect API key provided"}
        })))
        .mount(&server)
        .await;

    let client = OpenAiClient::new(&server.uri(), Some("bad".into()), Duration::from_secs(5)).unwrap();
    let err = client.generate(&request(None)).await.unwrap_err();
    match err {
        WatcherError::AuthError { provider, model, message } => {
            assert_eq!(provider, "openai");
            assert_eq!(model, "test-model");
            assert!(message.contains("401"));
        }
        other => panic!("Expected AuthError, got {:?}", other),
    }
}

#[tokio::test]
async fn openai_server_error_carries_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .mount(&server)
        .await;

    let client = OpenAiClient::new(&server.uri(), Some("k".into()), Duration::from_secs(5)).unwrap();
    let err = client.generate(&request(None)).await.unwrap_err();
    assert!(matches!(
        err,
        WatcherError::ProviderError { status: Some(503), .. }
    ));
    assert!(err.to_string().contains("overloaded"));
}

#[tokio::test]
async fn ollama_structured_output_is_validated() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_partial_json(json!({
            "model": "test-model",
            "stream": false,
            "format": {"type": "object", "required": ["scale"]}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": "{\"scale\": \"five\"}",
            "done": true
        })))
        .mount(&server)
        .await;

    let client = OllamaClient::new(&server.uri(), Duration::from_secs(5)).unwrap();
    let err = client
        .generate(&request(Some(json!({"scale": "integer"}))))
        .await
        .unwrap_err();
    assert!(matches!(err, WatcherError::ProviderError { .. }));
    assert!(err.to_string().contains("expected type"));
}

#[tokio::test]
async fn ollama_non_success_is_provider_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": "model 'test-model' not found"
        })))
        .mount(&server)
        .await;

    let client = OllamaClient::new(&server.uri(), Duration::from_secs(5)).unwrap();
    let err = client.generate(&request(None)).await.unwrap_err();
    match &err {
        WatcherError::ProviderError { provider, model, status, .. } => {
            assert_eq!(provider, "ollama");
            assert_eq!(model, "test-model");
            assert_eq!(*status, Some(404));
        }
        other => panic!("Expected ProviderError, got {:?}", other),
    }
}

#[tokio::test]
async fn ollama_deadline_is_timeout_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"response": "late"}))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let client = OllamaClient::new(&server.uri(), Duration::from_secs(1)).unwrap();
    let err = client.generate(&request(None)).await.unwrap_err();
    assert!(matches!(
        err,
        WatcherError::TimeoutError { timeout_secs: 1, .. }
    ));
}

#[tokio::test]
async fn unreachable_backend_is_provider_error() {
    // Nothing listens on port 9 (discard) in the test environment.
    let client = OllamaClient::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
    let err = client.generate(&request(None)).await.unwrap_err();
    assert!(err.is_document_scoped());
}
