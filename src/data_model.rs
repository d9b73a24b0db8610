use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, WatcherError};

/// Key of the control block the ingest pipeline attaches to queued documents.
pub const WATCHER_FIELD: &str = "_llm_watcher";
/// Field receiving free-text generations when the document names none.
pub const DEFAULT_OUTPUT_FIELD: &str = "llm_output";

/// A document currently sitting in the queue index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueDocument {
    pub id: String,
    /// Full `_source` of the queue copy, `_llm_watcher` included.
    pub source: Map<String, Value>,
}

impl QueueDocument {
    pub fn new(id: impl Into<String>, source: Map<String, Value>) -> Self {
        QueueDocument {
            id: id.into(),
            source,
        }
    }

    /// The original payload, i.e. everything except the control block.
    pub fn source_fields(&self) -> Map<String, Value> {
        let mut fields = self.source.clone();
        fields.remove(WATCHER_FIELD);
        fields
    }

    /// Parses the `_llm_watcher` block.
    pub fn watcher_meta(&self) -> Result<WatcherMeta> {
        let raw = self.source.get(WATCHER_FIELD).ok_or_else(|| {
            WatcherError::InvalidDocument(format!("missing '{}' object", WATCHER_FIELD))
        })?;
        WatcherMeta::from_value(raw)
    }

    /// The error-state machine as far as the store can express it.
    pub fn persisted_state(&self) -> DocumentState {
        match self
            .source
            .get(WATCHER_FIELD)
            .and_then(|meta| meta.get("error"))
        {
            Some(Value::String(reason)) => DocumentState::Errored(reason.clone()),
            Some(Value::Null) | None => DocumentState::Pending,
            Some(other) => DocumentState::Errored(other.to_string()),
        }
    }
}

/// Lifecycle of a queue document. `Processing` and `Done` only exist in
/// memory; the store sees `Pending` (no error field) or `Errored`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentState {
    Pending,
    Processing,
    Done,
    Errored(String),
}

impl fmt::Display for DocumentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentState::Pending => write!(f, "pending"),
            DocumentState::Processing => write!(f, "processing"),
            DocumentState::Done => write!(f, "done"),
            DocumentState::Errored(_) => write!(f, "errored"),
        }
    }
}

/// Which generation backend a document asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAi,
    Ollama,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Ollama => "ollama",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "openai" => Some(ProviderKind::OpenAi),
            "ollama" => Some(ProviderKind::Ollama),
            _ => None,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parsed `_llm_watcher` control block.
#[derive(Debug, Clone, PartialEq)]
pub struct WatcherMeta {
    pub provider: ProviderKind,
    pub model: String,
    pub prompt: String,
    pub format: Option<Value>,
    pub options: Option<Map<String, Value>>,
    pub original_index: String,
    pub output_field: Option<String>,
    pub error: Option<String>,
}

impl WatcherMeta {
    pub fn from_value(raw: &Value) -> Result<Self> {
        let obj = raw.as_object().ok_or_else(|| {
            WatcherError::InvalidDocument(format!("'{}' is not an object", WATCHER_FIELD))
        })?;

        let prompt = match obj.get("prompt") {
            Some(Value::String(p)) => p.clone(),
            Some(_) => {
                return Err(WatcherError::TemplateError(
                    "prompt template must be a string".to_string(),
                ))
            }
            None => {
                return Err(WatcherError::TemplateError(format!(
                    "missing '{}.prompt' template",
                    WATCHER_FIELD
                )))
            }
        };

        let provider_name = required_str(obj, "provider")?;
        let provider = ProviderKind::parse(provider_name).ok_or_else(|| {
            WatcherError::InvalidDocument(format!("Unknown llm provider: {}", provider_name))
        })?;
        let model = required_str(obj, "model")?.to_string();

        let original_index = ["_original_index", "original_index", "originalIndex"]
            .iter()
            .find_map(|key| obj.get(*key).and_then(Value::as_str))
            .filter(|index| !index.is_empty())
            .ok_or_else(|| {
                WatcherError::InvalidDocument(format!(
                    "missing '{}._original_index'",
                    WATCHER_FIELD
                ))
            })?
            .to_string();

        let format = match obj.get("format") {
            None | Some(Value::Null) => None,
            Some(v @ Value::Object(_)) => Some(v.clone()),
            Some(_) => {
                return Err(WatcherError::InvalidDocument(
                    "'format' must be an object".to_string(),
                ))
            }
        };

        let options = match obj.get("options") {
            None | Some(Value::Null) => None,
            Some(Value::Object(o)) => Some(o.clone()),
            Some(_) => {
                return Err(WatcherError::InvalidDocument(
                    "'options' must be an object".to_string(),
                ))
            }
        };

        Ok(WatcherMeta {
            provider,
            model,
            prompt,
            format,
            options,
            original_index,
            output_field: obj
                .get("output_field")
                .and_then(Value::as_str)
                .map(str::to_string),
            error: obj.get("error").and_then(Value::as_str).map(str::to_string),
        })
    }

    pub fn output_field(&self) -> &str {
        self.output_field.as_deref().unwrap_or(DEFAULT_OUTPUT_FIELD)
    }
}

fn required_str<'a>(obj: &'a Map<String, Value>, key: &str) -> Result<&'a str> {
    match obj.get(key).and_then(Value::as_str) {
        Some(s) if !s.is_empty() => Ok(s),
        _ => Err(WatcherError::InvalidDocument(format!(
            "missing '{}.{}'",
            WATCHER_FIELD, key
        ))),
    }
}

/// What a provider hands back.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationResult {
    Text(String),
    Structured(Map<String, Value>),
}

impl GenerationResult {
    /// Fields to merge into the original document.
    pub fn into_fields(self, output_field: &str) -> Map<String, Value> {
        match self {
            GenerationResult::Structured(fields) => fields,
            GenerationResult::Text(text) => {
                let mut fields = Map::new();
                fields.insert(output_field.to_string(), Value::String(text));
                fields
            }
        }
    }
}

/// Per-document result of a dispatch, consumed once by the committer.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessingOutcome {
    Success {
        document: QueueDocument,
        /// Where the result is merged back to.
        original_index: String,
        result: Map<String, Value>,
    },
    Failure {
        document: QueueDocument,
        error: String,
    },
}

impl ProcessingOutcome {
    pub fn document(&self) -> &QueueDocument {
        match self {
            ProcessingOutcome::Success { document, .. } => document,
            ProcessingOutcome::Failure { document, .. } => document,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ProcessingOutcome::Success { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(source: Value) -> QueueDocument {
        QueueDocument::new("1", source.as_object().unwrap().clone())
    }

    #[test]
    fn parses_ingest_pipeline_block() {
        let d = doc(json!({
            "message": "hi",
            "_llm_watcher": {
                "provider": "ollama",
                "model": "llama3.3",
                "prompt": "Rate: {{message}}",
                "format": {"scale": "integer"},
                "_original_index": "reviews"
            }
        }));
        let meta = d.watcher_meta().unwrap();
        assert_eq!(meta.provider, ProviderKind::Ollama);
        assert_eq!(meta.original_index, "reviews");
        assert_eq!(meta.output_field(), DEFAULT_OUTPUT_FIELD);
        assert!(meta.options.is_none());
        assert_eq!(d.persisted_state(), DocumentState::Pending);
        assert!(!d.source_fields().contains_key(WATCHER_FIELD));
    }

    #[test]
    fn missing_prompt_is_a_template_error() {
        let d = doc(json!({
            "_llm_watcher": {"provider": "openai", "model": "gpt-4o", "_original_index": "x"}
        }));
        assert!(matches!(
            d.watcher_meta(),
            Err(WatcherError::TemplateError(_))
        ));
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let d = doc(json!({
            "_llm_watcher": {"provider": "bard", "model": "m", "prompt": "p", "_original_index": "x"}
        }));
        let err = d.watcher_meta().unwrap_err();
        assert!(err.to_string().contains("Unknown llm provider: bard"));
    }

    #[test]
    fn error_field_marks_document_errored() {
        let d = doc(json!({"_llm_watcher": {"error": "timeout"}}));
        assert_eq!(
            d.persisted_state(),
            DocumentState::Errored("timeout".to_string())
        );
    }
}
