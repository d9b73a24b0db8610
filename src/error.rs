use thiserror::Error;

/// Custom Result type for this crate.
pub type Result<T> = std::result::Result<T, WatcherError>;

/// The Error type for watcher operations.
#[derive(Error, Debug)]
pub enum WatcherError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Template error: {0}")]
    TemplateError(String),

    /// The `_llm_watcher` block is missing or carries unusable attributes.
    #[error("Invalid queue document: {0}")]
    InvalidDocument(String),

    #[error("{provider} error (model '{model}'{}): {message}", status_suffix(.status))]
    ProviderError {
        provider: String,
        model: String,
        status: Option<u16>,
        message: String,
    },

    #[error("{provider} authentication failed (model '{model}'): {message}")]
    AuthError {
        provider: String,
        model: String,
        message: String,
    },

    #[error("{provider} request timed out after {timeout_secs}s (model '{model}')")]
    TimeoutError {
        provider: String,
        model: String,
        timeout_secs: u64,
    },

    #[error("Backing store unreachable: {0}")]
    ConnectivityError(String),

    #[error("Backing store rejected request (HTTP {status}): {message}")]
    StoreError { status: u16, message: String },

    #[error("Serialization/Deserialization error: {source}")]
    SerializationError {
        #[from]
        source: serde_json::Error,
    },

    #[error("I/O error: {source}")]
    IoError {
        #[from]
        source: std::io::Error,
    },
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(", HTTP {}", s)).unwrap_or_default()
}

impl WatcherError {
    /// Errors that belong to a single document and end up as an error
    /// annotation on it. Everything else concerns the store or the process.
    pub fn is_document_scoped(&self) -> bool {
        matches!(
            self,
            WatcherError::TemplateError(_)
                | WatcherError::InvalidDocument(_)
                | WatcherError::ProviderError { .. }
                | WatcherError::AuthError { .. }
                | WatcherError::TimeoutError { .. }
        )
    }

    pub(crate) fn provider(
        provider: &str,
        model: &str,
        status: Option<u16>,
        message: impl Into<String>,
    ) -> Self {
        WatcherError::ProviderError {
            provider: provider.to_string(),
            model: model.to_string(),
            status,
            message: message.into(),
        }
    }
}
