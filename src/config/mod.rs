// src/config/mod.rs

pub mod watcher;

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Result, WatcherError};
use crate::llm::DEFAULT_OPENAI_API_URL;

pub const DEFAULT_WATCH_INDEX: &str = "llm-queue";
pub const DEFAULT_BATCH_SIZE: usize = 10;
pub const DEFAULT_WATCH_INTERVAL_SECS: u64 = 10;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;
/// Elasticsearch's default `index.max_result_window`; larger searches are rejected.
pub const MAX_BATCH_SIZE: usize = 10_000;

/// Everything the watcher core needs, independent of where it came from
/// (command line, environment or a YAML file).
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct WatcherConfig {
    pub elasticsearch_url: String,
    pub elasticsearch_username: Option<String>,
    pub elasticsearch_password: Option<String>,
    pub ollama_api: Option<String>,
    pub openai_api_key: Option<String>,
    pub openai_api_url: String,
    pub watch_index: String,
    pub batch_size: usize,
    pub watch_interval_secs: u64,
    pub retry_errors: bool,
    pub sort_field: Option<String>,
    pub request_timeout_secs: u64,
    pub debug: bool,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        WatcherConfig {
            elasticsearch_url: String::new(),
            elasticsearch_username: None,
            elasticsearch_password: None,
            ollama_api: None,
            openai_api_key: None,
            openai_api_url: DEFAULT_OPENAI_API_URL.to_string(),
            watch_index: DEFAULT_WATCH_INDEX.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            watch_interval_secs: DEFAULT_WATCH_INTERVAL_SECS,
            retry_errors: false,
            sort_field: None,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            debug: false,
        }
    }
}

impl WatcherConfig {
    pub fn watch_interval(&self) -> Duration {
        Duration::from_secs(self.watch_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.elasticsearch_url.trim().is_empty() {
            return Err(WatcherError::ConfigError(
                "Elasticsearch URL is required (env: ELASTICSEARCH_URL or --elasticsearch)"
                    .to_string(),
            ));
        }
        match (
            self.elasticsearch_username.as_deref(),
            self.elasticsearch_password.as_deref(),
        ) {
            (Some(_), None) => {
                return Err(WatcherError::ConfigError(
                    "Elasticsearch password is required when a username is set (env: ELASTICSEARCH_PASSWORD or --elasticsearch-password)"
                        .to_string(),
                ))
            }
            (None, Some(_)) => {
                return Err(WatcherError::ConfigError(
                    "Elasticsearch username is required when a password is set (env: ELASTICSEARCH_USERNAME or --elasticsearch-username)"
                        .to_string(),
                ))
            }
            _ => {}
        }
        let has_ollama = self.ollama_api.as_deref().is_some_and(|u| !u.is_empty());
        let has_openai = self.openai_api_key.as_deref().is_some_and(|k| !k.is_empty());
        if !has_ollama && !has_openai {
            return Err(WatcherError::ConfigError(
                "Neither Ollama API URL nor OpenAI API key is set, llm will not work".to_string(),
            ));
        }
        if self.watch_index.trim().is_empty() {
            return Err(WatcherError::ConfigError(
                "Elasticsearch index to watch is required (env: WATCH_INDEX or --watch-index)"
                    .to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(WatcherError::ConfigError(
                "batch_size must be greater than 0".to_string(),
            ));
        }
        if self.batch_size > MAX_BATCH_SIZE {
            return Err(WatcherError::ConfigError(format!(
                "batch_size must be at most {} (Elasticsearch max_result_window)",
                MAX_BATCH_SIZE
            )));
        }
        if self.watch_interval_secs == 0 {
            return Err(WatcherError::ConfigError(
                "watch_interval_secs must be greater than 0".to_string(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(WatcherError::ConfigError(
                "request_timeout_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Loads, parses and validates a watcher configuration YAML file.
pub fn load_watcher_config<P: AsRef<Path>>(config_path: P) -> Result<WatcherConfig> {
    let path_ref = config_path.as_ref();
    let config_content = fs::read_to_string(path_ref).map_err(|e| {
        WatcherError::ConfigError(format!(
            "Failed to read watcher config file '{}': {}",
            path_ref.display(),
            e
        ))
    })?;

    let config: WatcherConfig = serde_yaml::from_str(&config_content).map_err(|e| {
        WatcherError::ConfigError(format!(
            "Failed to parse watcher config YAML from '{}': {}",
            path_ref.display(),
            e
        ))
    })?;

    config.validate()?;

    Ok(config)
}
