use std::path::PathBuf;

use clap::Parser;

use super::{load_watcher_config, WatcherConfig};
use crate::error::Result;
use crate::llm::DEFAULT_OPENAI_API_URL;

// Define command-line arguments
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Elasticsearch URL
    #[arg(long, env = "ELASTICSEARCH_URL")]
    pub elasticsearch: Option<String>,

    /// Username for Elasticsearch authentication
    #[arg(long, env = "ELASTICSEARCH_USERNAME")]
    pub elasticsearch_username: Option<String>,

    /// Password for Elasticsearch authentication
    #[arg(long, env = "ELASTICSEARCH_PASSWORD", hide_env_values = true)]
    pub elasticsearch_password: Option<String>,

    /// Ollama API URL
    #[arg(long, env = "OLLAMA_API_URL")]
    pub ollama_api: Option<String>,

    /// OpenAI API key, enables the openai provider
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    /// Base URL of the OpenAI-compatible API
    #[arg(long, env = "OPENAI_API_URL", default_value = DEFAULT_OPENAI_API_URL)]
    pub openai_api_url: String,

    /// Number of documents to process in a single batch
    #[arg(long, default_value_t = super::DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,

    /// Name of the Elasticsearch index to watch for new documents
    #[arg(long, env = "WATCH_INDEX", default_value = super::DEFAULT_WATCH_INDEX)]
    pub watch_index: String,

    /// Interval in seconds between index checks
    #[arg(long, default_value_t = super::DEFAULT_WATCH_INTERVAL_SECS)]
    pub watch_interval: u64,

    /// Retry documents which had errors before
    #[arg(long)]
    pub retry_errors: bool,

    /// Field to sort the documents by
    #[arg(long)]
    pub sort_field: Option<String>,

    /// Deadline in seconds for a single generation or store request
    #[arg(long, default_value_t = super::DEFAULT_REQUEST_TIMEOUT_SECS)]
    pub request_timeout: u64,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub log_json: bool,

    /// Optional: Port for the Prometheus metrics HTTP endpoint
    #[arg(long)]
    pub metrics_port: Option<u16>,

    /// Read the watcher configuration from this YAML file instead of flags
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Validate the configuration and exit
    #[arg(long)]
    pub validate_config: bool,
}

impl Args {
    /// Resolves the effective configuration. A YAML file given with
    /// `--config` takes precedence; `--debug` still applies on top of it.
    pub fn into_config(self) -> Result<WatcherConfig> {
        if let Some(path) = &self.config {
            let mut config = load_watcher_config(path)?;
            config.debug |= self.debug;
            return Ok(config);
        }

        let config = WatcherConfig {
            elasticsearch_url: self.elasticsearch.unwrap_or_default(),
            elasticsearch_username: self.elasticsearch_username,
            elasticsearch_password: self.elasticsearch_password,
            ollama_api: self.ollama_api,
            openai_api_key: self.openai_api_key,
            openai_api_url: self.openai_api_url,
            watch_index: self.watch_index,
            batch_size: self.batch_size,
            watch_interval_secs: self.watch_interval,
            retry_errors: self.retry_errors,
            sort_field: self.sort_field,
            request_timeout_secs: self.request_timeout,
            debug: self.debug,
        };
        config.validate()?;
        Ok(config)
    }
}
