// src/bin/watcher.rs

use clap::Parser;
use tracing::{error, info};

use llm_watcher::config::watcher::Args;
use llm_watcher::error::Result;
use llm_watcher::utils::{init_tracing, setup_prometheus_metrics, shutdown_signal};
use llm_watcher::watcher_logic::Watcher;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let shutdown = shutdown_signal();
    let cli_debug = args.debug;
    let log_json = args.log_json;
    let metrics_port = args.metrics_port;
    let validate_only = args.validate_config;

    // Log level follows the resolved config, flags or YAML.
    let config = match args.into_config() {
        Ok(config) => {
            init_tracing(config.debug, log_json)?;
            config
        }
        Err(e) => {
            init_tracing(cli_debug, log_json)?;
            error!("{}", e);
            return Err(e);
        }
    };
    if config.debug {
        info!("Debug mode enabled");
    }
    if validate_only {
        info!("Configuration is valid.");
        return Ok(());
    }

    if let Err(e) = setup_prometheus_metrics(metrics_port).await {
        error!("Failed to start Prometheus metrics endpoint: {}", e);
    }

    info!("Watcher starting.");
    info!(
        "Watching index '{}' @ {} every {}s (batch size {}, retry errors: {})",
        config.watch_index,
        config.elasticsearch_url,
        config.watch_interval_secs,
        config.batch_size,
        config.retry_errors
    );
    if let Some(field) = &config.sort_field {
        info!("Sorting candidates by '{}'", field);
    }

    let watcher = Watcher::from_config(config)?;
    watcher.run_until(shutdown).await;

    info!("Watcher stopped.");
    Ok(())
}
