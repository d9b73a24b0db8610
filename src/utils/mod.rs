// Utils

pub mod common;
pub mod prometheus_metrics;

pub use common::{init_tracing, setup_prometheus_metrics, shutdown_signal};
