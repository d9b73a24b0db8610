// src/utils/prometheus_metrics.rs

use once_cell::sync::Lazy;
use prometheus::{register_counter, register_gauge, register_histogram, Counter, Gauge, Histogram};

pub static WATCH_CYCLES_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "watcher_cycles_total",
        "Total number of watch cycles started."
    )
    .expect("Failed to register watcher_cycles_total counter")
});

pub static FETCH_ERRORS_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "watcher_fetch_errors_total",
        "Total number of cycles aborted because the queue index could not be read."
    )
    .expect("Failed to register watcher_fetch_errors_total counter")
});

pub static DOCUMENTS_FETCHED_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "watcher_documents_fetched_total",
        "Total number of queue documents fetched for processing."
    )
    .expect("Failed to register watcher_documents_fetched_total counter")
});

pub static DOCUMENTS_PROCESSED_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "watcher_documents_processed_total",
        "Total number of documents written back and removed from the queue."
    )
    .expect("Failed to register watcher_documents_processed_total counter")
});

pub static DOCUMENTS_FAILED_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "watcher_documents_failed_total",
        "Total number of documents annotated with an error."
    )
    .expect("Failed to register watcher_documents_failed_total counter")
});

pub static COMMIT_ERRORS_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "watcher_commit_errors_total",
        "Total number of write-backs or error annotations the store did not accept."
    )
    .expect("Failed to register watcher_commit_errors_total counter")
});

pub static ACTIVE_GENERATIONS: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!(
        "watcher_active_generations",
        "Number of generation requests currently in flight."
    )
    .expect("Failed to register watcher_active_generations gauge")
});

pub static GENERATION_DURATION_SECONDS: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "watcher_generation_duration_seconds",
        "Histogram of per-document processing durations (render plus generation)."
    )
    .expect("Failed to register watcher_generation_duration_seconds histogram")
});

pub static CYCLE_DURATION_SECONDS: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "watcher_cycle_duration_seconds",
        "Histogram of watch cycle durations (fetch, dispatch and commit)."
    )
    .expect("Failed to register watcher_cycle_duration_seconds histogram")
});
