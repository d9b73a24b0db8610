// src/watcher_logic.rs

use std::future::Future;
use std::sync::Arc;

use serde_json::{json, Map, Value};
use tokio::time::sleep;
use tracing::{debug, error, info, info_span, Instrument};

use crate::config::WatcherConfig;
use crate::data_model::{DocumentState, ProcessingOutcome, QueueDocument, WATCHER_FIELD};
use crate::error::Result;
use crate::executor::BatchDispatcher;
use crate::llm::ProviderRegistry;
use crate::store::{DocumentStore, ElasticsearchStore, SearchQuery};
use crate::utils::prometheus_metrics::*;

/// Selects up to `batch_size` candidates from the queue index. Retry mode only
/// widens the filter to documents carrying an error annotation.
pub async fn fetch_documents(
    store: &dyn DocumentStore,
    queue_index: &str,
    batch_size: usize,
    retry_errors: bool,
    sort_field: Option<&str>,
) -> Result<Vec<QueueDocument>> {
    let query = SearchQuery {
        size: batch_size,
        exclude_errored: !retry_errors,
        sort_field: sort_field.map(str::to_string),
    };
    let mut documents = store.search(queue_index, &query).await?;
    // `exists` cannot see error annotations under an unindexed `_llm_watcher`
    // mapping, so the filter is re-applied to what came back.
    let returned = documents.len();
    documents.retain(|document| query.matches(document));
    if documents.len() < returned {
        debug!(
            skipped = returned - documents.len(),
            "Store returned errored documents, skipped"
        );
    }
    documents.truncate(batch_size);
    Ok(documents)
}

/// The document as it should look in its original index: queue payload
/// without the control block, overlaid with the generated fields.
pub fn merged_fields(document: &QueueDocument, result: &Map<String, Value>) -> Map<String, Value> {
    let mut merged = document.source_fields();
    for (key, value) in result {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

/// Applies one outcome to the store and returns the document's new state.
///
/// Success merges into the original index and then deletes the queue copy.
/// The two writes are not atomic: a crash in between leaves the document in
/// both places and it is processed again on a later cycle, never lost.
/// Failure only sets `_llm_watcher.error` on the queue copy.
///
/// A store error leaves the document as it was before the call, except for
/// the merge-succeeded/delete-failed case described above.
pub async fn commit_outcome(
    store: &dyn DocumentStore,
    queue_index: &str,
    outcome: &ProcessingOutcome,
) -> Result<DocumentState> {
    match outcome {
        ProcessingOutcome::Success {
            document,
            original_index,
            result,
        } => {
            store
                .update(original_index, &document.id, merged_fields(document, result), true)
                .await?;
            store.delete(queue_index, &document.id).await?;
            debug!(doc_id = %document.id, original_index = %original_index, "Document written back");
            Ok(DocumentState::Done)
        }
        ProcessingOutcome::Failure { document, error } => {
            let mut annotation = Map::new();
            annotation.insert(WATCHER_FIELD.to_string(), json!({ "error": error }));
            store
                .update(queue_index, &document.id, annotation, false)
                .await?;
            Ok(DocumentState::Errored(error.clone()))
        }
    }
}

/// Counts logged at the end of every cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub found: usize,
    pub processed: usize,
    pub errors: usize,
}

/// Fetch → dispatch → commit, on a fixed interval.
pub struct Watcher {
    store: Arc<dyn DocumentStore>,
    dispatcher: BatchDispatcher,
    config: WatcherConfig,
}

impl Watcher {
    pub fn new(
        config: WatcherConfig,
        store: Arc<dyn DocumentStore>,
        providers: ProviderRegistry,
    ) -> Self {
        let dispatcher = BatchDispatcher::new(providers, config.watch_index.clone());
        Watcher {
            store,
            dispatcher,
            config,
        }
    }

    /// Wires the Elasticsearch store and every configured provider.
    pub fn from_config(config: WatcherConfig) -> Result<Self> {
        let store = ElasticsearchStore::new(
            &config.elasticsearch_url,
            config.elasticsearch_username.clone(),
            config.elasticsearch_password.clone(),
            config.request_timeout(),
        )?
        .refresh_writes_to(config.watch_index.clone());
        let providers = ProviderRegistry::from_config(&config)?;
        Ok(Watcher::new(config, Arc::new(store), providers))
    }

    pub fn config(&self) -> &WatcherConfig {
        &self.config
    }

    /// One full pass. Only a failed fetch is returned as an error; failed
    /// documents and failed commits are counted in the summary.
    pub async fn run_cycle(&self) -> Result<CycleSummary> {
        WATCH_CYCLES_TOTAL.inc();
        let timer = CYCLE_DURATION_SECONDS.start_timer();
        let index = self.config.watch_index.as_str();

        let documents = fetch_documents(
            self.store.as_ref(),
            index,
            self.config.batch_size,
            self.config.retry_errors,
            self.config.sort_field.as_deref(),
        )
        .await
        .inspect_err(|_| FETCH_ERRORS_TOTAL.inc())?;

        let found = documents.len();
        DOCUMENTS_FETCHED_TOTAL.inc_by(found as f64);
        info!("Found {} documents in {} to process", found, index);

        let mut summary = CycleSummary {
            found,
            ..CycleSummary::default()
        };
        if found == 0 {
            timer.observe_duration();
            return Ok(summary);
        }

        let outcomes = self
            .dispatcher
            .dispatch(documents, self.config.batch_size)
            .await;

        for outcome in &outcomes {
            let doc_id = outcome.document().id.as_str();
            if let ProcessingOutcome::Failure { error, .. } = outcome {
                error!(doc_id, error = %error, "Error processing document (id: {}): {}", doc_id, error);
            }

            match commit_outcome(self.store.as_ref(), index, outcome).await {
                Ok(DocumentState::Done) => {
                    DOCUMENTS_PROCESSED_TOTAL.inc();
                    summary.processed += 1;
                }
                Ok(_) => {
                    DOCUMENTS_FAILED_TOTAL.inc();
                    summary.errors += 1;
                }
                Err(e) => {
                    COMMIT_ERRORS_TOTAL.inc();
                    summary.errors += 1;
                    error!(doc_id, error = %e, "Failed to commit document (id: {}), left unchanged: {}", doc_id, e);
                }
            }
        }

        info!(
            found = summary.found,
            processed = summary.processed,
            errors = summary.errors,
            "processed {} of {}, {} errors",
            summary.processed,
            summary.found,
            summary.errors
        );
        timer.observe_duration();
        Ok(summary)
    }

    /// Runs cycles until `shutdown` resolves. The first cycle starts
    /// immediately; a running cycle is always finished before stopping.
    pub async fn run_until<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let interval = self.config.watch_interval();
        let mut cycle_number: u64 = 0;

        loop {
            cycle_number += 1;
            let span = info_span!("watch_cycle", cycle = cycle_number);
            if let Err(e) = self.run_cycle().instrument(span).await {
                error!(error = %e, "Watch cycle aborted, retrying after {}s", interval.as_secs());
            }

            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested, watcher stopping.");
                    return;
                }
                _ = sleep(interval) => {}
            }
        }
    }
}
