use futures::stream::{self, StreamExt};
use serde_json::{Map, Value};
use tracing::{debug, info_span, warn, Instrument};

use crate::data_model::{DocumentState, ProcessingOutcome, QueueDocument};
use crate::error::{Result, WatcherError};
use crate::llm::{GenerationRequest, ProviderRegistry};
use crate::schema::OutputSchema;
use crate::template::{document_context, render};
use crate::utils::prometheus_metrics::{ACTIVE_GENERATIONS, GENERATION_DURATION_SECONDS};

/// Runs prompt rendering and generation over a batch of queue documents.
pub struct BatchDispatcher {
    providers: ProviderRegistry,
    queue_index: String,
}

impl BatchDispatcher {
    pub fn new(providers: ProviderRegistry, queue_index: impl Into<String>) -> Self {
        BatchDispatcher {
            providers,
            queue_index: queue_index.into(),
        }
    }

    /// Processes up to `concurrency` documents at a time and returns once every
    /// document has an outcome. Output order is completion order.
    pub async fn dispatch(
        &self,
        documents: Vec<QueueDocument>,
        concurrency: usize,
    ) -> Vec<ProcessingOutcome> {
        let limit = concurrency.min(documents.len()).max(1);
        stream::iter(documents)
            .map(|doc| self.process_document(doc))
            .buffer_unordered(limit)
            .collect()
            .await
    }

    /// Never fails: every error is folded into a `Failure` outcome.
    pub async fn process_document(&self, document: QueueDocument) -> ProcessingOutcome {
        ACTIVE_GENERATIONS.inc();
        let timer = GENERATION_DURATION_SECONDS.start_timer();

        let span = info_span!("process_document", doc_id = %document.id);
        let result = self.generate_fields(&document).instrument(span).await;

        timer.observe_duration();
        ACTIVE_GENERATIONS.dec();

        match result {
            Ok((original_index, result)) => ProcessingOutcome::Success {
                document,
                original_index,
                result,
            },
            Err(e) => {
                if !e.is_document_scoped() {
                    warn!(doc_id = %document.id, error = %e, "Unexpected error kind while processing, recording it on the document");
                }
                ProcessingOutcome::Failure {
                    document,
                    error: e.to_string(),
                }
            }
        }
    }

    async fn generate_fields(
        &self,
        document: &QueueDocument,
    ) -> Result<(String, Map<String, Value>)> {
        debug!(state = %DocumentState::Processing, "Processing document");
        let meta = document.watcher_meta()?;
        if let Some(previous) = &meta.error {
            debug!(previous_error = %previous, "Retrying previously errored document");
        }

        if meta.original_index == self.queue_index {
            return Err(WatcherError::InvalidDocument(format!(
                "original index '{}' is the queue index",
                meta.original_index
            )));
        }

        let context = document_context(document.source_fields());
        let prompt = render(&meta.prompt, &context)?;
        let format = meta
            .format
            .as_ref()
            .map(OutputSchema::from_format)
            .transpose()?;

        let provider = self.providers.get(meta.provider).ok_or_else(|| {
            WatcherError::provider(
                meta.provider.as_str(),
                &meta.model,
                None,
                "provider is not configured",
            )
        })?;
        debug!(provider = provider.name(), model = %meta.model, "Generating");

        let request = GenerationRequest {
            model: meta.model.clone(),
            prompt,
            format,
            options: meta.options.clone(),
        };
        let generated = provider.generate(&request).await?;
        Ok((meta.original_index.clone(), generated.into_fields(meta.output_field())))
    }
}
