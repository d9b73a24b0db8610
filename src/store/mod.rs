// src/store/mod.rs

mod elasticsearch;

pub use elasticsearch::ElasticsearchStore;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::data_model::{DocumentState, QueueDocument, WATCHER_FIELD};
use crate::error::Result;

/// Candidate selection for one fetch from the queue index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub size: usize,
    /// Skip documents whose `_llm_watcher.error` is set.
    pub exclude_errored: bool,
    /// Ascending sort key; store order when absent.
    pub sort_field: Option<String>,
}

impl SearchQuery {
    /// Elasticsearch `_search` request body.
    pub fn to_body(&self) -> Value {
        let query = if self.exclude_errored {
            json!({
                "bool": {
                    "must_not": [
                        { "exists": { "field": format!("{}.error", WATCHER_FIELD) } }
                    ]
                }
            })
        } else {
            json!({ "match_all": {} })
        };

        let mut body = json!({
            "query": query,
            "size": self.size,
        });
        if let Some(field) = &self.sort_field {
            body["sort"] = json!([{ field.as_str(): { "order": "asc" } }]);
        }
        body
    }

    /// Whether `document` passes the query's filter.
    pub fn matches(&self, document: &QueueDocument) -> bool {
        !(self.exclude_errored
            && matches!(document.persisted_state(), DocumentState::Errored(_)))
    }
}

/// The search/indexing backend holding the queue and original indices.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Returns an empty list when the index does not exist.
    async fn search(&self, index: &str, query: &SearchQuery) -> Result<Vec<QueueDocument>>;

    /// Field-level merge of `partial` into `index/id`; nested objects merge
    /// recursively. With `upsert` a missing document is created from `partial`.
    async fn update(
        &self,
        index: &str,
        id: &str,
        partial: Map<String, Value>,
        upsert: bool,
    ) -> Result<()>;

    /// Removing a document that is already gone succeeds.
    async fn delete(&self, index: &str, id: &str) -> Result<()>;
}
