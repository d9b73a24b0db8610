// src/store/elasticsearch.rs

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use super::{DocumentStore, SearchQuery};
use crate::data_model::QueueDocument;
use crate::error::{Result, WatcherError};

/// [`DocumentStore`] over the Elasticsearch REST API.
pub struct ElasticsearchStore {
    http: reqwest::Client,
    base_url: Url,
    credentials: Option<(String, String)>,
    refresh_index: Option<String>,
}

#[derive(Deserialize)]
struct SearchResponse {
    hits: SearchHits,
}

#[derive(Deserialize)]
struct SearchHits {
    #[serde(default)]
    hits: Vec<SearchHit>,
}

#[derive(Deserialize)]
struct SearchHit {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_source", default)]
    source: Map<String, Value>,
}

impl ElasticsearchStore {
    pub fn new(
        base_url: &str,
        username: Option<String>,
        password: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let base_url = Url::parse(base_url).map_err(|e| {
            WatcherError::ConfigError(format!("Invalid Elasticsearch URL '{}': {}", base_url, e))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(WatcherError::ConfigError(format!(
                "Elasticsearch URL '{}' cannot be used as a base URL",
                base_url
            )));
        }
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| WatcherError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        info!(url = %base_url, "Using Elasticsearch store");
        Ok(ElasticsearchStore {
            http,
            base_url,
            credentials: username.zip(password),
            refresh_index: None,
        })
    }

    /// Writes to `index` wait for the next refresh before returning, so a
    /// search issued right after a delete or error annotation no longer
    /// returns the old queue copy.
    pub fn refresh_writes_to(mut self, index: impl Into<String>) -> Self {
        self.refresh_index = Some(index.into());
        self
    }

    fn write_endpoint(&self, index: &str, segments: &[&str]) -> Result<Url> {
        let mut url = self.endpoint(segments)?;
        if self.refresh_index.as_deref() == Some(index) {
            url.query_pairs_mut().append_pair("refresh", "wait_for");
        }
        Ok(url)
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| WatcherError::ConfigError("Elasticsearch URL cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.credentials {
            Some((user, pass)) => request.basic_auth(user, Some(pass)),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder, action: &str) -> Result<Response> {
        self.authorize(request).send().await.map_err(|e| {
            WatcherError::ConnectivityError(format!("{} failed: {}", action, e))
        })
    }
}

async fn rejected(response: Response, action: &str) -> WatcherError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    WatcherError::StoreError {
        status,
        message: format!("{}: {}", action, body),
    }
}

#[async_trait]
impl DocumentStore for ElasticsearchStore {
    async fn search(&self, index: &str, query: &SearchQuery) -> Result<Vec<QueueDocument>> {
        let url = self.endpoint(&[index, "_search"])?;
        let body = query.to_body();
        debug!(index, "Elasticsearch search: {}", body);

        let response = self
            .send(self.http.post(url).json(&body), "Search")
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!(index, "Queue index does not exist yet");
            return Ok(Vec::new());
        }
        if !response.status().is_success() {
            return Err(rejected(response, "Failed to get documents from Elasticsearch").await);
        }

        let text = response.text().await.map_err(|e| {
            WatcherError::ConnectivityError(format!("Reading search response failed: {}", e))
        })?;
        let parsed: SearchResponse = serde_json::from_str(&text)?;
        Ok(parsed
            .hits
            .hits
            .into_iter()
            .map(|hit| QueueDocument::new(hit.id, hit.source))
            .collect())
    }

    async fn update(
        &self,
        index: &str,
        id: &str,
        partial: Map<String, Value>,
        upsert: bool,
    ) -> Result<()> {
        let url = self.write_endpoint(index, &[index, "_update", id])?;
        let body = json!({ "doc": partial, "doc_as_upsert": upsert });
        debug!(index, doc_id = id, "Elasticsearch update: {}", body);

        let response = self
            .send(self.http.post(url).json(&body), "Update")
            .await?;
        if !response.status().is_success() {
            return Err(rejected(response, "Failed to write document to Elasticsearch").await);
        }
        Ok(())
    }

    async fn delete(&self, index: &str, id: &str) -> Result<()> {
        let url = self.write_endpoint(index, &[index, "_doc", id])?;
        debug!(index, doc_id = id, "Elasticsearch delete");

        let response = self.send(self.http.delete(url), "Delete").await?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!(index, doc_id = id, "Document already deleted");
            return Ok(());
        }
        if !response.status().is_success() {
            return Err(rejected(response, "Failed to delete document from Elasticsearch").await);
        }
        Ok(())
    }
}
