// Shared test doubles for the integration tests.
#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use llm_watcher::config::WatcherConfig;
use llm_watcher::data_model::{GenerationResult, QueueDocument};
use llm_watcher::error::{Result, WatcherError};
use llm_watcher::llm::{GenerationProvider, GenerationRequest};
use llm_watcher::store::{DocumentStore, SearchQuery};

pub const QUEUE: &str = "llm-queue";
pub const ORIGINAL: &str = "reviews";

pub fn object(value: Value) -> Map<String, Value> {
    value
        .as_object()
        .expect("test value must be a JSON object")
        .clone()
}

/// Queue document source as produced by the ingest pipeline.
pub fn queued(message: &str, provider: &str, prompt: &str) -> Map<String, Value> {
    object(json!({
        "message": message,
        "_llm_watcher": {
            "provider": provider,
            "model": "llama3.3",
            "prompt": prompt,
            "format": {"scale": "integer"},
            "_original_index": ORIGINAL
        }
    }))
}

pub fn test_config() -> WatcherConfig {
    WatcherConfig {
        elasticsearch_url: "http://localhost:9200".to_string(),
        ollama_api: Some("http://localhost:11434".to_string()),
        watch_index: QUEUE.to_string(),
        ..WatcherConfig::default()
    }
}

/// Elasticsearch-like store kept in memory. Updates merge objects
/// recursively, like `_update` with a partial `doc`.
#[derive(Default)]
pub struct InMemoryStore {
    indices: Mutex<HashMap<String, BTreeMap<String, Map<String, Value>>>>,
    unreachable: Mutex<bool>,
    ignore_filters: Mutex<bool>,
    rejecting_writes: Mutex<HashSet<String>>,
    pub searches: Mutex<Vec<SearchQuery>>,
}

impl InMemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn put(&self, index: &str, id: &str, source: Map<String, Value>) {
        self.indices
            .lock()
            .unwrap()
            .entry(index.to_string())
            .or_default()
            .insert(id.to_string(), source);
    }

    pub fn get(&self, index: &str, id: &str) -> Option<Map<String, Value>> {
        self.indices
            .lock()
            .unwrap()
            .get(index)
            .and_then(|docs| docs.get(id).cloned())
    }

    pub fn count(&self, index: &str) -> usize {
        self.indices
            .lock()
            .unwrap()
            .get(index)
            .map(|docs| docs.len())
            .unwrap_or(0)
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        *self.unreachable.lock().unwrap() = unreachable;
    }

    /// Makes search return every document, like a mapping where
    /// `_llm_watcher` is not indexed.
    pub fn set_ignore_filters(&self, ignore: bool) {
        *self.ignore_filters.lock().unwrap() = ignore;
    }

    pub fn reject_writes_to(&self, index: &str) {
        self.rejecting_writes
            .lock()
            .unwrap()
            .insert(index.to_string());
    }

    fn check_reachable(&self) -> Result<()> {
        if *self.unreachable.lock().unwrap() {
            return Err(WatcherError::ConnectivityError(
                "connection refused".to_string(),
            ));
        }
        Ok(())
    }
}

fn deep_merge(target: &mut Map<String, Value>, partial: Map<String, Value>) {
    for (key, value) in partial {
        match (target.get_mut(&key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                deep_merge(existing, incoming)
            }
            (_, value) => {
                target.insert(key, value);
            }
        }
    }
}

fn sort_key(source: &Map<String, Value>, field: &str) -> String {
    match source.get(field) {
        Some(Value::Number(n)) => format!("{:020}", n.as_f64().unwrap_or(0.0) as i64),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn search(&self, index: &str, query: &SearchQuery) -> Result<Vec<QueueDocument>> {
        self.check_reachable()?;
        self.searches.lock().unwrap().push(query.clone());

        let ignore_filters = *self.ignore_filters.lock().unwrap();
        let indices = self.indices.lock().unwrap();
        let Some(docs) = indices.get(index) else {
            return Ok(Vec::new());
        };
        let mut hits: Vec<QueueDocument> = docs
            .iter()
            .map(|(id, source)| QueueDocument::new(id.clone(), source.clone()))
            .filter(|doc| ignore_filters || query.matches(doc))
            .collect();
        if let Some(field) = &query.sort_field {
            hits.sort_by_key(|doc| sort_key(&doc.source, field));
        }
        hits.truncate(query.size);
        Ok(hits)
    }

    async fn update(
        &self,
        index: &str,
        id: &str,
        partial: Map<String, Value>,
        upsert: bool,
    ) -> Result<()> {
        self.check_reachable()?;
        if self.rejecting_writes.lock().unwrap().contains(index) {
            return Err(WatcherError::ConnectivityError(format!(
                "write to {} refused",
                index
            )));
        }

        let mut indices = self.indices.lock().unwrap();
        let docs = indices.entry(index.to_string()).or_default();
        match docs.get_mut(id) {
            Some(existing) => deep_merge(existing, partial),
            None if upsert => {
                docs.insert(id.to_string(), partial);
            }
            None => {
                return Err(WatcherError::StoreError {
                    status: 404,
                    message: format!("document {} missing in {}", id, index),
                })
            }
        }
        Ok(())
    }

    async fn delete(&self, index: &str, id: &str) -> Result<()> {
        self.check_reachable()?;
        if let Some(docs) = self.indices.lock().unwrap().get_mut(index) {
            docs.remove(id);
        }
        Ok(())
    }
}

type Script = dyn Fn(&GenerationRequest) -> Result<GenerationResult> + Send + Sync;

/// Provider answering from a closure, optionally after a delay, and
/// recording how many calls overlapped.
pub struct ScriptedProvider {
    script: Box<Script>,
    delay: Duration,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new<F>(script: F) -> Arc<Self>
    where
        F: Fn(&GenerationRequest) -> Result<GenerationResult> + Send + Sync + 'static,
    {
        Self::with_delay(Duration::ZERO, script)
    }

    pub fn with_delay<F>(delay: Duration, script: F) -> Arc<Self>
    where
        F: Fn(&GenerationRequest) -> Result<GenerationResult> + Send + Sync + 'static,
    {
        Arc::new(ScriptedProvider {
            script: Box::new(script),
            delay,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        })
    }

    /// Always answers `{"scale": 5}`.
    pub fn scale_five() -> Arc<Self> {
        Self::new(|_| Ok(GenerationResult::Structured(object(json!({"scale": 5})))))
    }
}

#[async_trait]
impl GenerationProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let result = (self.script)(request);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}
