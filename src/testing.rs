//! Hand-written doubles for the capability traits, shared by the unit tests.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::core::config::RetrievalConfig;
use crate::core::errors::ApiError;
use crate::crawl::{anchor_hrefs, PageFetcher, RawPage};
use crate::llm::{CompletionRequest, Embedder, LanguageModel, ModelResponse};
use crate::rag::normalizer::extract_title;
use crate::rag::{
    DistanceMetric, IndexHandle, NamespaceInfo, RetrievalPipeline, ScoredRecord, VectorRecord,
    VectorStore,
};
use crate::tools::{RerankHit, Reranker, ToolBridge};

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Default)]
pub struct MockFetcher {
    pages: HashMap<String, RawPage>,
    failures: HashSet<String>,
    fetched: Mutex<Vec<String>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(self, url: &str, html: &str) -> Self {
        let title = extract_title(html).unwrap_or_default();
        self.with_titled_page(url, &title, html)
    }

    pub fn with_titled_page(mut self, url: &str, title: &str, html: &str) -> Self {
        self.pages.insert(
            url.to_string(),
            RawPage {
                url: url.to_string(),
                html: html.to_string(),
                rendered_text: String::new(),
                title: title.to_string(),
            },
        );
        self
    }

    /// Serves the page registered at `to` when `from` is requested.
    pub fn with_redirect(mut self, from: &str, to: &str) -> Self {
        if let Some(page) = self.pages.get(to).cloned() {
            self.pages.insert(from.to_string(), page);
        }
        self
    }

    pub fn with_failure(mut self, url: &str) -> Self {
        self.failures.insert(url.to_string());
        self
    }

    pub fn fetched_urls(&self) -> Vec<String> {
        lock(&self.fetched).clone()
    }

    pub fn fetch_count(&self) -> usize {
        lock(&self.fetched).len()
    }
}

#[async_trait]
impl PageFetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> Result<RawPage, ApiError> {
        lock(&self.fetched).push(url.to_string());
        if self.failures.contains(url) {
            return Err(ApiError::Fetch(format!("{}: connection reset", url)));
        }
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| ApiError::Fetch(format!("{}: HTTP 404 Not Found", url)))
    }

    fn enumerate_links(&self, html: &str, _base_url: &str) -> Vec<String> {
        anchor_hrefs(html)
    }
}

/// Bag-of-words embedder: each lowercase word adds to one hashed bucket, and
/// the vector is L2-normalized, so equal texts embed identically.
pub struct MockEmbedder {
    dimension: usize,
    fail: bool,
    calls: AtomicUsize,
}

impl MockEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn embed_texts(&self, inputs: &[String]) -> Vec<Vec<f32>> {
        inputs.iter().map(|text| self.embed_one(text)).collect()
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let bucket = fnv1a(&word.to_lowercase()) as usize % self.dimension;
            vector[bucket] += 1.0;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        } else {
            vector[0] = 1.0;
        }
        vector
    }
}

fn fnv1a(text: &str) -> u64 {
    text.bytes().fold(0xcbf29ce484222325u64, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(0x100000001b3)
    })
}

#[async_trait]
impl Embedder for MockEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ApiError::Internal("embedding service unavailable".to_string()));
        }
        Ok(self.embed_texts(inputs))
    }
}

#[derive(Default)]
pub struct MemoryVectorStore {
    namespaces: Mutex<HashMap<String, (NamespaceInfo, BTreeMap<String, VectorRecord>)>>,
    fail_upserts: bool,
    upserts: AtomicUsize,
    creates: AtomicUsize,
    searches: AtomicUsize,
}

impl MemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_upserts(mut self) -> Self {
        self.fail_upserts = true;
        self
    }

    pub fn records(&self, namespace: &str) -> Vec<VectorRecord> {
        lock(&self.namespaces)
            .get(namespace)
            .map(|(_, records)| records.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn namespace_names(&self) -> Vec<String> {
        let mut names: Vec<String> = lock(&self.namespaces).keys().cloned().collect();
        names.sort();
        names
    }

    pub fn upsert_calls(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }

    pub fn created_namespaces(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn search_calls(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn namespace_info(&self, name: &str) -> Result<Option<NamespaceInfo>, ApiError> {
        Ok(lock(&self.namespaces).get(name).map(|(info, _)| info.clone()))
    }

    async fn list_namespaces(&self) -> Result<Vec<NamespaceInfo>, ApiError> {
        let mut infos: Vec<NamespaceInfo> = lock(&self.namespaces)
            .values()
            .map(|(info, _)| info.clone())
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(infos)
    }

    async fn create_namespace(
        &self,
        name: &str,
        dimension: usize,
        metric: DistanceMetric,
    ) -> Result<(), ApiError> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        let mut namespaces = lock(&self.namespaces);
        if namespaces.contains_key(name) {
            return Err(ApiError::BadRequest(format!("Namespace already exists: {}", name)));
        }
        let info = NamespaceInfo {
            name: name.to_string(),
            dimension,
            metric,
            created_at: "2024-01-01T00:00:00Z".to_string(),
        };
        namespaces.insert(name.to_string(), (info, BTreeMap::new()));
        Ok(())
    }

    async fn upsert(&self, namespace: &str, records: Vec<VectorRecord>) -> Result<usize, ApiError> {
        self.upserts.fetch_add(1, Ordering::SeqCst);
        if self.fail_upserts {
            return Err(ApiError::Internal("disk I/O error".to_string()));
        }
        let mut namespaces = lock(&self.namespaces);
        let (info, stored) = namespaces
            .get_mut(namespace)
            .ok_or_else(|| ApiError::NotFound(format!("Namespace not found: {}", namespace)))?;
        if records.iter().any(|r| r.embedding.len() != info.dimension) {
            return Err(ApiError::BadRequest("dimension mismatch".to_string()));
        }
        let written = records.len();
        for record in records {
            stored.insert(record.id.clone(), record);
        }
        Ok(written)
    }

    async fn search(
        &self,
        namespace: &str,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredRecord>, ApiError> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        let namespaces = lock(&self.namespaces);
        let (info, stored) = namespaces
            .get(namespace)
            .ok_or_else(|| ApiError::NotFound(format!("Namespace not found: {}", namespace)))?;

        let mut scored = Vec::with_capacity(stored.len());
        for record in stored.values() {
            scored.push(ScoredRecord {
                id: record.id.clone(),
                text: record.text.clone(),
                metadata: record.metadata.clone(),
                score: info.metric.score(query, &record.embedding)?,
            });
        }
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        scored.truncate(k);
        Ok(scored)
    }

    async fn count(&self, namespace: &str) -> Result<usize, ApiError> {
        Ok(lock(&self.namespaces)
            .get(namespace)
            .map(|(_, records)| records.len())
            .unwrap_or(0))
    }

    async fn drop_namespace(&self, name: &str) -> Result<bool, ApiError> {
        Ok(lock(&self.namespaces).remove(name).is_some())
    }

    async fn promote_namespace(&self, staging: &str, target: &str) -> Result<(), ApiError> {
        let mut namespaces = lock(&self.namespaces);
        let (mut info, records) = namespaces
            .remove(staging)
            .ok_or_else(|| ApiError::NotFound(format!("Namespace not found: {}", staging)))?;
        info.name = target.to_string();
        namespaces.insert(target.to_string(), (info, records));
        Ok(())
    }
}

enum RerankBehavior {
    Reverse,
    Hallucinate,
    Fail,
}

pub struct MockReranker {
    behavior: RerankBehavior,
    delay: Option<Duration>,
    calls: AtomicUsize,
    last_candidates: AtomicUsize,
}

impl MockReranker {
    fn with_behavior(behavior: RerankBehavior) -> Self {
        Self {
            behavior,
            delay: None,
            calls: AtomicUsize::new(0),
            last_candidates: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Ranks candidates in reverse input order.
    pub fn reversing() -> Self {
        Self::with_behavior(RerankBehavior::Reverse)
    }

    /// Returns out-of-range and repeated indices alongside valid ones.
    pub fn hallucinating() -> Self {
        Self::with_behavior(RerankBehavior::Hallucinate)
    }

    pub fn failing() -> Self {
        Self::with_behavior(RerankBehavior::Fail)
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_candidate_count(&self) -> usize {
        self.last_candidates.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Reranker for MockReranker {
    async fn rerank(
        &self,
        _query: &str,
        candidates: &[String],
        _top_n: usize,
    ) -> Result<Vec<RerankHit>, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.last_candidates.store(candidates.len(), Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let hits: Vec<RerankHit> = match self.behavior {
            RerankBehavior::Fail => {
                return Err(ApiError::Retrieval("rerank quota exceeded".to_string()))
            }
            RerankBehavior::Reverse => (0..candidates.len())
                .rev()
                .map(|index| RerankHit {
                    index,
                    score: 1.0 / (index as f32 + 1.0),
                })
                .collect(),
            RerankBehavior::Hallucinate => vec![
                RerankHit { index: candidates.len() + 3, score: 0.99 },
                RerankHit { index: 0, score: 0.9 },
                RerankHit { index: 0, score: 0.8 },
                RerankHit { index: 1, score: 0.7 },
                RerankHit { index: 2, score: 0.6 },
                RerankHit { index: 3, score: 0.5 },
            ],
        };
        Ok(hits)
    }
}

enum Script {
    Queue(Mutex<VecDeque<ModelResponse>>),
    Always(ModelResponse),
}

pub struct MockLanguageModel {
    script: Script,
    delay: Option<Duration>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl MockLanguageModel {
    pub fn scripted(responses: Vec<ModelResponse>) -> Self {
        Self {
            script: Script::Queue(Mutex::new(responses.into())),
            delay: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn always(response: ModelResponse) -> Self {
        Self {
            script: Script::Always(response),
            delay: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl LanguageModel for MockLanguageModel {
    fn name(&self) -> &str {
        "mock"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<ModelResponse, ApiError> {
        lock(&self.requests).push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.script {
            Script::Always(response) => Ok(response.clone()),
            Script::Queue(queue) => lock(queue)
                .pop_front()
                .ok_or_else(|| ApiError::Internal("mock model script exhausted".to_string())),
        }
    }
}

const TEST_DIM: usize = 16;

/// `search_acme` over an in-memory index holding `texts`.
pub async fn site_tool_bridge(texts: &[&str]) -> ToolBridge {
    site_tool_bridge_with_index(texts).await.0
}

pub async fn site_tool_bridge_with_index(texts: &[&str]) -> (ToolBridge, IndexHandle) {
    site_tool_bridge_reranked_by(texts, MockReranker::reversing()).await
}

/// `search_acme` whose reranker sleeps for `delay` before answering.
pub async fn slow_site_tool_bridge(texts: &[&str], delay: Duration) -> ToolBridge {
    site_tool_bridge_reranked_by(texts, MockReranker::reversing().with_delay(delay))
        .await
        .0
}

async fn site_tool_bridge_reranked_by(
    texts: &[&str],
    reranker: MockReranker,
) -> (ToolBridge, IndexHandle) {
    let embedder = Arc::new(MockEmbedder::new(TEST_DIM));
    let store = Arc::new(MemoryVectorStore::new());
    seed_namespace(&store, &embedder, "acme", texts).await;

    let index = IndexHandle::new("acme", store, embedder);
    let pipeline = RetrievalPipeline::new(index.clone(), Arc::new(reranker), &RetrievalConfig::default());
    (ToolBridge::for_site("acme", "Acme", pipeline), index)
}

/// `search_acme` whose embedder always fails.
pub async fn failing_site_tool_bridge() -> ToolBridge {
    let store = Arc::new(MemoryVectorStore::new());
    seed_namespace(&store, &MockEmbedder::new(TEST_DIM), "acme", &["anything"]).await;

    let index = IndexHandle::new("acme", store, Arc::new(MockEmbedder::new(TEST_DIM).failing()));
    let pipeline = RetrievalPipeline::new(
        index,
        Arc::new(MockReranker::reversing()),
        &RetrievalConfig::default(),
    );
    ToolBridge::for_site("acme", "Acme", pipeline)
}

async fn seed_namespace(
    store: &MemoryVectorStore,
    embedder: &MockEmbedder,
    namespace: &str,
    texts: &[&str],
) {
    store
        .create_namespace(namespace, embedder.dimension(), DistanceMetric::DotProduct)
        .await
        .expect("create namespace");
    let inputs: Vec<String> = texts.iter().map(|t| t.to_string()).collect();
    let records = inputs
        .iter()
        .cloned()
        .zip(embedder.embed_texts(&inputs))
        .enumerate()
        .map(|(i, (text, embedding))| VectorRecord {
            id: format!("seed-{}", i),
            text,
            embedding,
            metadata: BTreeMap::new(),
        })
        .collect();
    store.upsert(namespace, records).await.expect("seed records");
}
