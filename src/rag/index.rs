//! Site index lifecycle: open the namespace if it exists, otherwise crawl, normalize,
//! embed and publish it exactly once.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use futures_util::stream::{self, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;
use uuid::Uuid;

use super::normalizer::{ContentNormalizer, DocumentChunk};
use super::store::{NamespaceInfo, VectorRecord, VectorStore};
use crate::core::config::{CrawlConfig, IndexConfig, SiteConfig};
use crate::core::errors::ApiError;
use crate::crawl::{CrawlReport, Crawler, PageFetcher};
use crate::llm::Embedder;

/// A passage returned for a query, with its score under the stage that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedPassage {
    pub text: String,
    pub relevance_score: f32,
    pub metadata: BTreeMap<String, String>,
}

/// Read access to one published namespace.
#[derive(Clone)]
pub struct IndexHandle {
    namespace: String,
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
}

impl std::fmt::Debug for IndexHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexHandle")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl IndexHandle {
    pub fn new(namespace: impl Into<String>, store: Arc<dyn VectorStore>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            namespace: namespace.into(),
            store,
            embedder,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Similarity search only; no reranking.
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<RetrievedPassage>, ApiError> {
        let vector = self
            .embedder
            .embed_query(query)
            .await
            .map_err(ApiError::into_retrieval)?;
        let hits = self
            .store
            .search(&self.namespace, &vector, k)
            .await
            .map_err(ApiError::into_retrieval)?;

        Ok(hits
            .into_iter()
            .map(|hit| RetrievedPassage {
                text: hit.text,
                relevance_score: hit.score,
                metadata: hit.metadata,
            })
            .collect())
    }

    pub async fn count(&self) -> Result<usize, ApiError> {
        self.store.count(&self.namespace).await
    }

    pub async fn info(&self) -> Result<Option<NamespaceInfo>, ApiError> {
        self.store.namespace_info(&self.namespace).await
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildStats {
    pub pages: usize,
    pub chunks: usize,
}

pub struct IndexManager {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    fetcher: Arc<dyn PageFetcher>,
    normalizer: ContentNormalizer,
    crawl: CrawlConfig,
    index: IndexConfig,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl IndexManager {
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        fetcher: Arc<dyn PageFetcher>,
        crawl: CrawlConfig,
        index: IndexConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            fetcher,
            normalizer: ContentNormalizer::new(),
            crawl,
            index,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_normalizer(mut self, normalizer: ContentNormalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    fn namespace_lock(&self, namespace: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        locks
            .entry(namespace.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    fn handle(&self, namespace: &str) -> IndexHandle {
        IndexHandle::new(namespace, Arc::clone(&self.store), Arc::clone(&self.embedder))
    }

    /// Opens the site's namespace, building it first when it does not exist.
    ///
    /// At most one build runs per namespace; concurrent callers wait on the same
    /// lock and then find the published namespace. A failed build publishes nothing.
    pub async fn get_or_build_index(&self, site: &SiteConfig) -> Result<IndexHandle, ApiError> {
        let seed = site.parsed_url()?;
        let namespace = site.namespace();

        let lock = self.namespace_lock(&namespace);
        let _guard = lock.lock().await;

        if self.store.namespace_exists(&namespace).await? {
            tracing::info!(namespace = %namespace, "Opening existing index");
            return Ok(self.handle(&namespace));
        }

        tracing::info!(namespace = %namespace, url = %seed, "Index missing, building");
        let stats = self.build(&seed, &namespace).await?;
        tracing::info!(
            namespace = %namespace,
            pages = stats.pages,
            chunks = stats.chunks,
            "Index published"
        );
        Ok(self.handle(&namespace))
    }

    async fn build(&self, seed: &Url, namespace: &str) -> Result<BuildStats, ApiError> {
        if self.embedder.dimension() != self.index.dimension {
            return Err(ApiError::Build(format!(
                "Embedder dimension {} does not match index dimension {}",
                self.embedder.dimension(),
                self.index.dimension
            )));
        }

        let staging = format!("{}__staging-{}", namespace, Uuid::new_v4().simple());
        self.store
            .create_namespace(&staging, self.index.dimension, self.index.metric)
            .await
            .map_err(ApiError::into_build)?;

        let result = match self.populate(seed, namespace, &staging).await {
            Ok(stats) => self
                .store
                .promote_namespace(&staging, namespace)
                .await
                .map(|_| stats),
            Err(err) => Err(err),
        };

        if let Err(err) = &result {
            tracing::warn!(namespace = %namespace, error = %err, "Index build failed, discarding staging namespace");
            if let Err(drop_err) = self.store.drop_namespace(&staging).await {
                tracing::warn!(staging = %staging, error = %drop_err, "Failed to drop staging namespace");
            }
        }
        result.map_err(ApiError::into_build)
    }

    async fn populate(
        &self,
        seed: &Url,
        namespace: &str,
        staging: &str,
    ) -> Result<BuildStats, ApiError> {
        let crawler = Crawler::new(Arc::clone(&self.fetcher), self.crawl.clone());
        let report: CrawlReport = crawler.crawl(seed).await?;

        let chunks: Vec<DocumentChunk> = report
            .pages
            .iter()
            .flat_map(|page| self.normalizer.normalize(page))
            .collect();
        if chunks.is_empty() {
            return Err(ApiError::Build(format!(
                "Crawl of {} produced no content",
                seed
            )));
        }
        tracing::info!(pages = report.pages.len(), chunks = chunks.len(), "Normalized crawl output");

        let records: Vec<(String, DocumentChunk)> = chunks
            .into_iter()
            .enumerate()
            .map(|(position, chunk)| (chunk_id(namespace, position, &chunk), chunk))
            .collect();

        let batch_size = self.index.embed_batch_size.max(1);
        let batches: Vec<Vec<(String, DocumentChunk)>> = records
            .chunks(batch_size)
            .map(<[_]>::to_vec)
            .collect();

        let written = stream::iter(batches)
            .map(|batch| self.embed_and_upsert(staging, batch))
            .buffer_unordered(self.index.insert_concurrency.max(1))
            .try_fold(0usize, |total, written| async move { Ok(total + written) })
            .await?;

        Ok(BuildStats {
            pages: report.pages.len(),
            chunks: written,
        })
    }

    async fn embed_and_upsert(
        &self,
        staging: &str,
        batch: Vec<(String, DocumentChunk)>,
    ) -> Result<usize, ApiError> {
        let texts: Vec<String> = batch.iter().map(|(_, chunk)| chunk.text.clone()).collect();
        let embeddings = self.embedder.embed(&texts).await?;
        if embeddings.len() != batch.len() {
            return Err(ApiError::Build(format!(
                "Embedder returned {} vectors for {} chunks",
                embeddings.len(),
                batch.len()
            )));
        }

        let records = batch
            .into_iter()
            .zip(embeddings)
            .map(|((id, chunk), embedding)| VectorRecord {
                id,
                text: chunk.text,
                embedding,
                metadata: chunk.metadata,
            })
            .collect();
        self.store.upsert(staging, records).await
    }
}

/// Stable id for a chunk so that re-inserting the same content overwrites it.
fn chunk_id(namespace: &str, position: usize, chunk: &DocumentChunk) -> String {
    let mut hasher = Sha256::new();
    hasher.update(namespace.as_bytes());
    hasher.update([0u8]);
    hasher.update(chunk.source().unwrap_or_default().as_bytes());
    hasher.update([0u8]);
    hasher.update(position.to_le_bytes());
    hasher.update([0u8]);
    hasher.update(chunk.text.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::normalizer::SOURCE_KEY;
    use crate::testing::{MemoryVectorStore, MockEmbedder, MockFetcher};

    const DIM: usize = 16;

    fn site() -> SiteConfig {
        SiteConfig {
            url: "https://example.com".to_string(),
            namespace: Some("example".to_string()),
            name: None,
        }
    }

    fn index_config() -> IndexConfig {
        IndexConfig {
            dimension: DIM,
            embed_batch_size: 2,
            ..IndexConfig::default()
        }
    }

    fn example_site() -> MockFetcher {
        MockFetcher::new()
            .with_titled_page(
                "https://example.com/",
                "Example",
                r#"<h1>Example</h1><p>We make widgets.</p>
                <a href="/about">About</a><a href="/pricing">Pricing</a>
                <a href="https://partner.org/">Partner</a><a href="/#faq">FAQ</a>"#,
            )
            .with_titled_page(
                "https://example.com/about",
                "About",
                "<h2>History</h2><p>Founded in 2020.</p><h2>Team</h2><p>Five people.</p>",
            )
            .with_titled_page(
                "https://example.com/pricing",
                "Pricing",
                "<h2>Plans</h2><p>Basic and Pro.</p>",
            )
            .with_page("https://partner.org/", "<p>not ours</p>")
    }

    fn manager(
        fetcher: Arc<MockFetcher>,
        store: Arc<MemoryVectorStore>,
        embedder: Arc<MockEmbedder>,
    ) -> IndexManager {
        IndexManager::new(store, embedder, fetcher, CrawlConfig::default(), index_config())
    }

    #[tokio::test]
    async fn end_to_end_crawls_three_pages_and_indexes_their_chunks() {
        let fetcher = Arc::new(example_site());
        let store = Arc::new(MemoryVectorStore::new());
        let embedder = Arc::new(MockEmbedder::new(DIM));
        let manager = manager(fetcher.clone(), store.clone(), embedder);

        let handle = manager.get_or_build_index(&site()).await.unwrap();

        let mut fetched = fetcher.fetched_urls();
        fetched.sort();
        assert_eq!(
            fetched,
            vec![
                "https://example.com/",
                "https://example.com/about",
                "https://example.com/pricing",
            ]
        );

        let records = store.records("example");
        let mut sources: Vec<_> = records
            .iter()
            .filter_map(|r| r.metadata.get(SOURCE_KEY).cloned())
            .collect();
        sources.sort();
        sources.dedup();
        assert_eq!(
            sources,
            vec![
                "https://example.com/",
                "https://example.com/about",
                "https://example.com/pricing",
            ]
        );
        assert_eq!(handle.count().await.unwrap(), records.len());
        assert!(records.iter().any(|r| r.text.starts_with("Title: Team")));
        assert_eq!(store.namespace_names(), vec!["example"]);
    }

    #[tokio::test]
    async fn second_call_opens_without_crawling_or_upserting() {
        let fetcher = Arc::new(example_site());
        let store = Arc::new(MemoryVectorStore::new());
        let embedder = Arc::new(MockEmbedder::new(DIM));
        let manager = manager(fetcher.clone(), store.clone(), embedder);

        manager.get_or_build_index(&site()).await.unwrap();
        let fetches = fetcher.fetch_count();
        let upserts = store.upsert_calls();
        assert!(upserts > 0);

        let handle = manager.get_or_build_index(&site()).await.unwrap();

        assert_eq!(fetcher.fetch_count(), fetches);
        assert_eq!(store.upsert_calls(), upserts);
        assert_eq!(handle.namespace(), "example");
    }

    #[tokio::test]
    async fn concurrent_callers_build_once() {
        let fetcher = Arc::new(example_site());
        let store = Arc::new(MemoryVectorStore::new());
        let embedder = Arc::new(MockEmbedder::new(DIM));
        let manager = Arc::new(manager(fetcher.clone(), store.clone(), embedder));

        let site = site();
        let (a, b) = tokio::join!(
            manager.get_or_build_index(&site),
            manager.get_or_build_index(&site)
        );
        a.unwrap();
        b.unwrap();

        assert_eq!(fetcher.fetch_count(), 3);
        assert_eq!(store.created_namespaces(), 1);
    }

    #[tokio::test]
    async fn failed_build_leaves_namespace_absent() {
        let fetcher = Arc::new(example_site());
        let store = Arc::new(MemoryVectorStore::new().failing_upserts());
        let embedder = Arc::new(MockEmbedder::new(DIM));
        let manager = manager(fetcher, store.clone(), embedder);

        let err = manager.get_or_build_index(&site()).await.unwrap_err();

        assert_eq!(err.kind(), "build_failure");
        assert!(!store.namespace_exists("example").await.unwrap());
        assert!(store.namespace_names().is_empty());
    }

    #[tokio::test]
    async fn embedder_failure_is_a_build_failure() {
        let fetcher = Arc::new(example_site());
        let store = Arc::new(MemoryVectorStore::new());
        let embedder = Arc::new(MockEmbedder::new(DIM).failing());
        let manager = manager(fetcher, store.clone(), embedder);

        let err = manager.get_or_build_index(&site()).await.unwrap_err();
        assert_eq!(err.kind(), "build_failure");
        assert!(store.namespace_names().is_empty());
    }

    #[tokio::test]
    async fn handle_search_returns_k_passages() {
        let fetcher = Arc::new(example_site());
        let store = Arc::new(MemoryVectorStore::new());
        let embedder = Arc::new(MockEmbedder::new(DIM));
        let manager = manager(fetcher, store, embedder);
        let handle = manager.get_or_build_index(&site()).await.unwrap();

        let passages = handle.search("Founded in 2020", 2).await.unwrap();
        assert_eq!(passages.len(), 2);
        assert!(passages[0].relevance_score >= passages[1].relevance_score);
    }

    #[test]
    fn chunk_ids_are_stable_and_distinct() {
        let mut metadata = BTreeMap::new();
        metadata.insert(SOURCE_KEY.to_string(), "https://example.com/".to_string());
        let chunk = DocumentChunk {
            text: "hello".to_string(),
            metadata,
        };
        assert_eq!(chunk_id("ns", 0, &chunk), chunk_id("ns", 0, &chunk));
        assert_ne!(chunk_id("ns", 0, &chunk), chunk_id("ns", 1, &chunk));
        assert_eq!(chunk_id("ns", 0, &chunk).len(), 64);
    }
}
