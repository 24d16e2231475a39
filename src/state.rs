use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::agent::AgentLoop;
use crate::core::config::{AppConfig, AppPaths, RerankerProvider};
use crate::core::errors::ApiError;
use crate::crawl::HttpFetcher;
use crate::history::{ConversationSession, SqliteSessionStore};
use crate::llm::{Embedder, OpenAiChatModel, OpenAiEmbedder};
use crate::rag::{IndexHandle, IndexManager, RetrievalPipeline, SqliteVectorStore};
use crate::tools::{CohereReranker, EmbeddingReranker, Reranker, ToolBridge};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub agent: Arc<AgentLoop>,
    pub index: IndexHandle,
    pub sessions: ConversationSession,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        config: Arc<AppConfig>,
        agent: Arc<AgentLoop>,
        index: IndexHandle,
        sessions: ConversationSession,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            agent,
            index,
            sessions,
            started_at: Utc::now(),
        })
    }

    /// Wires the production components and opens (or builds) the site index.
    pub async fn initialize(config: AppConfig, paths: &AppPaths) -> Result<Arc<Self>, ApiError> {
        let config = Arc::new(config);
        let site = &config.site;

        let vectors = Arc::new(SqliteVectorStore::new(paths).await?);
        let embedder: Arc<dyn Embedder> =
            Arc::new(OpenAiEmbedder::new(&config.embedding, config.index.dimension));
        let fetcher = Arc::new(HttpFetcher::new(&config.crawl)?);

        let manager = IndexManager::new(
            vectors,
            Arc::clone(&embedder),
            fetcher,
            config.crawl.clone(),
            config.index.clone(),
        );
        let index = manager.get_or_build_index(site).await?;

        let reranker: Arc<dyn Reranker> = match config.reranker.provider {
            RerankerProvider::Cohere => Arc::new(CohereReranker::new(&config.reranker)),
            RerankerProvider::Embedding => Arc::new(EmbeddingReranker::new(Arc::clone(&embedder))),
        };
        let pipeline = RetrievalPipeline::new(index.clone(), reranker, &config.retrieval);
        let tools = Arc::new(ToolBridge::for_site(
            &site.label(),
            &site.display_name(),
            pipeline,
        ));

        let tool_names = tools.names();

        let model = Arc::new(OpenAiChatModel::new(&config.llm, config.agent.tool_calling)?);
        let sessions = ConversationSession::new(Arc::new(SqliteSessionStore::new(paths).await?));
        let agent = Arc::new(AgentLoop::new(
            model,
            tools,
            sessions.clone(),
            config.agent.clone(),
            &site.display_name(),
        ));

        tracing::info!(
            namespace = %index.namespace(),
            tools = ?tool_names,
            "Application state initialized"
        );
        Ok(Self::new(config, agent, index, sessions))
    }
}
