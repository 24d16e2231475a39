//! Typed application configuration.
//!
//! Every component receives the section it needs through its constructor; nothing
//! below the binary entry point reads the process environment.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use super::defaults::*;
use crate::core::errors::ApiError;
use crate::llm::ToolCallingMode;
use crate::rag::DistanceMetric;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub site: SiteConfig,
    pub crawl: CrawlConfig,
    pub index: IndexConfig,
    pub retrieval: RetrievalConfig,
    pub agent: AgentConfig,
    pub llm: LlmConfig,
    pub embedding: EmbeddingConfig,
    pub reranker: RerankerConfig,
    pub server: ServerConfig,
}

impl AppConfig {
    /// Deserializes an already validated config tree.
    pub fn from_value(value: &Value) -> Result<Self, ApiError> {
        serde_json::from_value(value.clone())
            .map_err(|e| ApiError::BadRequest(format!("Invalid config: {}", e)))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Landing page the crawl starts from.
    pub url: String,
    /// Vector store namespace; derived from the host when unset.
    pub namespace: Option<String>,
    /// Human readable name used in prompts and the tool name.
    pub name: Option<String>,
}

impl SiteConfig {
    pub fn parsed_url(&self) -> Result<Url, ApiError> {
        let url = Url::parse(self.url.trim())
            .map_err(|e| ApiError::BadRequest(format!("Invalid site url '{}': {}", self.url, e)))?;
        if url.host_str().is_none() {
            return Err(ApiError::BadRequest(format!(
                "Site url '{}' has no host",
                self.url
            )));
        }
        Ok(url)
    }

    /// Short identifier for the site: `https://www.acme.io/` becomes `acme`.
    pub fn label(&self) -> String {
        if let Some(name) = self.name.as_deref().filter(|n| !n.trim().is_empty()) {
            return sanitize_label(name);
        }
        self.parsed_url()
            .ok()
            .and_then(|url| url.host_str().map(site_label_from_host))
            .unwrap_or_else(|| "site".to_string())
    }

    pub fn namespace(&self) -> String {
        self.namespace
            .as_deref()
            .map(str::trim)
            .filter(|ns| !ns.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| self.label())
    }

    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| self.label())
    }
}

pub fn site_label_from_host(host: &str) -> String {
    let host = host.trim_start_matches("www.");
    let first = host.split('.').next().unwrap_or(host);
    sanitize_label(first)
}

fn sanitize_label(raw: &str) -> String {
    let label: String = raw
        .trim()
        .to_ascii_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    if label.is_empty() {
        "site".to_string()
    } else {
        label
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    /// Pages fetched in parallel after the landing page.
    pub concurrency: usize,
    pub max_links: usize,
    pub timeout_secs: u64,
    pub max_bytes: usize,
    pub user_agent: String,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            max_links: 200,
            timeout_secs: 30,
            max_bytes: 5_000_000,
            user_agent: concat!("sitechat/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl CrawlConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub dimension: usize,
    pub metric: DistanceMetric,
    pub embed_batch_size: usize,
    /// Embed+insert batches in flight during a build.
    pub insert_concurrency: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dimension: DEFAULT_EMBEDDING_DIMENSION,
            metric: DistanceMetric::DotProduct,
            embed_batch_size: 64,
            insert_concurrency: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Candidates pulled by similarity search.
    pub k: usize,
    /// Passages kept after reranking.
    pub top_n: usize,
    pub timeout_secs: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k: DEFAULT_SEARCH_K,
            top_n: DEFAULT_RERANK_TOP_N,
            timeout_secs: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub max_iterations: usize,
    /// `{site}` is replaced with the site display name.
    pub system_prompt: String,
    pub tool_calling: ToolCallingMode,
    pub turn_timeout_secs: u64,
    pub model_timeout_secs: u64,
    pub tool_timeout_secs: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            tool_calling: ToolCallingMode::Native,
            turn_timeout_secs: 180,
            model_timeout_secs: 60,
            tool_timeout_secs: 45,
        }
    }
}

impl AgentConfig {
    pub fn turn_timeout(&self) -> Duration {
        Duration::from_secs(self.turn_timeout_secs)
    }

    pub fn model_timeout(&self) -> Duration {
        Duration::from_secs(self.model_timeout_secs)
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: Option<u32>,
    /// Transport timeout for one chat request.
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            api_key: String::new(),
            model: DEFAULT_CHAT_MODEL.to_string(),
            temperature: 0.0,
            max_tokens: None,
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub timeout_secs: u64,
    pub max_retries: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            api_key: String::new(),
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            timeout_secs: 30,
            max_retries: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RerankerProvider {
    Cohere,
    /// Cosine similarity against the configured embedder.
    Embedding,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RerankerConfig {
    pub provider: RerankerProvider,
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for RerankerConfig {
    fn default() -> Self {
        Self {
            provider: RerankerProvider::Cohere,
            base_url: DEFAULT_COHERE_BASE_URL.to_string(),
            api_key: String::new(),
            model: DEFAULT_RERANK_MODEL.to_string(),
            timeout_secs: 15,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            cors_allowed_origins: Vec::new(),
        }
    }
}
