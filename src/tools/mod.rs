pub mod registry;
pub mod reranker;

pub use registry::{site_tool_name, AgentTool, SiteSearchTool, ToolBridge};
pub use reranker::{CohereReranker, EmbeddingReranker, RerankHit, Reranker};
