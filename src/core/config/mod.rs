pub mod defaults;
pub mod paths;
pub mod service;
pub mod settings;
pub mod validation;

pub use defaults::render_system_prompt;
pub use paths::AppPaths;
pub use service::ConfigService;
pub use settings::{
    AgentConfig, AppConfig, CrawlConfig, EmbeddingConfig, IndexConfig, LlmConfig,
    RerankerConfig, RerankerProvider, RetrievalConfig, ServerConfig, SiteConfig,
};
