pub mod decision;
pub mod embedding;
pub mod openai;
pub mod provider;
pub mod types;

pub use embedding::OpenAiEmbedder;
pub use openai::OpenAiChatModel;
pub use provider::{Embedder, LanguageModel};
pub use types::{
    CompletionRequest, Message, ModelResponse, Role, ScratchpadEntry, ToolCall, ToolCallInfo,
    ToolCallingMode, ToolSpec,
};
