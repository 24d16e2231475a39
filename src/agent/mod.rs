mod runtime;

pub use runtime::{AgentLoop, AgentRequest, AgentResponse};
