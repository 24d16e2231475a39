use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::config::{render_system_prompt, AgentConfig};
use crate::core::deadline::with_deadline;
use crate::core::errors::ApiError;
use crate::history::ConversationSession;
use crate::llm::{CompletionRequest, LanguageModel, Message, ModelResponse, ScratchpadEntry, ToolCall};
use crate::tools::ToolBridge;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRequest {
    pub input: String,
    pub session_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResponse {
    pub output: String,
}

enum LoopState {
    AwaitModel,
    ToolRequested(ToolCall),
    FinalAnswer(String),
}

/// Working state of one turn; dropped when the loop ends.
struct AgentTurn {
    input: String,
    history: Vec<Message>,
    scratchpad: Vec<ScratchpadEntry>,
    iterations: usize,
}

pub struct AgentLoop {
    model: Arc<dyn LanguageModel>,
    tools: Arc<ToolBridge>,
    sessions: ConversationSession,
    system_prompt: String,
    config: AgentConfig,
}

impl AgentLoop {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        tools: Arc<ToolBridge>,
        sessions: ConversationSession,
        config: AgentConfig,
        site_name: &str,
    ) -> Self {
        Self {
            model,
            tools,
            system_prompt: render_system_prompt(&config.system_prompt, site_name),
            sessions,
            config,
        }
    }

    pub fn sessions(&self) -> &ConversationSession {
        &self.sessions
    }

    /// Runs one turn under the turn deadline. The session is only written when a
    /// final answer is produced.
    pub async fn invoke(&self, request: AgentRequest) -> Result<AgentResponse, ApiError> {
        with_deadline("agent turn", self.config.turn_timeout(), self.run_turn(request)).await
    }

    async fn run_turn(&self, request: AgentRequest) -> Result<AgentResponse, ApiError> {
        let input = request.input.trim();
        if input.is_empty() {
            return Err(ApiError::BadRequest("input must not be empty".to_string()));
        }
        let history = self.sessions.load(&request.session_id).await?;

        let mut turn = AgentTurn {
            input: input.to_string(),
            history: history.messages,
            scratchpad: Vec::new(),
            iterations: 0,
        };
        let mut state = LoopState::AwaitModel;

        loop {
            state = match state {
                LoopState::AwaitModel => {
                    if turn.iterations >= self.config.max_iterations {
                        tracing::warn!(
                            session_id = %history.session_id,
                            iterations = turn.iterations,
                            "Agent loop hit the iteration cap"
                        );
                        return Err(ApiError::AgentLoopExceeded {
                            max_iterations: self.config.max_iterations,
                        });
                    }
                    turn.iterations += 1;
                    tracing::debug!(
                        session_id = %history.session_id,
                        iteration = turn.iterations,
                        model = %self.model.name(),
                        "Awaiting model decision"
                    );

                    let completion = CompletionRequest {
                        system_prompt: self.system_prompt.clone(),
                        history: turn.history.clone(),
                        input: turn.input.clone(),
                        scratchpad: turn.scratchpad.clone(),
                        tools: self.tools.specs(),
                    };
                    let response = with_deadline(
                        "language model",
                        self.config.model_timeout(),
                        self.model.complete(&completion),
                    )
                    .await?;

                    match response {
                        ModelResponse::Final(text) => LoopState::FinalAnswer(text),
                        ModelResponse::ToolCall(call) => LoopState::ToolRequested(call),
                    }
                }
                LoopState::ToolRequested(call) => {
                    let observation = self.observe(&call).await?;
                    turn.scratchpad.push(ScratchpadEntry { call, observation });
                    LoopState::AwaitModel
                }
                LoopState::FinalAnswer(text) => {
                    self.sessions
                        .record_turn(&history.session_id, &turn.input, &text)
                        .await?;
                    tracing::info!(
                        session_id = %history.session_id,
                        iterations = turn.iterations,
                        tool_calls = turn.scratchpad.len(),
                        "Agent turn finished"
                    );
                    return Ok(AgentResponse { output: text });
                }
            };
        }
    }

    /// Runs the tool. Tool errors become the observation so the model can report
    /// them; only timeouts end the turn.
    async fn observe(&self, call: &ToolCall) -> Result<String, ApiError> {
        match with_deadline("tool", self.config.tool_timeout(), self.tools.invoke(call)).await {
            Ok(output) => Ok(output),
            Err(err @ ApiError::Timeout(_)) => Err(err),
            Err(err) => {
                tracing::warn!(tool = %call.name, error = %err, "Tool call failed");
                Ok(format!(
                    "Tool `{}` failed ({}): {}. Tell the user the information could not be retrieved.",
                    call.name,
                    err.kind(),
                    err
                ))
            }
        }
    }
}
