use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use uuid::Uuid;

use super::decision::{json_tool_instructions, parse_model_decision, render_tool_call};
use super::provider::LanguageModel;
use super::types::{
    CompletionRequest, Message, ModelResponse, Role, ToolCall, ToolCallingMode, ToolSpec,
};
use crate::core::config::LlmConfig;
use crate::core::errors::ApiError;

/// OpenAI-compatible `/chat/completions` client.
#[derive(Clone)]
pub struct OpenAiChatModel {
    base_url: String,
    api_key: String,
    model: String,
    temperature: f64,
    max_tokens: Option<u32>,
    mode: ToolCallingMode,
    client: Client,
}

impl OpenAiChatModel {
    pub fn new(config: &LlmConfig, mode: ToolCallingMode) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(ApiError::internal)?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            mode,
            client,
        })
    }

    fn request_body(&self, request: &CompletionRequest) -> Value {
        let messages = match self.mode {
            ToolCallingMode::Native => native_messages(request),
            ToolCallingMode::Json => json_mode_messages(request),
        };

        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "temperature": self.temperature,
            "stream": false,
        });
        if let Some(obj) = body.as_object_mut() {
            if let Some(max) = self.max_tokens {
                obj.insert("max_tokens".to_string(), json!(max));
            }
            if self.mode == ToolCallingMode::Native && !request.tools.is_empty() {
                obj.insert("tools".to_string(), native_tools(&request.tools));
            }
        }
        body
    }
}

fn history_messages(history: &[Message]) -> impl Iterator<Item = Value> + '_ {
    // Tool traffic from earlier turns is not replayed; only the dialogue is.
    history
        .iter()
        .filter(|m| matches!(m.role, Role::User | Role::Assistant | Role::System))
        .map(|m| json!({"role": m.role.as_str(), "content": m.content}))
}

fn native_messages(request: &CompletionRequest) -> Vec<Value> {
    let mut messages = vec![json!({"role": "system", "content": request.system_prompt})];
    messages.extend(history_messages(&request.history));
    messages.push(json!({"role": "user", "content": request.input}));

    for entry in &request.scratchpad {
        messages.push(json!({
            "role": "assistant",
            "content": Value::Null,
            "tool_calls": [{
                "id": entry.call.id,
                "type": "function",
                "function": {
                    "name": entry.call.name,
                    "arguments": entry.call.arguments.to_string(),
                }
            }]
        }));
        messages.push(json!({
            "role": "tool",
            "tool_call_id": entry.call.id,
            "content": entry.observation,
        }));
    }
    messages
}

fn json_mode_messages(request: &CompletionRequest) -> Vec<Value> {
    let system = format!(
        "{}\n\n{}",
        request.system_prompt,
        json_tool_instructions(&request.tools)
    );
    let mut messages = vec![json!({"role": "system", "content": system})];
    messages.extend(history_messages(&request.history));
    messages.push(json!({"role": "user", "content": request.input}));

    for entry in &request.scratchpad {
        messages.push(json!({"role": "assistant", "content": render_tool_call(&entry.call)}));
        messages.push(json!({
            "role": "user",
            "content": format!("Tool result for {}:\n{}", entry.call.name, entry.observation),
        }));
    }
    messages
}

fn native_tools(tools: &[ToolSpec]) -> Value {
    Value::Array(
        tools
            .iter()
            .map(|tool| {
                json!({
                    "type": "function",
                    "function": {
                        "name": tool.name,
                        "description": tool.description,
                        "parameters": tool.parameters,
                    }
                })
            })
            .collect(),
    )
}

fn new_call_id() -> String {
    format!("call_{}", Uuid::new_v4().simple())
}

/// Reads `choices[0].message` of a native-mode response.
fn parse_native_response(payload: &Value) -> Result<ModelResponse, ApiError> {
    let message = payload
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .ok_or_else(|| ApiError::Internal("Chat response has no message".to_string()))?;

    if let Some(call) = message
        .get("tool_calls")
        .and_then(|calls| calls.as_array())
        .and_then(|calls| calls.first())
    {
        let function = &call["function"];
        let name = function["name"]
            .as_str()
            .ok_or_else(|| ApiError::Internal("Tool call without a name".to_string()))?;
        let raw_args = function["arguments"].as_str().unwrap_or("{}");
        let arguments = serde_json::from_str::<Value>(raw_args)
            .unwrap_or_else(|_| Value::String(raw_args.to_string()));
        let id = call["id"]
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(new_call_id);
        return Ok(ModelResponse::ToolCall(ToolCall {
            id,
            name: name.to_string(),
            arguments,
        }));
    }

    let content = message["content"].as_str().unwrap_or_default();
    Ok(ModelResponse::Final(content.trim().to_string()))
}

#[async_trait]
impl LanguageModel for OpenAiChatModel {
    fn name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<ModelResponse, ApiError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.request_body(request);

        let mut req = self.client.post(&url).json(&body);
        if !self.api_key.is_empty() {
            req = req.bearer_auth(&self.api_key);
        }
        let res = req.send().await.map_err(ApiError::internal)?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(ApiError::Internal(format!(
                "Chat completion error ({}): {}",
                status, text
            )));
        }

        let payload: Value = res.json().await.map_err(ApiError::internal)?;
        match self.mode {
            ToolCallingMode::Native => parse_native_response(&payload),
            ToolCallingMode::Json => {
                let content = payload["choices"][0]["message"]["content"]
                    .as_str()
                    .unwrap_or_default();
                Ok(parse_model_decision(content, new_call_id))
            }
        }
    }
}
