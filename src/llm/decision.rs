//! JSON tool-calling protocol for models without native function calling.

use serde_json::{json, Value};

use super::types::{ModelResponse, ToolCall, ToolSpec};

/// Instruction block appended to the system prompt in `json` mode.
pub fn json_tool_instructions(tools: &[ToolSpec]) -> String {
    let listing = if tools.is_empty() {
        "None".to_string()
    } else {
        tools
            .iter()
            .map(|tool| {
                format!(
                    "- {}: {}\n  arguments schema: {}",
                    tool.name, tool.description, tool.parameters
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        "You have access to the following tools:\n{listing}\n\
When you need to use a tool, respond ONLY with JSON in this format:\n\
{{\"type\":\"tool_call\",\"tool_name\":\"<tool>\",\"tool_args\":{{...}}}}\n\
When you have the final answer, respond ONLY with JSON in this format:\n\
{{\"type\":\"final\",\"content\":\"...\"}}\n\
Do not include any extra text outside the JSON."
    )
}

/// The JSON a model would have produced for `call`, replayed into the transcript.
pub fn render_tool_call(call: &ToolCall) -> String {
    json!({
        "type": "tool_call",
        "tool_name": call.name,
        "tool_args": call.arguments,
    })
    .to_string()
}

/// Reads a model reply. Anything that is not a recognizable tool call or final
/// envelope is taken as the final answer verbatim.
pub fn parse_model_decision(text: &str, call_id: impl FnOnce() -> String) -> ModelResponse {
    if let Some(value) = parse_json_from_text(text) {
        if let Some(decision) = parse_decision_from_value(&value, call_id) {
            return decision;
        }
    }
    ModelResponse::Final(text.trim().to_string())
}

fn parse_json_from_text(text: &str) -> Option<Value> {
    let trimmed = text
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Some(value);
    }

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<Value>(&trimmed[start..=end]).ok()
}

fn parse_decision_from_value(
    value: &Value,
    call_id: impl FnOnce() -> String,
) -> Option<ModelResponse> {
    let action_type = value
        .get("type")
        .or_else(|| value.get("action"))
        .and_then(|v| v.as_str())
        .unwrap_or("");

    match action_type {
        "tool_call" => {
            let name = value
                .get("tool_name")
                .or_else(|| value.get("name"))
                .or_else(|| value.get("tool"))
                .and_then(|v| v.as_str())?;
            let arguments = value
                .get("tool_args")
                .or_else(|| value.get("args"))
                .or_else(|| value.get("arguments"))
                .cloned()
                .unwrap_or_else(|| Value::Object(serde_json::Map::new()));
            Some(ModelResponse::ToolCall(ToolCall {
                id: call_id(),
                name: name.to_string(),
                arguments,
            }))
        }
        "final" => {
            let content = value
                .get("content")
                .or_else(|| value.get("message"))
                .or_else(|| value.get("response"))
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();
            Some(ModelResponse::Final(content))
        }
        _ => None,
    }
}
