//! Tools offered to the agent and their dispatch table.

use std::collections::HashMap;

use serde_json::{json, Value};

use crate::core::errors::ApiError;
use crate::llm::{ToolCall, ToolSpec};
use crate::rag::{RetrievalPipeline, RetrievedPassage};

const QUERY_KEYS: [&str; 3] = ["query", "q", "input"];

pub const NO_RESULTS: &str = "No relevant information was found on the site for this query.";

pub fn site_tool_name(label: &str) -> String {
    format!("search_{}", label)
}

/// Site search over the retrieval pipeline.
pub struct SiteSearchTool {
    name: String,
    description: String,
    pipeline: RetrievalPipeline,
}

impl SiteSearchTool {
    pub fn new(label: &str, display_name: &str, pipeline: RetrievalPipeline) -> Self {
        Self {
            name: site_tool_name(label),
            description: format!(
                "Search for information about {site}. For any questions about {site}, you must use this tool! \
                 Use this tool for any question about the site; do not answer from prior knowledge alone.",
                site = display_name
            ),
            pipeline,
        }
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "query to look up in the site content",
                    }
                },
                "required": ["query"],
            }),
        }
    }

    async fn call(&self, arguments: &Value) -> Result<String, ApiError> {
        let query = extract_query(arguments).ok_or_else(|| {
            ApiError::BadRequest(format!("{} requires a non-empty 'query' argument", self.name))
        })?;
        let passages = self.pipeline.retrieve(&query).await?;
        Ok(format_passages(&passages))
    }
}

/// The closed set of tools the agent can call.
pub enum AgentTool {
    SiteSearch(SiteSearchTool),
}

impl AgentTool {
    pub fn name(&self) -> &str {
        match self {
            AgentTool::SiteSearch(tool) => &tool.name,
        }
    }

    pub fn spec(&self) -> ToolSpec {
        match self {
            AgentTool::SiteSearch(tool) => tool.spec(),
        }
    }

    async fn call(&self, arguments: &Value) -> Result<String, ApiError> {
        match self {
            AgentTool::SiteSearch(tool) => tool.call(arguments).await,
        }
    }
}

pub struct ToolBridge {
    tools: Vec<AgentTool>,
    by_name: HashMap<String, usize>,
}

impl ToolBridge {
    pub fn new(tools: Vec<AgentTool>) -> Self {
        let by_name = tools
            .iter()
            .enumerate()
            .map(|(idx, tool)| (tool.name().to_string(), idx))
            .collect();
        Self { tools, by_name }
    }

    pub fn for_site(label: &str, display_name: &str, pipeline: RetrievalPipeline) -> Self {
        Self::new(vec![AgentTool::SiteSearch(SiteSearchTool::new(
            label,
            display_name,
            pipeline,
        ))])
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools.iter().map(AgentTool::spec).collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name().to_string()).collect()
    }

    pub async fn invoke(&self, call: &ToolCall) -> Result<String, ApiError> {
        let tool = self
            .by_name
            .get(&call.name)
            .and_then(|idx| self.tools.get(*idx))
            .ok_or_else(|| ApiError::BadRequest(format!("Unknown tool: {}", call.name)))?;

        tracing::info!(tool = %call.name, "Invoking tool");
        tool.call(&call.arguments).await
    }
}

/// Accepts `{"query": ..}` (or `q` / `input`) and a bare JSON string.
fn extract_query(arguments: &Value) -> Option<String> {
    let raw = match arguments {
        Value::String(s) => Some(s.as_str()),
        Value::Object(map) => QUERY_KEYS
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str)),
        _ => None,
    }?;
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Passage texts separated by blank lines, as handed back to the model.
pub fn format_passages(passages: &[RetrievedPassage]) -> String {
    if passages.is_empty() {
        return NO_RESULTS.to_string();
    }
    passages
        .iter()
        .map(|p| p.text.trim())
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn query_argument_shapes() {
        assert_eq!(extract_query(&json!({"query": " team "})), Some("team".to_string()));
        assert_eq!(extract_query(&json!({"q": "team"})), Some("team".to_string()));
        assert_eq!(extract_query(&json!("team")), Some("team".to_string()));
        assert_eq!(extract_query(&json!({"query": "  "})), None);
        assert_eq!(extract_query(&json!({"topic": "team"})), None);
        assert_eq!(extract_query(&json!(42)), None);
    }

    #[test]
    fn passages_are_joined_or_reported_missing() {
        assert_eq!(format_passages(&[]), NO_RESULTS);
        let passages = vec![
            RetrievedPassage {
                text: "Title: A\n\none".to_string(),
                relevance_score: 0.9,
                metadata: BTreeMap::new(),
            },
            RetrievedPassage {
                text: "two\n".to_string(),
                relevance_score: 0.5,
                metadata: BTreeMap::new(),
            },
        ];
        assert_eq!(format_passages(&passages), "Title: A\n\none\n\ntwo");
    }

    #[test]
    fn tool_name_follows_site_label() {
        assert_eq!(site_tool_name("promptior"), "search_promptior");
    }
}
