pub const DEFAULT_EMBEDDING_DIMENSION: usize = 1536;
pub const DEFAULT_SEARCH_K: usize = 4;
pub const DEFAULT_RERANK_TOP_N: usize = 4;
pub const DEFAULT_MAX_ITERATIONS: usize = 6;

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_CHAT_MODEL: &str = "gpt-3.5-turbo-0125";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
pub const DEFAULT_COHERE_BASE_URL: &str = "https://api.cohere.com";
pub const DEFAULT_RERANK_MODEL: &str = "rerank-english-v3.0";

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant for {site}. \
Only answer questions based on the context returned to you by your tools. \
If the tools return nothing relevant, or a tool reports a failure, say so plainly \
instead of guessing. Talk with the user as normal.";

/// Renders the system prompt template for a site label.
pub fn render_system_prompt(template: &str, site: &str) -> String {
    template.replace("{site}", site)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_prompt_names_site() {
        let prompt = render_system_prompt(DEFAULT_SYSTEM_PROMPT, "Example");
        assert!(prompt.starts_with("You are a helpful assistant for Example."));
        assert!(!prompt.contains("{site}"));
    }
}
