use serde_json::{Map, Value};

use crate::core::errors::ApiError;

const METRICS: [&str; 3] = ["dot_product", "cosine", "euclidean"];
const TOOL_CALLING_MODES: [&str; 2] = ["native", "json"];
const RERANKER_PROVIDERS: [&str; 2] = ["cohere", "embedding"];

pub fn validate_config(config: &Value) -> Result<(), ApiError> {
    let root = config
        .as_object()
        .ok_or_else(|| config_type_error("root", "object"))?;

    if let Some(site) = expect_optional_object(root, "site")? {
        validate_optional_string_field(site, "site.url", "url")?;
        validate_optional_string_field(site, "site.namespace", "namespace")?;
        validate_optional_string_field(site, "site.name", "name")?;
        if let Some(url) = site.get("url").and_then(|v| v.as_str()) {
            let parsed = url::Url::parse(url).map_err(|e| {
                ApiError::BadRequest(format!("Invalid config at 'site.url': {}", e))
            })?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(ApiError::BadRequest(
                    "Invalid config at 'site.url': only http/https are supported".to_string(),
                ));
            }
        }
    }

    if let Some(crawl) = expect_optional_object(root, "crawl")? {
        validate_u64_field(crawl, "crawl.concurrency", "concurrency", 1, 64)?;
        validate_u64_field(crawl, "crawl.max_links", "max_links", 1, 100_000)?;
        validate_u64_field(crawl, "crawl.timeout_secs", "timeout_secs", 1, 600)?;
        validate_u64_field(crawl, "crawl.max_bytes", "max_bytes", 1024, 100_000_000)?;
        validate_optional_string_field(crawl, "crawl.user_agent", "user_agent")?;
    }

    if let Some(index) = expect_optional_object(root, "index")? {
        validate_u64_field(index, "index.dimension", "dimension", 1, 65_536)?;
        validate_enum_field(index, "index.metric", "metric", &METRICS)?;
        validate_u64_field(index, "index.embed_batch_size", "embed_batch_size", 1, 2048)?;
        validate_u64_field(index, "index.insert_concurrency", "insert_concurrency", 1, 64)?;
    }

    if let Some(retrieval) = expect_optional_object(root, "retrieval")? {
        validate_u64_field(retrieval, "retrieval.k", "k", 1, 1000)?;
        validate_u64_field(retrieval, "retrieval.top_n", "top_n", 1, 1000)?;
        validate_u64_field(retrieval, "retrieval.timeout_secs", "timeout_secs", 1, 600)?;
    }

    if let Some(agent) = expect_optional_object(root, "agent")? {
        validate_u64_field(agent, "agent.max_iterations", "max_iterations", 1, 100)?;
        validate_optional_string_field(agent, "agent.system_prompt", "system_prompt")?;
        validate_enum_field(agent, "agent.tool_calling", "tool_calling", &TOOL_CALLING_MODES)?;
        validate_u64_field(agent, "agent.turn_timeout_secs", "turn_timeout_secs", 1, 3600)?;
        validate_u64_field(agent, "agent.model_timeout_secs", "model_timeout_secs", 1, 3600)?;
        validate_u64_field(agent, "agent.tool_timeout_secs", "tool_timeout_secs", 1, 3600)?;
    }

    for section_name in ["llm", "embedding", "reranker"] {
        if let Some(section) = expect_optional_object(root, section_name)? {
            validate_optional_string_field(
                section,
                &format!("{}.base_url", section_name),
                "base_url",
            )?;
            validate_optional_string_field(section, &format!("{}.api_key", section_name), "api_key")?;
            validate_optional_string_field(section, &format!("{}.model", section_name), "model")?;
            validate_u64_field(
                section,
                &format!("{}.timeout_secs", section_name),
                "timeout_secs",
                1,
                600,
            )?;
        }
    }

    if let Some(llm) = expect_optional_object(root, "llm")? {
        validate_f64_field(llm, "llm.temperature", "temperature", 0.0, 2.0)?;
        validate_u64_field(llm, "llm.max_tokens", "max_tokens", 1, 1_000_000)?;
    }

    if let Some(embedding) = expect_optional_object(root, "embedding")? {
        validate_u64_field(embedding, "embedding.max_retries", "max_retries", 0, 10)?;
    }

    if let Some(reranker) = expect_optional_object(root, "reranker")? {
        validate_enum_field(reranker, "reranker.provider", "provider", &RERANKER_PROVIDERS)?;
    }

    if let Some(server) = expect_optional_object(root, "server")? {
        validate_optional_string_field(server, "server.host", "host")?;
        validate_u64_field(server, "server.port", "port", 0, 65535)?;
        validate_string_array_field(
            server,
            "server.cors_allowed_origins",
            "cors_allowed_origins",
        )?;
    }

    Ok(())
}

fn expect_optional_object<'a>(
    root: &'a Map<String, Value>,
    key: &str,
) -> Result<Option<&'a Map<String, Value>>, ApiError> {
    match root.get(key) {
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(_) => Err(config_type_error(key, "object")),
        None => Ok(None),
    }
}

fn validate_u64_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
    min: u64,
    max: u64,
) -> Result<(), ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(number) = value.as_u64() else {
        return Err(config_type_error(path, "integer"));
    };
    if number < min || number > max {
        return Err(ApiError::BadRequest(format!(
            "Invalid config at '{}': must be between {} and {}",
            path, min, max
        )));
    }
    Ok(())
}

fn validate_f64_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
    min: f64,
    max: f64,
) -> Result<(), ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(number) = value.as_f64() else {
        return Err(config_type_error(path, "number"));
    };
    if !(min..=max).contains(&number) {
        return Err(ApiError::BadRequest(format!(
            "Invalid config at '{}': must be between {} and {}",
            path, min, max
        )));
    }
    Ok(())
}

fn validate_optional_string_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    if value.is_null() || value.as_str().is_some() {
        return Ok(());
    }
    Err(config_type_error(path, "string"))
}

fn validate_enum_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
    allowed: &[&str],
) -> Result<(), ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(text) = value.as_str() else {
        return Err(config_type_error(path, "string"));
    };
    if allowed.contains(&text) {
        return Ok(());
    }
    Err(ApiError::BadRequest(format!(
        "Invalid config at '{}': expected one of {}",
        path,
        allowed.join(", ")
    )))
}

fn validate_string_array_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(items) = value.as_array() else {
        return Err(config_type_error(path, "array of strings"));
    };
    for (index, item) in items.iter().enumerate() {
        let Some(text) = item.as_str() else {
            return Err(config_type_error(&format!("{}[{}]", path, index), "string"));
        };
        if text.trim().is_empty() {
            return Err(ApiError::BadRequest(format!(
                "Invalid config at '{}[{}]': value cannot be empty",
                path, index
            )));
        }
    }
    Ok(())
}

fn config_type_error(path: &str, expected: &str) -> ApiError {
    ApiError::BadRequest(format!(
        "Invalid config at '{}': expected {}",
        path, expected
    ))
}
