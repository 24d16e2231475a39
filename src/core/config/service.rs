use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Map, Value};

use super::paths::AppPaths;
use super::settings::AppConfig;
use super::validation::validate_config;
use crate::core::errors::ApiError;

#[derive(Clone)]
pub struct ConfigService {
    paths: Arc<AppPaths>,
    override_path: Option<PathBuf>,
}

impl ConfigService {
    pub fn new(paths: Arc<AppPaths>) -> Self {
        Self {
            paths,
            override_path: env::var("SITECHAT_CONFIG_PATH").ok().map(PathBuf::from),
        }
    }

    pub fn with_config_path(paths: Arc<AppPaths>, config_path: PathBuf) -> Self {
        Self {
            paths,
            override_path: Some(config_path),
        }
    }

    pub fn config_path(&self) -> PathBuf {
        if let Some(path) = &self.override_path {
            return path.clone();
        }

        let user_config = self.paths.user_data_dir.join("config.yml");
        if user_config.exists() {
            return user_config;
        }

        self.paths.project_root.join("config.yml")
    }

    pub fn secrets_path(&self) -> PathBuf {
        self.paths.secrets_path.clone()
    }

    /// Public config with secrets merged over it, validated but untyped.
    pub fn load_config(&self) -> Result<Value, ApiError> {
        let public_config = load_yaml_file(&self.config_path())?;
        let secrets_config = load_yaml_file(&self.secrets_path())?;
        let merged = deep_merge(&public_config, &secrets_config);
        validate_config(&merged)?;
        Ok(merged)
    }

    pub fn load_app_config(&self) -> Result<AppConfig, ApiError> {
        let merged = self.load_config()?;
        let config = AppConfig::from_value(&merged)?;
        tracing::info!(
            config = %self.config_path().display(),
            site = %config.site.url,
            namespace = %config.site.namespace(),
            "Configuration loaded"
        );
        Ok(config)
    }
}

fn load_yaml_file(path: &Path) -> Result<Value, ApiError> {
    if !path.exists() {
        return Ok(Value::Object(Map::new()));
    }

    let contents = fs::read_to_string(path).map_err(ApiError::internal)?;
    let value = serde_yaml::from_str::<Value>(&contents).map_err(|e| {
        ApiError::BadRequest(format!("Failed to parse {}: {}", path.display(), e))
    })?;
    match value {
        Value::Object(_) => Ok(value),
        Value::Null => Ok(Value::Object(Map::new())),
        _ => Err(ApiError::BadRequest(format!(
            "{} must contain a mapping at the top level",
            path.display()
        ))),
    }
}

fn deep_merge(base: &Value, override_value: &Value) -> Value {
    match (base, override_value) {
        (Value::Object(base_map), Value::Object(override_map)) => {
            let mut merged: Map<String, Value> = base_map.clone();
            for (key, value) in override_map {
                let merged_value = match merged.get(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value.clone(),
                };
                merged.insert(key.clone(), merged_value);
            }
            Value::Object(merged)
        }
        _ => override_value.clone(),
    }
}
