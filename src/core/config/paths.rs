use std::env;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub project_root: PathBuf,
    pub user_data_dir: PathBuf,
    pub log_dir: PathBuf,
    /// Conversation history database.
    pub history_db_path: PathBuf,
    /// Vector index database.
    pub vector_db_path: PathBuf,
    pub secrets_path: PathBuf,
}

impl AppPaths {
    pub fn new() -> Self {
        let project_root = discover_project_root();
        let user_data_dir = discover_user_data_dir(&project_root);
        Self::with_data_dir(project_root, user_data_dir)
    }

    pub fn with_data_dir(project_root: PathBuf, user_data_dir: PathBuf) -> Self {
        let log_dir = user_data_dir.join("logs");
        let history_db_path = user_data_dir.join("sitechat_history.db");
        let vector_db_path = user_data_dir.join("sitechat_vectors.db");
        let secrets_path = user_data_dir.join("secrets.yaml");

        for dir in [&user_data_dir, &log_dir] {
            let _ = fs::create_dir_all(dir);
        }

        AppPaths {
            project_root,
            user_data_dir,
            log_dir,
            history_db_path,
            vector_db_path,
            secrets_path,
        }
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}

const APP_DIR: &str = "sitechat";

/// `SITECHAT_ROOT`, else the crate directory when it holds a `config.yml`, else
/// the working directory.
fn discover_project_root() -> PathBuf {
    if let Some(root) = env_path("SITECHAT_ROOT") {
        return root;
    }

    let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    if manifest_dir.join("config.yml").is_file() {
        return manifest_dir;
    }
    env::current_dir().unwrap_or(manifest_dir)
}

/// `SITECHAT_DATA_DIR`, else `.sitechat/` under the project in debug builds, else
/// the platform data directory.
fn discover_user_data_dir(project_root: &Path) -> PathBuf {
    if let Some(dir) = env_path("SITECHAT_DATA_DIR") {
        return dir;
    }
    if cfg!(debug_assertions) {
        return project_root.join(format!(".{}", APP_DIR));
    }
    platform_data_dir().join(APP_DIR)
}

fn platform_data_dir() -> PathBuf {
    match env::consts::OS {
        "windows" => env_path("LOCALAPPDATA").unwrap_or_else(home_dir),
        "macos" => home_dir().join("Library/Application Support"),
        _ => env_path("XDG_DATA_HOME").unwrap_or_else(|| home_dir().join(".local/share")),
    }
}

fn home_dir() -> PathBuf {
    env_path("HOME")
        .or_else(|| env_path("USERPROFILE"))
        .unwrap_or_else(|| PathBuf::from("."))
}

fn env_path(key: &str) -> Option<PathBuf> {
    env::var_os(key)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}
