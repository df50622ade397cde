//! Paths and runtime settings.
//!
//! The settings file holds user-tunable values (currently the default
//! model). Everything else comes from environment knobs resolved once at
//! startup and threaded into the services that need them.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{json, Value};

use crate::core::errors::ApiError;

pub const DEFAULT_MODEL: &str = "gemma3:4b";

const DEFAULT_EMBED_URL: &str = "http://127.0.0.1:11434/api/embeddings";
const DEFAULT_MODEL_URL: &str = "http://127.0.0.1:11434/run";
const DEFAULT_MODEL_CMD: &str = "ollama";

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
    pub db_path: PathBuf,
    pub settings_path: PathBuf,
}

impl AppPaths {
    pub fn new() -> Self {
        let data_dir = discover_data_dir();
        let log_dir = data_dir.join("logs");
        let db_path = env::var("VYRE_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("vyre.db"));
        let settings_path = data_dir.join("config.json");

        for dir in [&data_dir, &log_dir] {
            let _ = fs::create_dir_all(dir);
        }
        if let Some(parent) = db_path.parent() {
            let _ = fs::create_dir_all(parent);
        }

        AppPaths {
            data_dir,
            log_dir,
            db_path,
            settings_path,
        }
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}

fn discover_data_dir() -> PathBuf {
    if let Ok(dir) = env::var("VYRE_DATA_DIR") {
        return PathBuf::from(dir);
    }

    if cfg!(debug_assertions) {
        return env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join("database");
    }

    if cfg!(target_os = "windows") {
        let base = env::var("APPDATA")
            .unwrap_or_else(|_| env::var("USERPROFILE").unwrap_or_else(|_| ".".to_string()));
        return PathBuf::from(base).join("Vyre");
    }

    let xdg = env::var("XDG_DATA_HOME").unwrap_or_else(|_| {
        home_dir().join(".local/share").to_string_lossy().to_string()
    });
    PathBuf::from(xdg).join("vyre")
}

fn home_dir() -> PathBuf {
    env::var("HOME")
        .or_else(|_| env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

/// Connection points for the local model runtime.
#[derive(Debug, Clone)]
pub struct RuntimeEndpoints {
    pub embed_url: String,
    pub model_url: String,
    pub model_cmd: String,
}

impl RuntimeEndpoints {
    pub fn from_env() -> Self {
        RuntimeEndpoints {
            embed_url: env::var("OLLAMA_EMBED_URL")
                .unwrap_or_else(|_| DEFAULT_EMBED_URL.to_string()),
            model_url: env::var("OLLAMA_HTTP").unwrap_or_else(|_| DEFAULT_MODEL_URL.to_string()),
            model_cmd: env::var("OLLAMA_CMD").unwrap_or_else(|_| DEFAULT_MODEL_CMD.to_string()),
        }
    }
}

/// Read/write access to the JSON settings file.
///
/// Reads hit the filesystem on every call so external edits take effect
/// without a restart. A missing or unparsable file behaves as empty.
#[derive(Clone)]
pub struct ConfigService {
    settings_path: Arc<PathBuf>,
}

impl ConfigService {
    pub fn new(settings_path: &Path) -> Self {
        Self {
            settings_path: Arc::new(settings_path.to_path_buf()),
        }
    }

    pub fn read(&self) -> Value {
        match fs::read_to_string(self.settings_path.as_ref()) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|_| json!({})),
            Err(_) => json!({}),
        }
    }

    pub fn write(&self, settings: &Value) -> Result<(), ApiError> {
        let raw = serde_json::to_string_pretty(settings).map_err(ApiError::internal)?;
        fs::write(self.settings_path.as_ref(), raw).map_err(ApiError::internal)
    }

    /// Resolution chain: settings file, then `OLLAMA_MODEL`, then the
    /// hard-coded default.
    pub fn default_model(&self) -> String {
        if let Some(name) = self.read().get("default_model").and_then(Value::as_str) {
            if !name.trim().is_empty() {
                return name.to_string();
            }
        }
        env::var("OLLAMA_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string())
    }

    pub fn set_default_model(&self, name: &str) -> Result<(), ApiError> {
        let mut settings = self.read();
        if let Some(map) = settings.as_object_mut() {
            map.insert("default_model".to_string(), json!(name));
        } else {
            settings = json!({ "default_model": name });
        }
        self.write(&settings)
    }
}
