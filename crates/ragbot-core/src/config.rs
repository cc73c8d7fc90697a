//! Configuration types for the ragbot system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{RagError, Result};
use crate::types::BackendKind;

/// Base URL used when `api_base` is `"default"`.
pub const OPENAI_API_BASE: &str = "https://api.openai.com/v1";

/// Main configuration for the ragbot system.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Vector store configuration.
    #[serde(default)]
    pub store: StoreConfig,

    /// Embedding provider configuration.
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Chat model configuration.
    #[serde(default)]
    pub chat: ChatConfig,

    /// Text splitter configuration.
    #[serde(default)]
    pub splitter: SplitterConfig,

    /// Conversation and retrieval settings.
    #[serde(default)]
    pub bot: BotConfig,
}

/// Vector store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Backend family to connect to.
    #[serde(default = "default_backend")]
    pub backend: BackendKind,

    /// Namespace bound at construction and targeted by the default alias.
    #[serde(default = "default_namespace")]
    pub default_namespace: String,

    /// Drop and recreate the default namespace when the client is built.
    #[serde(default = "default_true")]
    pub reset_on_start: bool,

    #[serde(default)]
    pub http: HttpStoreConfig,

    #[serde(default)]
    pub sqlite: SqliteStoreConfig,

    #[serde(default)]
    pub qdrant: QdrantStoreConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            default_namespace: default_namespace(),
            reset_on_start: true,
            http: HttpStoreConfig::default(),
            sqlite: SqliteStoreConfig::default(),
            qdrant: QdrantStoreConfig::default(),
        }
    }
}

/// Networked vector service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpStoreConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_http_port")]
    pub port: u16,
}

impl Default for HttpStoreConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_http_port(),
        }
    }
}

impl HttpStoreConfig {
    /// Base URL of the service.
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

/// Relational store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqliteStoreConfig {
    /// Path to the SQLite database file (`:memory:` for an in-memory store).
    #[serde(default = "default_database_path")]
    pub path: PathBuf,
}

impl Default for SqliteStoreConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

/// ANN engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QdrantStoreConfig {
    /// gRPC endpoint of the engine.
    #[serde(default = "default_qdrant_url")]
    pub url: String,

    /// Optional API key.
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for QdrantStoreConfig {
    fn default() -> Self {
        Self {
            url: default_qdrant_url(),
            api_key: None,
        }
    }
}

/// Embedding provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// OpenAI-compatible base URL, or `"default"`.
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// API key (falls back to `OPENAI_API_KEY`).
    #[serde(default)]
    pub api_key: Option<String>,

    /// Embedding model name.
    #[serde(default = "default_embedding_model")]
    pub model: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            api_key: None,
            model: default_embedding_model(),
        }
    }
}

/// Chat model configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// OpenAI-compatible base URL, or `"default"`.
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// API key (falls back to `OPENAI_API_KEY`).
    #[serde(default)]
    pub api_key: Option<String>,

    /// Chat model name.
    #[serde(default = "default_chat_model")]
    pub model: String,

    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            api_key: None,
            model: default_chat_model(),
            temperature: default_temperature(),
        }
    }
}

/// Text splitter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitterConfig {
    /// Maximum characters per chunk.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Characters carried over between consecutive chunks.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

/// Conversation and retrieval settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Number of past exchanges kept in the conversation prompt.
    #[serde(default = "default_memory_rounds")]
    pub memory_rounds: usize,

    /// Default number of references retrieved per question.
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Minimum similarity for a hit to be used as a reference.
    #[serde(default)]
    pub threshold: f32,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            memory_rounds: default_memory_rounds(),
            top_k: default_top_k(),
            threshold: 0.0,
        }
    }
}

/// Resolve an `api_base` setting to a concrete URL.
pub fn resolve_api_base(api_base: &str) -> String {
    if api_base.is_empty() || api_base == "default" {
        OPENAI_API_BASE.to_string()
    } else {
        api_base.trim_end_matches('/').to_string()
    }
}

/// Resolve an API key: explicit setting first, then `OPENAI_API_KEY`.
pub fn resolve_api_key(api_key: Option<&str>) -> String {
    match api_key {
        Some(key) if !key.is_empty() => key.to_string(),
        _ => std::env::var("OPENAI_API_KEY").unwrap_or_default(),
    }
}

// Default value functions

fn default_true() -> bool {
    true
}

fn default_backend() -> BackendKind {
    BackendKind::Sqlite
}

fn default_namespace() -> String {
    "documents".to_string()
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_http_port() -> u16 {
    8000
}

fn default_qdrant_url() -> String {
    "http://localhost:6334".to_string()
}

fn default_api_base() -> String {
    "default".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_chat_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_chunk_size() -> usize {
    500
}

fn default_chunk_overlap() -> usize {
    50
}

fn default_memory_rounds() -> usize {
    4
}

fn default_top_k() -> usize {
    5
}

fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ragbot")
        .join("vectors.db")
}

impl AppConfig {
    /// Load configuration from a TOML or JSON file (chosen by extension).
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));

        let config: Self = if is_json {
            serde_json::from_str(&content)
                .map_err(|e| RagError::config(format!("Failed to parse config: {}", e)))?
        } else {
            toml::from_str(&content)
                .map_err(|e| RagError::config(format!("Failed to parse config: {}", e)))?
        };

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from default paths.
    pub fn load_default() -> Result<Self> {
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("ragbot").join("config.toml");
            if user_config.exists() {
                return Self::load(&user_config);
            }
        }

        let local_config = PathBuf::from("ragbot.toml");
        if local_config.exists() {
            return Self::load(&local_config);
        }

        Ok(Self::default())
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        crate::types::validate_namespace(&self.store.default_namespace)?;

        if self.splitter.chunk_size == 0 {
            return Err(RagError::config("splitter.chunk_size must be positive"));
        }
        if self.splitter.chunk_overlap > self.splitter.chunk_size {
            return Err(RagError::config(format!(
                "splitter.chunk_overlap ({}) exceeds chunk_size ({})",
                self.splitter.chunk_overlap, self.splitter.chunk_size
            )));
        }
        if self.bot.top_k == 0 {
            return Err(RagError::config("bot.top_k must be positive"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.store.backend, BackendKind::Sqlite);
        assert_eq!(config.store.default_namespace, "documents");
        assert!(config.store.reset_on_start);
        assert_eq!(config.bot.memory_rounds, 4);
        assert_eq!(config.splitter.chunk_size, 500);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_toml() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[store]
backend = "qdrant"
default_namespace = "books"
reset_on_start = false

[store.qdrant]
url = "http://vectors:6334"

[splitter]
chunk_size = 200
chunk_overlap = 20
"#
        )
        .unwrap();

        let config = AppConfig::load(file.path()).unwrap();
        assert_eq!(config.store.backend, BackendKind::Qdrant);
        assert_eq!(config.store.default_namespace, "books");
        assert!(!config.store.reset_on_start);
        assert_eq!(config.store.qdrant.url, "http://vectors:6334");
        assert_eq!(config.splitter.chunk_overlap, 20);
        assert_eq!(config.bot.top_k, 5);
    }

    #[test]
    fn test_load_json() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            file,
            r#"{{"store": {{"backend": "http", "http": {{"host": "10.0.0.2", "port": 9000}}}}}}"#
        )
        .unwrap();

        let config = AppConfig::load(file.path()).unwrap();
        assert_eq!(config.store.backend, BackendKind::Http);
        assert_eq!(config.store.http.base_url(), "http://10.0.0.2:9000");
    }

    #[test]
    fn test_invalid_overlap_rejected() {
        let mut config = AppConfig::default();
        config.splitter.chunk_overlap = config.splitter.chunk_size + 1;
        assert!(matches!(config.validate(), Err(RagError::Config { .. })));
    }

    #[test]
    fn test_resolve_api_base() {
        assert_eq!(resolve_api_base("default"), OPENAI_API_BASE);
        assert_eq!(resolve_api_base("http://llm:8080/v1/"), "http://llm:8080/v1");
    }
}
