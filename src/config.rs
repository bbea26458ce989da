/// Configuration module for mechanic-rag.
///
/// Tunables live in a JSON file with per-field defaults; secrets are read
/// only from the environment through [`Credentials`].
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

// ── Default value functions ──────────────────────────────────────────

fn default_manuals_dir() -> String {
    "knowledge/manuals".to_string()
}

fn default_db_path() -> String {
    "knowledge/manuals.db".to_string()
}

fn default_static_dir() -> String {
    "ui/dist".to_string()
}

fn default_bind() -> String {
    "0.0.0.0:5000".to_string()
}

fn default_top_k() -> usize {
    4
}

fn default_chunk_size() -> usize {
    2000
}

fn default_chunk_overlap() -> usize {
    300
}

fn default_batch_size() -> usize {
    200
}

fn default_max_workers() -> usize {
    4
}

fn default_work_dir() -> String {
    ".".to_string()
}

fn default_chunks_file() -> String {
    "chunks.json".to_string()
}

fn default_progress_file() -> String {
    "progress.json".to_string()
}

fn default_chat_model() -> String {
    "gpt-4.1-mini".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_dimensions() -> usize {
    1536
}

fn default_openai_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_pinecone_controller() -> String {
    "https://api.pinecone.io".to_string()
}

fn default_pinecone_cloud() -> String {
    "aws".to_string()
}

// ── Config structs ───────────────────────────────────────────────────

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    #[serde(default = "default_manuals_dir")]
    pub manuals_dir: String,

    /// SQLite file holding the local vector index and the manual manifest.
    #[serde(default = "default_db_path")]
    pub db_path: String,

    #[serde(default = "default_static_dir")]
    pub static_dir: String,

    #[serde(default = "default_bind")]
    pub bind: String,

    #[serde(default)]
    pub index: IndexConfig,

    #[serde(default)]
    pub ingest: IngestConfig,

    #[serde(default)]
    pub model: ModelConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,
}

/// Which vector store backs the retrieval facade.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum IndexBackend {
    /// Embedded SQLite + sqlite-vec index at `db_path`.
    #[default]
    Local,
    /// Hosted Pinecone index.
    Pinecone,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct IndexConfig {
    #[serde(default)]
    pub backend: IndexBackend,

    #[serde(default = "default_top_k")]
    pub top_k: usize,

    #[serde(default = "default_pinecone_controller")]
    pub pinecone_controller: String,

    /// Cloud used when ingestion has to create the Pinecone index.
    #[serde(default = "default_pinecone_cloud")]
    pub pinecone_cloud: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Directory receiving the chunk cache and the progress checkpoint.
    #[serde(default = "default_work_dir")]
    pub work_dir: String,

    #[serde(default = "default_chunks_file")]
    pub chunks_file: String,

    #[serde(default = "default_progress_file")]
    pub progress_file: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ModelConfig {
    #[serde(default = "default_chat_model")]
    pub chat_model: String,

    #[serde(default)]
    pub temperature: f32,

    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    #[serde(default = "default_dimensions")]
    pub dimensions: usize,

    #[serde(default = "default_openai_base")]
    pub base_url: String,

    /// No timeout when unset: a hung remote call blocks the invocation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct PipelineConfig {
    /// Run the legacy SQL manifest lookup during the locate stage.
    #[serde(default)]
    pub sql_lookup: bool,

    /// YAML file overriding the built-in prompt templates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompts_path: Option<String>,
}

// ── Default impls ────────────────────────────────────────────────────

impl Default for Config {
    fn default() -> Self {
        Self {
            manuals_dir: default_manuals_dir(),
            db_path: default_db_path(),
            static_dir: default_static_dir(),
            bind: default_bind(),
            index: IndexConfig::default(),
            ingest: IngestConfig::default(),
            model: ModelConfig::default(),
            pipeline: PipelineConfig::default(),
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            backend: IndexBackend::default(),
            top_k: default_top_k(),
            pinecone_controller: default_pinecone_controller(),
            pinecone_cloud: default_pinecone_cloud(),
            namespace: None,
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            batch_size: default_batch_size(),
            max_workers: default_max_workers(),
            work_dir: default_work_dir(),
            chunks_file: default_chunks_file(),
            progress_file: default_progress_file(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            chat_model: default_chat_model(),
            temperature: 0.0,
            embedding_model: default_embedding_model(),
            dimensions: default_dimensions(),
            base_url: default_openai_base(),
            request_timeout_secs: None,
        }
    }
}

// ── Config implementation ────────────────────────────────────────────

impl Config {
    /// Load configuration from a JSON file.
    ///
    /// If `config_path` is empty, defaults to `"config.json"`.
    /// If the file does not exist, returns a default config and generates a
    /// template file for the default path.
    pub fn load(config_path: &str) -> Result<Self> {
        let path = if config_path.is_empty() {
            "config.json"
        } else {
            config_path
        };

        if !Path::new(path).exists() {
            info!("{path} not found, using defaults");
            let cfg = Self::default();

            if path == "config.json" {
                match cfg.save(path) {
                    Ok(()) => info!("Generated config template: {path}"),
                    Err(e) => warn!("Failed to generate config template: {e}"),
                }
            }

            return Ok(cfg);
        }

        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {path}"))?;

        let cfg: Config = match serde_json::from_str(&data) {
            Ok(c) => c,
            Err(e) => {
                warn!("Invalid JSON in {path}: {e}");
                warn!("Using default configuration");
                return Ok(Self::default());
            }
        };

        info!("Loaded configuration from {path}");
        Ok(cfg)
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &str) -> Result<()> {
        let data = serde_json::to_string_pretty(self).context("failed to marshal config")?;
        std::fs::write(path, data).with_context(|| format!("failed to write config: {path}"))?;
        Ok(())
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.ingest.chunk_size > 0, "ingest.chunk_size must be positive");
        anyhow::ensure!(
            self.ingest.chunk_overlap < self.ingest.chunk_size,
            "ingest.chunk_overlap must be smaller than ingest.chunk_size"
        );
        anyhow::ensure!(self.ingest.batch_size > 0, "ingest.batch_size must be positive");
        anyhow::ensure!(self.ingest.max_workers > 0, "ingest.max_workers must be positive");
        anyhow::ensure!(self.index.top_k > 0, "index.top_k must be positive");
        anyhow::ensure!(
            self.model.dimensions > 0,
            "model.dimensions must be positive"
        );
        Ok(())
    }
}

impl IngestConfig {
    pub fn chunks_path(&self) -> PathBuf {
        Path::new(&self.work_dir).join(&self.chunks_file)
    }

    pub fn progress_path(&self) -> PathBuf {
        Path::new(&self.work_dir).join(&self.progress_file)
    }
}

impl ModelConfig {
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}

// ── Credentials ──────────────────────────────────────────────────────

pub const OPENAI_API_KEY: &str = "OPENAI_API_KEY";
pub const PINECONE_API_KEY: &str = "PINECONE_API_KEY";
pub const PINECONE_ENV: &str = "PINECONE_ENV";
pub const PINECONE_INDEX: &str = "PINECONE_INDEX";
pub const PINECONE_HOST: &str = "PINECONE_HOST";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variables: {}", .0.join(", "))]
    MissingEnv(Vec<&'static str>),
}

/// Secrets needed to reach the hosted services.
#[derive(Clone)]
pub struct Credentials {
    pub openai_api_key: String,
    pub pinecone: Option<PineconeCredentials>,
}

#[derive(Clone)]
pub struct PineconeCredentials {
    pub api_key: String,
    /// Region used when the index has to be created.
    pub environment: String,
    pub index_name: String,
    /// Data-plane host; resolved from the control plane when absent.
    pub host: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("pinecone_index", &self.pinecone.as_ref().map(|p| &p.index_name))
            .finish_non_exhaustive()
    }
}

impl Credentials {
    /// Read credentials from the process environment.
    pub fn from_env(backend: IndexBackend) -> Result<Self, ConfigError> {
        Self::from_lookup(backend, |key| std::env::var(key).ok())
    }

    /// Read credentials through `lookup`, reporting every missing variable at once.
    pub fn from_lookup<F>(backend: IndexBackend, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut missing = Vec::new();
        let mut require = |key: &'static str| -> String {
            match lookup(key).filter(|v| !v.trim().is_empty()) {
                Some(v) => v,
                None => {
                    missing.push(key);
                    String::new()
                }
            }
        };

        let openai_api_key = require(OPENAI_API_KEY);
        let pinecone = match backend {
            IndexBackend::Local => None,
            IndexBackend::Pinecone => Some(PineconeCredentials {
                api_key: require(PINECONE_API_KEY),
                environment: require(PINECONE_ENV),
                index_name: require(PINECONE_INDEX),
                host: None,
            }),
        };

        if !missing.is_empty() {
            return Err(ConfigError::MissingEnv(missing));
        }

        let pinecone = pinecone.map(|mut p| {
            p.host = lookup(PINECONE_HOST).filter(|v| !v.trim().is_empty());
            p
        });

        Ok(Self {
            openai_api_key,
            pinecone,
        })
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.ingest.chunk_size, 2000);
        assert_eq!(config.ingest.chunk_overlap, 300);
        assert_eq!(config.ingest.batch_size, 200);
        assert_eq!(config.ingest.max_workers, 4);
        assert_eq!(config.index.top_k, 4);
        assert_eq!(config.index.backend, IndexBackend::Local);
        assert_eq!(config.model.dimensions, 1536);
        assert_eq!(config.model.chat_model, "gpt-4.1-mini");
        assert!(config.model.request_timeout_secs.is_none());
        assert!(!config.pipeline.sql_lookup);
    }

    #[test]
    fn test_load_from_json() {
        let json = r#"{"db_path": "./test.db", "index": {"backend": "pinecone"}, "ingest": {"chunk_size": 800}}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.db_path, "./test.db");
        assert_eq!(config.index.backend, IndexBackend::Pinecone);
        assert_eq!(config.ingest.chunk_size, 800);
        // Other fields should have defaults
        assert_eq!(config.ingest.chunk_overlap, 300);
        assert_eq!(config.index.top_k, 4);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");
        let config = Config::load(path.to_str().unwrap()).unwrap();
        assert_eq!(config.ingest.chunk_size, 2000);
        // Templates are only generated for the default path
        assert!(!path.exists());
    }

    #[test]
    fn test_load_invalid_json_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();
        let config = Config::load(path.to_str().unwrap()).unwrap();
        assert_eq!(config.bind, "0.0.0.0:5000");
    }

    #[test]
    fn test_validate_ok() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_overlap_too_large() {
        let mut config = Config::default();
        config.ingest.chunk_overlap = config.ingest.chunk_size;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_zero_top_k() {
        let mut config = Config::default();
        config.index.top_k = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_credentials_local_needs_only_openai() {
        let creds =
            Credentials::from_lookup(IndexBackend::Local, env(&[(OPENAI_API_KEY, "sk-test")]))
                .unwrap();
        assert_eq!(creds.openai_api_key, "sk-test");
        assert!(creds.pinecone.is_none());
    }

    #[test]
    fn test_credentials_reports_all_missing() {
        let err = Credentials::from_lookup(
            IndexBackend::Pinecone,
            env(&[(PINECONE_API_KEY, "pc"), (PINECONE_INDEX, "  ")]),
        )
        .unwrap_err();
        assert_eq!(
            err,
            ConfigError::MissingEnv(vec![OPENAI_API_KEY, PINECONE_ENV, PINECONE_INDEX])
        );
        assert!(err.to_string().contains("PINECONE_ENV"));
    }

    #[test]
    fn test_credentials_pinecone_with_host() {
        let creds = Credentials::from_lookup(
            IndexBackend::Pinecone,
            env(&[
                (OPENAI_API_KEY, "sk"),
                (PINECONE_API_KEY, "pc"),
                (PINECONE_ENV, "us-east-1"),
                (PINECONE_INDEX, "manuals"),
                (PINECONE_HOST, "manuals-abc.svc.pinecone.io"),
            ]),
        )
        .unwrap();
        let pc = creds.pinecone.unwrap();
        assert_eq!(pc.index_name, "manuals");
        assert_eq!(pc.environment, "us-east-1");
        assert_eq!(pc.host.as_deref(), Some("manuals-abc.svc.pinecone.io"));
    }

    #[test]
    fn test_serialization_roundtrip() {
        let config = Config::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let parsed: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.ingest.chunk_size, config.ingest.chunk_size);
        assert_eq!(parsed.db_path, config.db_path);
        assert_eq!(parsed.model.chat_model, config.model.chat_model);
    }
}
