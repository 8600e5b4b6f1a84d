use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Paragraph units shorter than this (after trimming) are dropped.
    #[serde(default = "default_min_chars")]
    pub min_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            min_chars: default_min_chars(),
        }
    }
}

fn default_min_chars() -> usize {
    1
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExtractionConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,
    #[serde(default)]
    pub preserve_paragraphs: bool,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_bytes: default_max_bytes(),
            temp_dir: None,
            preserve_paragraphs: false,
        }
    }
}

fn default_max_bytes() -> usize {
    10 * 1024 * 1024
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_embedding_url")]
    pub url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_remote_dims")]
    pub dims: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            api_key_env: default_api_key_env(),
            url: default_embedding_url(),
            model: default_model(),
            dims: default_remote_dims(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_provider() -> String {
    "auto".to_string()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_embedding_url() -> String {
    "https://api.openai.com/v1/embeddings".to_string()
}
fn default_model() -> String {
    "text-embedding-ada-002".to_string()
}
fn default_remote_dims() -> usize {
    1536
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    2
}

impl EmbeddingConfig {
    /// Reads the provider credential from the configured environment variable.
    /// Empty values count as absent.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_limit")]
    pub default_limit: usize,
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default = "default_semantic_weight")]
    pub semantic_weight: f64,
    #[serde(default = "default_min_similarity")]
    pub min_similarity: f64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            mode: default_mode(),
            semantic_weight: default_semantic_weight(),
            min_similarity: default_min_similarity(),
        }
    }
}

fn default_limit() -> usize {
    10
}
fn default_mode() -> String {
    "text".to_string()
}
fn default_semantic_weight() -> f64 {
    0.5
}
fn default_min_similarity() -> f64 {
    0.3
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_chunk_concurrency")]
    pub chunk_concurrency: usize,
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
            chunk_concurrency: default_chunk_concurrency(),
            stale_after_secs: default_stale_after_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

fn default_workers() -> usize {
    2
}
fn default_queue_capacity() -> usize {
    128
}
fn default_chunk_concurrency() -> usize {
    1
}
fn default_stale_after_secs() -> u64 {
    900
}
fn default_sweep_interval_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

impl Config {
    /// All-defaults configuration pointing at the given database path.
    pub fn minimal(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db: DbConfig {
                path: db_path.into(),
            },
            chunking: ChunkingConfig::default(),
            extraction: ExtractionConfig::default(),
            embedding: EmbeddingConfig::default(),
            retrieval: RetrievalConfig::default(),
            pipeline: PipelineConfig::default(),
            server: ServerConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunking.min_chars == 0 {
            anyhow::bail!("chunking.min_chars must be >= 1");
        }

        if self.extraction.timeout_secs == 0 {
            anyhow::bail!("extraction.timeout_secs must be > 0");
        }
        if self.extraction.max_bytes == 0 {
            anyhow::bail!("extraction.max_bytes must be > 0");
        }

        match self.embedding.provider.as_str() {
            "auto" | "remote" | "fallback" => {}
            other => anyhow::bail!(
                "Unknown embedding provider: '{}'. Must be auto, remote, or fallback.",
                other
            ),
        }
        if self.embedding.dims == 0 {
            anyhow::bail!("embedding.dims must be > 0");
        }
        if self.embedding.timeout_secs == 0 {
            anyhow::bail!("embedding.timeout_secs must be > 0");
        }

        match self.retrieval.mode.as_str() {
            "text" | "hybrid" => {}
            other => anyhow::bail!(
                "Unknown retrieval mode: '{}'. Must be text or hybrid.",
                other
            ),
        }
        if self.retrieval.default_limit == 0 {
            anyhow::bail!("retrieval.default_limit must be >= 1");
        }
        if self.retrieval.semantic_weight < 0.0 {
            anyhow::bail!("retrieval.semantic_weight must be >= 0.0");
        }
        if !(0.0..=1.0).contains(&self.retrieval.min_similarity) {
            anyhow::bail!("retrieval.min_similarity must be in [0.0, 1.0]");
        }

        if self.pipeline.workers == 0 {
            anyhow::bail!("pipeline.workers must be >= 1");
        }
        if self.pipeline.queue_capacity == 0 {
            anyhow::bail!("pipeline.queue_capacity must be >= 1");
        }
        if self.pipeline.chunk_concurrency == 0 {
            anyhow::bail!("pipeline.chunk_concurrency must be >= 1");
        }
        if self.pipeline.sweep_interval_secs == 0 {
            anyhow::bail!("pipeline.sweep_interval_secs must be >= 1");
        }

        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_is_valid() {
        let cfg = Config::minimal("/tmp/legally.sqlite");
        cfg.validate().unwrap();
        assert_eq!(cfg.retrieval.default_limit, 10);
        assert_eq!(cfg.embedding.timeout_secs, 30);
        assert_eq!(cfg.extraction.timeout_secs, 30);
        assert_eq!(cfg.pipeline.chunk_concurrency, 1);
    }

    #[test]
    fn test_parse_defaults_from_db_only() {
        let cfg: Config = toml::from_str("[db]\npath = \"./data/legally.sqlite\"\n").unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.embedding.provider, "auto");
        assert_eq!(cfg.retrieval.mode, "text");
        assert_eq!(cfg.server.bind, "127.0.0.1:8080");
    }

    #[test]
    fn test_rejects_unknown_provider() {
        let cfg: Config = toml::from_str(
            "[db]\npath = \"x.sqlite\"\n[embedding]\nprovider = \"magic\"\n",
        )
        .unwrap();
        let err = cfg.validate().unwrap_err().to_string();
        assert!(err.contains("Unknown embedding provider"));
    }

    #[test]
    fn test_rejects_zero_workers() {
        let mut cfg = Config::minimal("x.sqlite");
        cfg.pipeline.workers = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_mode() {
        let mut cfg = Config::minimal("x.sqlite");
        cfg.retrieval.mode = "vector".to_string();
        assert!(cfg.validate().is_err());
    }
}
