//! CLI configuration.

use anyhow::{bail, Result};
use reactmap_types::DistanceMetric;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable that overrides `db_path` from the config file.
pub const DB_PATH_ENV: &str = "REACTMAP_DB_PATH";

/// Name of the multilingual sentence model used by the fastembed backend.
pub const DEFAULT_EMBEDDING_MODEL: &str = "paraphrase-multilingual-MiniLM-L12-v2";

/// Which embedding backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbedderKind {
    /// Multilingual sentence embeddings (needs the `fastembed` feature).
    Fastembed,
    /// Deterministic hash vectors, no semantic signal.
    Hashed,
}

impl Default for EmbedderKind {
    fn default() -> Self {
        if cfg!(feature = "fastembed") {
            EmbedderKind::Fastembed
        } else {
            EmbedderKind::Hashed
        }
    }
}

impl std::str::FromStr for EmbedderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fastembed" => Ok(EmbedderKind::Fastembed),
            "hashed" => Ok(EmbedderKind::Hashed),
            _ => Err(format!("Invalid embedder: '{}'. Use 'fastembed' or 'hashed'.", s)),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    #[serde(default = "default_models_dir")]
    pub models_dir: PathBuf,
    #[serde(default)]
    pub embedder: EmbedderKind,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_hashed_dimension")]
    pub hashed_dimension: usize,
    #[serde(default)]
    pub clustering: ClusteringConfig,
}

/// `[clustering]` table: defaults for the `cluster` command.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ClusteringConfig {
    pub text_weight: f64,
    pub behavior_weight: f64,
    /// Kept as a string so an unknown name is reported by the engine.
    pub algorithm: String,
    pub min_cluster_size: usize,
    pub min_samples: usize,
    pub cluster_selection_epsilon: f64,
    pub metric: DistanceMetric,
    pub n_clusters: usize,
    pub seed: Option<u64>,
    pub output: PathBuf,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            text_weight: 0.5,
            behavior_weight: 0.5,
            algorithm: "hdbscan".to_string(),
            min_cluster_size: 2,
            min_samples: 1,
            cluster_selection_epsilon: 0.0,
            metric: DistanceMetric::Euclidean,
            n_clusters: 5,
            seed: Some(42),
            output: PathBuf::from("output/clusters.json"),
        }
    }
}

fn default_db_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("reactmap")
        .join("reactmap.db")
}

fn default_models_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("reactmap")
        .join("models")
}

fn default_embedding_model() -> String {
    DEFAULT_EMBEDDING_MODEL.to_string()
}

fn default_hashed_dimension() -> usize {
    384
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            models_dir: default_models_dir(),
            embedder: EmbedderKind::default(),
            embedding_model: default_embedding_model(),
            hashed_dimension: default_hashed_dimension(),
            clustering: ClusteringConfig::default(),
        }
    }
}

impl Config {
    /// Load config from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load config from default location (config/reactmap.toml) or fall back to defaults.
    pub fn load() -> Result<Self> {
        let config_path = PathBuf::from("config/reactmap.toml");
        if config_path.exists() {
            return Self::load_from(&config_path);
        }
        Ok(Config::default())
    }

    /// Apply `REACTMAP_DB_PATH` if it is set and non-empty.
    pub fn apply_env(&mut self) {
        self.apply_db_path_override(std::env::var(DB_PATH_ENV).ok());
    }

    fn apply_db_path_override(&mut self, value: Option<String>) {
        if let Some(path) = value.filter(|v| !v.trim().is_empty()) {
            self.db_path = PathBuf::from(path);
        }
    }

    /// Checks that do not depend on the database.
    pub fn validate(&self) -> Result<()> {
        if self.hashed_dimension == 0 {
            bail!("hashed_dimension must be at least 1");
        }
        if self.embedder == EmbedderKind::Fastembed && self.embedding_model != DEFAULT_EMBEDDING_MODEL {
            bail!(
                "Unsupported embedding model '{}'. Only '{}' is available.",
                self.embedding_model,
                DEFAULT_EMBEDDING_MODEL
            );
        }
        Ok(())
    }
}
