//! Configuration management for ragline
//!
//! A single TOML file describes where the document database and precomputed
//! artifacts live, the embedding model, the retrieval depths of each pipeline
//! stage and the generation backend. Every value has a default, so a missing
//! file still yields a working configuration for the default layout.

use crate::dataset::Dataset;
use crate::embedding::HnswParams;
use crate::error::{Result, RetrievalError};
use crate::generation::OllamaSettings;
use crate::pipeline::PipelineSettings;
use crate::storage::{ArtifactLayout, TableSpec};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

mod validator;

pub use crate::embedding::EmbeddingConfig;
pub use validator::ConfigValidator;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "_meta")]
    pub meta: MetaConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub datasets: BTreeMap<String, DatasetConfig>,
    #[serde(default)]
    pub artifacts: ArtifactsConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub indexing: IndexingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
}

/// Metadata about the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
    #[serde(default = "current_timestamp")]
    pub created_at: String,
    #[serde(default = "current_timestamp")]
    pub last_modified: String,
}

fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root of the database and artifact directories
    pub data_dir: PathBuf,
    /// Document database file, relative to `data_dir`
    pub database: String,
}

/// Per-dataset document table overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatasetConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_column: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_column: Option<String>,
}

/// Artifact directory names under `data_dir`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactsConfig {
    pub sparse_dir: String,
    pub dense_dir: String,
    pub ann_dir: String,
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            sparse_dir: "TF_IDF".to_string(),
            dense_dir: "Embedding".to_string(),
            ann_dir: "ANN_Indices".to_string(),
        }
    }
}

/// Chunk index construction parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingConfig {
    pub hnsw_m: usize,
    pub hnsw_ef_construction: usize,
    pub hnsw_ef_search: usize,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        let params = HnswParams::default();
        Self {
            hnsw_m: params.m,
            hnsw_ef_construction: params.ef_construction,
            hnsw_ef_search: params.ef_search,
        }
    }
}

/// Retrieval depths of each pipeline stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    pub top_n: usize,
    pub hybrid_sparse_candidates: usize,
    pub hybrid_ann_candidates: usize,
    pub top_k_chunks: usize,
    pub top_k_context: usize,
    pub ann_top_k: usize,
    pub ann_similarity_threshold: f32,
    pub snippet_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        let settings = PipelineSettings::default();
        Self {
            top_n: settings.top_n,
            hybrid_sparse_candidates: settings.hybrid_sparse_candidates,
            hybrid_ann_candidates: settings.hybrid_ann_candidates,
            top_k_chunks: settings.top_k_chunks,
            top_k_context: settings.top_k_context,
            ann_top_k: settings.ann_top_k,
            ann_similarity_threshold: settings.ann_similarity_threshold,
            snippet_chars: settings.snippet_chars,
        }
    }
}

/// Generation backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub enabled: bool,
    pub provider: String,
    pub endpoint: String,
    pub model: String,
    pub max_context_tokens: usize,
    pub max_new_tokens: usize,
    pub temperature: f32,
    pub top_p: f32,
    pub timeout_secs: u64,
    /// `tokenizer.json` of the generation model; word counts are used without it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokenizer_file: Option<PathBuf>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: "ollama".to_string(),
            endpoint: "http://localhost:11434".to_string(),
            model: "llama3.2".to_string(),
            max_context_tokens: 512,
            max_new_tokens: 150,
            temperature: 0.7,
            top_p: 0.9,
            timeout_secs: 120,
            tokenizer_file: None,
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(RetrievalError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| RetrievalError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let mut config: Config = toml::from_str(&content)?;

        // Apply environment variable overrides
        config.apply_env_overrides();

        // Validate configuration
        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| RetrievalError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Apply environment variable overrides
    /// Environment variables in format: RAGLINE_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        for (key, value) in std::env::vars() {
            if let Some(config_key) = key.strip_prefix("RAGLINE_") {
                if let Err(e) = self.set_value_from_env(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        match path {
            "STORAGE__DATA_DIR" => self.storage.data_dir = PathBuf::from(value),
            "STORAGE__DATABASE" => self.storage.database = value.to_string(),
            "EMBEDDING__MODEL" => self.embedding.model = value.to_string(),
            "RETRIEVAL__TOP_N" => self.retrieval.top_n = parse_value(path, value)?,
            "RETRIEVAL__ANN_SIMILARITY_THRESHOLD" => {
                self.retrieval.ann_similarity_threshold = parse_value(path, value)?
            }
            "GENERATION__ENABLED" => self.generation.enabled = parse_value(path, value)?,
            "GENERATION__ENDPOINT" => self.generation.endpoint = value.to_string(),
            "GENERATION__MODEL" => self.generation.model = value.to_string(),
            "GENERATION__TOKENIZER_FILE" => {
                self.generation.tokenizer_file = Some(PathBuf::from(value))
            }
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| RetrievalError::configuration("Cannot determine config directory"))?;

        Ok(config_dir.join("ragline").join("config.toml"))
    }

    /// Data directory with `~` expanded
    pub fn data_dir(&self) -> Result<PathBuf> {
        expand_path(&self.storage.data_dir)
    }

    pub fn database_path(&self) -> Result<PathBuf> {
        Ok(self.data_dir()?.join(&self.storage.database))
    }

    /// Table layout for every dataset, defaults merged with overrides
    pub fn table_specs(&self) -> Result<HashMap<Dataset, TableSpec>> {
        let mut specs: HashMap<Dataset, TableSpec> = Dataset::ALL
            .iter()
            .map(|&dataset| (dataset, TableSpec::for_dataset(dataset)))
            .collect();

        for (name, overrides) in &self.datasets {
            let dataset: Dataset = name.parse()?;
            if let Some(spec) = specs.get_mut(&dataset) {
                if let Some(table) = &overrides.table {
                    spec.table = table.clone();
                }
                if let Some(id_column) = &overrides.id_column {
                    spec.id_column = id_column.clone();
                }
                if let Some(text_column) = &overrides.text_column {
                    spec.text_column = text_column.clone();
                }
            }
        }

        Ok(specs)
    }

    pub fn artifact_layout(&self) -> Result<ArtifactLayout> {
        Ok(ArtifactLayout {
            data_dir: self.data_dir()?,
            sparse_dir: self.artifacts.sparse_dir.clone(),
            dense_dir: self.artifacts.dense_dir.clone(),
            ann_dir: self.artifacts.ann_dir.clone(),
        })
    }

    pub fn hnsw_params(&self) -> HnswParams {
        HnswParams {
            m: self.indexing.hnsw_m,
            ef_construction: self.indexing.hnsw_ef_construction,
            ef_search: self.indexing.hnsw_ef_search,
        }
    }

    pub fn ollama_settings(&self) -> OllamaSettings {
        OllamaSettings {
            endpoint: self.generation.endpoint.clone(),
            model: self.generation.model.clone(),
            temperature: self.generation.temperature,
            top_p: self.generation.top_p,
            timeout: Duration::from_secs(self.generation.timeout_secs),
        }
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        let r = &self.retrieval;
        PipelineSettings {
            top_n: r.top_n,
            hybrid_sparse_candidates: r.hybrid_sparse_candidates,
            hybrid_ann_candidates: r.hybrid_ann_candidates,
            top_k_chunks: r.top_k_chunks,
            top_k_context: r.top_k_context,
            ann_top_k: r.ann_top_k,
            ann_similarity_threshold: r.ann_similarity_threshold,
            snippet_chars: r.snippet_chars,
            max_context_tokens: self.generation.max_context_tokens,
            max_new_tokens: self.generation.max_new_tokens,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            meta: MetaConfig {
                schema_version: "1.0.0".to_string(),
                created_at: current_timestamp(),
                last_modified: current_timestamp(),
            },
            storage: StorageConfig {
                data_dir: PathBuf::from("~/.ragline"),
                database: "IR_project.db".to_string(),
            },
            datasets: BTreeMap::new(),
            artifacts: ArtifactsConfig::default(),
            embedding: EmbeddingConfig::default(),
            indexing: IndexingConfig::default(),
            retrieval: RetrievalConfig::default(),
            generation: GenerationConfig::default(),
        }
    }
}

fn parse_value<T: std::str::FromStr>(path: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| RetrievalError::InvalidConfigValue {
            path: path.to_string(),
            message: format!("Cannot parse '{}'", value),
        })
}

/// Expand a leading `~/` to the home directory
pub fn expand_path(path: &Path) -> Result<PathBuf> {
    let path_str = path
        .to_str()
        .ok_or_else(|| RetrievalError::configuration("Invalid path encoding"))?;

    if let Some(stripped) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| RetrievalError::configuration("Cannot determine home directory"))?;
        Ok(home.join(stripped))
    } else {
        Ok(path.to_path_buf())
    }
}
