use crate::config::Config;
use crate::dataset::Dataset;
use crate::error::{Result, RetrievalError, ValidationError};

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration, collecting every problem
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_storage(config, &mut errors);
        Self::validate_datasets(config, &mut errors);
        Self::validate_embedding(config, &mut errors);
        Self::validate_indexing(config, &mut errors);
        Self::validate_retrieval(config, &mut errors);
        Self::validate_generation(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(RetrievalError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != "1.0.0" {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_storage(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.storage.data_dir.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "storage.data_dir",
                "Data directory cannot be empty",
            ));
        }

        if config.storage.database.trim().is_empty() {
            errors.push(ValidationError::new(
                "storage.database",
                "Database file name cannot be empty",
            ));
        }

        let artifacts = &config.artifacts;
        for (key, dir) in [
            ("artifacts.sparse_dir", &artifacts.sparse_dir),
            ("artifacts.dense_dir", &artifacts.dense_dir),
            ("artifacts.ann_dir", &artifacts.ann_dir),
        ] {
            if dir.trim().is_empty() {
                errors.push(ValidationError::new(key, "Directory name cannot be empty"));
            }
        }
    }

    fn validate_datasets(config: &Config, errors: &mut Vec<ValidationError>) {
        for (name, overrides) in &config.datasets {
            if name.parse::<Dataset>().is_err() {
                errors.push(ValidationError::new(
                    format!("datasets.{}", name),
                    format!("Unknown dataset '{}'", name),
                ));
                continue;
            }

            for (field, value) in [
                ("table", &overrides.table),
                ("id_column", &overrides.id_column),
                ("text_column", &overrides.text_column),
            ] {
                if let Some(value) = value {
                    if !is_identifier(value) {
                        errors.push(ValidationError::new(
                            format!("datasets.{}.{}", name, field),
                            format!("'{}' is not a valid SQL identifier", value),
                        ));
                    }
                }
            }
        }
    }

    fn validate_embedding(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.embedding.batch_size == 0 {
            errors.push(ValidationError::new(
                "embedding.batch_size",
                "Batch size must be greater than 0",
            ));
        }

        if config.embedding.model.is_empty() {
            errors.push(ValidationError::new(
                "embedding.model",
                "Model name cannot be empty",
            ));
        }
    }

    fn validate_indexing(config: &Config, errors: &mut Vec<ValidationError>) {
        let indexing = &config.indexing;
        for (key, value) in [
            ("indexing.hnsw_m", indexing.hnsw_m),
            ("indexing.hnsw_ef_construction", indexing.hnsw_ef_construction),
            ("indexing.hnsw_ef_search", indexing.hnsw_ef_search),
        ] {
            if value == 0 {
                errors.push(ValidationError::new(key, "Must be greater than 0"));
            }
        }
    }

    fn validate_retrieval(config: &Config, errors: &mut Vec<ValidationError>) {
        let r = &config.retrieval;
        for (key, value) in [
            ("retrieval.top_n", r.top_n),
            ("retrieval.hybrid_sparse_candidates", r.hybrid_sparse_candidates),
            ("retrieval.hybrid_ann_candidates", r.hybrid_ann_candidates),
            ("retrieval.top_k_chunks", r.top_k_chunks),
            ("retrieval.top_k_context", r.top_k_context),
            ("retrieval.ann_top_k", r.ann_top_k),
            ("retrieval.snippet_chars", r.snippet_chars),
        ] {
            if value == 0 {
                errors.push(ValidationError::new(key, "Must be greater than 0"));
            }
        }

        if r.hybrid_sparse_candidates < r.top_n {
            errors.push(ValidationError::new(
                "retrieval.hybrid_sparse_candidates",
                format!(
                    "Sparse candidates ({}) must be at least top_n ({})",
                    r.hybrid_sparse_candidates, r.top_n
                ),
            ));
        }

        let threshold = r.ann_similarity_threshold;
        if !(-1.0..=1.0).contains(&threshold) {
            errors.push(ValidationError::new(
                "retrieval.ann_similarity_threshold",
                format!("Threshold must be between -1.0 and 1.0, got {}", threshold),
            ));
        }
    }

    fn validate_generation(config: &Config, errors: &mut Vec<ValidationError>) {
        let g = &config.generation;

        let valid_providers = ["ollama"];
        if !valid_providers.contains(&g.provider.as_str()) {
            errors.push(ValidationError::new(
                "generation.provider",
                format!(
                    "Provider must be one of {:?}, got '{}'",
                    valid_providers, g.provider
                ),
            ));
        }

        if g.model.is_empty() {
            errors.push(ValidationError::new(
                "generation.model",
                "Model name cannot be empty",
            ));
        }

        if g.enabled && g.endpoint.trim().is_empty() {
            errors.push(ValidationError::new(
                "generation.endpoint",
                "Endpoint is required when generation is enabled",
            ));
        }

        // The packer always reserves a 50 token safety margin
        if g.max_context_tokens <= 50 {
            errors.push(ValidationError::new(
                "generation.max_context_tokens",
                format!("Must be greater than 50, got {}", g.max_context_tokens),
            ));
        }

        if g.max_new_tokens == 0 {
            errors.push(ValidationError::new(
                "generation.max_new_tokens",
                "Must be greater than 0",
            ));
        }

        if !(0.0..=2.0).contains(&g.temperature) {
            errors.push(ValidationError::new(
                "generation.temperature",
                format!("Temperature must be between 0.0 and 2.0, got {}", g.temperature),
            ));
        }

        if !(g.top_p > 0.0 && g.top_p <= 1.0) {
            errors.push(ValidationError::new(
                "generation.top_p",
                format!("top_p must be in (0.0, 1.0], got {}", g.top_p),
            ));
        }

        if g.timeout_secs == 0 {
            errors.push(ValidationError::new(
                "generation.timeout_secs",
                "Timeout must be greater than 0",
            ));
        }
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}
