use ragline::cli::{Cli, Commands, ConfigAction};
use ragline::config::{expand_path, Config};
use ragline::dataset::Dataset;
use ragline::embedding::FastEmbedProvider;
use ragline::error::{Result, RetrievalError};
use ragline::generation::{
    ContextAssembler, Generator, HfTokenCounter, InstructionKey, OllamaGenerator, TokenCounter,
    WhitespaceTokenCounter,
};
use ragline::pipeline::{Pipeline, QueryOutcome, QueryRequest, SearchMethod, SearchResponse};
use ragline::resources::ResourceRegistry;
use ragline::storage::{ArtifactLoader, DocumentStore, SqliteDocumentStore};
use ragline::text::StopwordNormalizer;
use std::path::PathBuf;
use std::sync::Arc;

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse_args();

    // Initialize logging
    init_logging(cli.verbose);

    // Handle commands
    match cli.command {
        Commands::Query {
            query,
            dataset,
            method,
            top_n,
            instruction,
            json,
        } => {
            let mut request = QueryRequest::new(query, dataset, method)
                .with_instruction(InstructionKey::from(instruction.as_str()));
            request.top_n = top_n;
            cmd_query(cli.config, &request, json)?;
        }
        Commands::Document { doc_id, dataset } => {
            cmd_document(cli.config, dataset, &doc_id)?;
        }
        Commands::Config { action } => {
            cmd_config(cli.config, action)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_level = if verbose { "ragline=debug" } else { "ragline=info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn cmd_query(config_path: Option<PathBuf>, request: &QueryRequest, json: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let pipeline = build_pipeline(&config, request.method)?;

    let outcome = pipeline.run(request)?;

    if json {
        let json = serde_json::to_string_pretty(&outcome).map_err(|e| RetrievalError::Json {
            source: e,
            context: "Failed to serialize query outcome".to_string(),
        })?;
        println!("{}", json);
    } else {
        print_outcome(&outcome);
    }

    Ok(())
}

fn cmd_document(config_path: Option<PathBuf>, dataset: Dataset, doc_id: &str) -> Result<()> {
    let config = load_config(config_path)?;
    let store = open_document_store(&config)?;

    match store.get_document(dataset, doc_id)? {
        Some(text) => {
            println!("{}", text);
            Ok(())
        }
        None => Err(RetrievalError::configuration(format!(
            "Document '{}' not found in dataset '{}'",
            doc_id, dataset
        ))),
    }
}

fn cmd_config(config_path: Option<PathBuf>, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(config_path)?;
            let json = serde_json::to_string_pretty(&config).map_err(|e| RetrievalError::Json {
                source: e,
                context: "Failed to serialize config".to_string(),
            })?;
            println!("{}", json);
        }
        ConfigAction::Validate { file } => {
            let path = match file.or(config_path) {
                Some(path) => path,
                None => Config::default_path()?,
            };
            let config = Config::load(&path)?;
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
        }
        ConfigAction::Init { force } => {
            let path = match config_path {
                Some(path) => path,
                None => Config::default_path()?,
            };

            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }

            // Create parent directory
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| RetrievalError::Io {
                    source: e,
                    context: format!("Failed to create config directory: {:?}", parent),
                })?;
            }

            let config = Config::default();
            config.save(&path)?;

            println!("✓ Configuration initialized at: {}", path.display());
            println!(
                "  Place {} and the artifact directories under {}",
                config.storage.database,
                config.storage.data_dir.display()
            );
        }
    }

    Ok(())
}

fn load_config(config_path: Option<PathBuf>) -> Result<Config> {
    let path = match config_path {
        Some(path) => path,
        None => Config::default_path()?,
    };

    if !path.exists() {
        tracing::warn!(
            "Config file not found, using defaults. Run 'ragline config init' to create one."
        );
        let mut config = Config::default();
        config.apply_env_overrides();
        return Ok(config);
    }

    Config::load(&path)
}

fn open_document_store(config: &Config) -> Result<SqliteDocumentStore> {
    SqliteDocumentStore::open(&config.database_path()?, config.table_specs()?)
}

/// Wire the configured collaborators into a pipeline
///
/// The generation backend is only contacted by generating methods.
fn build_pipeline(config: &Config, method: SearchMethod) -> Result<Pipeline> {
    let store = Arc::new(open_document_store(config)?);
    let loader = Arc::new(ArtifactLoader::new(
        config.artifact_layout()?,
        config.hnsw_params(),
    ));
    let registry = Arc::new(ResourceRegistry::new(loader, store));

    let normalizer = Arc::new(StopwordNormalizer::new()?);
    // Loaded on the first query embedding; sparse search never needs it
    let embedder = Arc::new(FastEmbedProvider::lazy(
        &config.embedding.model,
        config.embedding.batch_size,
    )?);

    let counter: Arc<dyn TokenCounter> = match &config.generation.tokenizer_file {
        Some(path) => Arc::new(HfTokenCounter::from_file(&expand_path(path)?)?),
        None => Arc::new(WhitespaceTokenCounter),
    };

    let generator: Option<Arc<dyn Generator>> = if config.generation.enabled && method.is_generative()
    {
        let generator = OllamaGenerator::new(config.ollama_settings())
            .map_err(|e| RetrievalError::configuration(e.to_string()))?;
        Some(Arc::new(generator) as Arc<dyn Generator>)
    } else {
        None
    };

    Ok(Pipeline::new(
        registry,
        normalizer,
        embedder,
        ContextAssembler::new(counter),
        generator,
        config.pipeline_settings(),
    ))
}

fn print_outcome(outcome: &QueryOutcome) {
    println!(
        "{} on {} for \"{}\" ({} ms)",
        outcome.method, outcome.dataset, outcome.query, outcome.elapsed_ms
    );

    match &outcome.response {
        SearchResponse::Ranked { results } => {
            if results.is_empty() {
                println!("\nNo results");
                return;
            }
            for (rank, result) in results.iter().enumerate() {
                println!("\n{:>3}. {}  (score {:.4})", rank + 1, result.doc_id, result.score);
                if !result.snippet.is_empty() {
                    println!("     {}", result.snippet.replace('\n', " "));
                }
            }
        }
        SearchResponse::Generated(generation) => {
            println!("\n{}", generation.generated_text);
            if !generation.retrieved_context.is_empty() {
                println!(
                    "\nContext ({} of {} in prompt):",
                    generation.included_in_prompt,
                    generation.retrieved_context.len()
                );
                for chunk in &generation.retrieved_context {
                    println!("  - {}  (score {:.4})", chunk.doc_id, chunk.score);
                }
            }
        }
    }
}
