//! Pipeline over a SQLite document store and on-disk artifacts

use ragline::config::Config;
use ragline::dataset::Dataset;
use ragline::embedding::{CsrMatrix, EmbeddingProvider, HnswParams};
use ragline::generation::{ContextAssembler, InstructionKey, WhitespaceTokenCounter};
use ragline::pipeline::{Pipeline, PipelineSettings};
use ragline::resources::{ChunkRecord, ResourceKind, ResourceRegistry};
use ragline::storage::{
    doc_ids_fingerprint, ArtifactLayout, ArtifactLoader, MatrixArtifact, SqliteDocumentStore,
    TableSpec, VectorArtifact,
};
use ragline::testing::{fit_tfidf, KeywordEmbedder, ScriptedGenerator};
use ragline::text::{StopwordNormalizer, TextNormalizer};
use ragline::RetrievalError;
use rusqlite::{params, Connection};
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

const DOCUMENTS: [(&str, &str); 4] = [
    ("q1", "How do solar panels turn sunlight into electricity for a house?"),
    ("q2", "Wind turbines spin a generator and feed electricity into the grid."),
    ("q3", "Home batteries store surplus solar electricity for use at night."),
    ("q4", "Boil pasta in salted water for about ten minutes."),
];

const CHUNKS: [(&str, &str); 5] = [
    ("q1", "solar panels turn sunlight into electricity"),
    ("q2", "wind turbines spin a generator"),
    ("q2", "generators feed electricity into the grid"),
    ("q3", "home batteries store surplus solar electricity"),
    ("q4", "boil pasta in salted water"),
];

fn write_json(path: &Path, value: &impl Serialize, compress: bool) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    let bytes = serde_json::to_vec(value).unwrap();
    if compress {
        let mut name = path.as_os_str().to_owned();
        name.push(".zst");
        std::fs::write(name, zstd::encode_all(&bytes[..], 3).unwrap()).unwrap();
    } else {
        std::fs::write(path, bytes).unwrap();
    }
}

fn matrix_artifact(matrix: &CsrMatrix, fingerprint: Option<String>) -> MatrixArtifact {
    let mut data = Vec::new();
    let mut indices = Vec::new();
    let mut indptr = vec![0];
    for row in 0..matrix.rows() {
        let (cols, values) = matrix.row(row);
        indices.extend_from_slice(cols);
        data.extend_from_slice(values);
        indptr.push(data.len());
    }
    MatrixArtifact {
        shape: [matrix.rows(), matrix.cols()],
        data,
        indices,
        indptr,
        doc_ids_fingerprint: fingerprint,
    }
}

fn vector_artifact(embedder: &KeywordEmbedder, texts: &[&str]) -> VectorArtifact {
    VectorArtifact {
        dimension: embedder.dimension(),
        vectors: texts.iter().map(|t| embedder.embed(t).unwrap()).collect(),
    }
}

struct Corpus {
    _dir: TempDir,
    layout: ArtifactLayout,
    db_path: std::path::PathBuf,
    embedder: Arc<KeywordEmbedder>,
}

/// Write the antique dataset: a database plus every artifact kind
fn write_corpus(fingerprint: impl Fn(&[String]) -> Option<String>) -> Corpus {
    let dir = TempDir::new().unwrap();
    let layout = ArtifactLayout::new(dir.path());
    let dataset = Dataset::Antique;

    let db_path = dir.path().join("IR_project.db");
    let conn = Connection::open(&db_path).unwrap();
    conn.execute_batch("CREATE TABLE cleaned_antique (id TEXT PRIMARY KEY, text TEXT NOT NULL);")
        .unwrap();
    for (id, text) in DOCUMENTS {
        conn.execute(
            "INSERT INTO cleaned_antique (id, text) VALUES (?1, ?2)",
            params![id, text],
        )
        .unwrap();
    }
    drop(conn);

    let normalizer = StopwordNormalizer::new().unwrap();
    let ids: Vec<String> = DOCUMENTS.iter().map(|(id, _)| id.to_string()).collect();
    let normalized: Vec<String> = DOCUMENTS
        .iter()
        .map(|(_, text)| normalizer.normalize(text))
        .collect();
    let (vectorizer, matrix) = fit_tfidf(&normalized);
    write_json(&layout.vectorizer(dataset), &vectorizer, false);
    write_json(
        &layout.matrix(dataset),
        &matrix_artifact(&matrix, fingerprint(&ids)),
        true,
    );

    let embedder = KeywordEmbedder::from_corpus(
        DOCUMENTS
            .iter()
            .map(|(_, text)| *text)
            .chain(CHUNKS.iter().map(|(_, text)| *text)),
    )
    .unwrap();
    let doc_texts: Vec<&str> = DOCUMENTS.iter().map(|(_, text)| *text).collect();
    write_json(
        &layout.embeddings(dataset),
        &vector_artifact(&embedder, &doc_texts),
        true,
    );
    write_json(&layout.embedding_ids(dataset), &ids, false);

    let chunk_texts: Vec<&str> = CHUNKS.iter().map(|(_, text)| *text).collect();
    let metadata: Vec<ChunkRecord> = CHUNKS
        .iter()
        .map(|(doc_id, text)| ChunkRecord {
            doc_id: doc_id.to_string(),
            text: text.to_string(),
        })
        .collect();
    write_json(
        &layout.ann_vectors(dataset),
        &vector_artifact(&embedder, &chunk_texts),
        false,
    );
    write_json(&layout.ann_metadata(dataset), &metadata, true);

    Corpus {
        _dir: dir,
        layout,
        db_path,
        embedder: Arc::new(embedder),
    }
}

fn pipeline(corpus: &Corpus, generator: Option<Arc<ScriptedGenerator>>) -> Pipeline {
    let tables: HashMap<Dataset, TableSpec> = Dataset::ALL
        .iter()
        .map(|&d| (d, TableSpec::for_dataset(d)))
        .collect();
    let store = Arc::new(SqliteDocumentStore::open(&corpus.db_path, tables).unwrap());
    let loader = Arc::new(ArtifactLoader::new(
        corpus.layout.clone(),
        HnswParams::default(),
    ));
    let registry = Arc::new(ResourceRegistry::new(loader, store));

    Pipeline::new(
        registry,
        Arc::new(StopwordNormalizer::new().unwrap()),
        corpus.embedder.clone(),
        ContextAssembler::new(Arc::new(WhitespaceTokenCounter)),
        generator.map(|g| g as Arc<dyn ragline::generation::Generator>),
        PipelineSettings::default(),
    )
}

#[test]
fn test_hybrid_search_over_disk_artifacts() {
    let corpus = write_corpus(|ids| Some(doc_ids_fingerprint(ids)));
    let pipeline = pipeline(&corpus, None);

    let results = pipeline
        .hybrid("solar electricity", Dataset::Antique, 2)
        .unwrap();
    let ids: Vec<&str> = results.iter().map(|r| r.doc_id.as_str()).collect();
    assert_eq!(ids, vec!["q1", "q3"]);
    assert_eq!(results[0].snippet, DOCUMENTS[0].1);
    assert_eq!(results[1].snippet, DOCUMENTS[2].1);
    assert!(pipeline
        .registry()
        .is_loaded(Dataset::Antique, ResourceKind::Dense));
}

#[test]
fn test_chunk_methods_over_disk_artifacts() {
    let corpus = write_corpus(|_| None);
    let pipeline = pipeline(&corpus, None);

    let chunks = pipeline
        .hybrid_ann("wind generator", Dataset::Antique, 10)
        .unwrap();
    assert_eq!(chunks[0].doc_id, "q2");
    assert_eq!(chunks[0].snippet, "wind turbines spin a generator");

    let ann = pipeline.ann("boil pasta water", Dataset::Antique, 5).unwrap();
    assert_eq!(ann.len(), 1);
    assert_eq!(ann[0].doc_id, "q4");
}

#[test]
fn test_generation_reads_documents_from_sqlite() {
    let corpus = write_corpus(|_| None);
    let generator = Arc::new(ScriptedGenerator::replying("Panels and batteries."));
    let pipeline = pipeline(&corpus, Some(generator.clone()));

    let result = pipeline
        .hybrid_generate("solar electricity", Dataset::Antique, 2, InstructionKey::Comparative)
        .unwrap();
    assert_eq!(result.generated_text, "Panels and batteries.");

    let prompt = &generator.prompts()[0];
    assert!(prompt.contains(&format!("Document (ID: q3): {}", DOCUMENTS[2].1)));
    assert!(prompt.starts_with(InstructionKey::Comparative.instruction()));
}

#[test]
fn test_document_order_change_is_detected() {
    let corpus = write_corpus(|ids| {
        let mut reversed = ids.to_vec();
        reversed.reverse();
        Some(doc_ids_fingerprint(&reversed))
    });
    let pipeline = pipeline(&corpus, None);

    assert!(matches!(
        pipeline.sparse("solar", Dataset::Antique, 3),
        Err(RetrievalError::Configuration(_))
    ));
}

#[test]
fn test_missing_dataset_artifacts() {
    let corpus = write_corpus(|_| None);
    let pipeline = pipeline(&corpus, None);

    assert!(matches!(
        pipeline.sparse("solar", Dataset::Webis, 3),
        Err(RetrievalError::ResourceUnavailable {
            resource: ResourceKind::Sparse,
            ..
        })
    ));
    assert_eq!(
        pipeline.get_document(Dataset::Antique, "q4").unwrap().as_deref(),
        Some(DOCUMENTS[3].1)
    );
}

#[test]
fn test_config_points_at_corpus() {
    let corpus = write_corpus(|_| None);
    let config_path = corpus.layout.data_dir.join("config.toml");

    let mut config = Config::default();
    config.storage.data_dir = corpus.layout.data_dir.clone();
    config.save(&config_path).unwrap();

    let loaded = Config::load(&config_path).unwrap();
    assert_eq!(loaded.database_path().unwrap(), corpus.db_path);
    assert_eq!(
        loaded.artifact_layout().unwrap().matrix(Dataset::Antique),
        corpus.layout.matrix(Dataset::Antique)
    );

    let store = SqliteDocumentStore::open(
        &loaded.database_path().unwrap(),
        loaded.table_specs().unwrap(),
    )
    .unwrap();
    assert_eq!(store.count(Dataset::Antique).unwrap(), DOCUMENTS.len());
}
