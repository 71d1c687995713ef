//! End-to-end pipeline behaviour over in-memory resources

use ragline::dataset::Dataset;
use ragline::embedding::{EmbeddingError, EmbeddingProvider, LazyEmbeddingProvider};
use ragline::generation::{InstructionKey, GENERATION_FAILED, NO_DOCUMENTS_FOUND};
use ragline::pipeline::{PipelineSettings, QueryRequest, SearchMethod, SearchResponse};
use ragline::retrieval::ScoredResult;
use ragline::testing::{Fixture, ScriptedGenerator};
use ragline::RetrievalError;
use std::collections::HashSet;
use std::sync::Arc;

fn energy_corpus() -> Fixture {
    Fixture::builder(Dataset::Antique)
        .document("d1", "solar panels convert sunlight into electricity")
        .document("d2", "wind turbines generate electricity offshore")
        .document("d3", "solar batteries store solar electricity overnight")
        .document("d4", "pasta cooking needs boiling water")
        .document("d5", "solar farms need large land areas")
        .chunk("d1", "solar panels convert sunlight")
        .chunk("d1", "panels produce electricity")
        .chunk("d2", "wind turbines generate electricity")
        .chunk("d3", "solar batteries store energy")
        .chunk("d3", "batteries discharge overnight")
        .chunk("d4", "boiling water for pasta")
        .chunk("d5", "solar farms need land")
        .build()
}

fn assert_well_formed(results: &[ScoredResult], top_n: usize) {
    assert!(results.len() <= top_n);
    assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
    let unique: HashSet<&str> = results.iter().map(|r| r.doc_id.as_str()).collect();
    assert_eq!(unique.len(), results.len(), "duplicate doc ids in {:?}", results);
}

#[test]
fn test_ranked_methods_are_well_formed() {
    let fixture = energy_corpus();
    let pipeline = fixture.pipeline(PipelineSettings::default(), None);

    for method in [
        SearchMethod::Sparse,
        SearchMethod::Dense,
        SearchMethod::Ann,
        SearchMethod::Hybrid,
        SearchMethod::HybridAnn,
    ] {
        let request =
            QueryRequest::new("solar electricity", Dataset::Antique, method).with_top_n(3);
        let outcome = pipeline.run(&request).unwrap();
        assert_eq!(outcome.method, method);
        assert_well_formed(outcome.response.results(), 3);
    }
}

#[test]
fn test_empty_normalized_query_returns_nothing() {
    let fixture = energy_corpus();
    let pipeline = fixture.pipeline(PipelineSettings::default(), None);

    for method in [
        SearchMethod::Sparse,
        SearchMethod::Dense,
        SearchMethod::Ann,
        SearchMethod::Hybrid,
        SearchMethod::HybridAnn,
    ] {
        let request = QueryRequest::new("  ", Dataset::Antique, method);
        assert!(pipeline.run(&request).unwrap().response.results().is_empty());
    }

    assert!(pipeline
        .hybrid("the and of", Dataset::Antique, 5)
        .unwrap()
        .is_empty());
}

#[test]
fn test_hybrid_drops_documents_without_embeddings() {
    let fixture = Fixture::builder(Dataset::Webis)
        .document("a", "solar power plants")
        .document("b", "solar power storage")
        .document("c", "solar power prices")
        .without_dense_embedding("b")
        .build();
    let pipeline = fixture.pipeline(PipelineSettings::default(), None);

    let results = pipeline.hybrid("solar power", Dataset::Webis, 10).unwrap();
    let ids: HashSet<&str> = results.iter().map(|r| r.doc_id.as_str()).collect();
    assert_eq!(results.len(), 2);
    assert_eq!(ids, HashSet::from(["a", "c"]));
}

#[test]
fn test_hybrid_ann_stays_inside_candidates() {
    let fixture = energy_corpus();
    let settings = PipelineSettings {
        hybrid_ann_candidates: 2,
        ..PipelineSettings::default()
    };
    let pipeline = fixture.pipeline(settings, None);

    let candidates: HashSet<String> = pipeline
        .hybrid("solar electricity", Dataset::Antique, 2)
        .unwrap()
        .into_iter()
        .map(|r| r.doc_id)
        .collect();
    let chunks = pipeline
        .hybrid_ann("solar electricity", Dataset::Antique, 10)
        .unwrap();

    assert!(!chunks.is_empty());
    assert!(chunks.iter().all(|r| candidates.contains(&r.doc_id)));
    // Chunk results carry chunk text, not a document prefix
    assert!(chunks
        .iter()
        .all(|r| !r.snippet.is_empty() && !r.snippet.ends_with("...")));
}

/// 500 short reports, each with a unique term and one of four topics
fn report_corpus() -> Fixture {
    let letters: Vec<char> = ('a'..='z').collect();
    let mut builder = Fixture::builder(Dataset::Antique);
    for i in 0..500 {
        let term = format!("term{}{}", letters[i % 26], letters[(i / 26) % 26]);
        let topic = ["energy", "water", "forest", "market"][i % 4];
        builder = builder.document(&format!("doc{}", i), &format!("{} {} report", term, topic));
    }
    builder.build()
}

#[test]
fn test_prefilter_larger_than_corpus_matches_full_ranking() {
    let fixture = report_corpus();
    let retriever = fixture.sparse_retriever();

    for query in ["energy report", "water termba", "forest market"] {
        let full = retriever
            .search_sparse(query, Dataset::Antique, 20, None)
            .unwrap();
        let prefiltered = retriever
            .search_sparse(query, Dataset::Antique, 20, Some(1000))
            .unwrap();
        assert_eq!(full, prefiltered);
    }
}

#[test]
fn test_hybrid_candidates_beyond_corpus_size() {
    let fixture = report_corpus();
    let wide = fixture.pipeline(
        PipelineSettings {
            hybrid_sparse_candidates: 1000,
            ..PipelineSettings::default()
        },
        None,
    );
    let exact = fixture.pipeline(
        PipelineSettings {
            hybrid_sparse_candidates: 500,
            ..PipelineSettings::default()
        },
        None,
    );

    for query in ["energy report", "water termba", "forest market"] {
        let from_wide = wide.hybrid(query, Dataset::Antique, 20).unwrap();
        let from_exact = exact.hybrid(query, Dataset::Antique, 20).unwrap();
        assert_eq!(from_wide.len(), 20);
        assert_eq!(from_wide, from_exact);
    }
}

#[test]
fn test_sparse_query_runs_without_embedding_model() {
    let fixture = energy_corpus();
    let offline = Arc::new(LazyEmbeddingProvider::new(
        "offline",
        fixture.embedder.dimension(),
        || Err(EmbeddingError::InitializationError("model cache missing".into())),
    ));
    let pipeline =
        fixture.pipeline_with_embedder(offline.clone(), PipelineSettings::default(), None);

    let request = QueryRequest::new("solar electricity", Dataset::Antique, SearchMethod::Sparse);
    let outcome = pipeline.run(&request).unwrap();
    assert_eq!(outcome.response.results()[0].doc_id, "d3");
    assert!(!offline.is_initialized());

    // A missing dataset still reports its own resource failure
    let request = QueryRequest::new("solar", Dataset::Webis, SearchMethod::Sparse);
    assert!(matches!(
        pipeline.run(&request),
        Err(RetrievalError::ResourceUnavailable {
            dataset: Dataset::Webis,
            ..
        })
    ));

    let request = QueryRequest::new("solar", Dataset::Antique, SearchMethod::Dense);
    assert!(matches!(
        pipeline.run(&request),
        Err(RetrievalError::Embedding(EmbeddingError::InitializationError(_)))
    ));
}

#[test]
fn test_repeated_query_is_deterministic() {
    let fixture = energy_corpus();
    let generator = Arc::new(ScriptedGenerator::replying("Solar batteries store power."));
    let pipeline = fixture.pipeline(PipelineSettings::default(), Some(generator.clone()));

    let request = QueryRequest::new(
        "solar electricity storage",
        Dataset::Antique,
        SearchMethod::HybridAnnGenerate,
    )
    .with_instruction(InstructionKey::BulletPoints);

    let first = pipeline.run(&request).unwrap();
    let second = pipeline.run(&request).unwrap();
    assert_eq!(first.response, second.response);

    let prompts = generator.prompts();
    assert_eq!(prompts.len(), 2);
    assert_eq!(prompts[0], prompts[1]);
    assert!(prompts[0].starts_with(InstructionKey::BulletPoints.instruction()));
}

#[test]
fn test_hybrid_generate_uses_full_documents() {
    let fixture = energy_corpus();
    let generator = Arc::new(ScriptedGenerator::replying("answer"));
    let pipeline = fixture.pipeline(PipelineSettings::default(), Some(generator.clone()));

    let result = pipeline
        .hybrid_generate("solar electricity", Dataset::Antique, 2, InstructionKey::Default)
        .unwrap();

    assert_eq!(result.generated_text, "answer");
    assert_eq!(result.retrieved_context.len(), 2);
    assert_eq!(result.included_in_prompt, 2);

    let prompt = &generator.prompts()[0];
    for chunk in &result.retrieved_context {
        assert!(prompt.contains(&format!("Document (ID: {}): {}", chunk.doc_id, chunk.text)));
    }
    assert!(prompt.ends_with("Question: solar electricity\nAnswer:"));
}

#[test]
fn test_ann_generate_respects_threshold() {
    let fixture = energy_corpus();
    let generator = Arc::new(ScriptedGenerator::replying("answer"));
    let settings = PipelineSettings {
        ann_similarity_threshold: 0.99,
        ..PipelineSettings::default()
    };
    let pipeline = fixture.pipeline(settings, Some(generator.clone()));

    // No chunk is a near-exact match for this query
    let request = QueryRequest::new("wind energy", Dataset::Antique, SearchMethod::AnnGenerate);
    let outcome = pipeline.run(&request).unwrap();
    match outcome.response {
        SearchResponse::Generated(result) => {
            assert_eq!(result.generated_text, NO_DOCUMENTS_FOUND);
            assert!(result.retrieved_context.is_empty());
        }
        other => panic!("unexpected response: {:?}", other),
    }
    assert!(generator.prompts().is_empty());
}

#[test]
fn test_tiny_budget_still_renders_prompt() {
    let fixture = energy_corpus();
    let generator = Arc::new(ScriptedGenerator::replying("answer"));
    let settings = PipelineSettings {
        max_context_tokens: 60,
        ..PipelineSettings::default()
    };
    let pipeline = fixture.pipeline(settings, Some(generator.clone()));

    let result = pipeline
        .hybrid_ann_generate("solar electricity", Dataset::Antique, 5, InstructionKey::Default)
        .unwrap();
    assert_eq!(result.included_in_prompt, 0);
    assert!(!result.retrieved_context.is_empty());

    let prompt = &generator.prompts()[0];
    assert!(prompt.starts_with(InstructionKey::Default.instruction()));
    assert!(prompt.contains("\n\nContext:\n\nQuestion: solar electricity\nAnswer:"));
}

#[test]
fn test_failed_generation_keeps_context() {
    let fixture = energy_corpus();
    let pipeline = fixture.pipeline(
        PipelineSettings::default(),
        Some(Arc::new(ScriptedGenerator::failing())),
    );

    let request = QueryRequest::new("solar", Dataset::Antique, SearchMethod::HybridGenerate);
    let outcome = pipeline.run(&request).unwrap();
    let generation = outcome.response.generation().unwrap();
    assert_eq!(generation.generated_text, GENERATION_FAILED);
    assert!(!generation.retrieved_context.is_empty());
}

#[test]
fn test_unknown_dataset_resources_are_unavailable() {
    let fixture = energy_corpus();
    let pipeline = fixture.pipeline(PipelineSettings::default(), None);

    let request = QueryRequest::new("solar", Dataset::Webis, SearchMethod::Hybrid);
    assert!(matches!(
        pipeline.run(&request),
        Err(RetrievalError::ResourceUnavailable {
            dataset: Dataset::Webis,
            ..
        })
    ));
}

#[test]
fn test_shared_across_threads() {
    let fixture = energy_corpus();
    let pipeline = Arc::new(fixture.pipeline(PipelineSettings::default(), None));
    let expected = pipeline.hybrid("solar", Dataset::Antique, 3).unwrap();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let pipeline = Arc::clone(&pipeline);
            std::thread::spawn(move || pipeline.hybrid("solar", Dataset::Antique, 3).unwrap())
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), expected);
    }
}
