//! Wiring: configuration → a ready `Orchestrator`

use crate::compiler::{Dimension, QueryCompiler};
use crate::entities::{EntityExtractor, Vocabulary};
use crate::executor::QueryExecutor;
use crate::orchestrator::Orchestrator;
use crate::retrieval::{EmbeddingIndex, EvidenceRetriever, MemoryIndex, PgVectorIndex};
use crate::router::{KeywordClassifier, LlmClassifier, ModeClassifier, Router};
use crate::store::{CorpusStore, MemoryCorpus, PgCorpusStore};
use crate::strategy::StrategyResolver;
use crate::synthesizer::AnswerSynthesizer;
use reviewlens_common::config::{AnalysisConfig, AppConfig};
use reviewlens_common::db::DbPool;
use reviewlens_common::embeddings::{create_embedder, Embedder};
use reviewlens_common::errors::Result;
use reviewlens_common::llm::{create_generator, GenerationOptions};
use std::sync::Arc;

/// Build every stage from configuration.
///
/// A configured corpus snapshot replaces PostgreSQL for both the store and
/// the vector index.
pub async fn build_orchestrator(config: &AppConfig) -> Result<Orchestrator> {
    let embedder = create_embedder(&config.embedding)?;
    let (store, index) = open_backends(config, embedder.as_ref()).await?;
    build_with_backends(config, embedder, store, index).await
}

/// Build every stage around an already open store and vector index
pub async fn build_with_backends(
    config: &AppConfig,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn CorpusStore>,
    index: Arc<dyn EmbeddingIndex>,
) -> Result<Orchestrator> {
    let analysis = &config.analysis;
    let generator = create_generator(&config.llm)?;
    let vocabulary = load_vocabulary(analysis, store.as_ref()).await?;

    let classifier: Arc<dyn ModeClassifier> = if config.llm.classify_with_llm {
        Arc::new(LlmClassifier::new(generator.clone(), analysis.stage_timeout()))
    } else {
        Arc::new(KeywordClassifier)
    };

    tracing::info!(
        store = store.name(),
        embedder = embedder.model_name(),
        generator = generator.name(),
        classify_with_llm = config.llm.classify_with_llm,
        "Orchestrator ready"
    );

    Ok(Orchestrator::new(
        EntityExtractor::new(vocabulary.clone()),
        StrategyResolver::new(&vocabulary),
        QueryCompiler::new(analysis),
        QueryExecutor::new(store, analysis),
        Router::new(classifier, analysis),
        EvidenceRetriever::new(embedder, index, analysis.stage_timeout()),
        AnswerSynthesizer::new(generator, GenerationOptions::from_config(&config.llm), analysis),
    ))
}

async fn open_backends(
    config: &AppConfig,
    embedder: &dyn Embedder,
) -> Result<(Arc<dyn CorpusStore>, Arc<dyn EmbeddingIndex>)> {
    match &config.analysis.corpus_snapshot_path {
        Some(path) => {
            let corpus = MemoryCorpus::from_json_file(path)?;
            let index = MemoryIndex::build(&corpus.snapshot().reviews, embedder).await?;
            Ok((Arc::new(corpus), Arc::new(index)))
        }
        None => {
            let db = Arc::new(DbPool::new(&config.database).await?);
            Ok((
                Arc::new(PgCorpusStore::new(db.clone(), &config.analysis)),
                Arc::new(PgVectorIndex::new(db)),
            ))
        }
    }
}

/// Configured vocabulary (or defaults), plus brand and product names found
/// in the store
async fn load_vocabulary(config: &AnalysisConfig, store: &dyn CorpusStore) -> Result<Vocabulary> {
    let mut vocabulary = match &config.vocabulary_path {
        Some(path) => Vocabulary::from_json_file(path)?,
        None => Vocabulary::with_defaults(),
    };

    match store.distinct_values(Dimension::Brand).await {
        Ok(brands) => vocabulary.extend_brands(brands),
        Err(e) => tracing::warn!(error = %e, "Could not read brand names from the store"),
    }
    match store.distinct_values(Dimension::Product).await {
        Ok(products) => vocabulary.extend_products(products),
        Err(e) => tracing::warn!(error = %e, "Could not read product names from the store"),
    }

    tracing::info!(
        brands = vocabulary.brands.len(),
        products = vocabulary.products.len(),
        attributes = vocabulary.attributes.len(),
        channels = vocabulary.channels.len(),
        "Vocabulary ready"
    );

    Ok(vocabulary)
}
