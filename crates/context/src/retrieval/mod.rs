//! Evidence retrieval for the semantic path
//!
//! Provides:
//! - `EmbeddingIndex`, nearest-neighbour lookup plus record hydration
//! - pgvector and in-memory brute-force index backends
//! - `EvidenceRetriever`, question → ranked `EvidenceHit`s

mod memory;
mod pgvector;

pub use self::memory::MemoryIndex;
pub use self::pgvector::PgVectorIndex;

use crate::question::Question;
use async_trait::async_trait;
use chrono::NaiveDate;
use reviewlens_common::db::models::Review;
use reviewlens_common::embeddings::Embedder;
use reviewlens_common::errors::{AppError, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// A record id and its distance to the query vector
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    pub record_id: String,
    pub distance: f32,
}

/// Review fields needed to quote and attribute evidence
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvidenceRecord {
    pub record_id: String,
    pub text: String,
    pub brand: Option<String>,
    pub product: Option<String>,
    pub rating: Option<i32>,
    pub date: Option<NaiveDate>,
}

impl From<&Review> for EvidenceRecord {
    fn from(review: &Review) -> Self {
        Self {
            record_id: review.id.clone(),
            text: review.content.clone(),
            brand: Some(review.brand.clone()),
            product: Some(review.product.clone()),
            rating: Some(review.rating),
            date: Some(review.review_date),
        }
    }
}

/// One ranked piece of evidence
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvidenceHit {
    pub record_id: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    /// Cosine distance, lower is closer
    pub distance: f32,
}

impl EvidenceHit {
    fn new(record: EvidenceRecord, distance: f32) -> Self {
        Self {
            record_id: record.record_id,
            text: record.text,
            brand: record.brand,
            product: record.product,
            rating: record.rating,
            date: record.date,
            distance,
        }
    }
}

/// Vector index over review embeddings
#[async_trait]
pub trait EmbeddingIndex: Send + Sync {
    /// Up to `k` neighbours, ascending distance, ties in insertion order
    async fn nearest(&self, vector: &[f32], k: usize) -> Result<Vec<Neighbor>>;

    /// Records for the given ids; unknown ids are skipped
    async fn hydrate(&self, ids: &[String]) -> Result<Vec<EvidenceRecord>>;
}

/// Embeds the question and returns its nearest reviews
pub struct EvidenceRetriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn EmbeddingIndex>,
    timeout: Duration,
}

impl EvidenceRetriever {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<dyn EmbeddingIndex>, timeout: Duration) -> Self {
        Self {
            embedder,
            index,
            timeout,
        }
    }

    pub async fn search(&self, question: &Question, top_k: usize) -> Result<Vec<EvidenceHit>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let timeout_ms = self.timeout.as_millis() as u64;

        let vector = tokio::time::timeout(self.timeout, self.embedder.embed(question.text()))
            .await
            .map_err(|_| AppError::EmbeddingTimeout { timeout_ms })??;

        let mut neighbors = tokio::time::timeout(self.timeout, self.index.nearest(&vector, top_k))
            .await
            .map_err(|_| AppError::StoreTimeout { timeout_ms })??;

        // stable: equal distances keep index order
        neighbors.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        neighbors.truncate(top_k);

        let ids: Vec<String> = neighbors.iter().map(|n| n.record_id.clone()).collect();
        let records: HashMap<String, EvidenceRecord> =
            tokio::time::timeout(self.timeout, self.index.hydrate(&ids))
                .await
                .map_err(|_| AppError::StoreTimeout { timeout_ms })??
                .into_iter()
                .map(|r| (r.record_id.clone(), r))
                .collect();

        let hits: Vec<EvidenceHit> = neighbors
            .into_iter()
            .filter_map(|n| {
                records
                    .get(&n.record_id)
                    .cloned()
                    .map(|record| EvidenceHit::new(record, n.distance))
            })
            .collect();

        tracing::debug!(
            model = self.embedder.model_name(),
            top_k,
            hits = hits.len(),
            "Evidence retrieved"
        );

        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use reviewlens_common::embeddings::HashingEmbedder;

    async fn retriever() -> EvidenceRetriever {
        let embedder: Arc<dyn Embedder> = Arc::new(HashingEmbedder::new(128));
        let index = MemoryIndex::build(&fixtures::snapshot().reviews, embedder.as_ref())
            .await
            .unwrap();
        EvidenceRetriever::new(embedder, Arc::new(index), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_hits_are_ranked_and_hydrated() {
        let retriever = retriever().await;
        let question = Question::at("the smell is far too strong", fixtures::now()).unwrap();
        let hits = retriever.search(&question, 5).await.unwrap();

        assert_eq!(hits.len(), 5);
        assert!(hits.windows(2).all(|w| w[0].distance <= w[1].distance));
        assert!(hits[0].text.contains("smell is far too strong"));
        assert!(hits.iter().all(|h| h.brand.is_some() && h.date.is_some()));
    }

    #[tokio::test]
    async fn test_zero_top_k_is_empty() {
        let retriever = retriever().await;
        let question = Question::at("anything", fixtures::now()).unwrap();
        assert!(retriever.search(&question, 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_top_k_larger_than_corpus() {
        let retriever = retriever().await;
        let question = Question::at("texture", fixtures::now()).unwrap();
        let hits = retriever.search(&question, 500).await.unwrap();
        assert_eq!(hits.len(), fixtures::REVIEW_COUNT);
    }
}
