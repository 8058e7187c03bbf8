//! Brute-force in-memory vector index

use super::{EmbeddingIndex, EvidenceRecord, Neighbor};
use async_trait::async_trait;
use reviewlens_common::db::models::Review;
use reviewlens_common::embeddings::Embedder;
use reviewlens_common::errors::Result;
use std::collections::HashMap;

struct Entry {
    vector: Vec<f32>,
    record: EvidenceRecord,
}

/// Exact cosine search over every stored vector
pub struct MemoryIndex {
    /// Insertion order is the tie-break order
    entries: Vec<Entry>,
    positions: HashMap<String, usize>,
}

impl MemoryIndex {
    /// Embed reviews in `seq` order
    pub async fn build(reviews: &[Review], embedder: &dyn Embedder) -> Result<Self> {
        let mut ordered: Vec<&Review> = reviews.iter().collect();
        ordered.sort_by_key(|r| r.seq);

        let texts: Vec<String> = ordered.iter().map(|r| r.content.clone()).collect();
        let vectors = embedder.embed_batch(&texts).await?;

        let entries: Vec<Entry> = ordered
            .into_iter()
            .zip(vectors)
            .map(|(review, vector)| Entry {
                vector,
                record: EvidenceRecord::from(review),
            })
            .collect();

        let positions = entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.record.record_id.clone(), i))
            .collect();

        tracing::info!(
            entries = entries.len(),
            model = embedder.model_name(),
            "In-memory vector index built"
        );

        Ok(Self { entries, positions })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// `1 - cos(a, b)`; a zero vector is at distance 1 from everything
fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    1.0 - dot / (norm_a * norm_b)
}

#[async_trait]
impl EmbeddingIndex for MemoryIndex {
    async fn nearest(&self, vector: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        let mut scored: Vec<(f32, usize)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (cosine_distance(vector, &e.vector), i))
            .collect();

        scored.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(distance, i)| Neighbor {
                record_id: self.entries[i].record.record_id.clone(),
                distance,
            })
            .collect())
    }

    async fn hydrate(&self, ids: &[String]) -> Result<Vec<EvidenceRecord>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.positions.get(id))
            .map(|&i| self.entries[i].record.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use reviewlens_common::embeddings::HashingEmbedder;

    #[tokio::test]
    async fn test_ties_keep_insertion_order() {
        let mut reviews = fixtures::snapshot().reviews;
        reviews.truncate(3);
        reviews[1].content = reviews[2].content.clone();

        let embedder = HashingEmbedder::new(64);
        let index = MemoryIndex::build(&reviews, &embedder).await.unwrap();
        let query = embedder.embed(&reviews[2].content).await.unwrap();

        let neighbors = index.nearest(&query, 3).await.unwrap();
        assert_eq!(neighbors[0].record_id, reviews[1].id);
        assert_eq!(neighbors[1].record_id, reviews[2].id);
        assert_eq!(neighbors[0].distance, neighbors[1].distance);
        assert!(neighbors[1].distance <= neighbors[2].distance);
    }

    #[tokio::test]
    async fn test_hydrate_skips_unknown_ids() {
        let reviews = fixtures::snapshot().reviews;
        let embedder = HashingEmbedder::new(32);
        let index = MemoryIndex::build(&reviews, &embedder).await.unwrap();
        assert_eq!(index.len(), reviews.len());

        let records = index
            .hydrate(&["r001".to_string(), "nope".to_string()])
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].record_id, "r001");
    }

    #[test]
    fn test_cosine_distance() {
        assert!(cosine_distance(&[1.0, 0.0], &[1.0, 0.0]).abs() < 1e-6);
        assert!((cosine_distance(&[1.0, 0.0], &[0.0, 1.0]) - 1.0).abs() < 1e-6);
        assert_eq!(cosine_distance(&[0.0, 0.0], &[1.0, 0.0]), 1.0);
    }
}
