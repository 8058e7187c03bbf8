//! pgvector-backed index over `reviews.embedding`

use super::{EmbeddingIndex, EvidenceRecord, Neighbor};
use async_trait::async_trait;
use pgvector::Vector;
use reviewlens_common::db::models::{ReviewColumn, ReviewEntity};
use reviewlens_common::db::DbPool;
use reviewlens_common::errors::Result;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use std::sync::Arc;

const NEAREST_SQL: &str = r#"
    SELECT id, (embedding <=> $1)::float8 AS distance
    FROM reviews
    WHERE embedding IS NOT NULL
    ORDER BY embedding <=> $1, seq
    LIMIT $2
"#;

pub struct PgVectorIndex {
    db: Arc<DbPool>,
}

impl PgVectorIndex {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl EmbeddingIndex for PgVectorIndex {
    async fn nearest(&self, vector: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        let rows: Vec<(String, f64)> = sqlx::query_as(NEAREST_SQL)
            .bind(Vector::from(vector.to_vec()))
            .bind(k as i64)
            .fetch_all(self.db.read_sqlx())
            .await?;

        Ok(rows
            .into_iter()
            .map(|(record_id, distance)| Neighbor {
                record_id,
                distance: distance as f32,
            })
            .collect())
    }

    async fn hydrate(&self, ids: &[String]) -> Result<Vec<EvidenceRecord>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let reviews = ReviewEntity::find()
            .filter(ReviewColumn::Id.is_in(ids.iter().cloned()))
            .all(self.db.read())
            .await?;

        Ok(reviews.iter().map(EvidenceRecord::from).collect())
    }
}
