//! Corpus store backends
//!
//! Provides:
//! - `CorpusStore`, the single seam the executor talks to
//! - PostgreSQL execution of compiled SQL (SeaORM raw statements)
//! - An in-memory JSON snapshot that evaluates the structured query shape

mod memory;
mod postgres;

pub use memory::{CorpusSnapshot, MemoryCorpus};
pub use postgres::PgCorpusStore;

use crate::compiler::{CompiledQuery, Dimension};
use async_trait::async_trait;
use reviewlens_common::errors::Result;

/// One result row, keyed by output column
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Read-only access to the review corpus
#[async_trait]
pub trait CorpusStore: Send + Sync {
    /// Run one compiled query
    async fn fetch(&self, query: &CompiledQuery) -> Result<Vec<Record>>;

    /// Distinct non-empty values of a review column, sorted
    async fn distinct_values(&self, dimension: Dimension) -> Result<Vec<String>>;

    /// Cheap reachability check
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    /// Backend name for logs
    fn name(&self) -> &str;
}
