//! Query execution with per-query failure isolation
//!
//! Provides:
//! - `QueryResult`, one uniform envelope per compiled query
//! - `ResultEnvelope` with derived data characteristics
//! - `QueryExecutor`, bounded-concurrency execution with timeouts

use crate::compiler::{CompiledQuery, Dimension, Projection, QueryShape};
use crate::store::{CorpusStore, Record};
use futures::stream::{self, StreamExt};
use reviewlens_common::config::AnalysisConfig;
use reviewlens_common::errors::{AppError, Result};
use reviewlens_common::metrics;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

const TEXT_KEYS: [&str; 2] = ["content", "excerpt"];
const GROUP_KEYS: [&str; 3] = ["brand", "product", "channel"];
const TIME_KEYS: [&str; 2] = ["period", "review_date"];

/// Outcome of one compiled query.
///
/// `success == false` implies empty `data` and a set `error`;
/// `success == true` implies `error` is `None`.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub purpose: String,
    pub source_table: String,
    pub success: bool,
    pub row_count: usize,
    pub data: Vec<Record>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub elapsed_ms: u64,

    /// Structured description of the query that produced the rows
    #[serde(skip)]
    pub shape: QueryShape,
}

impl QueryResult {
    fn success(query: &CompiledQuery, data: Vec<Record>, elapsed_ms: u64) -> Self {
        Self {
            purpose: query.purpose.clone(),
            source_table: query.source_table.clone(),
            success: true,
            row_count: data.len(),
            data,
            error: None,
            elapsed_ms,
            shape: query.shape.clone(),
        }
    }

    fn failure(query: &CompiledQuery, error: String, elapsed_ms: u64) -> Self {
        Self {
            purpose: query.purpose.clone(),
            source_table: query.source_table.clone(),
            success: false,
            row_count: 0,
            data: Vec::new(),
            error: Some(error),
            elapsed_ms,
            shape: query.shape.clone(),
        }
    }

    /// Aggregate rows laid out along a month or day axis. Dated text
    /// samples are not a series.
    fn has_time_series(&self) -> bool {
        let Some(first) = self.data.first() else {
            return false;
        };
        match &self.shape.projection {
            Projection::Samples => false,
            Projection::Aggregate { dimensions, .. } => {
                dimensions.contains(&Dimension::Period)
                    || TIME_KEYS.iter().any(|k| first.contains_key(*k))
            }
        }
    }

    fn has_text_samples(&self) -> bool {
        self.data
            .first()
            .is_some_and(|r| TEXT_KEYS.iter().any(|k| r.contains_key(*k)))
    }

    /// Aggregate rows spanning at least two brands, products or channels
    fn has_group_comparison(&self) -> bool {
        if self.has_text_samples() {
            return false;
        }
        GROUP_KEYS.iter().any(|key| {
            let distinct: HashSet<String> = self
                .data
                .iter()
                .filter_map(|r| r.get(*key))
                .map(|v| v.to_string())
                .collect();
            distinct.len() >= 2
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DataCharacteristics {
    pub has_time_series: bool,
    pub has_text_samples: bool,
    pub has_group_comparison: bool,
    pub all_failed: bool,
    pub total_rows: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Ordered query results plus what they contain
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResultEnvelope {
    pub results: Vec<QueryResult>,
    pub data_characteristics: DataCharacteristics,
}

impl ResultEnvelope {
    pub fn new(results: Vec<QueryResult>) -> Self {
        let ok: Vec<&QueryResult> = results.iter().filter(|r| r.success).collect();

        let data_characteristics = DataCharacteristics {
            has_time_series: ok.iter().any(|r| r.has_time_series()),
            has_text_samples: ok.iter().any(|r| r.has_text_samples()),
            has_group_comparison: ok.iter().any(|r| r.has_group_comparison()),
            all_failed: ok.is_empty(),
            total_rows: ok.iter().map(|r| r.row_count).sum(),
            succeeded: ok.len(),
            failed: results.len() - ok.len(),
        };

        Self {
            results,
            data_characteristics,
        }
    }

    /// Nothing usable came back
    pub fn is_unusable(&self) -> bool {
        self.data_characteristics.all_failed || self.data_characteristics.total_rows == 0
    }

    pub fn successful(&self) -> impl Iterator<Item = &QueryResult> {
        self.results.iter().filter(|r| r.success)
    }
}

/// Runs compiled queries against one store. Never retries; retry policy
/// belongs to the store.
pub struct QueryExecutor {
    store: Arc<dyn CorpusStore>,
    max_concurrency: usize,
    timeout: Duration,
}

impl QueryExecutor {
    pub fn new(store: Arc<dyn CorpusStore>, config: &AnalysisConfig) -> Self {
        Self {
            store,
            max_concurrency: config.max_query_concurrency.max(1),
            timeout: config.stage_timeout(),
        }
    }

    pub async fn execute(&self, queries: &[CompiledQuery]) -> ResultEnvelope {
        let width = queries.len().clamp(1, self.max_concurrency);

        let pending: Vec<_> = queries.iter().map(|q| self.run_one(q)).collect();
        let results: Vec<QueryResult> = stream::iter(pending)
            .buffered(width)
            .collect()
            .await;

        let envelope = ResultEnvelope::new(results);

        tracing::info!(
            store = self.store.name(),
            queries = queries.len(),
            succeeded = envelope.data_characteristics.succeeded,
            failed = envelope.data_characteristics.failed,
            total_rows = envelope.data_characteristics.total_rows,
            "Queries executed"
        );

        envelope
    }

    /// Whether the store answers within the stage timeout
    pub async fn ping(&self) -> Result<()> {
        tokio::time::timeout(self.timeout, self.store.ping())
            .await
            .map_err(|_| AppError::StoreTimeout {
                timeout_ms: self.timeout.as_millis() as u64,
            })?
    }

    pub fn store_name(&self) -> &str {
        self.store.name()
    }

    async fn run_one(&self, query: &CompiledQuery) -> QueryResult {
        let started = Instant::now();
        let outcome = tokio::time::timeout(self.timeout, self.store.fetch(query)).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let result = match outcome {
            Ok(Ok(data)) => QueryResult::success(query, data, elapsed_ms),
            Ok(Err(e)) => QueryResult::failure(query, e.to_string(), elapsed_ms),
            Err(_) => {
                let e = AppError::StoreTimeout {
                    timeout_ms: self.timeout.as_millis() as u64,
                };
                QueryResult::failure(query, e.to_string(), elapsed_ms)
            }
        };

        metrics::record_query(&result.source_table, result.success);

        if let Some(error) = &result.error {
            tracing::warn!(
                purpose = %result.purpose,
                latency_ms = elapsed_ms,
                error = %error,
                "Query failed"
            );
        } else {
            tracing::debug!(
                purpose = %result.purpose,
                rows = result.row_count,
                latency_ms = elapsed_ms,
                "Query completed"
            );
        }

        result
    }
}
