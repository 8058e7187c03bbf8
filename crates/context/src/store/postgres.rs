//! PostgreSQL corpus store

use super::{CorpusStore, Record};
use crate::compiler::{CompiledQuery, Dimension, QueryParam};
use async_trait::async_trait;
use backoff::{future::retry, ExponentialBackoff};
use reviewlens_common::config::AnalysisConfig;
use reviewlens_common::db::DbPool;
use reviewlens_common::errors::{AppError, Result};
use sea_orm::{ConnectionTrait, DbBackend, FromQueryResult, JsonValue, Statement};
use std::sync::Arc;
use std::time::Duration;

/// Executes compiled SQL against the read connection
pub struct PgCorpusStore {
    db: Arc<DbPool>,

    /// Extra attempts for transient failures (0 = single attempt)
    retries: u32,

    /// Upper bound on time spent retrying one query
    retry_window: Duration,
}

impl PgCorpusStore {
    pub fn new(db: Arc<DbPool>, config: &AnalysisConfig) -> Self {
        Self {
            db,
            retries: config.store_retries,
            retry_window: config.stage_timeout(),
        }
    }

    fn statement(query: &CompiledQuery) -> Statement {
        let values: Vec<sea_orm::Value> = query
            .parameters
            .iter()
            .map(|param| match param {
                QueryParam::Text(text) => text.clone().into(),
                QueryParam::Date(date) => (*date).into(),
                QueryParam::Int(value) => (*value).into(),
            })
            .collect();

        Statement::from_sql_and_values(DbBackend::Postgres, &query.statement, values)
    }

    async fn fetch_once(&self, query: &CompiledQuery) -> Result<Vec<Record>> {
        let rows = JsonValue::find_by_statement(Self::statement(query))
            .all(self.db.read())
            .await?;

        rows.into_iter()
            .map(|row| match row {
                JsonValue::Object(record) => Ok(record),
                other => Err(AppError::StoreQuery {
                    message: format!("{} returned a non-object row: {}", query.purpose, other),
                }),
            })
            .collect()
    }
}

#[async_trait]
impl CorpusStore for PgCorpusStore {
    async fn fetch(&self, query: &CompiledQuery) -> Result<Vec<Record>> {
        let policy = ExponentialBackoff {
            initial_interval: Duration::from_millis(100),
            max_elapsed_time: Some(self.retry_window),
            ..ExponentialBackoff::default()
        };

        let mut attempt = 0u32;
        let retries = self.retries;

        retry(policy, || {
            attempt += 1;
            let current = attempt;
            async move {
                self.fetch_once(query).await.map_err(|e| {
                    if e.is_transient() && current <= retries {
                        tracing::warn!(
                            purpose = %query.purpose,
                            attempt = current,
                            error = %e,
                            "Transient store failure, retrying"
                        );
                        backoff::Error::transient(e)
                    } else {
                        backoff::Error::permanent(e)
                    }
                })
            }
        })
        .await
    }

    async fn distinct_values(&self, dimension: Dimension) -> Result<Vec<String>> {
        let column = match dimension {
            Dimension::Brand | Dimension::Product | Dimension::Channel => dimension.key(),
            other => {
                return Err(AppError::StoreQuery {
                    message: format!("{} is not a review column", other.key()),
                })
            }
        };

        let sql = format!(
            "SELECT DISTINCT {col} AS value FROM reviews WHERE {col} IS NOT NULL AND {col} <> '' ORDER BY 1",
            col = column
        );

        let rows = self
            .db
            .read()
            .query_all(Statement::from_string(DbBackend::Postgres, sql))
            .await?;

        Ok(rows
            .iter()
            .filter_map(|row| row.try_get::<String>("", "value").ok())
            .collect())
    }

    async fn ping(&self) -> Result<()> {
        self.db.ping().await
    }

    fn name(&self) -> &str {
        "postgres"
    }
}
