//! In-memory corpus snapshot
//!
//! Evaluates the structured `QueryShape` with the same record keys and
//! ordering rules as the SQL rendering, so local runs and tests see what
//! PostgreSQL would return.

use super::{CorpusStore, Record};
use crate::compiler::{
    CompiledQuery, Dimension, Measure, OrderKey, Predicate, Projection, SourceTable, MATCH_COUNT_KEY,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use reviewlens_common::db::models::{Review, ReviewAttribute};
use reviewlens_common::errors::{AppError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Serialized corpus contents
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorpusSnapshot {
    pub reviews: Vec<Review>,

    #[serde(default)]
    pub attributes: Vec<ReviewAttribute>,
}

/// A flattened row: every dimension, measure input and sample column
struct Row {
    date: NaiveDate,
    fields: Record,
}

impl Row {
    fn text(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    fn number(&self, key: &str) -> Option<f64> {
        self.fields.get(key).and_then(Value::as_f64)
    }
}

const REVIEW_SAMPLE_KEYS: &[&str] = &["id", "brand", "product", "channel", "rating", "review_date", "content"];

const ATTRIBUTE_SAMPLE_KEYS: &[&str] = &[
    "id",
    "review_id",
    "brand",
    "product",
    "channel",
    "attribute",
    "sentiment",
    "score",
    "review_date",
    "excerpt",
];

fn review_row(review: &Review) -> Row {
    let fields = json!({
        "id": review.id,
        "brand": review.brand,
        "product": review.product,
        "channel": review.channel,
        "rating": review.rating,
        "review_date": review.review_date.format("%Y-%m-%d").to_string(),
        "period": review.review_date.format("%Y-%m").to_string(),
        "content": review.content,
    });
    Row {
        date: review.review_date,
        fields: into_record(fields),
    }
}

fn attribute_row(attr: &ReviewAttribute) -> Row {
    let fields = json!({
        "id": attr.id,
        "review_id": attr.review_id,
        "brand": attr.brand,
        "product": attr.product,
        "channel": attr.channel,
        "attribute": attr.attribute,
        "sentiment": attr.sentiment,
        "score": attr.score,
        "review_date": attr.review_date.format("%Y-%m-%d").to_string(),
        "period": attr.review_date.format("%Y-%m").to_string(),
        "excerpt": attr.excerpt,
    });
    Row {
        date: attr.review_date,
        fields: into_record(fields),
    }
}

fn into_record(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        _ => Record::new(),
    }
}

/// Corpus held in memory, loaded from a JSON snapshot
pub struct MemoryCorpus {
    reviews: Vec<Row>,
    attributes: Vec<Row>,
    snapshot: CorpusSnapshot,
}

impl MemoryCorpus {
    pub fn new(snapshot: CorpusSnapshot) -> Self {
        Self {
            reviews: snapshot.reviews.iter().map(review_row).collect(),
            attributes: snapshot.attributes.iter().map(attribute_row).collect(),
            snapshot,
        }
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| AppError::Configuration {
            message: format!("Failed to read corpus snapshot {}: {}", path.display(), e),
        })?;
        let snapshot: CorpusSnapshot = serde_json::from_str(&raw)?;

        tracing::info!(
            path = %path.display(),
            reviews = snapshot.reviews.len(),
            attributes = snapshot.attributes.len(),
            "Corpus snapshot loaded"
        );

        Ok(Self::new(snapshot))
    }

    pub fn snapshot(&self) -> &CorpusSnapshot {
        &self.snapshot
    }

    fn rows(&self, table: SourceTable) -> &[Row] {
        match table {
            SourceTable::Reviews => &self.reviews,
            SourceTable::ReviewAttributes => &self.attributes,
        }
    }
}

fn matches(row: &Row, predicate: &Predicate) -> bool {
    match predicate {
        Predicate::In { dimension, values } => row
            .text(dimension.key())
            .is_some_and(|v| values.iter().any(|x| x == v)),
        Predicate::DateRange { start, end } => *start <= row.date && row.date < *end,
    }
}

fn measure(rows: &[&Row], measure: Measure) -> Value {
    match measure {
        Measure::ReviewCount | Measure::MentionCount => json!(rows.len() as i64),
        Measure::AvgRating => mean(rows.iter().filter_map(|r| r.number("rating"))),
        Measure::AvgAttributeScore => mean(rows.iter().filter_map(|r| r.number("score"))),
        Measure::PositiveRatingPct => share(rows, |r| r.number("rating").is_some_and(|v| v >= 4.0)),
        Measure::PositiveSentimentPct => share(rows, |r| r.text("sentiment") == Some("positive")),
    }
}

/// Percentage of rows satisfying `pred`
fn share(rows: &[&Row], pred: impl Fn(&Row) -> bool) -> Value {
    if rows.is_empty() {
        return Value::Null;
    }
    let hits = rows.iter().filter(|row| pred(**row)).count();
    number(100.0 * hits as f64 / rows.len() as f64)
}

fn mean(values: impl Iterator<Item = f64>) -> Value {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        Value::Null
    } else {
        number(sum / count as f64)
    }
}

fn number(value: f64) -> Value {
    serde_json::Number::from_f64(value)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

/// Ascending order with nulls last, numbers before strings
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (None | Some(Value::Null), None | Some(Value::Null)) => Ordering::Equal,
        (None | Some(Value::Null), _) => Ordering::Greater,
        (_, None | Some(Value::Null)) => Ordering::Less,
        (Some(Value::Number(_)), _) => Ordering::Less,
        (_, Some(Value::Number(_))) => Ordering::Greater,
        (Some(x), Some(y)) => x.to_string().cmp(&y.to_string()),
    }
}

fn sort_records(records: &mut [Record], order: &[OrderKey]) {
    records.sort_by(|a, b| {
        order
            .iter()
            .map(|key| {
                let ord = compare_values(a.get(&key.key), b.get(&key.key));
                if key.descending {
                    ord.reverse()
                } else {
                    ord
                }
            })
            .find(|ord| *ord != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    });
}

fn aggregate(rows: &[&Row], dimensions: &[Dimension], measures: &[Measure]) -> Vec<Record> {
    let mut groups: BTreeMap<String, (Vec<Value>, Vec<&Row>)> = BTreeMap::new();

    for &row in rows {
        let key_values: Vec<Value> = dimensions
            .iter()
            .map(|d| row.fields.get(d.key()).cloned().unwrap_or(Value::Null))
            .collect();
        let group_key = Value::Array(key_values.clone()).to_string();
        groups
            .entry(group_key)
            .or_insert_with(|| (key_values, Vec::new()))
            .1
            .push(row);
    }

    groups
        .into_values()
        .map(|(key_values, members)| {
            let mut record = Record::new();
            for (dimension, value) in dimensions.iter().zip(key_values) {
                record.insert(dimension.key().to_string(), value);
            }
            for m in measures {
                record.insert(m.key().to_string(), measure(&members, *m));
            }
            record
        })
        .collect()
}

fn sample(row: &Row, table: SourceTable, matched: usize) -> Record {
    let keys = match table {
        SourceTable::Reviews => REVIEW_SAMPLE_KEYS,
        SourceTable::ReviewAttributes => ATTRIBUTE_SAMPLE_KEYS,
    };
    let mut record: Record = keys
        .iter()
        .filter_map(|k| row.fields.get(*k).map(|v| (k.to_string(), v.clone())))
        .collect();
    record.insert(MATCH_COUNT_KEY.to_string(), json!(matched as i64));
    record
}

#[async_trait]
impl CorpusStore for MemoryCorpus {
    async fn fetch(&self, query: &CompiledQuery) -> Result<Vec<Record>> {
        let table = SourceTable::from_name(&query.source_table).ok_or_else(|| {
            AppError::StoreQuery {
                message: format!("relation \"{}\" does not exist", query.source_table),
            }
        })?;

        let shape = &query.shape;
        let rows: Vec<&Row> = self
            .rows(table)
            .iter()
            .filter(|row| shape.filters.iter().all(|p| matches(row, p)))
            .collect();

        let mut records = match &shape.projection {
            Projection::Aggregate {
                dimensions,
                measures,
            } => aggregate(&rows, dimensions, measures),
            Projection::Samples => rows.iter().map(|row| sample(row, table, rows.len())).collect(),
        };

        sort_records(&mut records, &shape.order);

        if let Some(limit) = shape.limit {
            records.truncate(limit as usize);
        }

        Ok(records)
    }

    async fn distinct_values(&self, dimension: Dimension) -> Result<Vec<String>> {
        let values: BTreeSet<String> = self
            .reviews
            .iter()
            .filter_map(|row| row.text(dimension.key()))
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .collect();
        Ok(values.into_iter().collect())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
