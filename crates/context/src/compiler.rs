//! Query compilation: analysis plan → parameterized store queries
//!
//! Every compiled query carries two equivalent renderings: SQL text with
//! `$n` placeholders for PostgreSQL, and a structured `QueryShape` for stores
//! that do not speak SQL. Both produce records with the same keys.

use crate::entities::EntitySet;
use crate::strategy::{AggregationType, AnalysisDepth, AnalysisPlan, DataScope, GroupBy, Metric};
use chrono::NaiveDate;
use reviewlens_common::config::AnalysisConfig;
use reviewlens_common::errors::{AppError, Result};
use serde::Serialize;

/// Tables of the read-only corpus store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceTable {
    Reviews,
    ReviewAttributes,
}

const REVIEW_SAMPLE_COLUMNS: &[&str] = &[
    "id",
    "brand",
    "product",
    "channel",
    "rating",
    "to_char(review_date, 'YYYY-MM-DD') AS review_date",
    "content",
];

const ATTRIBUTE_SAMPLE_COLUMNS: &[&str] = &[
    "id",
    "review_id",
    "brand",
    "product",
    "channel",
    "attribute",
    "sentiment",
    "score",
    "to_char(review_date, 'YYYY-MM-DD') AS review_date",
    "excerpt",
];

/// Rows matching the filters before `LIMIT`, repeated on every sample row
pub const MATCH_COUNT_KEY: &str = "match_count";

const MATCH_COUNT_SQL: &str = "(COUNT(*) OVER ())::int8 AS match_count";

impl SourceTable {
    pub fn name(self) -> &'static str {
        match self {
            Self::Reviews => "reviews",
            Self::ReviewAttributes => "review_attributes",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "reviews" => Some(Self::Reviews),
            "review_attributes" => Some(Self::ReviewAttributes),
            _ => None,
        }
    }

    /// Column holding quotable review text
    pub fn text_column(self) -> &'static str {
        match self {
            Self::Reviews => "content",
            Self::ReviewAttributes => "excerpt",
        }
    }

    fn sample_columns(self) -> &'static [&'static str] {
        match self {
            Self::Reviews => REVIEW_SAMPLE_COLUMNS,
            Self::ReviewAttributes => ATTRIBUTE_SAMPLE_COLUMNS,
        }
    }

    fn supports(self, metric: Metric) -> bool {
        match self {
            Self::Reviews => metric != Metric::AttributeScore,
            Self::ReviewAttributes => metric != Metric::Rating,
        }
    }

    /// Metric used when a mixed plan asks for something this table lacks
    fn natural_metric(self) -> Metric {
        match self {
            Self::Reviews => Metric::Rating,
            Self::ReviewAttributes => Metric::AttributeScore,
        }
    }

    fn measures(self, metric: Metric) -> Vec<Measure> {
        match (self, metric) {
            (Self::Reviews, Metric::Count) => vec![Measure::ReviewCount],
            (Self::Reviews, Metric::Percentage) => {
                vec![Measure::ReviewCount, Measure::PositiveRatingPct]
            }
            (Self::Reviews, _) => vec![Measure::ReviewCount, Measure::AvgRating],
            (Self::ReviewAttributes, Metric::Count) => vec![Measure::MentionCount],
            (Self::ReviewAttributes, Metric::Percentage) => {
                vec![Measure::MentionCount, Measure::PositiveSentimentPct]
            }
            (Self::ReviewAttributes, _) => vec![Measure::MentionCount, Measure::AvgAttributeScore],
        }
    }
}

/// A grouping or filter column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Brand,
    Product,
    Channel,
    /// Calendar month, `YYYY-MM`
    Period,
    Rating,
    Sentiment,
    Attribute,
}

impl Dimension {
    /// Output record key
    pub fn key(self) -> &'static str {
        match self {
            Self::Brand => "brand",
            Self::Product => "product",
            Self::Channel => "channel",
            Self::Period => "period",
            Self::Rating => "rating",
            Self::Sentiment => "sentiment",
            Self::Attribute => "attribute",
        }
    }

    fn sql_expr(self) -> &'static str {
        match self {
            Self::Period => "to_char(date_trunc('month', review_date), 'YYYY-MM')",
            other => other.key(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Measure {
    ReviewCount,
    AvgRating,
    /// Share of reviews rated 4 or 5, in percent
    PositiveRatingPct,
    MentionCount,
    AvgAttributeScore,
    /// Share of positive attribute mentions, in percent
    PositiveSentimentPct,
}

impl Measure {
    pub fn key(self) -> &'static str {
        match self {
            Self::ReviewCount => "review_count",
            Self::AvgRating => "avg_rating",
            Self::PositiveRatingPct | Self::PositiveSentimentPct => "positive_pct",
            Self::MentionCount => "mention_count",
            Self::AvgAttributeScore => "avg_score",
        }
    }

    /// Whether the value counts records (the section sample size)
    pub fn is_count(self) -> bool {
        matches!(self, Self::ReviewCount | Self::MentionCount)
    }

    fn sql(self) -> &'static str {
        match self {
            Self::ReviewCount => "COUNT(*)::int8 AS review_count",
            Self::AvgRating => "AVG(rating)::float8 AS avg_rating",
            Self::PositiveRatingPct => {
                "(100.0 * COUNT(*) FILTER (WHERE rating >= 4) / NULLIF(COUNT(*), 0))::float8 AS positive_pct"
            }
            Self::MentionCount => "COUNT(*)::int8 AS mention_count",
            Self::AvgAttributeScore => "AVG(score)::float8 AS avg_score",
            Self::PositiveSentimentPct => {
                "(100.0 * COUNT(*) FILTER (WHERE sentiment = 'positive') / NULLIF(COUNT(*), 0))::float8 AS positive_pct"
            }
        }
    }
}

/// Parameter-bound filter
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Predicate {
    In { dimension: Dimension, values: Vec<String> },
    /// `start <= review_date < end`
    DateRange { start: NaiveDate, end: NaiveDate },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Projection {
    Aggregate {
        dimensions: Vec<Dimension>,
        measures: Vec<Measure>,
    },
    /// Raw rows with their quotable text
    Samples,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderKey {
    pub key: String,
    pub descending: bool,
}

impl OrderKey {
    fn asc(key: &str) -> Self {
        Self {
            key: key.to_string(),
            descending: false,
        }
    }

    fn desc(key: &str) -> Self {
        Self {
            key: key.to_string(),
            descending: true,
        }
    }
}

/// Structured description of a query, equivalent to its SQL
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryShape {
    pub projection: Projection,
    pub filters: Vec<Predicate>,
    pub order: Vec<OrderKey>,
    pub limit: Option<u32>,
}

impl QueryShape {
    pub fn is_samples(&self) -> bool {
        matches!(self.projection, Projection::Samples)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QueryParam {
    Text(String),
    Date(NaiveDate),
    Int(i64),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledQuery {
    pub purpose: String,
    pub source_table: String,
    /// SQL with `$n` placeholders
    pub statement: String,
    /// Ordered placeholder values
    pub parameters: Vec<QueryParam>,
    pub shape: QueryShape,
}

impl CompiledQuery {
    fn new(purpose: String, table: SourceTable, shape: QueryShape) -> Self {
        let (statement, parameters) = render(table, &shape);
        Self {
            purpose,
            source_table: table.name().to_string(),
            statement,
            parameters,
            shape,
        }
    }
}

#[derive(Default)]
struct StatementBuilder {
    params: Vec<QueryParam>,
}

impl StatementBuilder {
    fn bind(&mut self, param: QueryParam) -> String {
        self.params.push(param);
        format!("${}", self.params.len())
    }

    fn predicate(&mut self, predicate: &Predicate) -> String {
        match predicate {
            Predicate::In { dimension, values } => {
                let placeholders: Vec<String> = values
                    .iter()
                    .map(|v| self.bind(QueryParam::Text(v.clone())))
                    .collect();
                format!("{} IN ({})", dimension.sql_expr(), placeholders.join(", "))
            }
            Predicate::DateRange { start, end } => {
                let start = self.bind(QueryParam::Date(*start));
                let end = self.bind(QueryParam::Date(*end));
                format!("review_date >= {} AND review_date < {}", start, end)
            }
        }
    }
}

fn render(table: SourceTable, shape: &QueryShape) -> (String, Vec<QueryParam>) {
    let mut builder = StatementBuilder::default();

    let select = match &shape.projection {
        Projection::Aggregate {
            dimensions,
            measures,
        } => dimensions
            .iter()
            .map(|d| format!("{} AS \"{}\"", d.sql_expr(), d.key()))
            .chain(measures.iter().map(|m| m.sql().to_string()))
            .collect::<Vec<_>>()
            .join(", "),
        Projection::Samples => table
            .sample_columns()
            .iter()
            .copied()
            .chain(std::iter::once(MATCH_COUNT_SQL))
            .collect::<Vec<_>>()
            .join(", "),
    };

    let mut sql = format!("SELECT {} FROM {}", select, table.name());

    if !shape.filters.is_empty() {
        let clauses: Vec<String> = shape
            .filters
            .iter()
            .map(|p| builder.predicate(p))
            .collect();
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }

    if let Projection::Aggregate { dimensions, .. } = &shape.projection {
        if dimensions.is_empty() {
            // an ungrouped aggregate over nothing is no row, not a zero row
            sql.push_str(" HAVING COUNT(*) > 0");
        } else {
            let ordinals: Vec<String> = (1..=dimensions.len()).map(|i| i.to_string()).collect();
            sql.push_str(" GROUP BY ");
            sql.push_str(&ordinals.join(", "));
        }
    }

    if !shape.order.is_empty() {
        let keys: Vec<String> = shape
            .order
            .iter()
            .map(|o| format!("\"{}\" {}", o.key, if o.descending { "DESC" } else { "ASC" }))
            .collect();
        sql.push_str(" ORDER BY ");
        sql.push_str(&keys.join(", "));
    }

    if let Some(limit) = shape.limit {
        let placeholder = builder.bind(QueryParam::Int(i64::from(limit)));
        sql.push_str(" LIMIT ");
        sql.push_str(&placeholder);
    }

    (sql, builder.params)
}

fn group_dimension(group_by: GroupBy) -> Option<Dimension> {
    match group_by {
        GroupBy::Brand => Some(Dimension::Brand),
        GroupBy::Product => Some(Dimension::Product),
        GroupBy::Channel => Some(Dimension::Channel),
        GroupBy::Period => Some(Dimension::Period),
        GroupBy::None => None,
    }
}

fn push_dimension(dimensions: &mut Vec<Dimension>, dimension: Dimension) {
    if !dimensions.contains(&dimension) {
        dimensions.push(dimension);
    }
}

/// Compiles plans into store queries
#[derive(Debug, Clone)]
pub struct QueryCompiler {
    sample_limit: u32,
    keyword_sample_limit: u32,
    keyword_limit: u32,
}

impl Default for QueryCompiler {
    fn default() -> Self {
        Self::new(&AnalysisConfig::default())
    }
}

impl QueryCompiler {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            sample_limit: config.sample_limit,
            keyword_sample_limit: config.keyword_sample_limit(),
            keyword_limit: config.keyword_limit,
        }
    }

    /// Compile a plan into 1-2 queries per touched store
    pub fn compile(&self, plan: &AnalysisPlan, entities: &EntitySet) -> Result<Vec<CompiledQuery>> {
        plan.validate()?;

        let mut queries = Vec::new();

        if plan.data_scope.touches_aggregate() {
            let metric = store_metric(plan, SourceTable::Reviews)?;
            queries.extend(self.aggregate_store_queries(plan, metric, entities));
        }

        if plan.data_scope.touches_evidence() {
            let metric = store_metric(plan, SourceTable::ReviewAttributes)?;
            queries.extend(self.evidence_store_queries(plan, metric, entities));
        }

        for query in &queries {
            tracing::debug!(
                purpose = %query.purpose,
                statement = %query.statement,
                params = query.parameters.len(),
                "Query compiled"
            );
        }

        Ok(queries)
    }

    fn aggregate_store_queries(
        &self,
        plan: &AnalysisPlan,
        metric: Metric,
        entities: &EntitySet,
    ) -> Vec<CompiledQuery> {
        let table = SourceTable::Reviews;
        let filters = filters_for(table, entities);

        // Keyword counts on review text are computed downstream from samples
        if plan.aggregation_type == AggregationType::KeywordFrequency {
            return vec![self.samples(plan, table, filters)];
        }

        let mut dimensions: Vec<Dimension> = group_dimension(plan.group_by).into_iter().collect();
        if plan.aggregation_type == AggregationType::Distribution {
            push_dimension(&mut dimensions, Dimension::Rating);
        }

        vec![aggregate(
            format!("{}:{}", table.name(), plan.aggregation_type),
            table,
            dimensions,
            table.measures(metric),
            filters,
        )]
    }

    fn evidence_store_queries(
        &self,
        plan: &AnalysisPlan,
        metric: Metric,
        entities: &EntitySet,
    ) -> Vec<CompiledQuery> {
        let table = SourceTable::ReviewAttributes;
        let filters = filters_for(table, entities);

        let secondary = match plan.analysis_depth {
            AnalysisDepth::Attribute | AnalysisDepth::Keyword => Some(Dimension::Attribute),
            AnalysisDepth::Sentiment | AnalysisDepth::ProsCons => Some(Dimension::Sentiment),
            AnalysisDepth::Overview => None,
        };

        let mut dimensions: Vec<Dimension> = group_dimension(plan.group_by).into_iter().collect();
        let purpose = format!("{}:{}", table.name(), plan.aggregation_type);

        let main = match plan.aggregation_type {
            AggregationType::KeywordFrequency => {
                push_dimension(&mut dimensions, Dimension::Attribute);
                let mut order = vec![OrderKey::desc(Measure::MentionCount.key())];
                order.extend(dimensions.iter().map(|d| OrderKey::asc(d.key())));
                let shape = QueryShape {
                    projection: Projection::Aggregate {
                        dimensions,
                        measures: vec![Measure::MentionCount],
                    },
                    filters: filters.clone(),
                    order,
                    limit: Some(self.keyword_limit),
                };
                CompiledQuery::new(purpose, table, shape)
            }
            aggregation => {
                if aggregation == AggregationType::Distribution {
                    push_dimension(&mut dimensions, Dimension::Sentiment);
                } else if let Some(secondary) = secondary {
                    push_dimension(&mut dimensions, secondary);
                }
                aggregate(
                    purpose,
                    table,
                    dimensions,
                    table.measures(metric),
                    filters.clone(),
                )
            }
        };

        let mut queries = vec![main];
        if plan.analysis_depth.is_qualitative() {
            queries.push(self.samples(plan, table, filters));
        }
        queries
    }

    /// Samples feeding keyword counts are never smaller than the grounding threshold
    fn samples(&self, plan: &AnalysisPlan, table: SourceTable, filters: Vec<Predicate>) -> CompiledQuery {
        let limit = if plan.counts_keywords() {
            self.keyword_sample_limit
        } else {
            self.sample_limit
        };
        let shape = QueryShape {
            projection: Projection::Samples,
            filters,
            order: vec![OrderKey::desc("review_date"), OrderKey::asc("id")],
            limit: Some(limit),
        };
        CompiledQuery::new(format!("{}:samples", table.name()), table, shape)
    }
}

fn aggregate(
    purpose: String,
    table: SourceTable,
    dimensions: Vec<Dimension>,
    measures: Vec<Measure>,
    filters: Vec<Predicate>,
) -> CompiledQuery {
    let order = dimensions.iter().map(|d| OrderKey::asc(d.key())).collect();
    let shape = QueryShape {
        projection: Projection::Aggregate {
            dimensions,
            measures,
        },
        filters,
        order,
        limit: None,
    };
    CompiledQuery::new(purpose, table, shape)
}

fn store_metric(plan: &AnalysisPlan, table: SourceTable) -> Result<Metric> {
    if table.supports(plan.metric) {
        return Ok(plan.metric);
    }
    if plan.data_scope == DataScope::Both {
        return Ok(table.natural_metric());
    }
    Err(AppError::Compile {
        message: format!("metric {} is not supported by {}", plan.metric, table.name()),
    })
}

fn filters_for(table: SourceTable, entities: &EntitySet) -> Vec<Predicate> {
    let mut filters = Vec::new();

    let mut filter_in = |dimension: Dimension, values: &[String]| {
        if !values.is_empty() {
            filters.push(Predicate::In {
                dimension,
                values: values.to_vec(),
            });
        }
    };

    filter_in(Dimension::Brand, &entities.brands);
    filter_in(Dimension::Product, &entities.products);
    filter_in(Dimension::Channel, &entities.channels);
    // Ratings are per review; attribute filters only narrow mentions
    if table == SourceTable::ReviewAttributes {
        filter_in(Dimension::Attribute, &entities.attributes);
    }

    if let Some(period) = &entities.period {
        filters.push(Predicate::DateRange {
            start: period.start,
            end: period.end,
        });
    }

    filters
}
