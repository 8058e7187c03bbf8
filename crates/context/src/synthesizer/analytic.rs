//! Report sections from query results

use super::report::{ChartKind, ChartPoint, ChartRequest, ReportSection};
use super::{plural, Draft};
use crate::compiler::{Dimension, Measure, Projection, SourceTable, MATCH_COUNT_KEY};
use crate::executor::{QueryResult, ResultEnvelope};
use crate::store::Record;
use crate::strategy::{AggregationType, AnalysisPlan};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};

const MAX_QUOTES: usize = 5;
const MAX_TERMS: usize = 10;

const STOPWORDS: &[&str] = &[
    "and", "the", "for", "but", "not", "are", "was", "were", "this", "that", "with", "have",
    "has", "had", "you", "your", "its", "it's", "all", "any", "can", "out", "too", "very",
    "just", "than", "then", "from", "they", "them", "their", "what", "when", "which", "who",
    "will", "would", "there", "been", "also", "after", "before", "into", "over", "only",
    "more", "most", "some", "such", "our", "she", "her", "him", "his", "one", "really",
];

pub(super) fn draft(plan: &AnalysisPlan, envelope: &ResultEnvelope, min_evidence: usize) -> Draft {
    let mut sections = Vec::new();
    let mut charts = Vec::new();
    let mut per_table: BTreeMap<&str, usize> = BTreeMap::new();

    for result in &envelope.results {
        let prefix = table_label(&result.source_table);

        if !result.success {
            let error = result.error.as_deref().unwrap_or("unknown error");
            sections.push(ReportSection::insufficient(
                format!("{}: unavailable", prefix),
                format!("This query failed: {}", error),
            ));
            continue;
        }

        if result.data.is_empty() {
            sections.push(ReportSection::insufficient(
                format!("{}: no data", prefix),
                "No records match the requested filters.".to_string(),
            ));
            continue;
        }

        let result_sample = match &result.shape.projection {
            Projection::Aggregate {
                dimensions,
                measures,
            } => {
                let groups = aggregate_sections(result, dimensions, measures, min_evidence);
                let total = groups.iter().map(|s| s.sample_size).sum();
                sections.extend(groups);
                charts.extend(chart(plan, result, dimensions, measures));
                total
            }
            Projection::Samples => {
                let text_key = SourceTable::from_name(&result.source_table)
                    .map(|t| t.text_column())
                    .unwrap_or("content");
                sections.push(excerpt_section(result, text_key));
                if plan.counts_keywords() {
                    sections.push(keyword_section(result, text_key, min_evidence));
                }
                matched_rows(result)
            }
        };

        let entry = per_table.entry(result.source_table.as_str()).or_default();
        *entry = (*entry).max(result_sample);
    }

    let sample_size = per_table.values().sum();
    let c = &envelope.data_characteristics;
    let mut source_note = format!(
        "All figures are computed from {} returned by {} of {} {}.",
        plural(sample_size, "record"),
        c.succeeded,
        c.succeeded + c.failed,
        if c.succeeded + c.failed == 1 { "query" } else { "queries" },
    );
    if c.failed > 0 {
        source_note.push_str(" Sections from failed queries carry no figures.");
    }

    Draft {
        sections,
        charts,
        sample_size,
        min_evidence,
        source_note,
    }
}

fn table_label(source_table: &str) -> &'static str {
    match SourceTable::from_name(source_table) {
        Some(SourceTable::Reviews) => "Reviews",
        Some(SourceTable::ReviewAttributes) => "Attribute mentions",
        None => "Records",
    }
}

fn is_grouping(dimension: Dimension) -> bool {
    matches!(
        dimension,
        Dimension::Brand | Dimension::Product | Dimension::Channel | Dimension::Period
    )
}

fn label(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => "unknown".to_string(),
        Some(other) => other.to_string(),
    }
}

fn count(value: Option<&Value>) -> usize {
    value
        .and_then(|v| v.as_u64().or_else(|| v.as_f64().map(|f| f.max(0.0) as u64)))
        .unwrap_or(0) as usize
}

fn number(value: Option<&Value>) -> Option<f64> {
    value.and_then(Value::as_f64)
}

fn dimension_label(dimension: Dimension, row: &Record) -> String {
    let value = label(row.get(dimension.key()));
    match dimension {
        Dimension::Rating => format!("{} stars", value),
        _ => value,
    }
}

fn measure_phrase(measure: Measure, value: Option<&Value>) -> Option<String> {
    match measure {
        Measure::ReviewCount => Some(plural(count(value), "review")),
        Measure::MentionCount => Some(plural(count(value), "mention")),
        Measure::AvgRating => number(value).map(|x| format!("average rating {:.2}", x)),
        Measure::AvgAttributeScore => number(value).map(|x| format!("average score {:.2}", x)),
        Measure::PositiveRatingPct | Measure::PositiveSentimentPct => {
            number(value).map(|x| format!("{:.2}% positive", x))
        }
    }
}

fn row_line(row: &Record, dimensions: &[Dimension], measures: &[Measure]) -> String {
    let figures = measures
        .iter()
        .filter_map(|m| measure_phrase(*m, row.get(m.key())))
        .collect::<Vec<_>>()
        .join(", ");

    if dimensions.is_empty() {
        return figures;
    }

    let labels = dimensions
        .iter()
        .map(|d| dimension_label(*d, row))
        .collect::<Vec<_>>()
        .join(" / ");
    format!("{}: {}", labels, figures)
}

/// One section per value of the leading grouping dimension, or one section
/// when the result is not grouped
fn aggregate_sections(
    result: &QueryResult,
    dimensions: &[Dimension],
    measures: &[Measure],
    min_evidence: usize,
) -> Vec<ReportSection> {
    let prefix = table_label(&result.source_table);
    let count_measure = measures.iter().copied().find(|m| m.is_count());

    let (group, rest) = match dimensions.split_first() {
        Some((first, rest)) if is_grouping(*first) => (Some(*first), rest),
        _ => (None, dimensions),
    };

    // first-appearance order; keyword results are not sorted by group
    let mut groups: Vec<(String, Vec<&Record>)> = Vec::new();
    for row in &result.data {
        let key = group.map(|g| label(row.get(g.key()))).unwrap_or_default();
        match groups.iter_mut().find(|(k, _)| *k == key) {
            Some((_, rows)) => rows.push(row),
            None => groups.push((key, vec![row])),
        }
    }

    groups
        .into_iter()
        .map(|(key, rows)| {
            let title = match group {
                Some(_) => format!("{}: {}", prefix, key),
                None if rest.is_empty() => format!("{}: overall", prefix),
                None => format!(
                    "{}: by {}",
                    prefix,
                    rest.iter().map(|d| d.key()).collect::<Vec<_>>().join(" and ")
                ),
            };
            let body = rows
                .iter()
                .map(|row| row_line(row, rest, measures))
                .collect::<Vec<_>>()
                .join("\n");
            let sample_size = match count_measure {
                Some(m) => rows.iter().map(|r| count(r.get(m.key()))).sum(),
                None => rows.len(),
            };
            ReportSection::measured(title, body, sample_size, min_evidence)
        })
        .collect()
}

fn quote(row: &Record, text_key: &str) -> Option<String> {
    let text = row.get(text_key)?.as_str()?;
    let source: Vec<&str> = ["brand", "product", "attribute", "sentiment", "review_date"]
        .iter()
        .filter_map(|k| row.get(*k).and_then(Value::as_str))
        .collect();

    if source.is_empty() {
        Some(format!("- \"{}\"", text))
    } else {
        Some(format!("- \"{}\" ({})", text, source.join(", ")))
    }
}

/// Rows matching the sample filters; the returned rows are a prefix of these
fn matched_rows(result: &QueryResult) -> usize {
    result
        .data
        .first()
        .and_then(|row| row.get(MATCH_COUNT_KEY))
        .map(|v| count(Some(v)))
        .unwrap_or(result.row_count)
        .max(result.row_count)
}

fn excerpt_section(result: &QueryResult, text_key: &str) -> ReportSection {
    let body = result
        .data
        .iter()
        .filter_map(|row| quote(row, text_key))
        .take(MAX_QUOTES)
        .collect::<Vec<_>>()
        .join("\n");

    ReportSection::quoted(
        format!("{}: excerpts", table_label(&result.source_table)),
        body,
        matched_rows(result),
    )
}

fn terms(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphabetic() && c != '\'')
        .map(|t| t.trim_matches('\''))
        .filter(|t| t.chars().count() >= 3 && !STOPWORDS.contains(t))
        .map(str::to_string)
        .collect()
}

/// Terms by the number of samples mentioning them. Grounding is judged on
/// every matching row, not only the ones counted.
fn keyword_section(result: &QueryResult, text_key: &str, min_evidence: usize) -> ReportSection {
    let texts: Vec<&str> = result
        .data
        .iter()
        .filter_map(|row| row.get(text_key).and_then(Value::as_str))
        .collect();
    let title = format!("{}: frequent terms", table_label(&result.source_table));
    if texts.is_empty() {
        return ReportSection::insufficient(title, "No review text to count.".to_string());
    }

    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for text in &texts {
        for term in terms(text) {
            *counts.entry(term).or_default() += 1;
        }
    }

    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    let body = ranked
        .iter()
        .take(MAX_TERMS)
        .map(|(term, n)| format!("{}: {} of {}", term, n, plural(texts.len(), "sample")))
        .collect::<Vec<_>>()
        .join("\n");

    ReportSection::measured(
        title,
        body,
        matched_rows(result),
        min_evidence,
    )
}

fn chart(
    plan: &AnalysisPlan,
    result: &QueryResult,
    dimensions: &[Dimension],
    measures: &[Measure],
) -> Option<ChartRequest> {
    let kind = match plan.aggregation_type {
        AggregationType::TimeSeries => ChartKind::Line,
        AggregationType::Comparison
        | AggregationType::Distribution
        | AggregationType::KeywordFrequency => ChartKind::Bar,
        AggregationType::Simple => return None,
    };

    let (x, series) = match dimensions {
        [] => return None,
        [x] => (*x, None),
        [x, series, ..] => (*x, Some(*series)),
    };
    // a distribution is bucketed on the value itself, so plot how many fall in each bucket
    let y = match plan.aggregation_type {
        AggregationType::Distribution => measures.iter().find(|m| m.is_count()),
        _ => measures.iter().find(|m| !m.is_count()),
    }
    .or_else(|| measures.first())?;

    let points: Vec<ChartPoint> = result
        .data
        .iter()
        .filter_map(|row| {
            Some(ChartPoint {
                x: dimension_label(x, row),
                series: series.map(|s| dimension_label(s, row)),
                y: number(row.get(y.key()))?,
            })
        })
        .collect();

    if points.is_empty() {
        return None;
    }

    Some(ChartRequest {
        kind,
        title: format!("{} by {}", y.key(), x.key()),
        x_label: x.key().to_string(),
        y_label: y.key().to_string(),
        points,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::QueryCompiler;
    use crate::entities::{EntityExtractor, EntitySet};
    use crate::executor::QueryExecutor;
    use crate::fixtures;
    use crate::question::Question;
    use crate::store::CorpusStore;
    use crate::strategy::{AnalysisDepth, DataScope, GroupBy, Metric, StrategyResolver};
    use crate::synthesizer::SectionStatus;
    use reviewlens_common::config::AnalysisConfig;
    use std::sync::Arc;

    async fn run(text: &str, min_evidence: usize) -> (AnalysisPlan, ResultEnvelope, Draft) {
        let vocabulary = fixtures::vocabulary();
        let question = Question::at(text, fixtures::now()).unwrap();
        let entities = EntityExtractor::new(vocabulary.clone()).extract(&question);
        let plan = StrategyResolver::new(&vocabulary).resolve(&question, &entities);
        let (envelope, draft) = run_plan(plan, &entities, min_evidence).await;
        (plan, envelope, draft)
    }

    async fn run_plan(plan: AnalysisPlan, entities: &EntitySet, min_evidence: usize) -> (ResultEnvelope, Draft) {
        let config = AnalysisConfig::default();
        let queries = QueryCompiler::new(&config).compile(&plan, entities).unwrap();
        let store: Arc<dyn CorpusStore> = Arc::new(fixtures::memory_corpus());
        let envelope = QueryExecutor::new(store, &config).execute(&queries).await;
        let draft = draft(&plan, &envelope, min_evidence);
        (envelope, draft)
    }

    fn record_numbers(envelope: &ResultEnvelope) -> HashSet<String> {
        let number = regex_lite::Regex::new(r"\d+(\.\d+)?").unwrap();
        let mut allowed = HashSet::new();
        for result in envelope.successful() {
            allowed.insert(result.row_count.to_string());
            for row in &result.data {
                for value in row.values() {
                    match value {
                        Value::Number(n) => {
                            if let Some(i) = n.as_i64() {
                                allowed.insert(i.to_string());
                            }
                            if let Some(f) = n.as_f64() {
                                allowed.insert(format!("{:.2}", f));
                            }
                        }
                        Value::String(s) => {
                            allowed.extend(number.find_iter(s).map(|m| m.as_str().to_string()));
                        }
                        _ => {}
                    }
                }
            }
        }
        allowed
    }

    #[tokio::test]
    async fn test_section_numbers_come_from_records() {
        let (_, envelope, draft) = run("Compare Brand A and Brand B average rating", 1).await;
        let allowed = record_numbers(&envelope);
        let number = regex_lite::Regex::new(r"\d+(\.\d+)?").unwrap();

        assert!(!draft.sections.is_empty());
        for section in &draft.sections {
            for m in number.find_iter(&section.body) {
                assert!(
                    allowed.contains(m.as_str()),
                    "{} in {:?} is not in the records",
                    m.as_str(),
                    section.body
                );
            }
        }
    }

    #[tokio::test]
    async fn test_small_groups_are_uncertain_but_kept() {
        let (_, _, draft) = run("Compare Brand A and Brand B average rating", 40).await;

        let brand_a = draft
            .sections
            .iter()
            .find(|s| s.title == "Reviews: Brand A")
            .unwrap();
        assert_eq!(brand_a.sample_size, 12);
        assert_eq!(brand_a.status, SectionStatus::Uncertain);
        assert_eq!(draft.sample_size, 24);
    }

    #[tokio::test]
    async fn test_comparison_gets_bar_chart() {
        let (_, _, draft) = run("Compare Brand A and Brand B average rating", 1).await;
        assert_eq!(draft.charts.len(), 1);
        assert_eq!(draft.charts[0].kind, ChartKind::Bar);
        assert_eq!(draft.charts[0].points.len(), 2);
    }

    #[tokio::test]
    async fn test_evidence_plan_quotes_excerpts() {
        let (plan, _, draft) =
            run("Compare Brand A and Brand B moisturizing feedback", 1).await;
        assert!(plan.analysis_depth.is_qualitative());

        let excerpts = draft
            .sections
            .iter()
            .find(|s| s.title == "Attribute mentions: excerpts")
            .unwrap();
        assert!(excerpts.body.lines().count() <= MAX_QUOTES);
        assert!(excerpts.body.contains("moisturizing"));

        // both queries cover the same mentions; they are not added up
        let grouped: usize = draft
            .sections
            .iter()
            .filter(|s| s.title.starts_with("Attribute mentions: Brand"))
            .map(|s| s.sample_size)
            .sum();
        assert_eq!(grouped, 6);
        assert_eq!(excerpts.sample_size, 6);
        assert_eq!(draft.sample_size, 6);
    }

    #[tokio::test]
    async fn test_keyword_section_grounded_on_all_matches() {
        let plan = AnalysisPlan {
            data_scope: DataScope::EvidenceStore,
            aggregation_type: AggregationType::KeywordFrequency,
            group_by: GroupBy::Brand,
            analysis_depth: AnalysisDepth::Keyword,
            metric: Metric::Count,
        };
        let min_evidence = AnalysisConfig::default().min_evidence;
        let (_, draft) = run_plan(plan, &EntitySet::default(), min_evidence).await;

        let terms = draft
            .sections
            .iter()
            .find(|s| s.title == "Attribute mentions: frequent terms")
            .unwrap();
        assert_eq!(terms.sample_size, fixtures::REVIEW_COUNT);
        assert_eq!(terms.status, SectionStatus::Grounded);
        assert!(terms.body.lines().all(|line| line.ends_with("of 30 samples")));
    }

    #[tokio::test]
    async fn test_distribution_chart_counts_each_bucket() {
        let plan = AnalysisPlan {
            aggregation_type: AggregationType::Distribution,
            ..AnalysisPlan::default()
        };
        let (_, draft) = run_plan(plan, &EntitySet::default(), 1).await;

        assert_eq!(draft.charts.len(), 1);
        let chart = &draft.charts[0];
        assert_eq!(chart.kind, ChartKind::Bar);
        assert_eq!(chart.x_label, "rating");
        assert_eq!(chart.y_label, "review_count");

        let snapshot = fixtures::snapshot();
        for point in &chart.points {
            let stars: i32 = point.x.trim_end_matches(" stars").parse().unwrap();
            let expected = snapshot.reviews.iter().filter(|r| r.rating == stars).count();
            assert_eq!(point.y, expected as f64, "{}", point.x);
        }
        let total: f64 = chart.points.iter().map(|p| p.y).sum();
        assert_eq!(total, fixtures::REVIEW_COUNT as f64);
    }

    #[test]
    fn test_terms_skip_stopwords() {
        let t = terms("The smell is far TOO strong, and it's sticky");
        assert!(t.contains("smell"));
        assert!(t.contains("strong"));
        assert!(t.contains("sticky"));
        assert!(!t.contains("the"));
        assert!(!t.contains("too"));
        assert!(!t.contains("is"));
    }
}
