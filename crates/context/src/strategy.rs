//! Strategy resolution: question + entities → analysis plan
//!
//! Provides:
//! - The `AnalysisPlan` vocabulary (scope, shape, grouping, depth, metric)
//! - Plan invariant validation
//! - A pure, first-match-wins resolver

use crate::entities::{EntitySet, Vocabulary};
use crate::question::Question;
use reviewlens_common::errors::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Which store(s) answer the question
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataScope {
    AggregateStore,
    EvidenceStore,
    Both,
}

impl DataScope {
    pub fn touches_aggregate(self) -> bool {
        matches!(self, Self::AggregateStore | Self::Both)
    }

    pub fn touches_evidence(self) -> bool {
        matches!(self, Self::EvidenceStore | Self::Both)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationType {
    TimeSeries,
    Comparison,
    Distribution,
    KeywordFrequency,
    Simple,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupBy {
    Brand,
    Product,
    Channel,
    Period,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisDepth {
    Overview,
    Attribute,
    Sentiment,
    Keyword,
    ProsCons,
}

impl AnalysisDepth {
    /// Depths that quote review text
    pub fn is_qualitative(self) -> bool {
        !matches!(self, Self::Overview)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Rating,
    Count,
    Percentage,
    AttributeScore,
}

macro_rules! snake_display {
    ($($ty:ty),+) => {
        $(
            impl fmt::Display for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    let value = serde_json::to_value(self).map_err(|_| fmt::Error)?;
                    f.write_str(value.as_str().unwrap_or_default())
                }
            }
        )+
    };
}

snake_display!(DataScope, AggregationType, GroupBy, AnalysisDepth, Metric);

/// How a question will be answered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisPlan {
    pub data_scope: DataScope,
    pub aggregation_type: AggregationType,
    pub group_by: GroupBy,
    pub analysis_depth: AnalysisDepth,
    pub metric: Metric,
}

impl Default for AnalysisPlan {
    fn default() -> Self {
        Self {
            data_scope: DataScope::AggregateStore,
            aggregation_type: AggregationType::Simple,
            group_by: GroupBy::None,
            analysis_depth: AnalysisDepth::Overview,
            metric: Metric::Rating,
        }
    }
}

impl AnalysisPlan {
    /// Whether the report counts terms over text samples
    pub fn counts_keywords(&self) -> bool {
        self.aggregation_type == AggregationType::KeywordFrequency
            || self.analysis_depth == AnalysisDepth::Keyword
    }

    /// Check the shape/grouping invariants
    pub fn validate(&self) -> Result<()> {
        use AggregationType as A;

        let ok = match (self.aggregation_type, self.group_by) {
            (A::TimeSeries, GroupBy::Period) => true,
            (A::TimeSeries, _) | (_, GroupBy::Period) => false,
            (A::Comparison, g) => matches!(g, GroupBy::Brand | GroupBy::Product | GroupBy::Channel),
            (A::Simple | A::Distribution, _) => true,
            (A::KeywordFrequency, g) => g != GroupBy::None,
        };

        if ok {
            Ok(())
        } else {
            Err(AppError::InvalidPlan {
                message: format!(
                    "aggregation {} cannot be grouped by {}",
                    self.aggregation_type, self.group_by
                ),
            })
        }
    }
}

const QUALITATIVE_WORDS: &[&str] = &[
    "feedback", "opinion", "opinions", "say", "saying", "said", "think", "feel about",
    "complain", "complaint", "complaints", "like", "dislike", "love", "hate", "why",
    "experience", "experiences", "pros", "cons", "sentiment", "mention", "mentions",
    "mentioned", "keyword", "keywords", "review text", "comments",
];

const QUANTITATIVE_WORDS: &[&str] = &[
    "rating", "ratings", "rated", "stars", "star", "average", "avg", "mean", "count",
    "how many", "number of", "volume", "percentage", "percent", "share", "ratio",
    "proportion", "score", "scores",
];

const PROS_CONS_WORDS: &[&str] = &[
    "pros", "cons", "pros and cons", "strengths", "weaknesses", "good and bad",
    "likes and dislikes", "advantages", "disadvantages",
];

const SENTIMENT_WORDS: &[&str] = &[
    "sentiment", "positive", "negative", "satisfaction", "satisfied", "dissatisfied",
    "happy", "unhappy", "complain", "complaint", "complaints",
];

const KEYWORD_WORDS: &[&str] = &[
    "keyword", "keywords", "words", "terms", "phrases", "most mentioned", "frequently mentioned",
    "buzzwords", "word cloud",
];

const TREND_WORDS: &[&str] = &[
    "trend", "trends", "trending", "over time", "monthly", "per month", "by month",
    "month by month", "month over month", "change", "changed", "changes", "changing",
    "evolve", "evolved", "growth", "grew", "increase", "increased", "decrease", "decreased",
    "decline", "declined", "rising", "falling",
];

const DISTRIBUTION_WORDS: &[&str] = &["distribution", "breakdown", "spread", "histogram", "split"];

const PERCENTAGE_WORDS: &[&str] = &["percentage", "percent", "share", "ratio", "proportion", "%"];

const COUNT_WORDS: &[&str] = &["how many", "count", "number of", "volume"];

const COMPARISON_WORDS: &[&str] = &[
    "compare", "compared", "comparing", "comparison", "vs", "versus", "difference between",
    "better than", "worse than",
];

const BY_BRAND_WORDS: &[&str] = &["by brand", "per brand", "each brand", "across brands"];
const BY_PRODUCT_WORDS: &[&str] = &["by product", "per product", "each product", "across products"];
const BY_CHANNEL_WORDS: &[&str] = &["by channel", "per channel", "each channel", "across channels"];

/// Whole-phrase match on padded normalized text
fn mentions(padded: &str, words: &[&str]) -> bool {
    words.iter().any(|w| {
        if *w == "%" {
            padded.contains('%')
        } else {
            padded.contains(&format!(" {} ", w))
        }
    })
}

/// Explicit comparison wording, regardless of resolved targets
pub fn has_comparison_intent(question: &Question) -> bool {
    mentions(&format!(" {} ", question.normalized()), COMPARISON_WORDS)
}

/// Maps a question and its entities to an `AnalysisPlan`. Pure.
#[derive(Debug, Clone, Default)]
pub struct StrategyResolver {
    /// Attributes measured numerically rather than judged from text
    quantitative_attributes: HashSet<String>,
}

impl StrategyResolver {
    pub fn new(vocabulary: &Vocabulary) -> Self {
        Self {
            quantitative_attributes: vocabulary
                .attributes
                .iter()
                .filter(|e| !vocabulary.is_qualitative(&e.name))
                .map(|e| e.name.clone())
                .collect(),
        }
    }

    pub fn resolve(&self, question: &Question, entities: &EntitySet) -> AnalysisPlan {
        let padded = format!(" {} ", question.normalized());

        let qualitative_attr = entities
            .attributes
            .iter()
            .any(|a| !self.quantitative_attributes.contains(a));
        let quantitative_attr = entities
            .attributes
            .iter()
            .any(|a| self.quantitative_attributes.contains(a));

        let qualitative = qualitative_attr || mentions(&padded, QUALITATIVE_WORDS);
        let quantitative = quantitative_attr || mentions(&padded, QUANTITATIVE_WORDS);

        let (data_scope, analysis_depth) = match (qualitative, quantitative) {
            (true, true) => (DataScope::Both, refine_depth(&padded)),
            (true, false) => (DataScope::EvidenceStore, refine_depth(&padded)),
            (false, _) => (DataScope::AggregateStore, AnalysisDepth::Overview),
        };

        let (aggregation_type, group_by) = resolve_shape(&padded, entities, analysis_depth);

        let metric = if mentions(&padded, PERCENTAGE_WORDS) {
            Metric::Percentage
        } else if mentions(&padded, COUNT_WORDS) || analysis_depth == AnalysisDepth::Keyword {
            Metric::Count
        } else if data_scope == DataScope::EvidenceStore {
            Metric::AttributeScore
        } else {
            Metric::Rating
        };

        let plan = AnalysisPlan {
            data_scope,
            aggregation_type,
            group_by,
            analysis_depth,
            metric,
        };

        tracing::debug!(
            data_scope = %plan.data_scope,
            aggregation_type = %plan.aggregation_type,
            group_by = %plan.group_by,
            analysis_depth = %plan.analysis_depth,
            metric = %plan.metric,
            "Strategy resolved"
        );

        plan
    }
}

fn refine_depth(padded: &str) -> AnalysisDepth {
    if mentions(padded, PROS_CONS_WORDS) {
        AnalysisDepth::ProsCons
    } else if mentions(padded, KEYWORD_WORDS) {
        AnalysisDepth::Keyword
    } else if mentions(padded, SENTIMENT_WORDS) {
        AnalysisDepth::Sentiment
    } else {
        AnalysisDepth::Attribute
    }
}

fn resolve_shape(
    padded: &str,
    entities: &EntitySet,
    depth: AnalysisDepth,
) -> (AggregationType, GroupBy) {
    let brands = entities.brands.len();
    let products = entities.products.len();

    // Products win when both have comparison targets and the counts differ
    let comparison_group = match (brands >= 2, products >= 2) {
        (true, true) if brands != products => Some(GroupBy::Product),
        (true, _) => Some(GroupBy::Brand),
        (false, true) => Some(GroupBy::Product),
        (false, false) if entities.channels.len() >= 2 || mentions(padded, BY_CHANNEL_WORDS) => {
            Some(GroupBy::Channel)
        }
        (false, false) if mentions(padded, BY_PRODUCT_WORDS) => Some(GroupBy::Product),
        (false, false) if mentions(padded, BY_BRAND_WORDS) => Some(GroupBy::Brand),
        (false, false) => None,
    };

    if let Some(group) = comparison_group {
        return (AggregationType::Comparison, group);
    }

    if entities.period.is_some() && mentions(padded, TREND_WORDS) {
        return (AggregationType::TimeSeries, GroupBy::Period);
    }

    if depth == AnalysisDepth::Keyword {
        let group = if products == 1 { GroupBy::Product } else { GroupBy::Brand };
        return (AggregationType::KeywordFrequency, group);
    }

    if mentions(padded, DISTRIBUTION_WORDS) {
        return (AggregationType::Distribution, GroupBy::None);
    }

    (AggregationType::Simple, GroupBy::None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::EntityExtractor;
    use crate::fixtures;

    fn plan_for(text: &str) -> (AnalysisPlan, EntitySet) {
        let vocabulary = fixtures::vocabulary();
        let question = Question::at(text, fixtures::now()).unwrap();
        let entities = EntityExtractor::new(vocabulary.clone()).extract(&question);
        let plan = StrategyResolver::new(&vocabulary).resolve(&question, &entities);
        (plan, entities)
    }

    #[test]
    fn test_rating_over_period_is_simple() {
        let (plan, entities) = plan_for("Brand A rating last 3 months");
        assert_eq!(plan.data_scope, DataScope::AggregateStore);
        assert_eq!(plan.aggregation_type, AggregationType::Simple);
        assert_eq!(plan.group_by, GroupBy::None);
        assert_eq!(plan.metric, Metric::Rating);
        assert_eq!(plan.analysis_depth, AnalysisDepth::Overview);
        assert_eq!(entities.brands, vec!["Brand A"]);
    }

    #[test]
    fn test_attribute_comparison() {
        let (plan, _) = plan_for("Compare Brand A and Brand B moisturizing feedback");
        assert_eq!(plan.data_scope, DataScope::EvidenceStore);
        assert_eq!(plan.aggregation_type, AggregationType::Comparison);
        assert_eq!(plan.group_by, GroupBy::Brand);
        assert_eq!(plan.analysis_depth, AnalysisDepth::Attribute);
        assert_eq!(plan.metric, Metric::AttributeScore);
    }

    #[test]
    fn test_trend_wording_gives_time_series() {
        let (plan, _) = plan_for("How did Brand A ratings change over the last 6 months?");
        assert_eq!(plan.aggregation_type, AggregationType::TimeSeries);
        assert_eq!(plan.group_by, GroupBy::Period);
    }

    #[test]
    fn test_trend_needs_period() {
        let (plan, _) = plan_for("Brand A rating trend");
        assert_eq!(plan.aggregation_type, AggregationType::Simple);
    }

    #[test]
    fn test_mixed_need_is_both() {
        let (plan, _) = plan_for("Average rating and scent feedback for Brand A");
        assert_eq!(plan.data_scope, DataScope::Both);
        assert_eq!(plan.analysis_depth, AnalysisDepth::Attribute);
        assert_eq!(plan.metric, Metric::Rating);
    }

    #[test]
    fn test_depth_refinement() {
        assert_eq!(plan_for("Pros and cons of Hydra Serum texture").0.analysis_depth, AnalysisDepth::ProsCons);
        assert_eq!(plan_for("Sentiment about Glow Tint scent").0.analysis_depth, AnalysisDepth::Sentiment);

        let (plan, _) = plan_for("Most mentioned keywords in Brand B feedback");
        assert_eq!(plan.analysis_depth, AnalysisDepth::Keyword);
        assert_eq!(plan.aggregation_type, AggregationType::KeywordFrequency);
        assert_eq!(plan.group_by, GroupBy::Brand);
        assert_eq!(plan.metric, Metric::Count);
    }

    #[test]
    fn test_product_vs_brand_grouping() {
        let (plan, _) = plan_for("Compare Hydra Serum vs Velvet Cream ratings");
        assert_eq!(plan.group_by, GroupBy::Product);

        let (plan, _) = plan_for("Brand A vs Brand B ratings");
        assert_eq!(plan.group_by, GroupBy::Brand);

        // equal counts keep brand grouping
        let (plan, _) = plan_for("Brand A Hydra Serum vs Brand B Velvet Cream ratings");
        assert_eq!(plan.group_by, GroupBy::Brand);
    }

    #[test]
    fn test_channel_and_distribution() {
        let (plan, _) = plan_for("Rating by channel for Brand A");
        assert_eq!(plan.aggregation_type, AggregationType::Comparison);
        assert_eq!(plan.group_by, GroupBy::Channel);

        let (plan, _) = plan_for("Rating distribution for Lumiere");
        assert_eq!(plan.aggregation_type, AggregationType::Distribution);
        assert_eq!(plan.group_by, GroupBy::None);

        let (plan, _) = plan_for("What percentage of Brand A reviews are positive");
        assert_eq!(plan.metric, Metric::Percentage);
    }

    #[test]
    fn test_unrecognized_question_defaults() {
        let (plan, _) = plan_for("hello there");
        assert_eq!(plan, AnalysisPlan::default());
    }

    #[test]
    fn test_resolved_plans_hold_invariants() {
        let questions = [
            "Brand A rating last 3 months",
            "How did Brand A ratings change over the last 6 months?",
            "Monthly trend of scent complaints this year",
            "Compare Brand A and Brand B moisturizing feedback",
            "Keywords for Hydra Serum",
            "Rating distribution by channel",
            "How many reviews mention irritation in 2024",
            "Brand A vs Brand B trend over the past 3 months",
        ];
        for text in questions {
            let (plan, _) = plan_for(text);
            plan.validate().unwrap();
            if plan.group_by == GroupBy::Period {
                assert_eq!(plan.aggregation_type, AggregationType::TimeSeries, "{}", text);
            }
        }
    }

    #[test]
    fn test_validate_rejects_bad_plans() {
        let plan = AnalysisPlan {
            group_by: GroupBy::Period,
            ..AnalysisPlan::default()
        };
        assert!(matches!(plan.validate(), Err(AppError::InvalidPlan { .. })));

        let plan = AnalysisPlan {
            aggregation_type: AggregationType::Comparison,
            ..AnalysisPlan::default()
        };
        assert!(plan.validate().is_err());

        let plan = AnalysisPlan {
            aggregation_type: AggregationType::TimeSeries,
            group_by: GroupBy::Brand,
            ..AnalysisPlan::default()
        };
        assert!(plan.validate().is_err());
    }

    #[test]
    fn test_comparison_intent() {
        let q = Question::at("Compare Brand A with the rest", fixtures::now()).unwrap();
        assert!(has_comparison_intent(&q));
        let q = Question::at("Brand A rating", fixtures::now()).unwrap();
        assert!(!has_comparison_intent(&q));
    }

    #[test]
    fn test_display_is_snake_case() {
        assert_eq!(AggregationType::TimeSeries.to_string(), "time_series");
        assert_eq!(AnalysisDepth::ProsCons.to_string(), "pros_cons");
        assert_eq!(DataScope::AggregateStore.to_string(), "aggregate_store");
    }
}
