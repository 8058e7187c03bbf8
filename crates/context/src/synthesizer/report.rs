//! The report handed to the presentation sink

use crate::router::ResponseMode;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionStatus {
    /// Backed by at least the minimum number of records
    Grounded,
    /// Backed by records, but fewer than the minimum
    Uncertain,
    /// No usable records behind it
    Insufficient,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportSection {
    pub title: String,
    pub body: String,
    pub status: SectionStatus,
    pub sample_size: usize,
}

impl ReportSection {
    /// Status follows from the sample size and the threshold
    pub(crate) fn measured(title: String, body: String, sample_size: usize, min_evidence: usize) -> Self {
        let status = match sample_size {
            0 => SectionStatus::Insufficient,
            n if n < min_evidence => SectionStatus::Uncertain,
            _ => SectionStatus::Grounded,
        };
        Self {
            title,
            body,
            status,
            sample_size,
        }
    }

    /// Verbatim quotes; no statistic to qualify
    pub(crate) fn quoted(title: String, body: String, sample_size: usize) -> Self {
        let status = if sample_size == 0 {
            SectionStatus::Insufficient
        } else {
            SectionStatus::Grounded
        };
        Self {
            title,
            body,
            status,
            sample_size,
        }
    }

    pub(crate) fn insufficient(title: String, body: String) -> Self {
        Self {
            title,
            body,
            status: SectionStatus::Insufficient,
            sample_size: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    Line,
    Bar,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartPoint {
    pub x: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub series: Option<String>,
    pub y: f64,
}

/// Chart the presentation sink may render next to the report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartRequest {
    pub kind: ChartKind,
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub points: Vec<ChartPoint>,
}

/// Why the pipeline answered with an insufficient-data report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    /// Comparison wording with fewer than two brands or products
    MissingComparisonTargets,
    AllQueriesFailed,
    NoMatchingRecords,
    NoEvidence,
    RetrievalFailed,
    InvalidQuestion,
    Cancelled,
}

impl FallbackReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MissingComparisonTargets => "missing_comparison_targets",
            Self::AllQueriesFailed => "all_queries_failed",
            Self::NoMatchingRecords => "no_matching_records",
            Self::NoEvidence => "no_evidence",
            Self::RetrievalFailed => "retrieval_failed",
            Self::InvalidQuestion => "invalid_question",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            Self::MissingComparisonTargets => {
                "The question asks for a comparison, but fewer than two known brands or products were recognised."
            }
            Self::AllQueriesFailed => "Every query against the review corpus failed.",
            Self::NoMatchingRecords => "No reviews match the requested filters.",
            Self::NoEvidence => "No reviews are similar enough to the question.",
            Self::RetrievalFailed => "The evidence search could not be completed.",
            Self::InvalidQuestion => "The question could not be analysed.",
            Self::Cancelled => "The request was cancelled before an answer was ready.",
        }
    }
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Grounded answer to one question
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub question: String,
    pub sections: Vec<ReportSection>,
    pub grounding_note: String,
    pub sample_size: usize,
    pub insufficient_evidence: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<FallbackReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<ResponseMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub narrative: Option<String>,
    pub charts: Vec<ChartRequest>,
}

impl Report {
    /// Explicit insufficient-data answer
    pub fn insufficient(question: &str, reason: FallbackReason) -> Self {
        Self {
            question: question.to_string(),
            sections: vec![ReportSection::insufficient(
                "Insufficient data".to_string(),
                reason.describe().to_string(),
            )],
            grounding_note: "No figures are reported because no usable review records were found."
                .to_string(),
            sample_size: 0,
            insufficient_evidence: true,
            fallback_reason: Some(reason),
            mode: None,
            narrative: None,
            charts: Vec::new(),
        }
    }

    pub fn uncertain_sections(&self) -> impl Iterator<Item = &ReportSection> {
        self.sections
            .iter()
            .filter(|s| s.status != SectionStatus::Grounded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_section_status_thresholds() {
        let s = |n| ReportSection::measured("t".into(), "b".into(), n, 30).status;
        assert_eq!(s(0), SectionStatus::Insufficient);
        assert_eq!(s(12), SectionStatus::Uncertain);
        assert_eq!(s(30), SectionStatus::Grounded);
    }

    #[test]
    fn test_insufficient_report() {
        let report = Report::insufficient("q", FallbackReason::NoMatchingRecords);
        assert!(report.insufficient_evidence);
        assert_eq!(report.sample_size, 0);
        assert_eq!(report.sections.len(), 1);
        assert_eq!(report.sections[0].status, SectionStatus::Insufficient);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["fallback_reason"], "no_matching_records");
        assert!(json.get("narrative").is_none());
    }
}
