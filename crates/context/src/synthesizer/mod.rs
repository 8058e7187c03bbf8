//! Grounded answer synthesis
//!
//! Provides:
//! - Deterministic report sections built only from returned records
//! - Minimum-evidence marking (uncertain sections are kept, never dropped)
//! - Optional prose narrative through an interchangeable `TextGenerator`
//! - Chart request descriptors for the presentation sink

mod analytic;
mod evidence;
mod report;

pub use self::report::{
    ChartKind, ChartPoint, ChartRequest, FallbackReason, Report, ReportSection, SectionStatus,
};

use crate::entities::EntitySet;
use crate::executor::ResultEnvelope;
use crate::question::Question;
use crate::retrieval::EvidenceHit;
use crate::router::{ModeProfile, ResponseMode};
use crate::strategy::AnalysisPlan;
use reviewlens_common::config::AnalysisConfig;
use reviewlens_common::errors::{AppError, Result};
use reviewlens_common::llm::{GenerationOptions, TextGenerator};
use reviewlens_common::metrics;
use std::sync::Arc;
use std::time::Duration;

const SYSTEM_PROMPT: &str = "You write short analytic summaries of customer review data. \
    Use only the figures and quotes you are given. Never introduce numbers, brands, \
    products or claims that are not in the input. Describe uncertain sections as tentative.";

/// What a report is synthesized from
#[derive(Debug, Clone, Copy)]
pub enum Evidence<'a> {
    Analytic {
        plan: &'a AnalysisPlan,
        envelope: &'a ResultEnvelope,
    },
    Semantic {
        profile: &'a ModeProfile,
        hits: &'a [EvidenceHit],
    },
}

/// Deterministic part of a report
pub(crate) struct Draft {
    sections: Vec<ReportSection>,
    charts: Vec<ChartRequest>,
    sample_size: usize,
    min_evidence: usize,
    source_note: String,
}

pub(crate) fn plural(n: usize, noun: &str) -> String {
    if n == 1 {
        format!("{} {}", n, noun)
    } else {
        format!("{} {}s", n, noun)
    }
}

/// Human-readable filter summary for the grounding note
fn describe_filters(entities: &EntitySet) -> Option<String> {
    let mut parts = Vec::new();
    for (name, values) in [
        ("brands", &entities.brands),
        ("products", &entities.products),
        ("attributes", &entities.attributes),
        ("channels", &entities.channels),
    ] {
        if !values.is_empty() {
            parts.push(format!("{} {}", name, values.join(", ")));
        }
    }
    if let Some(period) = &entities.period {
        parts.push(format!("period {}", period.label));
    }

    if parts.is_empty() {
        None
    } else {
        Some(format!("Filters: {}.", parts.join("; ")))
    }
}

pub struct AnswerSynthesizer {
    generator: Arc<dyn TextGenerator>,
    options: GenerationOptions,
    timeout: Duration,
    min_evidence: usize,
}

impl AnswerSynthesizer {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        options: GenerationOptions,
        config: &AnalysisConfig,
    ) -> Self {
        Self {
            generator,
            options: GenerationOptions {
                system_prompt: options
                    .system_prompt
                    .or_else(|| Some(SYSTEM_PROMPT.to_string())),
                ..options
            },
            timeout: config.stage_timeout(),
            min_evidence: config.min_evidence,
        }
    }

    /// Build the report; never fails
    pub async fn synthesize(
        &self,
        question: &Question,
        entities: &EntitySet,
        evidence: Evidence<'_>,
    ) -> Report {
        let (draft, mode) = match evidence {
            Evidence::Analytic { plan, envelope } => {
                (analytic::draft(plan, envelope, self.min_evidence), None)
            }
            Evidence::Semantic { profile, hits } => {
                (evidence::draft(profile, hits), Some(profile.mode))
            }
        };

        let insufficient_evidence = draft.sections.is_empty()
            || draft
                .sections
                .iter()
                .any(|s| s.status != SectionStatus::Grounded);

        let mut notes = vec![draft.source_note.clone()];
        notes.extend(describe_filters(entities));
        notes.push(format!(
            "Sections backed by fewer than {} are marked uncertain.",
            plural(draft.min_evidence, "record")
        ));

        let narrative = match self.narrate(question, &draft.sections).await {
            Ok(text) => Some(text),
            Err(e) => {
                metrics::record_generation_failure(self.generator.name());
                tracing::info!(
                    backend = self.generator.name(),
                    error = %e,
                    "Narrative unavailable, keeping templated report"
                );
                notes.push("Narrative unavailable; the report contains templated sections only.".to_string());
                None
            }
        };

        tracing::debug!(
            sections = draft.sections.len(),
            sample_size = draft.sample_size,
            insufficient_evidence,
            "Report synthesized"
        );

        Report {
            question: question.text().to_string(),
            sections: draft.sections,
            grounding_note: notes.join(" "),
            sample_size: draft.sample_size,
            insufficient_evidence,
            fallback_reason: None,
            mode,
            narrative,
            charts: draft.charts,
        }
    }

    /// Insufficient-data report for a run that ends before synthesis
    pub fn fallback(
        &self,
        question: &Question,
        reason: FallbackReason,
        mode: Option<ResponseMode>,
    ) -> Report {
        tracing::debug!(reason = reason.as_str(), "Fallback report synthesized");
        let mut report = Report::insufficient(question.text(), reason);
        report.mode = mode;
        report
    }

    fn prompt(question: &Question, sections: &[ReportSection]) -> String {
        let mut prompt = format!(
            "Question: {}\n\nSummarise the findings below in one short paragraph.\n",
            question.text()
        );
        for section in sections {
            let status = match section.status {
                SectionStatus::Grounded => "",
                SectionStatus::Uncertain => " [uncertain: small sample]",
                SectionStatus::Insufficient => " [no data]",
            };
            prompt.push_str(&format!("\n## {}{}\n{}\n", section.title, status, section.body));
        }
        prompt
    }

    async fn narrate(&self, question: &Question, sections: &[ReportSection]) -> Result<String> {
        let prompt = Self::prompt(question, sections);
        let call = self.generator.generate(&prompt, &self.options);

        let text = tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| AppError::GenerationUnavailable {
                message: format!("timed out after {}ms", self.timeout.as_millis()),
            })??;

        let text = text.trim();
        if text.is_empty() {
            return Err(AppError::GenerationUnavailable {
                message: "empty completion".to_string(),
            });
        }
        Ok(text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::EntityExtractor;
    use crate::fixtures::{self, StubGenerator};
    use crate::router::{NarrativeTemplate, ResponseMode};
    use crate::strategy::StrategyResolver;
    use chrono::NaiveDate;

    fn synthesizer(generator: StubGenerator, min_evidence: usize) -> AnswerSynthesizer {
        let config = AnalysisConfig {
            min_evidence,
            ..AnalysisConfig::default()
        };
        AnswerSynthesizer::new(Arc::new(generator), GenerationOptions::default(), &config)
    }

    fn semantic_hits() -> Vec<EvidenceHit> {
        (0..3)
            .map(|i| EvidenceHit {
                record_id: format!("r{}", i),
                text: "silky texture".to_string(),
                brand: Some("Brand A".to_string()),
                product: None,
                rating: Some(5),
                date: NaiveDate::from_ymd_opt(2024, 2, 1),
                distance: 0.1 * i as f32,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_narrative_from_generator() {
        let question = Question::at("What do people say?", fixtures::now()).unwrap();
        let hits = semantic_hits();
        let profile = ModeProfile {
            mode: ResponseMode::Default,
            top_k: 20,
            min_evidence: 2,
            template: NarrativeTemplate::GeneralSummary,
        };

        let report = synthesizer(StubGenerator::replying("  Mostly positive.  "), 30)
            .synthesize(
                &question,
                &EntitySet::default(),
                Evidence::Semantic {
                    profile: &profile,
                    hits: &hits,
                },
            )
            .await;

        assert_eq!(report.narrative.as_deref(), Some("Mostly positive."));
        assert_eq!(report.mode, Some(ResponseMode::Default));
        assert_eq!(report.sample_size, 3);
        assert!(!report.insufficient_evidence);
        assert!(report.grounding_note.contains("fewer than 2 records"));
    }

    #[tokio::test]
    async fn test_generation_failure_keeps_sections() {
        let question = Question::at("What do people say?", fixtures::now()).unwrap();
        let hits = semantic_hits();
        let profile = ModeProfile {
            mode: ResponseMode::Persona,
            top_k: 10,
            min_evidence: 2,
            template: NarrativeTemplate::PersonaPortrait,
        };

        let report = synthesizer(StubGenerator::failing(), 30)
            .synthesize(
                &question,
                &EntitySet::default(),
                Evidence::Semantic {
                    profile: &profile,
                    hits: &hits,
                },
            )
            .await;

        assert!(report.narrative.is_none());
        assert_eq!(report.sections.len(), 1);
        assert!(report.grounding_note.contains("Narrative unavailable"));
    }

    #[test]
    fn test_fallback_report_keeps_mode() {
        let question = Question::at("Why do people hate it?", fixtures::now()).unwrap();
        let report = synthesizer(StubGenerator::failing(), 30).fallback(
            &question,
            FallbackReason::NoEvidence,
            Some(ResponseMode::QualityIssue),
        );

        assert!(report.insufficient_evidence);
        assert_eq!(report.sections.len(), 1);
        assert_eq!(report.sections[0].status, SectionStatus::Insufficient);
        assert_eq!(report.sample_size, 0);
        assert_eq!(report.fallback_reason, Some(FallbackReason::NoEvidence));
        assert_eq!(report.mode, Some(ResponseMode::QualityIssue));
    }

    #[tokio::test]
    async fn test_small_sample_raises_flag() {
        let vocabulary = fixtures::vocabulary();
        let question = Question::at("Brand A rating", fixtures::now()).unwrap();
        let entities = EntityExtractor::new(vocabulary.clone()).extract(&question);
        let plan = StrategyResolver::new(&vocabulary).resolve(&question, &entities);

        let config = AnalysisConfig::default();
        let queries = crate::compiler::QueryCompiler::new(&config)
            .compile(&plan, &entities)
            .unwrap();
        let envelope = crate::executor::QueryExecutor::new(Arc::new(fixtures::memory_corpus()), &config)
            .execute(&queries)
            .await;

        let report = synthesizer(StubGenerator::failing(), 40)
            .synthesize(
                &question,
                &entities,
                Evidence::Analytic {
                    plan: &plan,
                    envelope: &envelope,
                },
            )
            .await;

        assert_eq!(report.sections.len(), 1);
        assert_eq!(report.sections[0].status, SectionStatus::Uncertain);
        assert_eq!(report.sections[0].sample_size, 12);
        assert!(report.insufficient_evidence);
        assert!(report.grounding_note.contains("Filters: brands Brand A."));
    }
}
