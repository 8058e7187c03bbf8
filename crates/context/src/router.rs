//! Response-mode routing for the semantic path
//!
//! Provides:
//! - `ResponseMode`, the closed set of answer modes
//! - Keyword and LLM-backed classifiers behind `ModeClassifier`
//! - Mode → retrieval profile mapping with config overrides

use crate::question::Question;
use async_trait::async_trait;
use reviewlens_common::config::{AnalysisConfig, ModeSettings};
use reviewlens_common::llm::{GenerationOptions, TextGenerator};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseMode {
    Trend,
    Persona,
    QualityIssue,
    BrandInsight,
    PricePromo,
    AttributeDrivers,
    Default,
}

impl ResponseMode {
    /// Classification candidates, in tie-break order
    pub const ALL: [ResponseMode; 7] = [
        Self::Trend,
        Self::Persona,
        Self::QualityIssue,
        Self::BrandInsight,
        Self::PricePromo,
        Self::AttributeDrivers,
        Self::Default,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trend => "trend",
            Self::Persona => "persona",
            Self::QualityIssue => "quality_issue",
            Self::BrandInsight => "brand_insight",
            Self::PricePromo => "price_promo",
            Self::AttributeDrivers => "attribute_drivers",
            Self::Default => "default",
        }
    }

    pub fn parse(label: &str) -> Option<Self> {
        let label = label.trim().to_lowercase().replace([' ', '-'], "_");
        Self::ALL.into_iter().find(|m| m.as_str() == label)
    }

    fn keywords(self) -> &'static [&'static str] {
        match self {
            Self::Trend => &[
                "trend", "trends", "over time", "monthly", "change", "changed", "growth",
                "increase", "decrease", "decline", "season", "seasonal",
            ],
            Self::Persona => &[
                "persona", "personas", "who buys", "customers", "customer profile", "demographic",
                "demographics", "age", "skin type", "buyers", "audience", "target",
            ],
            Self::QualityIssue => &[
                "complaint", "complaints", "complain", "problem", "problems", "issue", "issues",
                "defect", "defects", "broken", "leak", "leaking", "worst", "refund", "return",
            ],
            Self::BrandInsight => &[
                "brand image", "positioning", "perception", "perceived", "reputation",
                "competitor", "competitors", "loyalty", "brand strengths",
            ],
            Self::PricePromo => &[
                "price", "prices", "pricing", "expensive", "cheap", "cost", "value for money",
                "discount", "promo", "promotion", "coupon", "sale", "deal",
            ],
            Self::AttributeDrivers => &[
                "driver", "drivers", "drive", "why", "reason", "reasons", "factor", "factors",
                "satisfaction", "what makes",
            ],
            Self::Default => &[],
        }
    }
}

/// Narrative template a mode renders with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NarrativeTemplate {
    MonthlyTrend,
    PersonaPortrait,
    IssueDigest,
    BrandProfile,
    PriceAndPromotion,
    DriverAnalysis,
    GeneralSummary,
}

/// Retrieval parameters for one mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ModeProfile {
    pub mode: ResponseMode,
    pub top_k: usize,
    pub min_evidence: usize,
    pub template: NarrativeTemplate,
}

/// Picks a response mode for a question
#[async_trait]
pub trait ModeClassifier: Send + Sync {
    async fn classify(&self, question: &Question) -> ResponseMode;
}

/// Deterministic keyword scoring; ties go to the earlier mode
#[derive(Debug, Clone, Default)]
pub struct KeywordClassifier;

impl KeywordClassifier {
    pub fn classify_text(&self, normalized: &str) -> ResponseMode {
        let padded = format!(" {} ", normalized);

        let mut best = (ResponseMode::Default, 0usize);
        for mode in ResponseMode::ALL {
            let score = mode
                .keywords()
                .iter()
                .filter(|k| padded.contains(&format!(" {} ", k)))
                .count();
            if score > best.1 {
                best = (mode, score);
            }
        }
        best.0
    }
}

#[async_trait]
impl ModeClassifier for KeywordClassifier {
    async fn classify(&self, question: &Question) -> ResponseMode {
        self.classify_text(&question.normalized())
    }
}

/// Asks a text generator for the label, falling back to keywords when the
/// generator fails, times out or answers with an unknown label
pub struct LlmClassifier {
    generator: Arc<dyn TextGenerator>,
    fallback: KeywordClassifier,
    timeout: Duration,
}

impl LlmClassifier {
    pub fn new(generator: Arc<dyn TextGenerator>, timeout: Duration) -> Self {
        Self {
            generator,
            fallback: KeywordClassifier,
            timeout,
        }
    }

    fn prompt(question: &Question) -> String {
        let labels: Vec<&str> = ResponseMode::ALL.iter().map(|m| m.as_str()).collect();
        format!(
            "Classify the analytics question about product reviews into exactly one label.\n\
             Labels: {}\n\
             Answer with the label only.\n\n\
             Question: {}",
            labels.join(", "),
            question.text()
        )
    }
}

#[async_trait]
impl ModeClassifier for LlmClassifier {
    async fn classify(&self, question: &Question) -> ResponseMode {
        let options = GenerationOptions {
            temperature: 0.0,
            max_tokens: 10,
            system_prompt: None,
        };
        let prompt = Self::prompt(question);
        let call = self.generator.generate(&prompt, &options);

        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(reply)) => {
                let label = reply.trim().trim_matches(|c: char| !c.is_alphanumeric() && c != '_');
                match ResponseMode::parse(label) {
                    Some(mode) => mode,
                    None => {
                        tracing::warn!(reply = %reply, "Unknown mode label, using keywords");
                        self.fallback.classify(question).await
                    }
                }
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Mode classification failed, using keywords");
                self.fallback.classify(question).await
            }
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Mode classification timed out, using keywords"
                );
                self.fallback.classify(question).await
            }
        }
    }
}

pub struct Router {
    classifier: Arc<dyn ModeClassifier>,
    min_evidence: usize,
    overrides: BTreeMap<String, ModeSettings>,
}

impl Router {
    pub fn new(classifier: Arc<dyn ModeClassifier>, config: &AnalysisConfig) -> Self {
        Self {
            classifier,
            min_evidence: config.min_evidence,
            overrides: config.modes.clone(),
        }
    }

    pub async fn classify(&self, question: &Question) -> ResponseMode {
        let mode = self.classifier.classify(question).await;
        tracing::debug!(mode = mode.as_str(), "Question routed");
        mode
    }

    /// Retrieval parameters for a mode; configured overrides win
    pub fn profile(&self, mode: ResponseMode) -> ModeProfile {
        let (top_k, template) = match mode {
            ResponseMode::Trend => (40, NarrativeTemplate::MonthlyTrend),
            ResponseMode::Persona => (10, NarrativeTemplate::PersonaPortrait),
            ResponseMode::QualityIssue => (25, NarrativeTemplate::IssueDigest),
            ResponseMode::BrandInsight => (30, NarrativeTemplate::BrandProfile),
            ResponseMode::PricePromo => (20, NarrativeTemplate::PriceAndPromotion),
            ResponseMode::AttributeDrivers => (30, NarrativeTemplate::DriverAnalysis),
            ResponseMode::Default => (20, NarrativeTemplate::GeneralSummary),
        };

        let overrides = self.overrides.get(mode.as_str());

        ModeProfile {
            mode,
            top_k: overrides.and_then(|o| o.top_k).unwrap_or(top_k),
            min_evidence: overrides
                .and_then(|o| o.min_evidence)
                .unwrap_or(self.min_evidence),
            template,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{self, StubGenerator};

    fn question(text: &str) -> Question {
        Question::at(text, fixtures::now()).unwrap()
    }

    #[test]
    fn test_keyword_modes() {
        let c = KeywordClassifier;
        assert_eq!(c.classify_text("what are the main complaints"), ResponseMode::QualityIssue);
        assert_eq!(c.classify_text("who buys this and what is their skin type"), ResponseMode::Persona);
        assert_eq!(c.classify_text("is it good value for money"), ResponseMode::PricePromo);
        assert_eq!(c.classify_text("why do people love it"), ResponseMode::AttributeDrivers);
        assert_eq!(c.classify_text("how has buzz changed over time"), ResponseMode::Trend);
        assert_eq!(c.classify_text("tell me something"), ResponseMode::Default);
    }

    #[test]
    fn test_parse_labels() {
        assert_eq!(ResponseMode::parse(" Quality-Issue "), Some(ResponseMode::QualityIssue));
        assert_eq!(ResponseMode::parse("price promo"), Some(ResponseMode::PricePromo));
        assert_eq!(ResponseMode::parse("banana"), None);
        for mode in ResponseMode::ALL {
            assert_eq!(ResponseMode::parse(mode.as_str()), Some(mode));
        }
    }

    #[tokio::test]
    async fn test_llm_classifier_uses_reply() {
        let c = LlmClassifier::new(
            Arc::new(StubGenerator::replying("persona.")),
            Duration::from_secs(1),
        );
        assert_eq!(c.classify(&question("anything")).await, ResponseMode::Persona);
    }

    #[tokio::test]
    async fn test_llm_classifier_falls_back() {
        let failing = LlmClassifier::new(Arc::new(StubGenerator::failing()), Duration::from_secs(1));
        assert_eq!(
            failing.classify(&question("Main complaints?")).await,
            ResponseMode::QualityIssue
        );

        let confused = LlmClassifier::new(
            Arc::new(StubGenerator::replying("I think it is about prices")),
            Duration::from_secs(1),
        );
        assert_eq!(
            confused.classify(&question("Is the price fair?")).await,
            ResponseMode::PricePromo
        );
    }

    #[test]
    fn test_profiles_and_overrides() {
        let mut config = AnalysisConfig::default();
        config.modes.insert(
            "persona".to_string(),
            ModeSettings {
                top_k: Some(5),
                min_evidence: Some(3),
            },
        );
        let router = Router::new(Arc::new(KeywordClassifier), &config);

        let trend = router.profile(ResponseMode::Trend);
        assert_eq!(trend.top_k, 40);
        assert_eq!(trend.min_evidence, config.min_evidence);
        assert_eq!(trend.template, NarrativeTemplate::MonthlyTrend);

        let persona = router.profile(ResponseMode::Persona);
        assert_eq!((persona.top_k, persona.min_evidence), (5, 3));

        assert_eq!(router.profile(ResponseMode::Default).top_k, 20);
    }
}
