//! Pipeline driver
//!
//! Provides:
//! - `PipelineState` and the explicit per-run `PipelineContext`
//! - Analytic path: entities → plan → queries → results → report
//! - Semantic path: mode → evidence → report
//! - Fallback to an insufficient-data report, and stage-boundary cancellation
//!
//! A run visits each state at most once. Every transition is checked against
//! the state graph, so the trail in `RunOutcome` is always a valid path.

use crate::compiler::{CompiledQuery, QueryCompiler};
use crate::entities::{EntityExtractor, EntitySet};
use crate::executor::{QueryExecutor, ResultEnvelope};
use crate::question::Question;
use crate::retrieval::{EvidenceHit, EvidenceRetriever};
use crate::router::{ModeProfile, ResponseMode, Router};
use crate::strategy::{has_comparison_intent, AnalysisPlan, StrategyResolver};
use crate::synthesizer::{AnswerSynthesizer, Evidence, FallbackReason, Report};
use reviewlens_common::errors::{AppError, Result};
use reviewlens_common::metrics;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineState {
    Start,
    EntitiesExtracted,
    StrategyResolved,
    QueriesCompiled,
    Executed,
    Routed,
    EvidenceRetrieved,
    Synthesized,
    Done,
    Fallback,
    FallbackDone,
}

impl PipelineState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "START",
            Self::EntitiesExtracted => "ENTITIES_EXTRACTED",
            Self::StrategyResolved => "STRATEGY_RESOLVED",
            Self::QueriesCompiled => "QUERIES_COMPILED",
            Self::Executed => "EXECUTED",
            Self::Routed => "ROUTED",
            Self::EvidenceRetrieved => "EVIDENCE_RETRIEVED",
            Self::Synthesized => "SYNTHESIZED",
            Self::Done => "DONE",
            Self::Fallback => "FALLBACK",
            Self::FallbackDone => "FALLBACK_DONE",
        }
    }

    /// Edges of the state graph
    fn can_follow(self, previous: PipelineState) -> bool {
        use PipelineState::*;
        matches!(
            (previous, self),
            (Start, EntitiesExtracted)
                | (EntitiesExtracted, StrategyResolved)
                | (StrategyResolved, QueriesCompiled)
                | (QueriesCompiled, Executed)
                | (Executed, Synthesized)
                | (Start, Routed)
                | (Routed, EvidenceRetrieved)
                | (EvidenceRetrieved, Synthesized)
                | (Synthesized, Done)
                | (EntitiesExtracted, Fallback)
                | (Executed, Fallback)
                | (EvidenceRetrieved, Fallback)
                | (Fallback, FallbackDone)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::FallbackDone)
    }
}

/// Which path answers the question
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum AnswerPath {
    /// Semantic when no entity is recognised and the question has a
    /// non-default mode, analytic otherwise
    #[default]
    Auto,
    Analytic,
    Semantic,
}

impl AnswerPath {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Analytic => "analytic",
            Self::Semantic => "semantic",
        }
    }
}

/// Everything one run derives, threaded through every stage
#[derive(Debug, Serialize)]
pub struct PipelineContext {
    pub run_id: Uuid,
    pub question: Question,
    pub path: AnswerPath,
    pub trail: Vec<PipelineState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entities: Option<EntitySet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<AnalysisPlan>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub queries: Vec<CompiledQuery>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub envelope: Option<ResultEnvelope>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<ModeProfile>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub evidence: Vec<EvidenceHit>,

    #[serde(skip)]
    cancel: CancellationToken,
}

impl PipelineContext {
    fn new(question: Question, cancel: CancellationToken) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            question,
            path: AnswerPath::Auto,
            trail: vec![PipelineState::Start],
            entities: None,
            plan: None,
            queries: Vec::new(),
            envelope: None,
            profile: None,
            evidence: Vec::new(),
            cancel,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.trail.last().copied().unwrap_or(PipelineState::Start)
    }

    fn advance(&mut self, next: PipelineState) -> Result<()> {
        let current = self.state();
        if !next.can_follow(current) {
            return Err(AppError::Internal {
                message: format!(
                    "illegal pipeline transition {} -> {}",
                    current.as_str(),
                    next.as_str()
                ),
            });
        }
        self.trail.push(next);
        tracing::debug!(run_id = %self.run_id, state = next.as_str(), "Pipeline state");
        Ok(())
    }

    /// Stage boundary
    fn checkpoint(&self, stage: &str) -> Result<()> {
        if self.cancel.is_cancelled() {
            tracing::info!(run_id = %self.run_id, stage, "Run cancelled");
            return Err(AppError::Cancelled {
                stage: stage.to_string(),
            });
        }
        Ok(())
    }
}

/// Report plus the context that produced it
#[derive(Debug, Serialize)]
pub struct RunOutcome {
    pub report: Report,
    pub context: PipelineContext,
}

impl RunOutcome {
    pub fn is_fallback(&self) -> bool {
        self.context.state() == PipelineState::FallbackDone
    }
}

pub struct Orchestrator {
    extractor: EntityExtractor,
    resolver: StrategyResolver,
    compiler: QueryCompiler,
    executor: QueryExecutor,
    router: Router,
    retriever: EvidenceRetriever,
    synthesizer: AnswerSynthesizer,
}

impl Orchestrator {
    pub fn new(
        extractor: EntityExtractor,
        resolver: StrategyResolver,
        compiler: QueryCompiler,
        executor: QueryExecutor,
        router: Router,
        retriever: EvidenceRetriever,
        synthesizer: AnswerSynthesizer,
    ) -> Self {
        Self {
            extractor,
            resolver,
            compiler,
            executor,
            router,
            retriever,
            synthesizer,
        }
    }

    pub fn extractor(&self) -> &EntityExtractor {
        &self.extractor
    }

    /// Corpus store reachability, for readiness checks
    pub async fn ping_store(&self) -> Result<()> {
        self.executor.ping().await
    }

    pub fn store_name(&self) -> &str {
        self.executor.store_name()
    }

    /// Drive one question to a report.
    ///
    /// Contract violations and cancellation are returned as errors; every
    /// other condition ends in a report.
    pub async fn run(
        &self,
        question: Question,
        path: AnswerPath,
        cancel: CancellationToken,
    ) -> Result<RunOutcome> {
        let (result, context) = self.drive(question, path, cancel).await;
        let report = result?;
        Ok(RunOutcome { report, context })
    }

    /// Like `run`, but errors end in a fallback report too. The context
    /// shows how far the run got.
    pub async fn answer_traced(
        &self,
        question: Question,
        path: AnswerPath,
        cancel: CancellationToken,
    ) -> RunOutcome {
        let (result, context) = self.drive(question, path, cancel).await;
        let report = match result {
            Ok(report) => report,
            Err(e) => {
                let reason = match e {
                    AppError::Cancelled { .. } => FallbackReason::Cancelled,
                    e => {
                        tracing::error!(run_id = %context.run_id, error = %e, "Run failed, answering with fallback report");
                        FallbackReason::InvalidQuestion
                    }
                };
                self.synthesizer
                    .fallback(&context.question, reason, context.profile.map(|p| p.mode))
            }
        };
        RunOutcome { report, context }
    }

    /// Like `run`, but always returns a report
    pub async fn answer(&self, question: Question, path: AnswerPath, cancel: CancellationToken) -> Report {
        self.answer_traced(question, path, cancel).await.report
    }

    async fn drive(
        &self,
        question: Question,
        path: AnswerPath,
        cancel: CancellationToken,
    ) -> (Result<Report>, PipelineContext) {
        let started = Instant::now();
        let mut ctx = PipelineContext::new(question, cancel);

        tracing::info!(
            run_id = %ctx.run_id,
            question = %ctx.question.text(),
            requested_path = path.as_str(),
            "Run started"
        );

        let entities = self.extractor.extract(&ctx.question);
        let (resolved, routed) = match path {
            AnswerPath::Auto if entities.is_empty() => {
                let mode = self.router.classify(&ctx.question).await;
                if mode == ResponseMode::Default {
                    (AnswerPath::Analytic, None)
                } else {
                    (AnswerPath::Semantic, Some(mode))
                }
            }
            AnswerPath::Auto | AnswerPath::Analytic => (AnswerPath::Analytic, None),
            AnswerPath::Semantic => (AnswerPath::Semantic, None),
        };
        ctx.path = resolved;

        let result = match resolved {
            AnswerPath::Semantic => self.semantic(&mut ctx, routed).await,
            _ => self.analytic(&mut ctx, entities).await,
        };

        let outcome = match &result {
            Ok(_) if ctx.state() == PipelineState::FallbackDone => "fallback",
            Ok(_) => "answered",
            Err(AppError::Cancelled { .. }) => "cancelled",
            Err(_) => "error",
        };
        metrics::record_question(resolved.as_str(), outcome);

        tracing::info!(
            run_id = %ctx.run_id,
            path = resolved.as_str(),
            outcome,
            latency_ms = started.elapsed().as_millis() as u64,
            "Run finished"
        );

        (result, ctx)
    }

    async fn analytic(&self, ctx: &mut PipelineContext, entities: EntitySet) -> Result<Report> {
        ctx.checkpoint("entities")?;
        let targets = entities.comparison_targets();
        ctx.entities = Some(entities);
        ctx.advance(PipelineState::EntitiesExtracted)?;

        if has_comparison_intent(&ctx.question) && targets < 2 {
            return self.fall_back(ctx, FallbackReason::MissingComparisonTargets);
        }

        ctx.checkpoint("strategy")?;
        let timer = Instant::now();
        let entities = ctx.entities.clone().unwrap_or_default();
        let plan = self.resolver.resolve(&ctx.question, &entities);
        plan.validate()?;
        metrics::record_stage("strategy", timer.elapsed().as_secs_f64());
        tracing::info!(
            run_id = %ctx.run_id,
            data_scope = %plan.data_scope,
            aggregation = %plan.aggregation_type,
            group_by = %plan.group_by,
            depth = %plan.analysis_depth,
            metric = %plan.metric,
            "Strategy resolved"
        );
        ctx.plan = Some(plan);
        ctx.advance(PipelineState::StrategyResolved)?;

        ctx.checkpoint("compile")?;
        let timer = Instant::now();
        ctx.queries = self.compiler.compile(&plan, &entities)?;
        metrics::record_stage("compile", timer.elapsed().as_secs_f64());
        ctx.advance(PipelineState::QueriesCompiled)?;

        ctx.checkpoint("execute")?;
        let timer = Instant::now();
        let envelope = self.executor.execute(&ctx.queries).await;
        metrics::record_stage("execute", timer.elapsed().as_secs_f64());
        let characteristics = envelope.data_characteristics.clone();
        ctx.envelope = Some(envelope);
        ctx.advance(PipelineState::Executed)?;

        if characteristics.all_failed {
            return self.fall_back(ctx, FallbackReason::AllQueriesFailed);
        }
        if characteristics.total_rows == 0 {
            return self.fall_back(ctx, FallbackReason::NoMatchingRecords);
        }

        ctx.checkpoint("synthesize")?;
        let timer = Instant::now();
        let envelope = ctx.envelope.as_ref().ok_or_else(|| AppError::Internal {
            message: "executed state without results".to_string(),
        })?;
        let report = self
            .synthesizer
            .synthesize(
                &ctx.question,
                &entities,
                Evidence::Analytic {
                    plan: &plan,
                    envelope,
                },
            )
            .await;
        metrics::record_stage("synthesize", timer.elapsed().as_secs_f64());

        ctx.advance(PipelineState::Synthesized)?;
        ctx.advance(PipelineState::Done)?;
        Ok(report)
    }

    async fn semantic(&self, ctx: &mut PipelineContext, routed: Option<ResponseMode>) -> Result<Report> {
        ctx.checkpoint("route")?;
        let mode = match routed {
            Some(mode) => mode,
            None => self.router.classify(&ctx.question).await,
        };
        let profile = self.router.profile(mode);
        ctx.profile = Some(profile);
        ctx.advance(PipelineState::Routed)?;

        ctx.checkpoint("retrieve")?;
        let timer = Instant::now();
        let search = self.retriever.search(&ctx.question, profile.top_k).await;
        metrics::record_stage("retrieve", timer.elapsed().as_secs_f64());

        let hits = match search {
            Ok(hits) => hits,
            Err(e) if e.is_contract_violation() => return Err(e),
            Err(e) => {
                tracing::warn!(run_id = %ctx.run_id, error = %e, "Evidence retrieval failed");
                ctx.advance(PipelineState::EvidenceRetrieved)?;
                return self.fall_back(ctx, FallbackReason::RetrievalFailed);
            }
        };
        metrics::record_retrieval(mode.as_str(), hits.len());
        ctx.evidence = hits;
        ctx.advance(PipelineState::EvidenceRetrieved)?;

        if ctx.evidence.is_empty() {
            return self.fall_back(ctx, FallbackReason::NoEvidence);
        }

        ctx.checkpoint("synthesize")?;
        let timer = Instant::now();
        let report = self
            .synthesizer
            .synthesize(
                &ctx.question,
                &EntitySet::default(),
                Evidence::Semantic {
                    profile: &profile,
                    hits: &ctx.evidence,
                },
            )
            .await;
        metrics::record_stage("synthesize", timer.elapsed().as_secs_f64());

        ctx.advance(PipelineState::Synthesized)?;
        ctx.advance(PipelineState::Done)?;
        Ok(report)
    }

    fn fall_back(&self, ctx: &mut PipelineContext, reason: FallbackReason) -> Result<Report> {
        ctx.advance(PipelineState::Fallback)?;
        tracing::warn!(
            run_id = %ctx.run_id,
            reason = reason.as_str(),
            "Falling back to insufficient-data report"
        );

        let report = self
            .synthesizer
            .fallback(&ctx.question, reason, ctx.profile.map(|p| p.mode));

        ctx.advance(PipelineState::FallbackDone)?;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{self, StubGenerator};
    use crate::retrieval::{EmbeddingIndex, MemoryIndex};
    use crate::router::KeywordClassifier;
    use crate::compiler::Dimension;
    use crate::store::{CorpusStore, MemoryCorpus, Record};
    use crate::synthesizer::SectionStatus;
    use async_trait::async_trait;
    use reviewlens_common::config::AnalysisConfig;
    use reviewlens_common::embeddings::{Embedder, HashingEmbedder};
    use reviewlens_common::llm::GenerationOptions;
    use std::sync::Arc;

    async fn orchestrator_with(store: Arc<dyn CorpusStore>, config: AnalysisConfig) -> Orchestrator {
        let vocabulary = fixtures::vocabulary();
        let embedder: Arc<dyn Embedder> = Arc::new(HashingEmbedder::new(128));
        let index: Arc<dyn EmbeddingIndex> = Arc::new(
            MemoryIndex::build(&fixtures::snapshot().reviews, embedder.as_ref())
                .await
                .unwrap(),
        );

        Orchestrator::new(
            EntityExtractor::new(vocabulary.clone()),
            StrategyResolver::new(&vocabulary),
            QueryCompiler::new(&config),
            QueryExecutor::new(store, &config),
            Router::new(Arc::new(KeywordClassifier), &config),
            EvidenceRetriever::new(embedder, index, config.stage_timeout()),
            AnswerSynthesizer::new(
                Arc::new(StubGenerator::failing()),
                GenerationOptions::default(),
                &config,
            ),
        )
    }

    async fn orchestrator() -> Orchestrator {
        orchestrator_with(Arc::new(fixtures::memory_corpus()), AnalysisConfig::default()).await
    }

    fn question(text: &str) -> Question {
        Question::at(text, fixtures::now()).unwrap()
    }

    #[tokio::test]
    async fn test_analytic_trail() {
        let outcome = orchestrator()
            .await
            .run(question("Brand A rating last 3 months"), AnswerPath::Auto, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            outcome.context.trail,
            vec![
                PipelineState::Start,
                PipelineState::EntitiesExtracted,
                PipelineState::StrategyResolved,
                PipelineState::QueriesCompiled,
                PipelineState::Executed,
                PipelineState::Synthesized,
                PipelineState::Done,
            ]
        );
        assert_eq!(outcome.context.path, AnswerPath::Analytic);
        assert_eq!(outcome.context.queries.len(), 1);
        assert!(outcome.report.fallback_reason.is_none());
        assert!(outcome.report.sample_size > 0);
    }

    #[tokio::test]
    async fn test_unknown_brand_falls_back() {
        let config = AnalysisConfig::default();
        let mut vocabulary = fixtures::vocabulary();
        vocabulary.extend_brands(["Nowhere Labs".to_string()]);

        let embedder: Arc<dyn Embedder> = Arc::new(HashingEmbedder::new(32));
        let index: Arc<dyn EmbeddingIndex> = Arc::new(
            MemoryIndex::build(&[], embedder.as_ref()).await.unwrap(),
        );
        let orchestrator = Orchestrator::new(
            EntityExtractor::new(vocabulary.clone()),
            StrategyResolver::new(&vocabulary),
            QueryCompiler::new(&config),
            QueryExecutor::new(Arc::new(fixtures::memory_corpus()), &config),
            Router::new(Arc::new(KeywordClassifier), &config),
            EvidenceRetriever::new(embedder, index, config.stage_timeout()),
            AnswerSynthesizer::new(
                Arc::new(StubGenerator::failing()),
                GenerationOptions::default(),
                &config,
            ),
        );

        let outcome = orchestrator
            .run(question("Nowhere Labs rating"), AnswerPath::Auto, CancellationToken::new())
            .await
            .unwrap();

        assert!(outcome.is_fallback());
        assert_eq!(outcome.context.trail[4], PipelineState::Executed);
        assert_eq!(outcome.context.trail[5], PipelineState::Fallback);
        assert!(outcome.report.insufficient_evidence);
        assert_eq!(outcome.report.fallback_reason, Some(FallbackReason::NoMatchingRecords));
    }

    #[tokio::test]
    async fn test_comparison_without_targets_falls_back_early() {
        let outcome = orchestrator()
            .await
            .run(
                question("Compare Brand A against the competition"),
                AnswerPath::Analytic,
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(
            outcome.context.trail,
            vec![
                PipelineState::Start,
                PipelineState::EntitiesExtracted,
                PipelineState::Fallback,
                PipelineState::FallbackDone,
            ]
        );
        assert_eq!(
            outcome.report.fallback_reason,
            Some(FallbackReason::MissingComparisonTargets)
        );
        assert!(outcome.context.queries.is_empty());
    }

    #[tokio::test]
    async fn test_small_brand_sample_is_uncertain() {
        let config = AnalysisConfig {
            min_evidence: 40,
            ..AnalysisConfig::default()
        };
        let orchestrator = orchestrator_with(Arc::new(fixtures::memory_corpus()), config).await;

        let report = orchestrator
            .answer(question("Brand A rating"), AnswerPath::Analytic, CancellationToken::new())
            .await;

        assert_eq!(report.sections.len(), 1);
        assert_eq!(report.sections[0].sample_size, 12);
        assert_eq!(report.sections[0].status, SectionStatus::Uncertain);
        assert!(report.insufficient_evidence);
        assert!(report.fallback_reason.is_none());
    }

    #[tokio::test]
    async fn test_semantic_path_when_no_entities() {
        let outcome = orchestrator()
            .await
            .run(
                question("What are the main complaints and problems?"),
                AnswerPath::Auto,
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.context.path, AnswerPath::Semantic);
        assert_eq!(
            outcome.context.trail,
            vec![
                PipelineState::Start,
                PipelineState::Routed,
                PipelineState::EvidenceRetrieved,
                PipelineState::Synthesized,
                PipelineState::Done,
            ]
        );
        assert_eq!(outcome.report.mode, Some(ResponseMode::QualityIssue));
        assert_eq!(outcome.context.evidence.len(), 25);
        assert!(outcome
            .context
            .evidence
            .windows(2)
            .all(|w| w[0].distance <= w[1].distance));
    }

    #[tokio::test]
    async fn test_cancelled_run() {
        let orchestrator = orchestrator().await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = orchestrator
            .run(question("Brand A rating"), AnswerPath::Analytic, cancel.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Cancelled { .. }));

        let report = orchestrator
            .answer(question("Brand A rating"), AnswerPath::Analytic, cancel)
            .await;
        assert_eq!(report.fallback_reason, Some(FallbackReason::Cancelled));
    }

    /// Cancels its run from inside the first fetch
    struct CancellingStore {
        inner: MemoryCorpus,
        cancel: CancellationToken,
    }

    #[async_trait]
    impl CorpusStore for CancellingStore {
        async fn fetch(&self, query: &CompiledQuery) -> Result<Vec<Record>> {
            self.cancel.cancel();
            self.inner.fetch(query).await
        }

        async fn distinct_values(&self, dimension: Dimension) -> Result<Vec<String>> {
            self.inner.distinct_values(dimension).await
        }

        fn name(&self) -> &str {
            "cancelling"
        }
    }

    #[tokio::test]
    async fn test_cancel_during_execution_stops_at_next_boundary() {
        let cancel = CancellationToken::new();
        let store = CancellingStore {
            inner: fixtures::memory_corpus(),
            cancel: cancel.clone(),
        };
        let orchestrator = orchestrator_with(Arc::new(store), AnalysisConfig::default()).await;

        let outcome = orchestrator
            .answer_traced(question("Brand A rating"), AnswerPath::Analytic, cancel.clone())
            .await;

        // the in-flight query finishes; synthesis never starts
        assert_eq!(outcome.context.state(), PipelineState::Executed);
        assert!(outcome.context.envelope.as_ref().is_some_and(|e| e.data_characteristics.total_rows > 0));
        assert_eq!(outcome.report.fallback_reason, Some(FallbackReason::Cancelled));
        assert!(outcome.report.insufficient_evidence);

        let err = orchestrator
            .run(question("Brand A rating"), AnswerPath::Analytic, cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Cancelled { stage } if stage == "entities"));
    }

    #[test]
    fn test_state_graph() {
        use PipelineState::*;
        assert!(EntitiesExtracted.can_follow(Start));
        assert!(Fallback.can_follow(Executed));
        assert!(!Fallback.can_follow(QueriesCompiled));
        assert!(!Start.can_follow(Done));
        assert!(!Routed.can_follow(EntitiesExtracted));
        assert!(Done.is_terminal() && FallbackDone.is_terminal());
    }
}
