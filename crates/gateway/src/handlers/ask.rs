//! Question answering handler

use axum::{extract::State, Json};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use validator::Validate;

use crate::AppState;
use reviewlens_common::errors::{AppError, Result};
use reviewlens_context::orchestrator::{AnswerPath, PipelineContext, RunOutcome};
use reviewlens_context::{Question, Report};

/// Ask request
#[derive(Debug, Deserialize, Validate)]
pub struct AskRequest {
    #[validate(length(min = 1, max = 2000))]
    pub question: String,

    /// Channel the question comes from (e.g. "online")
    #[validate(length(min = 1, max = 64))]
    pub channel: Option<String>,

    pub session_id: Option<Uuid>,

    #[serde(default)]
    pub path: AnswerPath,

    /// Reference date for relative periods; defaults to today
    pub now: Option<NaiveDate>,

    /// Include the pipeline trail and intermediate artefacts
    #[serde(default)]
    pub trace: bool,
}

/// Ask response
#[derive(Serialize)]
pub struct AskResponse {
    pub report: Report,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace: Option<PipelineContext>,

    pub processing_time_ms: u64,
}

/// Answer one question with a grounded report
pub async fn ask(
    State(state): State<AppState>,
    Json(request): Json<AskRequest>,
) -> Result<Json<AskResponse>> {
    let start = Instant::now();

    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: None,
    })?;

    let mut question = match request.now {
        Some(now) => Question::at(request.question, now)?,
        None => Question::new(request.question)?,
    };
    if let Some(channel) = request.channel {
        question = question.with_channel(channel);
    }
    if let Some(session_id) = request.session_id {
        question = question.with_session(session_id);
    }

    // The run stops at its next stage boundary once the request budget is
    // spent. The guard ends the deadline task on every exit path.
    let cancel = CancellationToken::new();
    let _deadline_guard = cancel.clone().drop_guard();
    tokio::spawn({
        let cancel = cancel.clone();
        let budget = state.config.request_timeout();
        async move {
            tokio::select! {
                _ = tokio::time::sleep(budget) => cancel.cancel(),
                _ = cancel.cancelled() => {}
            }
        }
    });

    let RunOutcome { report, context } = state
        .orchestrator
        .answer_traced(question, request.path, cancel)
        .await;
    let trace = request.trace.then_some(context);

    tracing::info!(
        sections = report.sections.len(),
        sample_size = report.sample_size,
        insufficient = report.insufficient_evidence,
        fallback = ?report.fallback_reason,
        "Question answered"
    );

    Ok(Json(AskResponse {
        report,
        trace,
        processing_time_ms: start.elapsed().as_millis() as u64,
    }))
}
