//! ReviewLens Context Engine
//!
//! Answers analytic questions about product reviews:
//! - Entity extraction against a controlled vocabulary
//! - Strategy resolution and query compilation
//! - Failure-isolated query execution
//! - Mode routing and vector evidence retrieval
//! - Grounded report synthesis
//! - A stateful orchestrator tying the stages together

pub mod compiler;
pub mod entities;
pub mod executor;
pub mod orchestrator;
pub mod question;
pub mod retrieval;
pub mod router;
pub mod service;
pub mod store;
pub mod strategy;
pub mod synthesizer;

#[cfg(test)]
mod fixtures;

pub use orchestrator::{AnswerPath, Orchestrator, PipelineState, RunOutcome};
pub use question::Question;
pub use service::{build_orchestrator, build_with_backends};
pub use synthesizer::Report;
