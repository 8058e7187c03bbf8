//! ReviewLens Common Library
//!
//! Shared code for the ReviewLens services including:
//! - Database pool and corpus models
//! - Embedding client abstraction
//! - Text generation backends
//! - Error types and handling
//! - Configuration management
//! - Metrics and observability

pub mod config;
pub mod db;
pub mod embeddings;
pub mod errors;
pub mod llm;
pub mod metrics;

// Re-export commonly used types
pub use config::AppConfig;
pub use embeddings::Embedder;
pub use errors::{AppError, Result};
pub use llm::TextGenerator;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
