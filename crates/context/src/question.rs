//! The per-turn question input

use chrono::{NaiveDate, Utc};
use reviewlens_common::errors::{AppError, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum accepted question length, in characters
pub const MAX_QUESTION_CHARS: usize = 2000;

/// Immutable user question plus its turn context
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    text: String,

    /// Channel the question was asked from, if the caller knows it
    channel: Option<String>,

    /// Caller session, carried for external logging only
    session_id: Option<Uuid>,

    /// Reference date for relative time phrases
    now: NaiveDate,
}

impl Question {
    /// Create a question anchored at today's date
    pub fn new(text: impl Into<String>) -> Result<Self> {
        Self::at(text, Utc::now().date_naive())
    }

    /// Create a question anchored at an explicit reference date
    pub fn at(text: impl Into<String>, now: NaiveDate) -> Result<Self> {
        let text = text.into();
        let trimmed = text.trim();

        if trimmed.is_empty() {
            return Err(AppError::Validation {
                message: "question must not be empty".to_string(),
                field: Some("question".to_string()),
            });
        }
        if trimmed.chars().count() > MAX_QUESTION_CHARS {
            return Err(AppError::Validation {
                message: format!("question exceeds {} characters", MAX_QUESTION_CHARS),
                field: Some("question".to_string()),
            });
        }

        Ok(Self {
            text: trimmed.to_string(),
            channel: None,
            session_id: None,
            now,
        })
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    pub fn with_session(mut self, session_id: Uuid) -> Self {
        self.session_id = Some(session_id);
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn channel(&self) -> Option<&str> {
        self.channel.as_deref()
    }

    pub fn session_id(&self) -> Option<Uuid> {
        self.session_id
    }

    pub fn now(&self) -> NaiveDate {
        self.now
    }

    /// Lowercased text with runs of whitespace collapsed
    pub fn normalized(&self) -> String {
        normalize(&self.text)
    }
}

/// Lowercase, turn punctuation into spaces, collapse whitespace.
///
/// Hyphens, apostrophes, `&` and `%` survive so names like "l'oreal", "a&b"
/// or ISO dates keep their shape.
pub fn normalize(text: &str) -> String {
    let mapped: String = text
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '\'' | '&' | '%') {
                c
            } else {
                ' '
            }
        })
        .collect();

    mapped.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_question_rejected() {
        let err = Question::new("   ").unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
    }

    #[test]
    fn test_overlong_question_rejected() {
        let text = "a".repeat(MAX_QUESTION_CHARS + 1);
        assert!(Question::new(text).is_err());
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("  Compare   Brand-A,  vs L'Oreal?? "), "compare brand-a vs l'oreal");
        assert_eq!(normalize("Rating\tlast 3\nmonths"), "rating last 3 months");
    }

    #[test]
    fn test_context_fields() {
        let now = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
        let session = Uuid::new_v4();
        let q = Question::at("hello", now)
            .unwrap()
            .with_channel("online")
            .with_session(session);
        assert_eq!(q.channel(), Some("online"));
        assert_eq!(q.session_id(), Some(session));
        assert_eq!(q.now(), now);
    }
}
