//! Entity extraction: structured filters parsed out of free text
//!
//! Provides:
//! - `EntitySet`, the filter bundle every later stage reads
//! - A controlled vocabulary with alias matching
//! - Temporal phrase resolution against a caller-supplied date

mod extractor;
mod temporal;
mod vocabulary;

pub use extractor::EntityExtractor;
pub use temporal::resolve_period;
pub use vocabulary::{Vocabulary, VocabularyEntry};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A closed-open date window `[start, end)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period {
    pub start: NaiveDate,
    /// Exclusive upper bound
    pub end: NaiveDate,
    /// Human label ("last 3 months", "2024-05")
    pub label: String,
}

impl Period {
    /// Build a period; `None` when `start > end`
    pub fn new(start: NaiveDate, end: NaiveDate, label: impl Into<String>) -> Option<Self> {
        (start <= end).then(|| Self {
            start,
            end,
            label: label.into(),
        })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date < self.end
    }
}

/// Structured filters. Empty collections mean "unconstrained"; a missing
/// period means "all time".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntitySet {
    pub brands: Vec<String>,
    pub products: Vec<String>,
    pub attributes: Vec<String>,
    pub channels: Vec<String>,
    pub period: Option<Period>,
}

impl EntitySet {
    pub fn is_empty(&self) -> bool {
        self.brands.is_empty()
            && self.products.is_empty()
            && self.attributes.is_empty()
            && self.channels.is_empty()
            && self.period.is_none()
    }

    /// Number of distinct comparison targets (the larger of brands/products)
    pub fn comparison_targets(&self) -> usize {
        self.brands.len().max(self.products.len())
    }
}

/// Append if absent, keeping first-seen order
pub(crate) fn push_unique(values: &mut Vec<String>, value: &str) {
    if !values.iter().any(|v| v == value) {
        values.push(value.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_period_rejects_inverted_range() {
        assert!(Period::new(date(2024, 5, 1), date(2024, 4, 1), "bad").is_none());
        assert!(Period::new(date(2024, 5, 1), date(2024, 5, 1), "empty").is_some());
    }

    #[test]
    fn test_period_is_closed_open() {
        let p = Period::new(date(2024, 5, 1), date(2024, 6, 1), "2024-05").unwrap();
        assert!(p.contains(date(2024, 5, 1)));
        assert!(p.contains(date(2024, 5, 31)));
        assert!(!p.contains(date(2024, 6, 1)));
    }

    #[test]
    fn test_default_set_is_empty() {
        let set = EntitySet::default();
        assert!(set.is_empty());
        assert_eq!(set.comparison_targets(), 0);
    }

    #[test]
    fn test_push_unique_keeps_order() {
        let mut v = Vec::new();
        push_unique(&mut v, "b");
        push_unique(&mut v, "a");
        push_unique(&mut v, "b");
        assert_eq!(v, vec!["b", "a"]);
    }
}
