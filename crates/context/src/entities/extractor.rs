//! Vocabulary- and pattern-based entity extraction

use super::{push_unique, resolve_period, EntitySet, Vocabulary};
use crate::question::Question;

/// Turns a question into an `EntitySet`. Extraction never fails; an
/// unrecognizable question yields an empty set.
#[derive(Debug, Clone)]
pub struct EntityExtractor {
    vocabulary: Vocabulary,
}

impl EntityExtractor {
    pub fn new(vocabulary: Vocabulary) -> Self {
        Self { vocabulary }
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    pub fn extract(&self, question: &Question) -> EntitySet {
        let normalized = question.normalized();
        let padded = format!(" {} ", normalized);

        let mut entities = EntitySet {
            brands: self.vocabulary.match_brands(&padded),
            products: self.vocabulary.match_products(&padded),
            attributes: self.vocabulary.match_attributes(&padded),
            channels: self.vocabulary.match_channels(&padded),
            period: resolve_period(&normalized, question.now()),
        };

        // Caller channel context applies only when the text names none
        if entities.channels.is_empty() {
            if let Some(channel) = question.channel() {
                let canonical = self
                    .vocabulary
                    .canonical_channel(channel)
                    .unwrap_or_else(|| channel.trim().to_lowercase());
                if !canonical.is_empty() {
                    push_unique(&mut entities.channels, &canonical);
                }
            }
        }

        tracing::debug!(
            brands = ?entities.brands,
            products = ?entities.products,
            attributes = ?entities.attributes,
            channels = ?entities.channels,
            period = ?entities.period.as_ref().map(|p| p.label.as_str()),
            "Entities extracted"
        );

        entities
    }
}

impl Default for EntityExtractor {
    fn default() -> Self {
        Self::new(Vocabulary::with_defaults())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use chrono::NaiveDate;

    fn extractor() -> EntityExtractor {
        EntityExtractor::new(fixtures::vocabulary())
    }

    fn ask(text: &str) -> EntitySet {
        extractor().extract(&Question::at(text, fixtures::now()).unwrap())
    }

    #[test]
    fn test_rating_question() {
        let e = ask("What is the average rating of Brand A in the last 3 months?");
        assert_eq!(e.brands, vec!["Brand A"]);
        assert!(e.products.is_empty());
        assert!(e.attributes.is_empty());
        let period = e.period.unwrap();
        assert_eq!(period.start, NaiveDate::from_ymd_opt(2024, 3, 17).unwrap());
    }

    #[test]
    fn test_comparison_question() {
        let e = ask("Compare Hydra Serum and Velvet Cream on moisturizing");
        assert_eq!(e.products, vec!["Hydra Serum", "Velvet Cream"]);
        assert_eq!(e.attributes, vec!["moisturizing"]);
        assert!(e.period.is_none());
    }

    #[test]
    fn test_unrecognized_question_is_empty() {
        let e = ask("What do people complain about?");
        assert!(e.is_empty());
    }

    #[test]
    fn test_channel_context_fallback() {
        let q = Question::at("How is the scent?", fixtures::now())
            .unwrap()
            .with_channel("Website");
        let e = extractor().extract(&q);
        assert_eq!(e.channels, vec!["online"]);

        let q = Question::at("How is the scent in store?", fixtures::now())
            .unwrap()
            .with_channel("online");
        let e = extractor().extract(&q);
        assert_eq!(e.channels, vec!["offline"]);
    }
}
