//! Shared test corpus and stubs

use crate::entities::{Vocabulary, VocabularyEntry};
use crate::store::{CorpusSnapshot, MemoryCorpus};
use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use reviewlens_common::db::models::{Review, ReviewAttribute};
use reviewlens_common::errors::{AppError, Result};
use reviewlens_common::llm::{GenerationOptions, TextGenerator};

const BRANDS: [(&str, &str); 3] = [
    ("Brand A", "Hydra Serum"),
    ("Brand B", "Velvet Cream"),
    ("Lumiere", "Glow Tint"),
];

const CHANNELS: [&str; 3] = ["online", "offline", "marketplace"];

/// (attribute, positive excerpt, negative excerpt)
const ATTRIBUTES: [(&str, &str, &str); 4] = [
    ("moisturizing", "keeps my skin hydrated all day", "left my skin dry by noon"),
    ("scent", "lovely light fragrance", "the smell is far too strong"),
    ("texture", "silky texture that absorbs fast", "sticky texture that feels greasy"),
    ("irritation", "no irritation even on sensitive skin", "caused redness and stinging"),
];

pub const REVIEW_COUNT: usize = 36;

/// Reference date for every fixture question
pub fn now() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()
}

pub fn vocabulary() -> Vocabulary {
    let mut vocabulary = Vocabulary::with_defaults();
    vocabulary.brands = vec![
        VocabularyEntry::new("Brand A", &["brand-a"]),
        VocabularyEntry::new("Brand B", &["brand-b"]),
        VocabularyEntry::new("Lumiere", &["lumière"]),
    ];
    vocabulary.products = vec![
        VocabularyEntry::new("Hydra Serum", &["hydra-serum"]),
        VocabularyEntry::new("Velvet Cream", &[]),
        VocabularyEntry::new("Glow Tint", &[]),
    ];
    vocabulary
}

/// 36 reviews, 12 per brand, one attribute mention each, January-May 2024
pub fn snapshot() -> CorpusSnapshot {
    let start = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
    let mut reviews = Vec::with_capacity(REVIEW_COUNT);
    let mut attributes = Vec::with_capacity(REVIEW_COUNT);

    for i in 0..REVIEW_COUNT {
        let (brand, product) = BRANDS[i % 3];
        let channel = CHANNELS[(i / 3) % 3];
        let rating = 1 + ((i * 7) % 5) as i32;
        let date = start + Duration::days(4 * i as i64);
        let (attribute, good, bad) = ATTRIBUTES[i % 4];
        let (sentiment, excerpt) = match rating {
            4 | 5 => ("positive", good),
            3 => ("neutral", good),
            _ => ("negative", bad),
        };
        let id = format!("r{:03}", i);

        reviews.push(Review {
            id: id.clone(),
            seq: i as i64,
            content: format!("{} {}: {}", brand, product, excerpt),
            brand: brand.to_string(),
            product: product.to_string(),
            rating,
            review_date: date,
            channel: channel.to_string(),
        });

        attributes.push(ReviewAttribute {
            id: format!("a{:03}", i),
            review_id: id,
            brand: brand.to_string(),
            product: product.to_string(),
            channel: channel.to_string(),
            category: "skincare".to_string(),
            attribute: attribute.to_string(),
            sentiment: sentiment.to_string(),
            score: f64::from(rating),
            excerpt: excerpt.to_string(),
            review_date: date,
        });
    }

    CorpusSnapshot {
        reviews,
        attributes,
    }
}

pub fn memory_corpus() -> MemoryCorpus {
    MemoryCorpus::new(snapshot())
}

/// Generator with a fixed reply, or none at all
pub struct StubGenerator {
    reply: Option<String>,
}

impl StubGenerator {
    pub fn replying(text: &str) -> Self {
        Self {
            reply: Some(text.to_string()),
        }
    }

    pub fn failing() -> Self {
        Self { reply: None }
    }
}

#[async_trait]
impl TextGenerator for StubGenerator {
    async fn generate(&self, _prompt: &str, _options: &GenerationOptions) -> Result<String> {
        self.reply
            .clone()
            .ok_or_else(|| AppError::GenerationUnavailable {
                message: "stub generator has no reply".to_string(),
            })
    }

    fn name(&self) -> &str {
        "stub"
    }
}
