//! Controlled vocabulary of known brands, products, attributes and channels

use crate::question::normalize;
use reviewlens_common::errors::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

fn default_true() -> bool {
    true
}

/// One canonical name and the surface forms that map to it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VocabularyEntry {
    pub name: String,

    #[serde(default)]
    pub aliases: Vec<String>,

    /// Attributes only: whether the trait is judged from review text
    #[serde(default = "default_true")]
    pub qualitative: bool,
}

impl VocabularyEntry {
    pub fn new(name: &str, aliases: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            aliases: aliases.iter().map(|a| a.to_string()).collect(),
            qualitative: true,
        }
    }

    /// Normalized surface forms, canonical name first
    fn terms(&self) -> impl Iterator<Item = String> + '_ {
        std::iter::once(&self.name)
            .chain(self.aliases.iter())
            .map(|t| normalize(t))
            .filter(|t| !t.is_empty())
    }

    /// Earliest byte offset of any surface form in padded normalized text
    fn first_position(&self, padded: &str) -> Option<usize> {
        self.terms()
            .filter_map(|term| padded.find(&format!(" {} ", term)))
            .min()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Vocabulary {
    #[serde(default)]
    pub brands: Vec<VocabularyEntry>,

    #[serde(default)]
    pub products: Vec<VocabularyEntry>,

    #[serde(default = "default_attributes")]
    pub attributes: Vec<VocabularyEntry>,

    #[serde(default = "default_channels")]
    pub channels: Vec<VocabularyEntry>,
}

fn default_attributes() -> Vec<VocabularyEntry> {
    vec![
        VocabularyEntry::new(
            "moisturizing",
            &["moisturising", "moisture", "moisturize", "hydrating", "hydration", "dryness"],
        ),
        VocabularyEntry::new("texture", &["consistency", "sticky", "greasy", "oily", "feel"]),
        VocabularyEntry::new("scent", &["smell", "fragrance", "odor", "perfume"]),
        VocabularyEntry::new("longevity", &["long-lasting", "long lasting", "lasting", "wear time"]),
        VocabularyEntry::new(
            "irritation",
            &["irritating", "sensitive", "rash", "stinging", "breakout", "breakouts", "redness"],
        ),
        VocabularyEntry::new("absorption", &["absorbs", "absorb", "absorbed", "absorbing"]),
        VocabularyEntry::new("coverage", &["covers", "concealing"]),
        VocabularyEntry::new("packaging", &["package", "container", "pump", "bottle"]),
        VocabularyEntry::new("color", &["colour", "shade", "tone"]),
    ]
}

fn default_channels() -> Vec<VocabularyEntry> {
    vec![
        VocabularyEntry::new("online", &["website", "web", "app", "e-commerce", "ecommerce"]),
        VocabularyEntry::new("offline", &["in-store", "in store", "retail store", "shop"]),
        VocabularyEntry::new("marketplace", &["market place", "open market"]),
    ]
}

impl Vocabulary {
    /// Built-in attributes and channels, no brands or products
    pub fn with_defaults() -> Self {
        Self {
            brands: Vec::new(),
            products: Vec::new(),
            attributes: default_attributes(),
            channels: default_channels(),
        }
    }

    /// Load from a JSON file; missing sections fall back to defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| AppError::Configuration {
            message: format!("Failed to read vocabulary {}: {}", path.display(), e),
        })?;
        let vocabulary: Vocabulary = serde_json::from_str(&raw)?;
        tracing::info!(
            path = %path.display(),
            brands = vocabulary.brands.len(),
            products = vocabulary.products.len(),
            attributes = vocabulary.attributes.len(),
            "Vocabulary loaded"
        );
        Ok(vocabulary)
    }

    /// Add brand names not already known, each as its own alias-free entry
    pub fn extend_brands<I: IntoIterator<Item = String>>(&mut self, names: I) {
        extend_entries(&mut self.brands, names);
    }

    /// Add product names not already known
    pub fn extend_products<I: IntoIterator<Item = String>>(&mut self, names: I) {
        extend_entries(&mut self.products, names);
    }

    pub fn match_brands(&self, padded: &str) -> Vec<String> {
        match_entries(&self.brands, padded)
    }

    pub fn match_products(&self, padded: &str) -> Vec<String> {
        match_entries(&self.products, padded)
    }

    pub fn match_attributes(&self, padded: &str) -> Vec<String> {
        match_entries(&self.attributes, padded)
    }

    pub fn match_channels(&self, padded: &str) -> Vec<String> {
        match_entries(&self.channels, padded)
    }

    /// Canonical channel for a caller-supplied value, if it is known
    pub fn canonical_channel(&self, value: &str) -> Option<String> {
        match_entries(&self.channels, &format!(" {} ", normalize(value)))
            .into_iter()
            .next()
    }

    /// Attributes absent from the vocabulary count as qualitative
    pub fn is_qualitative(&self, attribute: &str) -> bool {
        self.attributes
            .iter()
            .find(|e| e.name == attribute)
            .map_or(true, |e| e.qualitative)
    }
}

fn extend_entries<I: IntoIterator<Item = String>>(entries: &mut Vec<VocabularyEntry>, names: I) {
    for name in names {
        if name.trim().is_empty() || entries.iter().any(|e| e.name == name) {
            continue;
        }
        entries.push(VocabularyEntry {
            name,
            aliases: Vec::new(),
            qualitative: true,
        });
    }
}

/// Canonical names found in `padded`, ordered by first mention
fn match_entries(entries: &[VocabularyEntry], padded: &str) -> Vec<String> {
    let mut found: Vec<(usize, usize, &str)> = entries
        .iter()
        .enumerate()
        .filter_map(|(idx, entry)| {
            entry
                .first_position(padded)
                .map(|pos| (pos, idx, entry.name.as_str()))
        })
        .collect();

    found.sort_by_key(|(pos, idx, _)| (*pos, *idx));

    let mut names = Vec::with_capacity(found.len());
    for (_, _, name) in found {
        super::push_unique(&mut names, name);
    }
    names
}
