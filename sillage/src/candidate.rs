//! Match candidate with memoized derived state.
//!
//! Module isolation ensures no code outside this module can swap the record
//! after construction, so the `OnceLock` caches can never go stale.

use std::collections::HashSet;
use std::sync::OnceLock;

use crate::matcher::FieldText;
use crate::models::CatalogRecord;
use crate::query::StrategyKind;

/// A snapshot record recalled by one strategy within one search call.
/// `words()` and `char_set()` are computed on first access and shared by the
/// relevance gate and the score cascade.
#[derive(Debug, Clone)]
pub struct MatchCandidate<'a> {
    record: &'a CatalogRecord,
    text: &'a FieldText,
    /// Position in the snapshot (popularity order).
    pub slot: usize,
    /// Raw match distance, 0 is exact.
    pub distance: f64,
    pub strategy: StrategyKind,
    pub weight: f64,
    words: OnceLock<Vec<String>>,
    char_set: OnceLock<HashSet<char>>,
}

impl<'a> MatchCandidate<'a> {
    pub fn new(
        record: &'a CatalogRecord,
        text: &'a FieldText,
        slot: usize,
        distance: f64,
        strategy: StrategyKind,
        weight: f64,
    ) -> Self {
        Self {
            record,
            text,
            slot,
            distance,
            strategy,
            weight,
            words: OnceLock::new(),
            char_set: OnceLock::new(),
        }
    }

    pub fn record(&self) -> &'a CatalogRecord {
        self.record
    }

    pub fn name_lower(&self) -> &str {
        &self.text.name.lower
    }

    pub fn brand_lower(&self) -> &str {
        &self.text.brand.lower
    }

    /// Raw distance normalized by the strategy weight.
    pub fn adjusted_score(&self) -> f64 {
        self.distance / self.weight
    }

    /// Name words followed by brand words.
    pub fn words(&self) -> &[String] {
        self.words.get_or_init(|| {
            self.text
                .name
                .words
                .iter()
                .chain(self.text.brand.words.iter())
                .cloned()
                .collect()
        })
    }

    /// Alphanumeric characters of name and brand.
    pub fn char_set(&self) -> &HashSet<char> {
        self.char_set.get_or_init(|| {
            self.name_lower()
                .chars()
                .chain(self.brand_lower().chars())
                .filter(|c| c.is_alphanumeric())
                .collect()
        })
    }

    /// A literal occurrence of `term` in name or brand.
    pub fn mentions(&self, term: &str) -> bool {
        self.name_lower().contains(term) || self.brand_lower().contains(term)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_views() {
        let record = CatalogRecord::new("d&g-lb", "Light Blue", "Dolce & Gabbana");
        let text = FieldText::from_record(&record);
        let candidate = MatchCandidate::new(&record, &text, 3, 0.35, StrategyKind::Fuzzy, 0.7);

        assert_eq!(candidate.words(), &["light", "blue", "dolce", "gabbana"]);
        assert!(candidate.char_set().contains(&'g'));
        assert!(!candidate.char_set().contains(&'&'));
        assert!(candidate.mentions("blue"));
        assert!((candidate.adjusted_score() - 0.5).abs() < 1e-9);
    }
}
