//! Approximate string matching over catalog fields.
//!
//! Distances are in `[0, 1]`, lower is better, 0 is exact. A sub-query is
//! scored against name, brand and concentration independently; the record
//! distance is the weighted product over the fields that matched.

use crate::models::CatalogRecord;
use crate::query::FuzzyQuery;

pub const NAME_WEIGHT: f64 = 0.7;
pub const BRAND_WEIGHT: f64 = 0.3;
pub const CONCENTRATION_WEIGHT: f64 = 0.1;

/// Shortest query token that may match by substring or typo.
pub const MIN_FRAGMENT_LEN: usize = 3;

const PREFIX_SPAN: f64 = 0.2;
const INFIX_DISTANCE: f64 = 0.5;
const TYPO_BASE: f64 = 0.1;
const INCLUDE_WORD_START: f64 = 0.1;

/// Lowercased, tokenized view of a record's searchable fields, computed once
/// per snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldText {
    pub name: FieldView,
    pub brand: FieldView,
    pub concentration: Option<FieldView>,
}

impl FieldText {
    pub fn from_record(record: &CatalogRecord) -> Self {
        Self {
            name: FieldView::new(&record.name),
            brand: FieldView::new(&record.brand),
            concentration: record.concentration.as_deref().map(FieldView::new),
        }
    }

    fn weighted(&self) -> impl Iterator<Item = (&FieldView, f64)> {
        [(Some(&self.name), NAME_WEIGHT), (Some(&self.brand), BRAND_WEIGHT), (self.concentration.as_ref(), CONCENTRATION_WEIGHT)]
            .into_iter()
            .filter_map(|(view, weight)| view.map(|v| (v, weight)))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldView {
    pub lower: String,
    pub words: Vec<String>,
}

impl FieldView {
    pub fn new(text: &str) -> Self {
        let lower = text.trim().to_lowercase();
        let words = tokenize_words(&lower);
        Self { lower, words }
    }
}

/// Split text into alphanumeric words. Punctuation and whitespace separate words.
pub fn tokenize_words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

/// Maximum allowed edit distance based on word length.
pub fn max_edit_distance(word_len: usize) -> u8 {
    if word_len < 5 {
        0
    } else if word_len <= 8 {
        1
    } else {
        2
    }
}

/// Damerau-Levenshtein edit distance (optimal string alignment) with threshold pruning.
/// Counts insertions, deletions, substitutions, and adjacent transpositions each as 1 edit.
/// Returns `Some(distance)` if distance <= max_dist, `None` otherwise.
pub fn edit_distance_bounded(a: &str, b: &str, max_dist: u8) -> Option<u8> {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let m = a_chars.len();
    let n = b_chars.len();
    let max_d = max_dist as usize;

    if m.abs_diff(n) > max_d {
        return None;
    }

    let mut prev2 = vec![0usize; n + 1];
    let mut prev: Vec<usize> = (0..=n).collect();
    let mut curr = vec![0usize; n + 1];

    for i in 1..=m {
        curr[0] = i;
        let mut row_min = curr[0];

        for j in 1..=n {
            let cost = usize::from(a_chars[i - 1] != b_chars[j - 1]);
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);

            if i >= 2 && j >= 2 && a_chars[i - 1] == b_chars[j - 2] && a_chars[i - 2] == b_chars[j - 1] {
                curr[j] = curr[j].min(prev2[j - 2] + 1);
            }

            row_min = row_min.min(curr[j]);
        }

        if row_min > max_d {
            return None;
        }

        std::mem::swap(&mut prev2, &mut prev);
        std::mem::swap(&mut prev, &mut curr);
    }

    let result = prev[n];
    (result <= max_d).then_some(result as u8)
}

/// Normalized Levenshtein similarity in `[0, 1]`, 1.0 for identical strings.
pub fn similarity(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(a, b)
}

/// Whether `needle` occurs in `haystack` bounded by non-alphanumerics on both sides.
pub fn contains_at_word_boundary(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    haystack.match_indices(needle).any(|(start, _)| {
        let end = start + needle.len();
        let before_ok = haystack[..start].chars().next_back().map_or(true, |c| !c.is_alphanumeric());
        let after_ok = haystack[end..].chars().next().map_or(true, |c| !c.is_alphanumeric());
        before_ok && after_ok
    })
}

/// Whether `needle` occurs in `haystack` starting at a word start.
pub fn contains_at_word_start(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    haystack.match_indices(needle).any(|(start, _)| {
        haystack[..start].chars().next_back().map_or(true, |c| !c.is_alphanumeric())
    })
}

/// Distance between one query token and one field word, or `None` if they do
/// not match within `threshold`.
pub fn token_distance(query: &str, word: &str, threshold: f64) -> Option<f64> {
    let q_len = query.chars().count();
    let w_len = word.chars().count();
    if q_len == 0 || w_len == 0 {
        return None;
    }

    let distance = if query == word {
        0.0
    } else if word.starts_with(query) {
        PREFIX_SPAN * (1.0 - q_len as f64 / w_len as f64)
    } else if q_len < MIN_FRAGMENT_LEN {
        return None;
    } else if word.contains(query) {
        INFIX_DISTANCE
    } else {
        let max = max_edit_distance(q_len);
        if max == 0 {
            return None;
        }
        let edits = edit_distance_bounded(query, word, max)?;
        TYPO_BASE + edits as f64 / q_len as f64
    };

    (distance <= threshold).then_some(distance)
}

/// Fuzzy distance of a free-text query against one field.
pub fn field_distance(query: &str, query_tokens: &[String], field: &FieldView, threshold: f64) -> Option<f64> {
    if query.is_empty() || field.lower.is_empty() {
        return None;
    }
    if field.lower == query || contains_at_word_boundary(&field.lower, query) {
        return Some(0.0);
    }
    if query_tokens.is_empty() {
        return None;
    }

    let mut matched = 0usize;
    let mut total = 0.0;
    for token in query_tokens {
        let best = field
            .words
            .iter()
            .filter_map(|w| token_distance(token, w, threshold))
            .fold(None, |acc: Option<f64>, d| Some(acc.map_or(d, |a| a.min(d))));
        match best {
            Some(d) => {
                matched += 1;
                total += d;
            }
            None => total += 1.0,
        }
    }

    (matched > 0).then(|| total / query_tokens.len() as f64)
}

/// Combine per-field distances: product of `max(d, EPSILON)^weight`.
pub fn combine_fields(fields: impl IntoIterator<Item = (Option<f64>, f64)>) -> Option<f64> {
    let mut product: Option<f64> = None;
    for (distance, weight) in fields {
        if let Some(d) = distance {
            let term = d.max(f64::EPSILON).powf(weight);
            product = Some(product.map_or(term, |p| p * term));
        }
    }
    product
}

/// Distance of a parsed sub-query against a record, `None` if no field matches.
pub fn record_distance(query: &FuzzyQuery, text: &FieldText, threshold: f64) -> Option<f64> {
    match query {
        FuzzyQuery::Exact(target) => {
            combine_fields(text.weighted().map(|(view, w)| ((view.lower == *target).then_some(0.0), w)))
        }
        FuzzyQuery::Include(fragment) => {
            combine_fields(text.weighted().map(|(view, w)| (include_distance(fragment, view), w)))
        }
        FuzzyQuery::Fuzzy(raw) => {
            let tokens = tokenize_words(raw);
            combine_fields(text.weighted().map(|(view, w)| (field_distance(raw, &tokens, view, threshold), w)))
        }
        FuzzyQuery::AnyOf(alternatives) => alternatives
            .iter()
            .filter_map(|alt| record_distance(alt, text, threshold))
            .fold(None, |acc: Option<f64>, d| Some(acc.map_or(d, |a| a.min(d)))),
    }
}

/// Literal substring distance graded by where the fragment sits in the field.
fn include_distance(fragment: &str, field: &FieldView) -> Option<f64> {
    if fragment.is_empty() || !field.lower.contains(fragment) {
        None
    } else if contains_at_word_boundary(&field.lower, fragment) {
        Some(0.0)
    } else if contains_at_word_start(&field.lower, fragment) {
        Some(INCLUDE_WORD_START)
    } else {
        Some(INFIX_DISTANCE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(name: &str, brand: &str) -> FieldText {
        FieldText::from_record(&CatalogRecord::new("t", name, brand))
    }

    // ── edit_distance_bounded tests ──────────────────────────────

    #[test]
    fn test_edit_distance_exact() {
        assert_eq!(edit_distance_bounded("sauvage", "sauvage", 2), Some(0));
    }

    #[test]
    fn test_edit_distance_one_deletion() {
        assert_eq!(edit_distance_bounded("savage", "sauvage", 1), Some(1));
    }

    #[test]
    fn test_edit_distance_one_substitution() {
        assert_eq!(edit_distance_bounded("aventis", "aventus", 1), Some(1));
    }

    #[test]
    fn test_edit_distance_exceeds_threshold() {
        assert_eq!(edit_distance_bounded("creed", "dior", 2), None);
    }

    #[test]
    fn test_edit_distance_length_prune() {
        assert_eq!(edit_distance_bounded("tf", "tom ford", 2), None);
    }

    #[test]
    fn test_edit_distance_empty_strings() {
        assert_eq!(edit_distance_bounded("", "", 0), Some(0));
        assert_eq!(edit_distance_bounded("ab", "", 2), Some(2));
        assert_eq!(edit_distance_bounded("abc", "", 2), None);
    }

    #[test]
    fn test_edit_distance_transposition() {
        assert_eq!(edit_distance_bounded("versaec", "versace", 1), Some(1));
        assert_eq!(edit_distance_bounded("aventsu", "aventus", 1), Some(1));
    }

    #[test]
    fn test_max_edit_distance_graduation() {
        assert_eq!(max_edit_distance(4), 0);
        assert_eq!(max_edit_distance(5), 1);
        assert_eq!(max_edit_distance(8), 1);
        assert_eq!(max_edit_distance(9), 2);
    }

    // ── token and field distance ─────────────────────────────────

    #[test]
    fn test_token_distance_kinds() {
        assert_eq!(token_distance("eros", "eros", 0.6), Some(0.0));
        let prefix = token_distance("sau", "sauvage", 0.6).unwrap();
        assert!(prefix > 0.0 && prefix < 0.2);
        assert_eq!(token_distance("eros", "kerosene", 0.6), Some(0.5));
        let typo = token_distance("savage", "sauvage", 0.6).unwrap();
        assert!((typo - (0.1 + 1.0 / 6.0)).abs() < 1e-9);
    }

    #[test]
    fn test_short_tokens_only_match_by_prefix() {
        assert!(token_distance("au", "sauvage", 0.6).is_none());
        assert!(token_distance("sa", "sauvage", 0.6).is_some());
    }

    #[test]
    fn test_token_distance_respects_threshold() {
        assert!(token_distance("eros", "kerosene", 0.4).is_none());
    }

    #[test]
    fn test_tokenize_words() {
        assert_eq!(tokenize_words("terre d'hermes"), vec!["terre", "d", "hermes"]);
        assert_eq!(tokenize_words("dolce & gabbana"), vec!["dolce", "gabbana"]);
        assert_eq!(tokenize_words("  "), Vec::<String>::new());
    }

    #[test]
    fn test_word_boundary_containment() {
        assert!(contains_at_word_boundary("eros flame", "eros"));
        assert!(!contains_at_word_boundary("kerosene deluxe", "eros"));
        assert!(contains_at_word_start("sauvage elixir", "sauv"));
        assert!(!contains_at_word_start("kerosene", "eros"));
    }

    #[test]
    fn test_field_distance_unmatched_tokens_count_full() {
        let field = FieldView::new("Eros Flame");
        let tokens = tokenize_words("eros zzzz");
        assert_eq!(field_distance("eros zzzz", &tokens, &field, 0.6), Some(0.5));
        let tokens = tokenize_words("zzzz");
        assert_eq!(field_distance("zzzz", &tokens, &field, 0.6), None);
    }

    // ── record distance ──────────────────────────────────────────

    #[test]
    fn test_exact_query_matches_whole_field_only() {
        let t = text("Sauvage", "Dior");
        assert!(record_distance(&FuzzyQuery::Exact("sauvage".into()), &t, 0.6).is_some());
        assert!(record_distance(&FuzzyQuery::Exact("sauv".into()), &t, 0.6).is_none());
    }

    #[test]
    fn test_record_distance_exact_is_near_zero() {
        let d = record_distance(&FuzzyQuery::Fuzzy("sauvage".into()), &text("Sauvage", "Dior"), 0.6).unwrap();
        assert!(d < 1e-6);
    }

    #[test]
    fn test_name_weighs_more_than_brand() {
        let in_name = record_distance(&FuzzyQuery::Include("eros".into()), &text("Kerosene", "Acme"), 0.6).unwrap();
        let in_brand = record_distance(&FuzzyQuery::Include("eros".into()), &text("Acme", "Kerosene"), 0.6).unwrap();
        assert!(in_name < in_brand, "a name hit should rank ahead of the same brand hit");
        assert!((in_name - 0.5f64.powf(NAME_WEIGHT)).abs() < 1e-9);
    }

    #[test]
    fn test_any_of_takes_best_alternative() {
        let t = text("Aventus", "Creed");
        let q = FuzzyQuery::AnyOf(vec![FuzzyQuery::Fuzzy("zzzz".into()), FuzzyQuery::Fuzzy("aventus".into())]);
        let best = record_distance(&q, &t, 0.6).unwrap();
        assert!(best < 1e-6);
    }

    #[test]
    fn test_similarity() {
        assert_eq!(similarity("eros", "eros"), 1.0);
        assert!(similarity("eros", "kerosene") <= 0.5);
    }
}
