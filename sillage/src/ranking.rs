//! Relevance gate and the intelligent score cascade.
//!
//! Scores here are distances: lower is better. The cascade is a pure function
//! of the base score and extracted features; each factor is a separate
//! function applied in a fixed order.

use std::collections::HashSet;

use crate::candidate::MatchCandidate;
use crate::config::{CascadeFactors, GateThresholds};
use crate::interface::MatchType;
use crate::lexicon::Lexicon;
use crate::matcher::{similarity, MIN_FRAGMENT_LEN};
use crate::query::{correct_typos, extract_key_terms, normalize_query};

/// Per-call view of the query shared by the gate, the cascade and the classifier.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryFeatures {
    pub normalized: String,
    pub terms: Vec<String>,
    pub corrected: String,
    pub corrected_terms: Vec<String>,
    /// Query words of at least `MIN_FRAGMENT_LEN` characters.
    long_words: Vec<String>,
    chars: HashSet<char>,
}

impl QueryFeatures {
    pub fn new(query: &str, lexicon: &Lexicon) -> Self {
        let normalized = normalize_query(query);
        let corrected = correct_typos(&normalized, lexicon);
        Self {
            terms: extract_key_terms(&normalized, lexicon),
            corrected_terms: extract_key_terms(&corrected, lexicon),
            long_words: normalized
                .split(' ')
                .filter(|w| w.chars().count() >= MIN_FRAGMENT_LEN)
                .map(str::to_string)
                .collect(),
            chars: normalized.chars().filter(|c| c.is_alphanumeric()).collect(),
            normalized,
            corrected,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RELEVANCE GATE
// ═══════════════════════════════════════════════════════════════════════════════

/// Whether a recalled candidate is plausible enough to rank.
pub fn is_relevant_match(candidate: &MatchCandidate<'_>, query: &QueryFeatures, gate: &GateThresholds) -> bool {
    let distance = candidate.distance;

    if distance > gate.poor_match_distance && !query.terms.iter().any(|t| candidate.mentions(t)) {
        return false;
    }

    if distance > gate.char_overlap_distance && char_overlap(query, candidate) < gate.min_char_overlap {
        return false;
    }

    if distance > gate.word_overlap_distance && !has_word_overlap(query, candidate, gate.word_similarity) {
        return false;
    }

    if let [term] = query.terms.as_slice() {
        if term.chars().count() <= gate.short_term_max_len
            && distance > gate.short_term_distance
            && !short_term_anchored(term, candidate, gate.short_term_similarity)
        {
            return false;
        }
    }

    true
}

/// Fraction of the query's characters present in name + brand.
fn char_overlap(query: &QueryFeatures, candidate: &MatchCandidate<'_>) -> f64 {
    if query.chars.is_empty() {
        return 1.0;
    }
    let shared = query.chars.iter().filter(|c| candidate.char_set().contains(c)).count();
    shared as f64 / query.chars.len() as f64
}

fn has_word_overlap(query: &QueryFeatures, candidate: &MatchCandidate<'_>, min_similarity: f64) -> bool {
    query.long_words.iter().any(|qw| {
        candidate
            .words()
            .iter()
            .filter(|w| w.chars().count() >= MIN_FRAGMENT_LEN)
            .any(|w| w.contains(qw.as_str()) || qw.contains(w.as_str()) || similarity(qw, w) > min_similarity)
    })
}

/// A short single term must sit at the start of the name, brand or a word,
/// or be a near-spelling of a word. Occurring mid-word is not enough.
fn short_term_anchored(term: &str, candidate: &MatchCandidate<'_>, min_similarity: f64) -> bool {
    if candidate.name_lower().starts_with(term) || candidate.brand_lower().starts_with(term) {
        return true;
    }
    candidate.words().iter().any(|w| {
        w == term
            || w.starts_with(term)
            || (w.chars().count() >= 2 && term.starts_with(w.as_str()))
            || similarity(term, w) > min_similarity
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// SCORE CASCADE
// ═══════════════════════════════════════════════════════════════════════════════

/// Candidate/query features the cascade consumes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoreFeatures {
    pub exact: bool,
    pub name_contains_query: bool,
    /// Key terms starting the name or brand, counted per field.
    pub start_matches: usize,
    pub key_term_matches: usize,
    pub total_key_terms: usize,
    /// Words that contain a key term without being equal to it.
    pub partial_matches: usize,
    pub brand_has_first_term: bool,
    pub variant_line: bool,
    pub popularity: Option<f64>,
    pub rating: Option<f64>,
    pub verified: bool,
    pub year: Option<i32>,
}

impl ScoreFeatures {
    pub fn extract(candidate: &MatchCandidate<'_>, query: &QueryFeatures) -> Self {
        let name = candidate.name_lower();
        let brand = candidate.brand_lower();
        let corrected = query.corrected.as_str();
        let terms = &query.corrected_terms;
        let record = candidate.record();

        let mut start_matches = 0;
        let mut key_term_matches = 0;
        let mut partial_matches = 0;
        for term in terms {
            if candidate.mentions(term) {
                key_term_matches += 1;
                start_matches += usize::from(name.starts_with(term.as_str()));
                start_matches += usize::from(brand.starts_with(term.as_str()));
            }
            partial_matches += candidate
                .words()
                .iter()
                .filter(|w| w.contains(term.as_str()) && *w != term)
                .count();
        }

        let first = terms.first().map(String::as_str);
        Self {
            exact: !corrected.is_empty() && (name == corrected || brand == corrected),
            name_contains_query: !corrected.is_empty() && name.contains(corrected),
            start_matches,
            key_term_matches,
            total_key_terms: terms.len(),
            partial_matches,
            brand_has_first_term: first.is_some_and(|t| brand.contains(t)),
            variant_line: terms.len() > 1 && first.is_some_and(|t| name.contains(t)),
            popularity: record.popularity,
            rating: record.rating,
            verified: record.verified,
            year: record.year,
        }
    }
}

/// Final score from an adjusted score. Lower is better, never below the floor.
pub fn intelligent_score(base: f64, f: &ScoreFeatures, c: &CascadeFactors) -> f64 {
    if f.exact {
        return c.floor;
    }

    let mut score = base;
    if f.name_contains_query {
        score *= c.name_contains_query;
    }
    score *= c.start_match.powi(f.start_matches as i32);
    score *= key_term_factor(f.key_term_matches, f.total_key_terms, c);
    score *= partial_factor(f.partial_matches, c);
    if f.brand_has_first_term {
        score *= c.brand_family;
    }
    if f.variant_line {
        score *= c.variant_line;
    }
    score *= popularity_factor(f.popularity, c);
    score *= rating_factor(f.rating, c);
    if f.verified {
        score *= c.verified_factor;
    }
    score *= recency_factor(f.year, c);

    score.max(c.floor)
}

pub fn key_term_factor(matches: usize, total: usize, c: &CascadeFactors) -> f64 {
    if matches == 0 || total == 0 {
        return 1.0;
    }
    let ratio = matches as f64 / total as f64;
    c.key_term_base + ratio * c.key_term_ratio
}

pub fn partial_factor(partials: usize, c: &CascadeFactors) -> f64 {
    if partials == 0 {
        return 1.0;
    }
    (c.partial_base - partials as f64 * c.partial_step).max(c.partial_min)
}

pub fn popularity_factor(popularity: Option<f64>, c: &CascadeFactors) -> f64 {
    match popularity {
        Some(p) if p > c.popularity_high => c.popularity_high_factor,
        Some(p) if p > c.popularity_mid => c.popularity_mid_factor,
        _ => 1.0,
    }
}

pub fn rating_factor(rating: Option<f64>, c: &CascadeFactors) -> f64 {
    match rating {
        Some(r) if r > c.rating_high => c.rating_high_factor,
        Some(r) if r > c.rating_mid => c.rating_mid_factor,
        _ => 1.0,
    }
}

pub fn recency_factor(year: Option<i32>, c: &CascadeFactors) -> f64 {
    match year {
        Some(y) if y > c.recent_after_year => c.recent_factor,
        _ => 1.0,
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// MATCH TYPE
// ═══════════════════════════════════════════════════════════════════════════════

/// Public match type of a local result, by direct containment of the
/// typo-corrected query.
pub fn classify_local(name: &str, brand: &str, query: &QueryFeatures) -> MatchType {
    let q = query.corrected.as_str();
    if q.is_empty() {
        return MatchType::Fuzzy;
    }
    if name == q || brand == q {
        MatchType::Exact
    } else if name.contains(q) || brand.contains(q) {
        MatchType::Partial
    } else if query.corrected_terms.iter().any(|t| brand.contains(t.as_str())) {
        MatchType::Brand
    } else {
        MatchType::Fuzzy
    }
}

/// Public match type of a remote hit. Inputs are lowercase.
pub fn classify_remote(name: &str, brand: &str, query: &str) -> MatchType {
    if query.is_empty() {
        MatchType::Fuzzy
    } else if name == query || brand == query {
        MatchType::Exact
    } else if name.contains(query) || brand.contains(query) {
        MatchType::Partial
    } else {
        MatchType::Fuzzy
    }
}
