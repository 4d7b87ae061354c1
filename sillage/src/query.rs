//! Query rewriting: key terms, typo correction, strategies, suggestions.
//!
//! Strategies produce sub-queries in a small extended syntax parsed by
//! [`FuzzyQuery::parse`]:
//!
//! | form        | meaning                                        |
//! |-------------|------------------------------------------------|
//! | `="text"`   | whole field equals `text`                      |
//! | `'text`     | field contains `text` literally                |
//! | `a \| b`    | best of the alternatives                       |
//! | other       | typo-tolerant fuzzy match                      |

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::RankingTuning;
use crate::lexicon::Lexicon;
use crate::matcher::{similarity, tokenize_words};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("Empty sub-query")]
    Empty,
    #[error("Unterminated exact match: {0}")]
    UnterminatedQuote(String),
    #[error("Empty alternative in: {0}")]
    EmptyAlternative(String),
}

/// A parsed sub-query. Text is always lowercase.
#[derive(Debug, Clone, PartialEq)]
pub enum FuzzyQuery {
    Exact(String),
    Include(String),
    Fuzzy(String),
    AnyOf(Vec<FuzzyQuery>),
}

impl FuzzyQuery {
    pub fn parse(input: &str) -> Result<Self, QueryError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(QueryError::Empty);
        }
        if input.starts_with("=\"") {
            return Self::parse_single(input);
        }
        if input.contains(" | ") || input.starts_with('|') || input.ends_with('|') {
            let alternatives = input
                .split('|')
                .map(|alt| {
                    if alt.trim().is_empty() {
                        Err(QueryError::EmptyAlternative(input.to_string()))
                    } else {
                        Self::parse_single(alt)
                    }
                })
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(FuzzyQuery::AnyOf(alternatives));
        }
        Self::parse_single(input)
    }

    fn parse_single(input: &str) -> Result<Self, QueryError> {
        let input = input.trim();
        if let Some(rest) = input.strip_prefix("=\"") {
            let inner = rest
                .strip_suffix('"')
                .ok_or_else(|| QueryError::UnterminatedQuote(input.to_string()))?;
            if inner.trim().is_empty() {
                return Err(QueryError::Empty);
            }
            return Ok(FuzzyQuery::Exact(inner.trim().to_lowercase()));
        }
        if let Some(rest) = input.strip_prefix('\'') {
            if rest.trim().is_empty() {
                return Err(QueryError::Empty);
            }
            return Ok(FuzzyQuery::Include(rest.trim().to_lowercase()));
        }
        if input.is_empty() {
            return Err(QueryError::Empty);
        }
        Ok(FuzzyQuery::Fuzzy(input.to_lowercase()))
    }
}

/// Query-rewrite approaches, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    Exact,
    Partial,
    Brand,
    Fuzzy,
    Words,
    Expanded,
}

impl StrategyKind {
    pub fn weight(self, tuning: &RankingTuning) -> f64 {
        let w = &tuning.weights;
        match self {
            StrategyKind::Exact => w.exact,
            StrategyKind::Partial => w.partial,
            StrategyKind::Brand => w.brand,
            StrategyKind::Fuzzy => w.fuzzy,
            StrategyKind::Words => w.words,
            StrategyKind::Expanded => w.expanded,
        }
    }
}

/// One rewrite approach for a single search call.
#[derive(Debug, Clone, PartialEq)]
pub struct Strategy {
    pub kind: StrategyKind,
    pub weight: f64,
    pub queries: Vec<String>,
}

/// Lowercase, trim and collapse whitespace.
pub fn normalize_query(query: &str) -> String {
    query.split_whitespace().map(str::to_lowercase).collect::<Vec<_>>().join(" ")
}

/// Meaningful lowercase terms of a query. Falls back to every token when
/// filtering would leave nothing.
pub fn extract_key_terms(query: &str, lexicon: &Lexicon) -> Vec<String> {
    let tokens: Vec<String> = query.split_whitespace().map(str::to_lowercase).collect();
    let filtered: Vec<String> = tokens
        .iter()
        .filter(|t| t.chars().count() > 1 && !lexicon.is_stop_word(t))
        .cloned()
        .collect();
    if filtered.is_empty() {
        tokens
    } else {
        filtered
    }
}

/// Replace known misspellings, first for the whole query, then word by word.
pub fn correct_typos(query: &str, lexicon: &Lexicon) -> String {
    let normalized = normalize_query(query);
    if let Some(fixed) = lexicon.correction(&normalized) {
        return fixed.to_string();
    }
    normalized
        .split(' ')
        .map(|word| lexicon.correction(word).unwrap_or(word))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Nickname expansion of the query, if it changes anything.
pub fn expand_query(query: &str, lexicon: &Lexicon) -> Option<String> {
    let normalized = normalize_query(query);
    if normalized.is_empty() {
        return None;
    }
    if let Some(expanded) = lexicon.expansion(&normalized) {
        return Some(expanded.to_string());
    }
    let expanded = normalized
        .split(' ')
        .map(|word| lexicon.expansion(word).unwrap_or(word))
        .collect::<Vec<_>>()
        .join(" ");
    (expanded != normalized).then_some(expanded)
}

/// Lexicon brands related to the key terms, lowercased. A term relates to a
/// brand when it is (a prefix of) one of the brand's words, or when its
/// nickname expansion names the brand.
pub fn matching_brands(terms: &[String], lexicon: &Lexicon) -> Vec<String> {
    let mut brands = Vec::new();
    for brand in lexicon.brands() {
        let lower = brand.to_lowercase();
        let words = tokenize_words(&lower);
        let related = terms.iter().any(|term| {
            let direct = term.chars().count() >= 3 && words.iter().any(|w| w.starts_with(term.as_str()));
            let aliased = lexicon.expansion(term).is_some_and(|exp| exp == lower || lower.contains(exp));
            direct || aliased || *term == lower
        });
        if related && !brands.contains(&lower) {
            brands.push(lower);
        }
    }
    brands
}

/// Strategies for a query in priority order. Strategies with no sub-query are omitted.
pub fn build_strategies(query: &str, terms: &[String], lexicon: &Lexicon, tuning: &RankingTuning) -> Vec<Strategy> {
    let normalized = normalize_query(query);
    if normalized.is_empty() {
        return Vec::new();
    }

    let mut strategies = Vec::with_capacity(6);
    let mut push = |kind: StrategyKind, queries: Vec<String>| {
        if !queries.is_empty() {
            strategies.push(Strategy {
                kind,
                weight: kind.weight(tuning),
                queries,
            });
        }
    };

    push(StrategyKind::Exact, vec![format!("=\"{normalized}\"")]);
    push(StrategyKind::Partial, terms.iter().map(|t| format!("'{t}")).collect());
    push(
        StrategyKind::Brand,
        matching_brands(terms, lexicon).into_iter().map(|b| format!("'{b}")).collect(),
    );
    push(StrategyKind::Fuzzy, vec![normalized.clone()]);
    push(StrategyKind::Words, if terms.is_empty() { Vec::new() } else { vec![terms.join(" | ")] });
    push(StrategyKind::Expanded, expand_query(&normalized, lexicon).into_iter().collect());

    strategies
}

/// Spelling suggestions: dictionary corrections of the query and its words,
/// plus common terms similar to the query. Deduplicated, first occurrence kept.
pub fn suggestions(query: &str, lexicon: &Lexicon, min_similarity: f64) -> Vec<String> {
    let normalized = normalize_query(query);
    if normalized.is_empty() {
        return Vec::new();
    }

    let mut out: Vec<String> = Vec::new();
    let mut add = |s: &str| {
        if !out.iter().any(|o| o == s) {
            out.push(s.to_string());
        }
    };

    if let Some(fixed) = lexicon.correction(&normalized) {
        add(fixed);
    }
    for word in normalized.split(' ') {
        if let Some(fixed) = lexicon.correction(word) {
            add(fixed);
        }
    }
    for term in lexicon.common_terms() {
        if similarity(&normalized, term) > min_similarity {
            add(term.as_str());
        }
    }
    out
}
