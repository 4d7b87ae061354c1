//! Local fuzzy matcher over a catalog snapshot.
//!
//! Every strategy's sub-queries are recalled from the snapshot index (or a
//! linear scan), scored by `matcher`, merged in priority order, deduplicated
//! by record id, filtered by the relevance gate and re-ranked by the
//! intelligent score cascade. Everything here is synchronous CPU work; the
//! service runs it on the blocking pool.

use std::cmp::Ordering;
use std::collections::HashSet;

use rayon::prelude::*;
use tracing::{debug, warn};

use crate::candidate::MatchCandidate;
use crate::config::RankingTuning;
use crate::indexer::SnapshotIndex;
use crate::interface::{ResolvedOptions, ResultSource, SearchResult};
use crate::lexicon::Lexicon;
use crate::matcher::{record_distance, tokenize_words, MIN_FRAGMENT_LEN};
use crate::query::{build_strategies, normalize_query, suggestions, FuzzyQuery, StrategyKind};
use crate::ranking::{classify_local, intelligent_score, is_relevant_match, QueryFeatures, ScoreFeatures};
use crate::snapshot::Snapshot;

/// Upper bound on slots recalled from the index for one sub-query. A recall
/// that hits it may be truncated, so the sub-query is scanned linearly instead.
pub(crate) const RECALL_LIMIT: usize = 2000;

pub const DEFAULT_AUTOCOMPLETE_LIMIT: usize = 10;

/// Output of one local search call, before it is wrapped in a response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocalSearch {
    /// The requested page.
    pub results: Vec<SearchResult>,
    /// Candidates that passed the relevance gate, before pagination.
    pub total: usize,
    /// Strategies that contributed a kept candidate, in priority order.
    pub strategies: Vec<StrategyKind>,
    pub suggestions: Vec<String>,
}

/// Hits of one sub-query: `(slot, distance)`, best first.
struct SubQueryHits {
    kind: StrategyKind,
    weight: f64,
    hits: Vec<(usize, f64)>,
}

/// A gated candidate with its final cascade score.
struct Ranked<'a> {
    candidate: MatchCandidate<'a>,
    score: f64,
    exact: bool,
}

/// Run every strategy for `query` against `snapshot` and return the requested page.
pub fn search_local(
    snapshot: &Snapshot,
    query: &str,
    options: &ResolvedOptions,
    lexicon: &Lexicon,
    tuning: &RankingTuning,
) -> LocalSearch {
    let features = QueryFeatures::new(query, lexicon);
    if features.normalized.is_empty() {
        return LocalSearch::default();
    }

    let threshold = options.threshold.unwrap_or(tuning.matcher_threshold);
    let cap = tuning.hits_per_query(options.offset.saturating_add(options.limit));
    let strategies = build_strategies(&features.normalized, &features.terms, lexicon, tuning);

    let sub_queries: Vec<(StrategyKind, f64, &str)> = strategies
        .iter()
        .flat_map(|s| s.queries.iter().map(move |q| (s.kind, s.weight, q.as_str())))
        .collect();

    // Indexed parallel iterator: collect keeps the priority order.
    let per_query: Vec<SubQueryHits> = sub_queries
        .par_iter()
        .map(|&(kind, weight, raw)| SubQueryHits {
            kind,
            weight,
            hits: run_sub_query(snapshot, raw, threshold, cap),
        })
        .collect();

    let mut seen: HashSet<&str> = HashSet::new();
    let mut used: Vec<StrategyKind> = Vec::new();
    let mut kept: Vec<MatchCandidate<'_>> = Vec::new();
    let records = snapshot.records();
    let texts = snapshot.texts();

    for sub in &per_query {
        let before = kept.len();
        for &(slot, distance) in &sub.hits {
            let (Some(record), Some(text)) = (records.get(slot), texts.get(slot)) else {
                continue;
            };
            if seen.contains(record.id.as_str()) {
                continue;
            }
            let candidate = MatchCandidate::new(record, text, slot, distance, sub.kind, sub.weight);
            if is_relevant_match(&candidate, &features, &tuning.gate) {
                seen.insert(record.id.as_str());
                kept.push(candidate);
            }
        }
        if kept.len() > before && !used.contains(&sub.kind) {
            used.push(sub.kind);
        }
        debug!(strategy = ?sub.kind, hits = sub.hits.len(), kept = kept.len() - before, "Sub-query merged");
    }
    used.sort_unstable();

    let mut ranked: Vec<Ranked<'_>> = kept
        .into_iter()
        .map(|candidate| {
            let score_features = ScoreFeatures::extract(&candidate, &features);
            let score = intelligent_score(candidate.adjusted_score(), &score_features, &tuning.cascade);
            Ranked {
                candidate,
                score,
                exact: score_features.exact,
            }
        })
        .collect();
    ranked.sort_by(compare_ranked);

    let total = ranked.len();
    let results = ranked
        .iter()
        .skip(options.offset)
        .take(options.limit)
        .map(|r| to_result(r, &features))
        .collect();

    LocalSearch {
        results,
        total,
        strategies: used,
        suggestions: suggestions(&features.normalized, lexicon, tuning.suggestion_similarity),
    }
}

/// Ascending final score, exact matches first on ties, then snapshot order.
fn compare_ranked(a: &Ranked<'_>, b: &Ranked<'_>) -> Ordering {
    a.score
        .total_cmp(&b.score)
        .then_with(|| b.exact.cmp(&a.exact))
        .then_with(|| a.candidate.slot.cmp(&b.candidate.slot))
}

fn to_result(ranked: &Ranked<'_>, features: &QueryFeatures) -> SearchResult {
    let c = &ranked.candidate;
    let match_type = classify_local(c.name_lower(), c.brand_lower(), features);
    SearchResult::from_record(c.record(), 1.0 - ranked.score, match_type, ResultSource::Local)
}

/// Parse and score one sub-query, keeping at most `cap` hits. Malformed
/// sub-queries are skipped.
fn run_sub_query(snapshot: &Snapshot, raw: &str, threshold: f64, cap: usize) -> Vec<(usize, f64)> {
    let parsed = match FuzzyQuery::parse(raw) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!(sub_query = raw, error = %e, "Skipping malformed sub-query");
            return Vec::new();
        }
    };

    let texts = snapshot.texts();
    let score = |slot: usize| texts.get(slot).and_then(|t| record_distance(&parsed, t, threshold)).map(|d| (slot, d));

    let mut hits: Vec<(usize, f64)> = match snapshot.index().and_then(|index| recall(index, &parsed)) {
        Some(slots) => slots.into_iter().filter_map(score).collect(),
        None => (0..texts.len()).filter_map(score).collect(),
    };
    hits.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
    hits.truncate(cap);
    hits
}

/// Slots that may match `query`, or `None` when only a linear scan is complete.
fn recall(index: &SnapshotIndex, query: &FuzzyQuery) -> Option<Vec<usize>> {
    let mut units = Vec::new();
    recall_units(query, &mut units)?;

    let mut seen = HashSet::new();
    let mut slots = Vec::new();
    for unit in units {
        let recalled = match index.recall(&unit, RECALL_LIMIT) {
            Ok(recalled) => recalled,
            Err(e) => {
                warn!(unit = %unit, error = %e, "Index recall failed, scanning snapshot");
                return None;
            }
        };
        if recalled.len() >= RECALL_LIMIT {
            return None;
        }
        slots.extend(recalled.into_iter().filter(|slot| seen.insert(*slot)));
    }
    Some(slots)
}

/// Texts to recall separately for a sub-query. A fuzzy record hit needs only
/// one matching token, so fuzzy text is recalled word by word; a token too
/// short for the index forces a scan.
fn recall_units(query: &FuzzyQuery, units: &mut Vec<String>) -> Option<()> {
    match query {
        FuzzyQuery::Exact(text) | FuzzyQuery::Include(text) => {
            if !SnapshotIndex::supports(text) {
                return None;
            }
            units.push(text.clone());
        }
        FuzzyQuery::Fuzzy(text) => {
            let words = tokenize_words(text);
            if words.is_empty() || words.iter().any(|w| w.chars().count() < MIN_FRAGMENT_LEN) {
                return None;
            }
            units.extend(words);
        }
        FuzzyQuery::AnyOf(alternatives) => {
            for alt in alternatives {
                recall_units(alt, units)?;
            }
        }
    }
    Some(())
}

/// `"<name> by <brand>"` for records whose name or brand contains `query`,
/// in snapshot order.
pub fn autocomplete(snapshot: &Snapshot, query: &str, limit: usize) -> Vec<String> {
    let needle = normalize_query(query);
    if needle.is_empty() || limit == 0 {
        return Vec::new();
    }
    snapshot
        .records()
        .iter()
        .zip(snapshot.texts())
        .filter(|(_, text)| text.name.lower.contains(&needle) || text.brand.lower.contains(&needle))
        .take(limit)
        .map(|(record, _)| record.display_label())
        .collect()
}
