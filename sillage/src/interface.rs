//! Sillage public interface.
//!
//! Shapes returned to callers of the search core (the HTTP/RPC layer lives
//! elsewhere and consumes these in-process). Wire names are camelCase so the
//! types serialize the same way the web client expects.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::CatalogRecord;
use crate::query::StrategyKind;

// ═══════════════════════════════════════════════════════════════════════════════
// ENUMS
// ═══════════════════════════════════════════════════════════════════════════════

/// How a result relates to the query, as reported to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    Exact,
    Fuzzy,
    Partial,
    Brand,
    /// Produced by the AI categorization pipeline, never by this crate.
    Ai,
}

/// Which backend produced a result or response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResultSource {
    Local,
    Meilisearch,
    /// Produced by the AI categorization pipeline, never by this crate.
    AiFallback,
}

// ═══════════════════════════════════════════════════════════════════════════════
// RECORDS (Structs)
// ═══════════════════════════════════════════════════════════════════════════════

/// Caller-supplied search options. Every field is optional on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchOptions {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    /// Per-token match threshold override for the local matcher (0..=1).
    pub threshold: Option<f64>,
    pub include_metadata: bool,
    /// Skip the cache on read; the fresh response is still written back.
    pub force_refresh: bool,
}

impl SearchOptions {
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn with_metadata(mut self) -> Self {
        self.include_metadata = true;
        self
    }

    pub fn force_refresh(mut self) -> Self {
        self.force_refresh = true;
        self
    }

    /// Fill defaults and clamp the limit into `[1, max_limit]`.
    pub fn resolve(&self, default_limit: usize, max_limit: usize) -> ResolvedOptions {
        let max_limit = max_limit.max(1);
        ResolvedOptions {
            limit: self.limit.unwrap_or(default_limit).clamp(1, max_limit),
            offset: self.offset.unwrap_or(0),
            threshold: self.threshold.map(|t| t.clamp(0.0, 1.0)),
            include_metadata: self.include_metadata,
            force_refresh: self.force_refresh,
        }
    }
}

/// Options after defaults are applied. Serialized form is part of the cache key,
/// so `force_refresh` is left out of it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedOptions {
    pub limit: usize,
    pub offset: usize,
    pub threshold: Option<f64>,
    pub include_metadata: bool,
    #[serde(skip)]
    pub force_refresh: bool,
}

/// A single ranked fragrance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub id: String,
    pub name: String,
    pub brand: String,
    pub year: Option<i32>,
    pub concentration: Option<String>,
    pub rating: Option<f64>,
    pub popularity: Option<f64>,
    pub verified: bool,
    /// 1.0 is a perfect match, 0.0 the weakest.
    pub score: f64,
    pub match_type: MatchType,
    pub source: ResultSource,
}

impl SearchResult {
    pub fn from_record(record: &CatalogRecord, score: f64, match_type: MatchType, source: ResultSource) -> Self {
        Self {
            id: record.id.clone(),
            name: record.name.clone(),
            brand: record.brand.clone(),
            year: record.year,
            concentration: record.concentration.clone(),
            rating: record.rating,
            popularity: record.popularity,
            verified: record.verified,
            score: score.clamp(0.0, 1.0),
            match_type,
            source,
        }
    }
}

/// Diagnostic details attached when `includeMetadata` is requested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchMetadata {
    /// Strategies that contributed at least one kept candidate, in priority order.
    pub strategies: Vec<StrategyKind>,
    /// Candidates that survived the relevance gate.
    pub candidates: usize,
    pub snapshot_size: usize,
    pub snapshot_refreshed_at: Option<DateTime<Utc>>,
    pub cached: bool,
}

/// Search response container
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
    pub total: usize,
    pub query: String,
    /// Wall time of the call in milliseconds.
    pub duration: u64,
    pub source: ResultSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestions: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<SearchMetadata>,
}

impl SearchResponse {
    pub fn empty(query: &str, source: ResultSource) -> Self {
        Self {
            results: Vec::new(),
            total: 0,
            query: query.to_string(),
            duration: 0,
            source,
            suggestions: None,
            metadata: None,
        }
    }
}

/// Counters reported by `cache_stats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub keys: usize,
}

/// Error type for search core operations
#[derive(Debug, Error)]
pub enum SillageError {
    #[error("Catalog error: {0}")]
    Catalog(#[from] crate::database::CatalogError),
    #[error("Index error: {0}")]
    Index(#[from] crate::indexer::IndexerError),
    #[error("Remote engine error: {0}")]
    Remote(#[from] crate::remote::RemoteError),
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
    #[error("No catalog snapshot could be loaded: {0}")]
    SnapshotUnavailable(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<tokio::task::JoinError> for SillageError {
    fn from(e: tokio::task::JoinError) -> Self {
        SillageError::Internal(e.to_string())
    }
}

pub type SillageResult<T> = Result<T, SillageError>;

// ═══════════════════════════════════════════════════════════════════════════════
// SERVICE INTERFACE
// ═══════════════════════════════════════════════════════════════════════════════

/// The operations the RPC layer calls. `FragranceSearch` is the production
/// implementation; callers depend on this trait so handlers can be tested
/// against a fake.
#[async_trait::async_trait]
pub trait FragranceSearchApi: Send + Sync {
    /// Ranked search. Empty query returns an empty response.
    async fn search(&self, query: &str, options: SearchOptions) -> SillageResult<SearchResponse>;

    /// `"<name> by <brand>"` completions for a substring of name or brand.
    async fn autocomplete(&self, query: &str, limit: Option<usize>) -> SillageResult<Vec<String>>;

    /// Push the snapshot (or the given records) into the remote engine.
    /// No-op when no remote engine is configured.
    async fn index_fragrances(&self, records: Option<Vec<CatalogRecord>>) -> SillageResult<()>;

    fn clear_cache(&self);

    fn cache_stats(&self) -> CacheStats;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_applies_defaults_and_clamps() {
        let resolved = SearchOptions::default().resolve(20, 100);
        assert_eq!(resolved.limit, 20);
        assert_eq!(resolved.offset, 0);

        let resolved = SearchOptions::default().with_limit(500).resolve(20, 100);
        assert_eq!(resolved.limit, 100);

        let resolved = SearchOptions::default().with_limit(0).resolve(20, 100);
        assert_eq!(resolved.limit, 1);
    }

    #[test]
    fn options_deserialize_from_camel_case() {
        let options: SearchOptions =
            serde_json::from_str(r#"{"limit":5,"includeMetadata":true,"forceRefresh":true}"#).unwrap();
        assert_eq!(options.limit, Some(5));
        assert!(options.include_metadata);
        assert!(options.force_refresh);
        assert_eq!(options.offset, None);
    }

    #[test]
    fn resolved_options_key_ignores_force_refresh() {
        let plain = SearchOptions::default().resolve(20, 100);
        let forced = SearchOptions::default().force_refresh().resolve(20, 100);
        assert_eq!(
            serde_json::to_string(&plain).unwrap(),
            serde_json::to_string(&forced).unwrap()
        );
    }

    #[test]
    fn enums_use_wire_names() {
        assert_eq!(serde_json::to_string(&ResultSource::AiFallback).unwrap(), "\"ai-fallback\"");
        assert_eq!(serde_json::to_string(&ResultSource::Meilisearch).unwrap(), "\"meilisearch\"");
        assert_eq!(serde_json::to_string(&MatchType::Partial).unwrap(), "\"partial\"");
    }

    #[test]
    fn result_score_is_clamped() {
        let record = CatalogRecord::new("x", "X", "Brand");
        let result = SearchResult::from_record(&record, 1.7, MatchType::Fuzzy, ResultSource::Local);
        assert_eq!(result.score, 1.0);
        let result = SearchResult::from_record(&record, -0.3, MatchType::Fuzzy, ResultSource::Local);
        assert_eq!(result.score, 0.0);
    }
}
