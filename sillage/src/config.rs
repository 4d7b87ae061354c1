//! Search core configuration
//!
//! Every section deserializes with defaults, so a TOML file only needs the
//! keys it overrides. Durations are integer fields (`*_secs`, `*_ms`).

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const ENV_MEILISEARCH_URL: &str = "SILLAGE_MEILISEARCH_URL";
pub const ENV_MEILISEARCH_KEY: &str = "SILLAGE_MEILISEARCH_KEY";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Top-level configuration for `FragranceSearch`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Minimum age of the snapshot before the catalog is fetched again.
    pub freshness_window_secs: u64,
    pub default_limit: usize,
    pub max_limit: usize,
    pub cache: CacheConfig,
    pub remote: RemoteConfig,
    pub ranking: RankingTuning,
    pub lexicon: LexiconExtras,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            freshness_window_secs: 300,
            default_limit: 20,
            max_limit: 100,
            cache: CacheConfig::default(),
            remote: RemoteConfig::default(),
            ranking: RankingTuning::default(),
            lexicon: LexiconExtras::default(),
        }
    }
}

impl SearchConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: SearchConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a TOML file, then apply environment overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml_str(&text)?;
        config.apply_env();
        Ok(config)
    }

    /// Defaults plus environment overrides, for running without a file.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(ENV_MEILISEARCH_URL) {
            if !url.trim().is_empty() {
                self.remote.url = Some(url);
            }
        }
        if let Ok(key) = std::env::var(ENV_MEILISEARCH_KEY) {
            if !key.trim().is_empty() {
                self.remote.api_key = Some(key);
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_limit == 0 {
            return Err(ConfigError::Invalid {
                field: "max_limit",
                reason: "must be at least 1".into(),
            });
        }
        if self.default_limit == 0 || self.default_limit > self.max_limit {
            return Err(ConfigError::Invalid {
                field: "default_limit",
                reason: format!("must be in 1..={}", self.max_limit),
            });
        }
        if self.cache.max_entries == 0 {
            return Err(ConfigError::Invalid {
                field: "cache.max_entries",
                reason: "must be at least 1".into(),
            });
        }
        let w = &self.ranking.weights;
        for (field, weight) in [
            ("ranking.weights.exact", w.exact),
            ("ranking.weights.partial", w.partial),
            ("ranking.weights.brand", w.brand),
            ("ranking.weights.fuzzy", w.fuzzy),
            ("ranking.weights.words", w.words),
            ("ranking.weights.expanded", w.expanded),
        ] {
            if !(weight > 0.0 && weight <= 1.0) {
                return Err(ConfigError::Invalid {
                    field,
                    reason: format!("{weight} is outside (0, 1]"),
                });
            }
        }
        Ok(())
    }

    pub fn freshness_window(&self) -> Duration {
        Duration::from_secs(self.freshness_window_secs)
    }
}

/// Deployment additions layered over the built-in lexicon tables.
///
/// ```toml
/// [lexicon]
/// stop_words = ["cologne"]
/// brands = ["Zara"]
///
/// [lexicon.corrections]
/// sovaj = "sauvage"
///
/// [lexicon.nicknames]
/// pdm = "parfums de marly"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LexiconExtras {
    pub corrections: BTreeMap<String, String>,
    pub nicknames: BTreeMap<String, String>,
    pub stop_words: Vec<String>,
    pub brands: Vec<String>,
}

impl LexiconExtras {
    pub fn is_empty(&self) -> bool {
        self.corrections.is_empty() && self.nicknames.is_empty() && self.stop_words.is_empty() && self.brands.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_secs: u64,
    pub sweep_interval_secs: u64,
    /// Oldest entry is evicted once this many keys are held.
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 60,
            sweep_interval_secs: 120,
            max_entries: 1000,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

/// Remote engine endpoint. No `url` means the adapter is not configured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub index: String,
    pub timeout_ms: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            url: None,
            api_key: None,
            index: "fragrances".to_string(),
            timeout_ms: 2000,
        }
    }
}

impl RemoteConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn is_configured(&self) -> bool {
        self.url.as_deref().is_some_and(|u| !u.trim().is_empty())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RANKING TUNING
// ═══════════════════════════════════════════════════════════════════════════════

/// Thresholds and multipliers of the local matcher. The defaults are the
/// empirically tuned values; their interaction is non-linear, so change them
/// only against a labeled query set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingTuning {
    pub weights: StrategyWeights,
    pub gate: GateThresholds,
    pub cascade: CascadeFactors,
    /// Token distance above which a query token counts as unmatched.
    pub matcher_threshold: f64,
    /// Common terms at or below this similarity are not suggested.
    pub suggestion_similarity: f64,
    /// Upper bound on hits per sub-query.
    pub max_hits_per_query: usize,
    /// Lower bound on hits per sub-query, so a small page sees the same
    /// candidate pool (and `total`) as a default-sized one.
    pub min_hits_per_query: usize,
}

impl Default for RankingTuning {
    fn default() -> Self {
        Self {
            weights: StrategyWeights::default(),
            gate: GateThresholds::default(),
            cascade: CascadeFactors::default(),
            matcher_threshold: 0.6,
            suggestion_similarity: 0.6,
            max_hits_per_query: 100,
            min_hits_per_query: 40,
        }
    }
}

impl RankingTuning {
    /// Per sub-query cap for a page ending at `window_end` (offset + limit):
    /// twice the window, clamped to `[min_hits_per_query, max_hits_per_query]`.
    pub fn hits_per_query(&self, window_end: usize) -> usize {
        let ceiling = self.max_hits_per_query.max(1);
        window_end
            .saturating_mul(2)
            .max(self.min_hits_per_query)
            .clamp(1, ceiling)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyWeights {
    pub exact: f64,
    pub partial: f64,
    pub brand: f64,
    pub fuzzy: f64,
    pub words: f64,
    pub expanded: f64,
}

impl Default for StrategyWeights {
    fn default() -> Self {
        Self {
            exact: 1.0,
            partial: 0.9,
            brand: 0.8,
            fuzzy: 0.7,
            words: 0.6,
            expanded: 0.5,
        }
    }
}

/// Relevance gate thresholds. Distances are raw match distances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateThresholds {
    /// Above this, a key term must appear literally in name or brand.
    pub poor_match_distance: f64,
    pub min_char_overlap: f64,
    pub char_overlap_distance: f64,
    pub word_similarity: f64,
    pub word_overlap_distance: f64,
    pub short_term_max_len: usize,
    pub short_term_similarity: f64,
    pub short_term_distance: f64,
}

impl Default for GateThresholds {
    fn default() -> Self {
        Self {
            poor_match_distance: 0.7,
            min_char_overlap: 0.5,
            char_overlap_distance: 0.5,
            word_similarity: 0.7,
            word_overlap_distance: 0.5,
            short_term_max_len: 4,
            short_term_similarity: 0.8,
            short_term_distance: 0.3,
        }
    }
}

/// Multipliers of the intelligent score cascade, in application order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CascadeFactors {
    pub floor: f64,
    pub name_contains_query: f64,
    pub start_match: f64,
    pub key_term_base: f64,
    pub key_term_ratio: f64,
    pub partial_base: f64,
    pub partial_step: f64,
    pub partial_min: f64,
    pub brand_family: f64,
    pub variant_line: f64,
    pub popularity_high: f64,
    pub popularity_high_factor: f64,
    pub popularity_mid: f64,
    pub popularity_mid_factor: f64,
    pub rating_high: f64,
    pub rating_high_factor: f64,
    pub rating_mid: f64,
    pub rating_mid_factor: f64,
    pub verified_factor: f64,
    pub recent_after_year: i32,
    pub recent_factor: f64,
}

impl Default for CascadeFactors {
    fn default() -> Self {
        Self {
            floor: 0.001,
            name_contains_query: 0.01,
            start_match: 0.05,
            key_term_base: 0.02,
            key_term_ratio: 0.08,
            partial_base: 0.5,
            partial_step: 0.1,
            partial_min: 0.15,
            brand_family: 0.2,
            variant_line: 0.1,
            popularity_high: 7.0,
            popularity_high_factor: 0.85,
            popularity_mid: 5.0,
            popularity_mid_factor: 0.9,
            rating_high: 4.5,
            rating_high_factor: 0.9,
            rating_mid: 4.0,
            rating_mid_factor: 0.95,
            verified_factor: 0.95,
            recent_after_year: 2020,
            recent_factor: 0.98,
        }
    }
}
