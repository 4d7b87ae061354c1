//! FragranceSearch - the search core service
//!
//! One instance is constructed at process startup and shared by reference.
//!
//! Pipeline: cache → remote engine (optional, best-effort) → local fuzzy
//! matcher over the catalog snapshot → cache write-back.
//!
//! Concurrency Model:
//! - Snapshot and cache are swapped/mutated behind `parking_lot` locks, never held across `.await`
//! - Local matching is CPU-bound and runs on `tokio::spawn_blocking`, fanning out over rayon
//! - The remote call carries a timeout; any failure falls through to the local path

use std::sync::{Arc, Once};
use std::time::Instant;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::{CachedValue, ResultCache};
use crate::config::SearchConfig;
use crate::database::CatalogSource;
use crate::interface::{
    CacheStats, FragranceSearchApi, ResolvedOptions, ResultSource, SearchMetadata, SearchOptions, SearchResponse,
    SillageResult,
};
use crate::lexicon::Lexicon;
use crate::models::CatalogRecord;
use crate::query::normalize_query;
use crate::remote::{hits_to_results, MeilisearchEngine, RemoteSearchEngine};
use crate::search::{self, DEFAULT_AUTOCOMPLETE_LIMIT};
use crate::snapshot::{Snapshot, SnapshotRefresher};

static RAYON_INIT: Once = Once::new();

/// Initialize the global rayon pool, leaving cores for the tokio workers.
fn init_rayon() {
    RAYON_INIT.call_once(|| {
        let num_threads = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4);
        let rayon_threads = num_threads.saturating_sub(2).max(1);

        let _ = rayon::ThreadPoolBuilder::new()
            .num_threads(rayon_threads)
            .thread_name(|i| format!("sillage-rayon-{}", i))
            .build_global();
    });
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

pub struct FragranceSearch {
    config: SearchConfig,
    lexicon: Arc<Lexicon>,
    refresher: SnapshotRefresher,
    cache: Arc<ResultCache>,
    remote: Option<Arc<dyn RemoteSearchEngine>>,
    shutdown: CancellationToken,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl FragranceSearch {
    /// Service with no remote engine. Call `initialize` before serving.
    pub fn new(config: SearchConfig, catalog: Arc<dyn CatalogSource>) -> Self {
        init_rayon();
        let refresher = SnapshotRefresher::new(catalog, config.freshness_window());
        let cache = Arc::new(ResultCache::new(config.cache.ttl(), config.cache.max_entries));
        let lexicon = Lexicon::builtin().clone().extended(&config.lexicon);
        Self {
            config,
            lexicon: Arc::new(lexicon),
            refresher,
            cache,
            remote: None,
            shutdown: CancellationToken::new(),
            sweeper: Mutex::new(None),
        }
    }

    /// Service wired to Meilisearch when `config.remote.url` is set.
    pub fn from_config(config: SearchConfig, catalog: Arc<dyn CatalogSource>) -> SillageResult<Self> {
        let remote = if config.remote.is_configured() {
            Some(MeilisearchEngine::from_config(&config.remote)?)
        } else {
            None
        };
        let service = Self::new(config, catalog);
        Ok(match remote {
            Some(engine) => service.with_remote(Arc::new(engine)),
            None => service,
        })
    }

    pub fn with_remote(mut self, engine: Arc<dyn RemoteSearchEngine>) -> Self {
        self.remote = Some(engine);
        self
    }

    pub fn with_lexicon(mut self, lexicon: Lexicon) -> Self {
        self.lexicon = Arc::new(lexicon);
        self
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn lexicon(&self) -> &Lexicon {
        &self.lexicon
    }

    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    /// The published snapshot, without refreshing it.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.refresher.current()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    /// Apply remote settings (best-effort), start the cache sweeper and load
    /// the first snapshot. Fails only when no snapshot can be loaded.
    pub async fn initialize(&self) -> SillageResult<()> {
        if let Some(remote) = &self.remote {
            match remote.configure(&self.lexicon).await {
                Ok(()) => info!("Remote engine configured"),
                Err(e) => warn!(error = %e, "Remote engine configuration failed, continuing"),
            }
        }

        {
            let mut sweeper = self.sweeper.lock();
            if sweeper.is_none() && !self.shutdown.is_cancelled() {
                *sweeper = Some(self.cache.spawn_sweeper(self.config.cache.sweep_interval(), self.shutdown.clone()));
            }
        }

        let snapshot = self.refresher.ensure_fresh().await?;
        info!(records = snapshot.len(), remote = self.has_remote(), "Search core initialized");
        Ok(())
    }

    /// Stop the cache sweeper and wait for it to exit.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let handle = self.sweeper.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Cache sweeper exited abnormally");
            }
        }
        debug!("Search core shut down");
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Search
    // ─────────────────────────────────────────────────────────────────────────

    /// Ranked search: cache, then the remote engine, then the local matcher.
    pub async fn search(&self, query: &str, options: SearchOptions) -> SillageResult<SearchResponse> {
        let started = Instant::now();
        let normalized = normalize_query(query);
        if normalized.is_empty() {
            return Ok(SearchResponse::empty(query, ResultSource::Local));
        }

        let resolved = options.resolve(self.config.default_limit, self.config.max_limit);
        let key = ResultCache::search_key(&normalized, &resolved);

        if !resolved.force_refresh {
            if let Some(CachedValue::Search(mut cached)) = self.cache.get(&key) {
                cached.query = query.to_string();
                cached.duration = elapsed_ms(started);
                if let Some(metadata) = cached.metadata.as_mut() {
                    metadata.cached = true;
                }
                return Ok(cached);
            }
        }

        let mut response = match self.search_remote(query, &resolved).await {
            Some(response) => response,
            None => self.local_response(query, &resolved).await?,
        };
        response.duration = elapsed_ms(started);

        self.cache.set(&key, CachedValue::Search(response.clone()));
        Ok(response)
    }

    /// Local matcher only, bypassing the cache and the remote engine.
    pub async fn search_local(&self, query: &str, options: SearchOptions) -> SillageResult<SearchResponse> {
        let started = Instant::now();
        if normalize_query(query).is_empty() {
            return Ok(SearchResponse::empty(query, ResultSource::Local));
        }
        let resolved = options.resolve(self.config.default_limit, self.config.max_limit);
        let mut response = self.local_response(query, &resolved).await?;
        response.duration = elapsed_ms(started);
        Ok(response)
    }

    /// `None` means the local path should answer: no engine, no hits, or a failure.
    async fn search_remote(&self, query: &str, options: &ResolvedOptions) -> Option<SearchResponse> {
        let remote = self.remote.as_ref()?;
        let timeout = self.config.remote.timeout();
        let query = query.trim();

        let hits = match tokio::time::timeout(timeout, remote.search(query, options.limit, options.offset)).await {
            Ok(Ok(hits)) => hits,
            Ok(Err(e)) => {
                warn!(error = %e, "Remote search failed, falling back to local matcher");
                return None;
            }
            Err(_) => {
                warn!(timeout_ms = timeout.as_millis() as u64, "Remote search timed out, falling back to local matcher");
                return None;
            }
        };
        if hits.is_empty() {
            debug!(query, "Remote engine returned no hits");
            return None;
        }

        let results = hits_to_results(&hits, query);
        let metadata = options.include_metadata.then(|| {
            let snapshot = self.refresher.current();
            SearchMetadata {
                strategies: Vec::new(),
                candidates: results.len(),
                snapshot_size: snapshot.len(),
                snapshot_refreshed_at: snapshot.refreshed_at(),
                cached: false,
            }
        });
        Some(SearchResponse {
            total: results.len(),
            results,
            query: query.to_string(),
            duration: 0,
            source: ResultSource::Meilisearch,
            suggestions: None,
            metadata,
        })
    }

    async fn local_response(&self, query: &str, options: &ResolvedOptions) -> SillageResult<SearchResponse> {
        let snapshot = self.refresher.ensure_fresh().await?;

        let local = {
            let snapshot = Arc::clone(&snapshot);
            let lexicon = Arc::clone(&self.lexicon);
            let tuning = self.config.ranking.clone();
            let query = query.to_string();
            let options = options.clone();
            tokio::task::spawn_blocking(move || search::search_local(&snapshot, &query, &options, &lexicon, &tuning))
                .await?
        };
        debug!(query, total = local.total, strategies = ?local.strategies, "Local search");

        let metadata = options.include_metadata.then(|| SearchMetadata {
            strategies: local.strategies.clone(),
            candidates: local.total,
            snapshot_size: snapshot.len(),
            snapshot_refreshed_at: snapshot.refreshed_at(),
            cached: false,
        });
        Ok(SearchResponse {
            results: local.results,
            total: local.total,
            query: query.to_string(),
            duration: 0,
            source: ResultSource::Local,
            suggestions: (!local.suggestions.is_empty()).then_some(local.suggestions),
            metadata,
        })
    }

    /// `"<name> by <brand>"` for records whose name or brand contains the query.
    pub async fn autocomplete(&self, query: &str, limit: Option<usize>) -> SillageResult<Vec<String>> {
        let normalized = normalize_query(query);
        if normalized.is_empty() {
            return Ok(Vec::new());
        }
        let limit = limit.unwrap_or(DEFAULT_AUTOCOMPLETE_LIMIT).clamp(1, self.config.max_limit.max(1));
        let key = ResultCache::autocomplete_key(&normalized, limit);

        if let Some(CachedValue::Autocomplete(labels)) = self.cache.get(&key) {
            return Ok(labels);
        }

        let snapshot = self.refresher.ensure_fresh().await?;
        let labels = tokio::task::spawn_blocking(move || search::autocomplete(&snapshot, &normalized, limit)).await?;

        self.cache.set(&key, CachedValue::Autocomplete(labels.clone()));
        Ok(labels)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Maintenance
    // ─────────────────────────────────────────────────────────────────────────

    /// Push the given records, or the current snapshot, to the remote engine.
    /// Returns the number of documents sent; 0 when no engine is configured.
    pub async fn index_fragrances(&self, records: Option<Vec<CatalogRecord>>) -> SillageResult<usize> {
        let Some(remote) = &self.remote else {
            debug!("No remote engine configured, skipping indexing");
            return Ok(0);
        };
        let records = match records {
            Some(records) => records,
            None => self.refresher.ensure_fresh().await?.records().to_vec(),
        };
        let sent = remote.index_records(&records).await?;
        info!(documents = sent, "Indexed fragrances into remote engine");
        Ok(sent)
    }

    /// Reload the snapshot now. Cached responses are kept until their TTL.
    pub async fn refresh_snapshot(&self) -> SillageResult<usize> {
        Ok(self.refresher.refresh().await?.len())
    }

    /// Make the next search reload the snapshot.
    pub fn invalidate_snapshot(&self) {
        self.refresher.invalidate();
    }

    pub fn clear_cache(&self) {
        self.cache.flush();
        info!("Result cache cleared");
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

impl Drop for FragranceSearch {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[async_trait::async_trait]
impl FragranceSearchApi for FragranceSearch {
    async fn search(&self, query: &str, options: SearchOptions) -> SillageResult<SearchResponse> {
        FragranceSearch::search(self, query, options).await
    }

    async fn autocomplete(&self, query: &str, limit: Option<usize>) -> SillageResult<Vec<String>> {
        FragranceSearch::autocomplete(self, query, limit).await
    }

    async fn index_fragrances(&self, records: Option<Vec<CatalogRecord>>) -> SillageResult<()> {
        FragranceSearch::index_fragrances(self, records).await.map(|_| ())
    }

    fn clear_cache(&self) {
        FragranceSearch::clear_cache(self)
    }

    fn cache_stats(&self) -> CacheStats {
        FragranceSearch::cache_stats(self)
    }
}
