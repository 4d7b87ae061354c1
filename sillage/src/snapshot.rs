//! In-memory catalog snapshot and its refresher.
//!
//! A snapshot is built completely (records, field views, recall index) before
//! it is published, then swapped in behind a read-write lock. Readers clone
//! the `Arc` and never observe a partially built snapshot.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::database::CatalogSource;
use crate::indexer::{IndexerResult, SnapshotIndex};
use crate::interface::{SillageError, SillageResult};
use crate::matcher::FieldText;
use crate::models::CatalogRecord;

/// Read-only copy of the catalog used by the local matcher.
#[derive(Debug)]
pub struct Snapshot {
    records: Vec<CatalogRecord>,
    texts: Vec<FieldText>,
    index: Option<SnapshotIndex>,
    loaded_at: Option<Instant>,
    refreshed_at: Option<DateTime<Utc>>,
}

impl Snapshot {
    /// The startup snapshot: no records, never loaded.
    pub fn empty() -> Self {
        Self {
            records: Vec::new(),
            texts: Vec::new(),
            index: None,
            loaded_at: None,
            refreshed_at: None,
        }
    }

    /// Build a snapshot from fetched records, keeping their order. Records with
    /// a blank id are dropped, and only the first record per id is kept.
    pub fn build(records: Vec<CatalogRecord>, loaded_at: Instant, refreshed_at: DateTime<Utc>) -> IndexerResult<Self> {
        let fetched = records.len();
        let mut seen = HashSet::with_capacity(fetched);
        let records: Vec<CatalogRecord> = records
            .into_iter()
            .filter(|r| r.is_valid() && seen.insert(r.id.clone()))
            .collect();
        if records.len() < fetched {
            warn!(fetched, kept = records.len(), "Dropped records with blank or duplicate ids");
        }

        let texts: Vec<FieldText> = records.iter().map(FieldText::from_record).collect();
        let index = Some(SnapshotIndex::build(&texts)?);

        Ok(Self {
            records,
            texts,
            index,
            loaded_at: Some(loaded_at),
            refreshed_at: Some(refreshed_at),
        })
    }

    /// Snapshot without a recall index. Searches fall back to linear scans.
    pub fn unindexed(records: Vec<CatalogRecord>) -> Self {
        let texts = records.iter().map(FieldText::from_record).collect();
        Self {
            records,
            texts,
            index: None,
            loaded_at: Some(Instant::now()),
            refreshed_at: Some(Utc::now()),
        }
    }

    pub fn records(&self) -> &[CatalogRecord] {
        &self.records
    }

    pub fn texts(&self) -> &[FieldText] {
        &self.texts
    }

    pub fn index(&self) -> Option<&SnapshotIndex> {
        self.index.as_ref()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Whether this snapshot came from a successful fetch.
    pub fn is_loaded(&self) -> bool {
        self.loaded_at.is_some()
    }

    pub fn refreshed_at(&self) -> Option<DateTime<Utc>> {
        self.refreshed_at
    }

    fn is_fresh(&self, now: Instant, window: Duration) -> bool {
        self.loaded_at.is_some_and(|at| now.duration_since(at) < window)
    }
}

/// Refresh bookkeeping, held under the async gate so only one fetch runs at a time.
struct RefreshState {
    last_attempt: Option<Instant>,
}

/// Keeps the snapshot at most one freshness window old.
pub struct SnapshotRefresher {
    catalog: Arc<dyn CatalogSource>,
    freshness_window: Duration,
    current: RwLock<Arc<Snapshot>>,
    gate: Mutex<RefreshState>,
    invalidated: AtomicBool,
}

impl SnapshotRefresher {
    pub fn new(catalog: Arc<dyn CatalogSource>, freshness_window: Duration) -> Self {
        Self {
            catalog,
            freshness_window,
            current: RwLock::new(Arc::new(Snapshot::empty())),
            gate: Mutex::new(RefreshState { last_attempt: None }),
            invalidated: AtomicBool::new(false),
        }
    }

    /// The published snapshot, fresh or not.
    pub fn current(&self) -> Arc<Snapshot> {
        self.current.read().clone()
    }

    pub fn refreshed_at(&self) -> Option<DateTime<Utc>> {
        self.current.read().refreshed_at()
    }

    /// Make the next `ensure_fresh` fetch regardless of age.
    pub fn invalidate(&self) {
        self.invalidated.store(true, Ordering::SeqCst);
    }

    /// Return a snapshot no older than the freshness window when possible.
    ///
    /// A fetch failure keeps the previous snapshot and is not retried until
    /// another window has passed. Only a failure before the first successful
    /// load is returned as an error.
    pub async fn ensure_fresh(&self) -> SillageResult<Arc<Snapshot>> {
        let snapshot = self.current();
        if !self.invalidated.load(Ordering::SeqCst) && snapshot.is_fresh(Instant::now(), self.freshness_window) {
            return Ok(snapshot);
        }

        let mut state = self.gate.lock().await;

        // Another caller may have refreshed while we waited on the gate.
        let snapshot = self.current();
        let now = Instant::now();
        let invalidated = self.invalidated.load(Ordering::SeqCst);
        if !invalidated && snapshot.is_fresh(now, self.freshness_window) {
            return Ok(snapshot);
        }
        let attempted_recently = state
            .last_attempt
            .is_some_and(|at| now.duration_since(at) < self.freshness_window);
        if !invalidated && snapshot.is_loaded() && attempted_recently {
            debug!("Serving stale snapshot until the next refresh window");
            return Ok(snapshot);
        }

        state.last_attempt = Some(now);
        self.invalidated.store(false, Ordering::SeqCst);
        match self.reload().await {
            Ok(fresh) => Ok(fresh),
            Err(e) if snapshot.is_loaded() => {
                warn!(error = %e, records = snapshot.len(), "Snapshot refresh failed, keeping previous snapshot");
                Ok(snapshot)
            }
            Err(e) => Err(SillageError::SnapshotUnavailable(e.to_string())),
        }
    }

    /// Fetch and publish a new snapshot now, ignoring the freshness window.
    pub async fn refresh(&self) -> SillageResult<Arc<Snapshot>> {
        let mut state = self.gate.lock().await;
        state.last_attempt = Some(Instant::now());
        self.invalidated.store(false, Ordering::SeqCst);
        self.reload().await
    }

    async fn reload(&self) -> SillageResult<Arc<Snapshot>> {
        let started = std::time::Instant::now();
        let loaded_at = Instant::now();
        let refreshed_at = Utc::now();

        let records = self.catalog.fetch_all().await?;
        let snapshot = tokio::task::spawn_blocking(move || Snapshot::build(records, loaded_at, refreshed_at)).await??;
        let snapshot = Arc::new(snapshot);
        *self.current.write() = snapshot.clone();

        info!(
            records = snapshot.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Catalog snapshot refreshed"
        );
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{CatalogError, CatalogResult};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    struct CountingCatalog {
        records: Vec<CatalogRecord>,
        calls: AtomicUsize,
        fail_after: Option<usize>,
    }

    impl CountingCatalog {
        fn new(records: Vec<CatalogRecord>) -> Self {
            Self {
                records,
                calls: AtomicUsize::new(0),
                fail_after: None,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CatalogSource for CountingCatalog {
        async fn fetch_all(&self) -> CatalogResult<Vec<CatalogRecord>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_after.is_some_and(|n| call >= n) {
                return Err(CatalogError::Unavailable("storage offline".into()));
            }
            Ok(self.records.clone())
        }
    }

    fn records() -> Vec<CatalogRecord> {
        vec![
            CatalogRecord::new("sauvage", "Sauvage", "Dior"),
            CatalogRecord::new("aventus", "Aventus", "Creed"),
        ]
    }

    #[test]
    fn test_build_drops_blank_and_duplicate_ids() {
        let snapshot = Snapshot::build(
            vec![
                CatalogRecord::new("a", "First", "X"),
                CatalogRecord::new("", "Blank", "X"),
                CatalogRecord::new("a", "Second", "X"),
                CatalogRecord::new("b", "Other", "X"),
            ],
            Instant::now(),
            Utc::now(),
        )
        .unwrap();
        let names: Vec<&str> = snapshot.records().iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["First", "Other"]);
        assert_eq!(snapshot.texts().len(), 2);
        assert_eq!(snapshot.index().map(|i| i.num_docs()), Some(2));
    }

    #[test]
    fn test_empty_snapshot_is_not_loaded() {
        let snapshot = Snapshot::empty();
        assert!(!snapshot.is_loaded());
        assert!(snapshot.is_empty());
        assert!(snapshot.refreshed_at().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetches_at_most_once_per_window() {
        let catalog = Arc::new(CountingCatalog::new(records()));
        let refresher = SnapshotRefresher::new(catalog.clone(), Duration::from_secs(300));

        refresher.ensure_fresh().await.unwrap();
        tokio::time::advance(Duration::from_secs(100)).await;
        refresher.ensure_fresh().await.unwrap();
        assert_eq!(catalog.calls(), 1);

        tokio::time::advance(Duration::from_secs(201)).await;
        let snapshot = refresher.ensure_fresh().await.unwrap();
        assert_eq!(catalog.calls(), 2);
        assert_eq!(snapshot.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_keeps_stale_snapshot_without_retry() {
        let catalog = Arc::new(CountingCatalog {
            fail_after: Some(1),
            ..CountingCatalog::new(records())
        });
        let refresher = SnapshotRefresher::new(catalog.clone(), Duration::from_secs(300));

        refresher.ensure_fresh().await.unwrap();
        tokio::time::advance(Duration::from_secs(301)).await;

        let stale = refresher.ensure_fresh().await.unwrap();
        assert_eq!(stale.len(), 2);
        assert_eq!(catalog.calls(), 2);

        // Failed attempt counts against the window
        refresher.ensure_fresh().await.unwrap();
        assert_eq!(catalog.calls(), 2);

        tokio::time::advance(Duration::from_secs(301)).await;
        refresher.ensure_fresh().await.unwrap();
        assert_eq!(catalog.calls(), 3);
    }

    #[tokio::test]
    async fn test_failure_before_first_load_is_an_error() {
        let catalog = Arc::new(CountingCatalog {
            fail_after: Some(0),
            ..CountingCatalog::new(records())
        });
        let refresher = SnapshotRefresher::new(catalog, Duration::from_secs(300));
        let err = refresher.ensure_fresh().await.unwrap_err();
        assert!(matches!(err, SillageError::SnapshotUnavailable(_)));
    }

    #[tokio::test]
    async fn test_invalidate_forces_refetch() {
        let catalog = Arc::new(CountingCatalog::new(records()));
        let refresher = SnapshotRefresher::new(catalog.clone(), Duration::from_secs(300));

        refresher.ensure_fresh().await.unwrap();
        refresher.invalidate();
        refresher.ensure_fresh().await.unwrap();
        assert_eq!(catalog.calls(), 2);
        assert!(refresher.refreshed_at().is_some());
    }

    #[tokio::test]
    async fn test_refresh_ignores_window() {
        let catalog = Arc::new(CountingCatalog::new(records()));
        let refresher = SnapshotRefresher::new(catalog.clone(), Duration::from_secs(300));
        refresher.ensure_fresh().await.unwrap();
        refresher.refresh().await.unwrap();
        assert_eq!(catalog.calls(), 2);
    }
}
