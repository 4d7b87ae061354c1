//! Pipeline behaviour of `FragranceSearch`: remote engine fallback, snapshot
//! freshness, the SQLite catalog and remote indexing.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use sillage::database::{CatalogError, CatalogResult};
use sillage::lexicon::Lexicon;
use sillage::models::demo_records;
use sillage::remote::{RemoteError, RemoteResult};
use sillage::{
    CatalogRecord, CatalogSource, FragranceSearch, FragranceSearchApi, MatchType, MemoryCatalog, RemoteHit,
    RemoteSearchEngine, ResultSource, SearchConfig, SearchOptions, SqliteCatalog,
};
use tempfile::TempDir;

// ============================================================
// Fakes
// ============================================================

enum Behaviour {
    Fail,
    Hang,
    Empty,
    Hits(Vec<RemoteHit>),
}

struct FakeRemote {
    behaviour: Behaviour,
    searches: AtomicUsize,
    configured: AtomicUsize,
    indexed: Mutex<Vec<String>>,
}

impl FakeRemote {
    fn new(behaviour: Behaviour) -> Arc<Self> {
        Arc::new(Self {
            behaviour,
            searches: AtomicUsize::new(0),
            configured: AtomicUsize::new(0),
            indexed: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl RemoteSearchEngine for FakeRemote {
    async fn configure(&self, _lexicon: &Lexicon) -> RemoteResult<()> {
        self.configured.fetch_add(1, Ordering::SeqCst);
        match self.behaviour {
            Behaviour::Fail => Err(RemoteError::NotConfigured),
            _ => Ok(()),
        }
    }

    async fn search(&self, _query: &str, limit: usize, _offset: usize) -> RemoteResult<Vec<RemoteHit>> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        match &self.behaviour {
            Behaviour::Fail => Err(RemoteError::Timeout),
            Behaviour::Hang => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(Vec::new())
            }
            Behaviour::Empty => Ok(Vec::new()),
            Behaviour::Hits(hits) => Ok(hits.iter().take(limit).cloned().collect()),
        }
    }

    async fn index_records(&self, records: &[CatalogRecord]) -> RemoteResult<usize> {
        if let Behaviour::Fail = self.behaviour {
            return Err(RemoteError::NotConfigured);
        }
        self.indexed.lock().extend(records.iter().map(|r| r.id.clone()));
        Ok(records.len())
    }
}

struct CountingCatalog {
    inner: MemoryCatalog,
    fetches: AtomicUsize,
    fail: std::sync::atomic::AtomicBool,
}

impl CountingCatalog {
    fn new(records: Vec<CatalogRecord>) -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryCatalog::new(records),
            fetches: AtomicUsize::new(0),
            fail: std::sync::atomic::AtomicBool::new(false),
        })
    }

    fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CatalogSource for CountingCatalog {
    async fn fetch_all(&self) -> CatalogResult<Vec<CatalogRecord>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(CatalogError::Unavailable("storage offline".into()));
        }
        self.inner.fetch_all().await
    }
}

fn hit(id: &str, name: &str, brand: &str, score: f64) -> RemoteHit {
    RemoteHit {
        id: id.into(),
        name: name.into(),
        brand: brand.into(),
        year: None,
        concentration: None,
        rating: None,
        popularity: None,
        verified: false,
        ranking_score: Some(score),
    }
}

fn demo_catalog() -> Arc<MemoryCatalog> {
    Arc::new(MemoryCatalog::new(demo_records()))
}

fn fast_timeout_config() -> SearchConfig {
    let mut config = SearchConfig::default();
    config.remote.timeout_ms = 50;
    config
}

// ============================================================
// Remote engine fallback
// ============================================================

#[tokio::test]
async fn failing_remote_falls_back_to_local() {
    let remote = FakeRemote::new(Behaviour::Fail);
    let with_remote = FragranceSearch::new(fast_timeout_config(), demo_catalog()).with_remote(remote.clone());
    let local_only = FragranceSearch::new(fast_timeout_config(), demo_catalog());

    let fallback = with_remote.search("eros", SearchOptions::default()).await.unwrap();
    let expected = local_only.search_local("eros", SearchOptions::default()).await.unwrap();

    assert_eq!(remote.searches.load(Ordering::SeqCst), 1);
    assert_eq!(fallback.source, ResultSource::Local);
    assert!(!fallback.results.is_empty());
    assert_eq!(fallback.results, expected.results);
}

#[tokio::test]
async fn hanging_remote_times_out_to_local() {
    let remote = FakeRemote::new(Behaviour::Hang);
    let service = FragranceSearch::new(fast_timeout_config(), demo_catalog()).with_remote(remote);

    let started = std::time::Instant::now();
    let response = service.search("aventus", SearchOptions::default()).await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(response.source, ResultSource::Local);
    assert_eq!(response.results[0].id, "creed-aventus");
}

#[tokio::test]
async fn empty_remote_answer_uses_local() {
    let remote = FakeRemote::new(Behaviour::Empty);
    let service = FragranceSearch::new(SearchConfig::default(), demo_catalog()).with_remote(remote);
    let response = service.search("layton", SearchOptions::default()).await.unwrap();
    assert_eq!(response.source, ResultSource::Local);
    assert_eq!(response.results[0].id, "pdm-layton");
}

#[tokio::test]
async fn remote_hits_are_returned_first() {
    let remote = FakeRemote::new(Behaviour::Hits(vec![
        hit("creed-aventus", "Aventus", "Creed", 0.97),
        hit("creed-green-irish-tweed", "Green Irish Tweed", "Creed", 0.41),
    ]));
    let service = FragranceSearch::new(SearchConfig::default(), demo_catalog()).with_remote(remote);

    let response = service
        .search("aventus", SearchOptions::default().with_metadata())
        .await
        .unwrap();
    assert_eq!(response.source, ResultSource::Meilisearch);
    assert_eq!(response.total, 2);
    assert_eq!(response.results[0].match_type, MatchType::Exact);
    assert_eq!(response.results[1].match_type, MatchType::Fuzzy);
    assert!((response.results[0].score - 0.97).abs() < 1e-12);
    assert!(response.suggestions.is_none());
    assert!(response.metadata.unwrap().strategies.is_empty());
}

#[tokio::test]
async fn remote_configuration_failure_is_not_fatal() {
    let remote = FakeRemote::new(Behaviour::Fail);
    let service = FragranceSearch::new(SearchConfig::default(), demo_catalog()).with_remote(remote.clone());
    service.initialize().await.unwrap();
    assert_eq!(remote.configured.load(Ordering::SeqCst), 1);
    service.shutdown().await;
}

// ============================================================
// Snapshot freshness
// ============================================================

#[tokio::test(start_paused = true)]
async fn catalog_fetched_once_per_window() {
    let catalog = CountingCatalog::new(demo_records());
    let service = FragranceSearch::new(SearchConfig::default(), catalog.clone());

    service.search("eros", SearchOptions::default()).await.unwrap();
    tokio::time::advance(Duration::from_secs(120)).await;
    service.search("aventus", SearchOptions::default()).await.unwrap();
    service.autocomplete("dior", None).await.unwrap();
    assert_eq!(catalog.fetches(), 1);

    tokio::time::advance(Duration::from_secs(181)).await;
    service.search("layton", SearchOptions::default()).await.unwrap();
    assert_eq!(catalog.fetches(), 2);
}

#[tokio::test(start_paused = true)]
async fn storage_failure_keeps_stale_snapshot() {
    let catalog = CountingCatalog::new(demo_records());
    let service = FragranceSearch::new(SearchConfig::default(), catalog.clone());
    let before = service.search("sauvage", SearchOptions::default()).await.unwrap();

    catalog.fail.store(true, Ordering::SeqCst);
    tokio::time::advance(Duration::from_secs(301)).await;
    let after = service
        .search("sauvage", SearchOptions::default().force_refresh())
        .await
        .unwrap();

    assert_eq!(catalog.fetches(), 2);
    assert_eq!(before.results, after.results);

    // The failed attempt is not retried inside the same window.
    service.search("eros", SearchOptions::default()).await.unwrap();
    assert_eq!(catalog.fetches(), 2);
}

#[tokio::test]
async fn refresh_snapshot_picks_up_new_records() {
    let catalog = Arc::new(MemoryCatalog::new(vec![CatalogRecord::new("dior-sauvage", "Sauvage", "Dior")]));
    let service = FragranceSearch::new(SearchConfig::default(), catalog.clone());
    assert!(service.autocomplete("layton", None).await.unwrap().is_empty());

    catalog.push(CatalogRecord::new("pdm-layton", "Layton", "Parfums de Marly"));
    assert_eq!(service.refresh_snapshot().await.unwrap(), 2);
    service.clear_cache();
    assert_eq!(
        service.autocomplete("layton", None).await.unwrap(),
        vec!["Layton by Parfums de Marly"]
    );
}

#[tokio::test(start_paused = true)]
async fn invalidated_snapshot_is_refetched_inside_window() {
    let catalog = CountingCatalog::new(vec![CatalogRecord::new("dior-sauvage", "Sauvage", "Dior")]);
    let service = FragranceSearch::new(SearchConfig::default(), catalog.clone());
    let before = service.search("layton", SearchOptions::default()).await.unwrap();
    assert!(before.results.is_empty());

    catalog.inner.push(CatalogRecord::new("pdm-layton", "Layton", "Parfums de Marly"));
    tokio::time::advance(Duration::from_secs(10)).await;
    service.invalidate_snapshot();
    let after = service.search("layton", SearchOptions::default().force_refresh()).await.unwrap();

    assert_eq!(catalog.fetches(), 2);
    assert_eq!(after.results[0].id, "pdm-layton");

    // Back to the normal window once the reload happened.
    service.search("sauvage", SearchOptions::default()).await.unwrap();
    assert_eq!(catalog.fetches(), 2);
}

// ============================================================
// Lexicon configuration
// ============================================================

#[tokio::test]
async fn configured_correction_changes_results() {
    let records = vec![
        CatalogRecord::new("creed-aventus", "Aventus", "Creed"),
        CatalogRecord::new("dior-sauvage", "Sauvage", "Dior"),
    ];
    let plain = FragranceSearch::new(SearchConfig::default(), Arc::new(MemoryCatalog::new(records.clone())));
    let before = plain.search("aventu", SearchOptions::default()).await.unwrap();
    assert_eq!(before.results[0].id, "creed-aventus");
    assert_eq!(before.results[0].match_type, MatchType::Partial);

    let config = SearchConfig::from_toml_str("[lexicon.corrections]\naventu = \"aventus\"\n").unwrap();
    let configured = FragranceSearch::new(config, Arc::new(MemoryCatalog::new(records)));
    assert_eq!(configured.lexicon().correction("aventu"), Some("aventus"));
    let after = configured.search("aventu", SearchOptions::default()).await.unwrap();
    assert_eq!(after.results[0].id, "creed-aventus");
    assert_eq!(after.results[0].match_type, MatchType::Exact);
}

#[tokio::test]
async fn custom_lexicon_nickname_is_used() {
    let records = vec![CatalogRecord::new("pdm-layton", "Layton", "Parfums de Marly")];
    let plain = FragranceSearch::new(SearchConfig::default(), Arc::new(MemoryCatalog::new(records.clone())));
    assert!(plain.search("gumdrop", SearchOptions::default()).await.unwrap().results.is_empty());

    let service = FragranceSearch::new(SearchConfig::default(), Arc::new(MemoryCatalog::new(records)))
        .with_lexicon(Lexicon::new().with_nickname("gumdrop", "layton"));
    let response = service.search("gumdrop", SearchOptions::default()).await.unwrap();
    assert_eq!(response.results[0].id, "pdm-layton");
}

// ============================================================
// SQLite catalog end to end
// ============================================================

#[tokio::test]
async fn sqlite_catalog_serves_search() {
    let dir = TempDir::new().unwrap();
    let catalog = SqliteCatalog::open(dir.path().join("catalog.sqlite")).unwrap();
    catalog.upsert_many(&demo_records()).unwrap();

    let service = FragranceSearch::new(SearchConfig::default(), Arc::new(catalog));
    service.initialize().await.unwrap();
    assert_eq!(service.snapshot().len(), demo_records().len());

    let response = service.search("Baccarat Rouge", SearchOptions::default()).await.unwrap();
    assert_eq!(response.results[0].id, "mfk-baccarat-rouge");
    service.shutdown().await;
}

// ============================================================
// Remote indexing and the trait seam
// ============================================================

#[tokio::test]
async fn index_pushes_snapshot_or_given_records() {
    let remote = FakeRemote::new(Behaviour::Empty);
    let service = FragranceSearch::new(SearchConfig::default(), demo_catalog()).with_remote(remote.clone());

    assert_eq!(service.index_fragrances(None).await.unwrap(), demo_records().len());
    let custom = vec![CatalogRecord::new("custom", "Custom", "House")];
    assert_eq!(service.index_fragrances(Some(custom)).await.unwrap(), 1);
    assert_eq!(remote.indexed.lock().len(), demo_records().len() + 1);
}

#[tokio::test]
async fn index_errors_surface() {
    let remote = FakeRemote::new(Behaviour::Fail);
    let service = FragranceSearch::new(SearchConfig::default(), demo_catalog()).with_remote(remote);
    assert!(service.index_fragrances(None).await.is_err());
}

#[tokio::test]
async fn service_is_usable_through_api_trait() {
    let api: Arc<dyn FragranceSearchApi> = Arc::new(FragranceSearch::new(SearchConfig::default(), demo_catalog()));
    let response = api.search("le male", SearchOptions::default()).await.unwrap();
    assert_eq!(response.results[0].id, "jpg-le-male");
    api.index_fragrances(None).await.unwrap();
    api.clear_cache();
    assert_eq!(api.cache_stats().keys, 0);
}
