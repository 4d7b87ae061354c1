//! Catalog storage for the search core
//!
//! `CatalogSource` is the only thing the search core needs from storage: a bulk
//! fetch in popularity order. `SqliteCatalog` is the production implementation,
//! pooled with r2d2 so the blocking fetch can run off the async runtime.

use std::path::Path;

use async_trait::async_trait;
use parking_lot::RwLock;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Row};
use thiserror::Error;

use crate::models::{catalog_order, CatalogRecord};

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),
    #[error("Invalid record: {0}")]
    InvalidRecord(String),
    #[error("Catalog task failed: {0}")]
    Task(String),
    #[error("Catalog unavailable: {0}")]
    Unavailable(String),
}

pub type CatalogResult<T> = Result<T, CatalogError>;

/// Storage collaborator of the search core.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Every record, ordered by popularity desc then rating desc.
    async fn fetch_all(&self) -> CatalogResult<Vec<CatalogRecord>>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// SQLITE
// ═══════════════════════════════════════════════════════════════════════════════

const SELECT_ALL: &str = "
    SELECT id, name, brand, year, concentration, rating, popularity, verified
    FROM fragrances
    ORDER BY popularity IS NULL, popularity DESC, rating IS NULL, rating DESC, id";

/// Thread-safe catalog using connection pooling
///
/// WAL mode lets the snapshot fetch proceed while writers seed the table.
#[derive(Clone)]
pub struct SqliteCatalog {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteCatalog {
    /// Open or create a catalog database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> CatalogResult<Self> {
        let manager = SqliteConnectionManager::file(path).with_init(|conn| {
            conn.execute_batch(
                "
                PRAGMA journal_mode=WAL;
                PRAGMA synchronous=NORMAL;
                ",
            )?;
            Ok(())
        });

        let pool = Pool::builder().max_size(4).build(manager)?;

        let catalog = Self { pool };
        catalog.setup_schema()?;
        Ok(catalog)
    }

    /// Open an in-memory catalog (tests, benches)
    pub fn open_in_memory() -> CatalogResult<Self> {
        let manager = SqliteConnectionManager::memory();

        // In-memory needs single connection to maintain state
        let pool = Pool::builder().max_size(1).build(manager)?;

        let catalog = Self { pool };
        catalog.setup_schema()?;
        Ok(catalog)
    }

    fn get_conn(&self) -> CatalogResult<PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }

    fn setup_schema(&self) -> CatalogResult<()> {
        let conn = self.get_conn()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS fragrances (
                id TEXT PRIMARY KEY NOT NULL,
                name TEXT NOT NULL,
                brand TEXT NOT NULL,
                year INTEGER,
                concentration TEXT,
                rating REAL,
                popularity REAL,
                verified INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX IF NOT EXISTS idx_fragrances_popularity
                ON fragrances(popularity DESC, rating DESC);
            "#,
        )?;
        Ok(())
    }

    /// Insert or replace one record.
    pub fn upsert(&self, record: &CatalogRecord) -> CatalogResult<()> {
        validate(record)?;
        let conn = self.get_conn()?;
        insert(&conn, record)?;
        Ok(())
    }

    /// Insert or replace many records in one transaction. Nothing is written
    /// if any record is invalid.
    pub fn upsert_many(&self, records: &[CatalogRecord]) -> CatalogResult<usize> {
        records.iter().try_for_each(validate)?;
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        for record in records {
            insert(&tx, record)?;
        }
        tx.commit()?;
        Ok(records.len())
    }

    /// Returns whether a row was removed.
    pub fn delete(&self, id: &str) -> CatalogResult<bool> {
        let conn = self.get_conn()?;
        let changed = conn.execute("DELETE FROM fragrances WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    pub fn count(&self) -> CatalogResult<usize> {
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM fragrances", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Blocking bulk fetch in popularity order, missing values last.
    pub fn fetch_all_records(&self) -> CatalogResult<Vec<CatalogRecord>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(SELECT_ALL)?;
        let rows = stmt.query_map([], row_to_record)?;
        let records = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }
}

#[async_trait]
impl CatalogSource for SqliteCatalog {
    async fn fetch_all(&self) -> CatalogResult<Vec<CatalogRecord>> {
        let catalog = self.clone();
        tokio::task::spawn_blocking(move || catalog.fetch_all_records())
            .await
            .map_err(|e| CatalogError::Task(e.to_string()))?
    }
}

fn validate(record: &CatalogRecord) -> CatalogResult<()> {
    if !record.is_valid() {
        return Err(CatalogError::InvalidRecord(format!(
            "empty id for \"{}\" by \"{}\"",
            record.name, record.brand
        )));
    }
    Ok(())
}

fn insert(conn: &rusqlite::Connection, record: &CatalogRecord) -> rusqlite::Result<usize> {
    conn.execute(
        "INSERT OR REPLACE INTO fragrances
            (id, name, brand, year, concentration, rating, popularity, verified)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            record.id,
            record.name,
            record.brand,
            record.year,
            record.concentration,
            record.rating,
            record.popularity,
            record.verified,
        ],
    )
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<CatalogRecord> {
    Ok(CatalogRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        brand: row.get(2)?,
        year: row.get(3)?,
        concentration: row.get(4)?,
        rating: row.get(5)?,
        popularity: row.get(6)?,
        verified: row.get(7)?,
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// IN-MEMORY
// ═══════════════════════════════════════════════════════════════════════════════

/// Catalog held in memory. Used by tests, benches and embedders that already
/// own their records.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    records: RwLock<Vec<CatalogRecord>>,
}

impl MemoryCatalog {
    pub fn new(records: Vec<CatalogRecord>) -> Self {
        Self {
            records: RwLock::new(records),
        }
    }

    pub fn replace(&self, records: Vec<CatalogRecord>) {
        *self.records.write() = records;
    }

    pub fn push(&self, record: CatalogRecord) {
        self.records.write().push(record);
    }
}

#[async_trait]
impl CatalogSource for MemoryCatalog {
    async fn fetch_all(&self) -> CatalogResult<Vec<CatalogRecord>> {
        let mut records = self.records.read().clone();
        records.sort_by(catalog_order);
        Ok(records)
    }
}
