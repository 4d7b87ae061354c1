//! Sillage - fragrance search core
//!
//! Multi-strategy fuzzy search over a fragrance catalog: an in-memory
//! snapshot indexed with Tantivy (trigram + fuzzy-word recall), a relevance
//! gate and a re-ranking cascade, fronted by a TTL result cache and an
//! optional Meilisearch engine.

pub mod cache;
pub(crate) mod candidate;
pub mod config;
pub mod database;
pub mod indexer;
pub mod interface;
pub mod lexicon;
pub mod matcher;
pub mod models;
pub mod query;
pub mod ranking;
pub mod remote;
pub mod search;
mod service;
pub mod snapshot;

pub use config::SearchConfig;
pub use database::{CatalogSource, MemoryCatalog, SqliteCatalog};
pub use interface::*;
pub use lexicon::Lexicon;
pub use models::CatalogRecord;
pub use remote::{MeilisearchEngine, RemoteHit, RemoteSearchEngine};
pub use service::FragranceSearch;
