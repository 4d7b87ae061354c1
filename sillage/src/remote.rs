//! Remote full-text engine adapter (Meilisearch HTTP API).
//!
//! Best-effort: every call carries a timeout and every failure is returned as
//! a `RemoteError` for the caller to fall back on. Hits are decoded into the
//! typed `RemoteHit` here, so untyped JSON never leaves this module.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::config::RemoteConfig;
use crate::interface::{ResultSource, SearchResult};
use crate::lexicon::Lexicon;
use crate::models::CatalogRecord;
use crate::ranking::classify_remote;

pub const SEARCHABLE_ATTRIBUTES: [&str; 4] = ["name", "brand", "concentration", "year"];
pub const RANKING_RULES: [&str; 6] = ["words", "typo", "exactness", "attribute", "popularity:desc", "rating:desc"];
const DOCUMENT_BATCH: usize = 1000;
const MAX_ERROR_BODY: usize = 512;

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("Remote engine not configured")]
    NotConfigured,
    #[error("HTTP request failed: {0}")]
    Http(reqwest::Error),
    #[error("Remote engine timed out")]
    Timeout,
    #[error("Remote engine returned {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("Invalid remote URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl From<reqwest::Error> for RemoteError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            RemoteError::Timeout
        } else {
            RemoteError::Http(e)
        }
    }
}

pub type RemoteResult<T> = Result<T, RemoteError>;

/// One hit from the remote engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteHit {
    pub id: String,
    pub name: String,
    pub brand: String,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub concentration: Option<String>,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub popularity: Option<f64>,
    #[serde(default)]
    pub verified: bool,
    #[serde(default, rename = "_rankingScore")]
    pub ranking_score: Option<f64>,
}

impl RemoteHit {
    fn record(&self) -> CatalogRecord {
        CatalogRecord {
            id: self.id.clone(),
            name: self.name.clone(),
            brand: self.brand.clone(),
            year: self.year,
            concentration: self.concentration.clone(),
            rating: self.rating,
            popularity: self.popularity,
            verified: self.verified,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchReply {
    hits: Vec<RemoteHit>,
}

/// Convert remote hits into public results, preserving the engine's order.
pub fn hits_to_results(hits: &[RemoteHit], query: &str) -> Vec<SearchResult> {
    let query = query.trim().to_lowercase();
    let len = hits.len().max(1) as f64;
    hits.iter()
        .enumerate()
        .map(|(pos, hit)| {
            let score = hit.ranking_score.unwrap_or(1.0 - pos as f64 / len);
            let match_type = classify_remote(&hit.name.to_lowercase(), &hit.brand.to_lowercase(), &query);
            SearchResult::from_record(&hit.record(), score, match_type, ResultSource::Meilisearch)
        })
        .collect()
}

/// A remote full-text engine the search core may consult first.
#[async_trait]
pub trait RemoteSearchEngine: Send + Sync {
    /// Apply index settings. Idempotent.
    async fn configure(&self, lexicon: &Lexicon) -> RemoteResult<()>;

    async fn search(&self, query: &str, limit: usize, offset: usize) -> RemoteResult<Vec<RemoteHit>>;

    /// Push documents, replacing any with the same id. Returns the number sent.
    async fn index_records(&self, records: &[CatalogRecord]) -> RemoteResult<usize>;
}

/// Meilisearch client for one index.
pub struct MeilisearchEngine {
    client: Client,
    base_url: Url,
    api_key: Option<String>,
    index: String,
    timeout: Duration,
}

impl MeilisearchEngine {
    pub fn new(base_url: &str, api_key: Option<String>, index: impl Into<String>, timeout: Duration) -> RemoteResult<Self> {
        let mut base = base_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            base_url: Url::parse(&base)?,
            api_key,
            index: index.into(),
            timeout,
        })
    }

    pub fn from_config(config: &RemoteConfig) -> RemoteResult<Self> {
        let url = config.url.as_deref().filter(|u| !u.trim().is_empty()).ok_or(RemoteError::NotConfigured)?;
        Self::new(url, config.api_key.clone(), config.index.clone(), config.timeout())
    }

    pub fn index_url(&self, path: &str) -> RemoteResult<Url> {
        Ok(self.base_url.join(&format!("indexes/{}/{}", self.index, path))?)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request.timeout(self.timeout);
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> RemoteResult<reqwest::Response> {
        let response = self.authorize(request).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let mut body = response.text().await.unwrap_or_default();
        if body.len() > MAX_ERROR_BODY {
            let cut = (0..=MAX_ERROR_BODY).rev().find(|i| body.is_char_boundary(*i)).unwrap_or(0);
            body.truncate(cut);
        }
        Err(RemoteError::Status { status, body })
    }
}

pub fn settings_body(lexicon: &Lexicon) -> serde_json::Value {
    json!({
        "searchableAttributes": SEARCHABLE_ATTRIBUTES,
        "rankingRules": RANKING_RULES,
        "sortableAttributes": ["popularity", "rating"],
        "synonyms": lexicon.synonyms(),
    })
}

pub fn search_body(query: &str, limit: usize, offset: usize) -> serde_json::Value {
    json!({
        "q": query,
        "limit": limit,
        "offset": offset,
        "showRankingScore": true,
    })
}

#[async_trait]
impl RemoteSearchEngine for MeilisearchEngine {
    async fn configure(&self, lexicon: &Lexicon) -> RemoteResult<()> {
        let url = self.index_url("settings")?;
        self.send(self.client.patch(url).json(&settings_body(lexicon))).await?;
        info!(index = %self.index, "Remote engine settings applied");
        Ok(())
    }

    async fn search(&self, query: &str, limit: usize, offset: usize) -> RemoteResult<Vec<RemoteHit>> {
        let url = self.index_url("search")?;
        let reply: SearchReply = self
            .send(self.client.post(url).json(&search_body(query, limit, offset)))
            .await?
            .json()
            .await?;
        debug!(query, hits = reply.hits.len(), "Remote search");
        Ok(reply.hits)
    }

    async fn index_records(&self, records: &[CatalogRecord]) -> RemoteResult<usize> {
        let mut url = self.index_url("documents")?;
        url.query_pairs_mut().append_pair("primaryKey", "id");
        for batch in records.chunks(DOCUMENT_BATCH) {
            self.send(self.client.post(url.clone()).json(batch)).await?;
        }
        info!(index = %self.index, documents = records.len(), "Documents pushed to remote engine");
        Ok(records.len())
    }
}
