//! Core data models for the search core
//!
//! `CatalogRecord` is the read-only projection of a persisted fragrance. The
//! search core only ever holds copies of it inside a snapshot.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// Searchable attributes of one fragrance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogRecord {
    pub id: String,
    pub name: String,
    pub brand: String,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub concentration: Option<String>,
    /// Community rating, 0–5.
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub popularity: Option<f64>,
    #[serde(default)]
    pub verified: bool,
}

impl CatalogRecord {
    pub fn new(id: impl Into<String>, name: impl Into<String>, brand: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            brand: brand.into(),
            year: None,
            concentration: None,
            rating: None,
            popularity: None,
            verified: false,
        }
    }

    pub fn with_year(mut self, year: i32) -> Self {
        self.year = Some(year);
        self
    }

    pub fn with_concentration(mut self, concentration: impl Into<String>) -> Self {
        self.concentration = Some(concentration.into());
        self
    }

    pub fn with_rating(mut self, rating: f64) -> Self {
        self.rating = Some(rating);
        self
    }

    pub fn with_popularity(mut self, popularity: f64) -> Self {
        self.popularity = Some(popularity);
        self
    }

    pub fn verified(mut self) -> Self {
        self.verified = true;
        self
    }

    /// A record is usable by the search core only with a non-blank id.
    pub fn is_valid(&self) -> bool {
        !self.id.trim().is_empty()
    }

    /// Autocomplete label.
    pub fn display_label(&self) -> String {
        format!("{} by {}", self.name, self.brand)
    }
}

impl From<&demo_catalog::DemoFragrance> for CatalogRecord {
    fn from(row: &demo_catalog::DemoFragrance) -> Self {
        Self {
            id: row.id.clone(),
            name: row.name.clone(),
            brand: row.brand.clone(),
            year: row.year,
            concentration: row.concentration.clone(),
            rating: row.rating,
            popularity: row.popularity,
            verified: row.verified,
        }
    }
}

/// Storage order for snapshots: popularity desc, then rating desc, missing values last.
pub fn catalog_order(a: &CatalogRecord, b: &CatalogRecord) -> Ordering {
    desc_nulls_last(a.popularity, b.popularity).then_with(|| desc_nulls_last(a.rating, b.rating))
}

fn desc_nulls_last(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => y.total_cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// The demo catalog as records, in storage order.
pub fn demo_records() -> Vec<CatalogRecord> {
    let mut records: Vec<CatalogRecord> = demo_catalog::records().iter().map(CatalogRecord::from).collect();
    records.sort_by(catalog_order);
    records
}
