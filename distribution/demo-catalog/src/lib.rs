//! Demo fragrance catalog.
//!
//! A small, hand-curated set of well-known fragrances embedded as CSV. Used to
//! seed a local database for the CLI, to drive benchmarks, and as fixture data
//! in integration tests.

use once_cell::sync::Lazy;

const CATALOG_CSV: &str = include_str!("../data/catalog.csv");

/// One row of the demo catalog, mirroring the CSV columns.
#[derive(Debug, Clone, PartialEq)]
pub struct DemoFragrance {
    pub id: String,
    pub name: String,
    pub brand: String,
    pub year: Option<i32>,
    pub concentration: Option<String>,
    pub rating: Option<f64>,
    pub popularity: Option<f64>,
    pub verified: bool,
}

static RECORDS: Lazy<Vec<DemoFragrance>> = Lazy::new(|| parse(CATALOG_CSV));

/// All demo rows, in file order.
pub fn records() -> &'static [DemoFragrance] {
    &RECORDS
}

fn parse(data: &str) -> Vec<DemoFragrance> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(data.as_bytes());

    reader
        .records()
        .filter_map(Result::ok)
        .filter_map(|row| {
            let id = row.get(0)?.to_string();
            if id.is_empty() {
                return None;
            }
            Some(DemoFragrance {
                id,
                name: row.get(1)?.to_string(),
                brand: row.get(2)?.to_string(),
                year: row.get(3).and_then(|s| s.parse().ok()),
                concentration: row.get(4).filter(|s| !s.is_empty()).map(str::to_string),
                rating: row.get(5).and_then(|s| s.parse().ok()),
                popularity: row.get(6).and_then(|s| s.parse().ok()),
                verified: row.get(7).map_or(false, |s| s.eq_ignore_ascii_case("true")),
            })
        })
        .collect()
}
