//! Coordinate dataset loading and sampling.

use anyhow::Context;
use rand::Rng;
use std::path::Path;

/// One coordinate record from the dataset. Immutable after load.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoRecord {
    pub latitude: f64,
    pub longitude: f64,
}

/// The shared read-only sampling pool. Loaded once per run and shared
/// across all virtual clients behind an `Arc`; sampling takes `&self`.
#[derive(Debug)]
pub struct Dataset {
    records: Vec<GeoRecord>,
    skipped: usize,
}

impl Dataset {
    /// Load the dataset from a CSV file. The first row is a header naming
    /// the columns; every valid subsequent row becomes one record.
    ///
    /// Rows whose coordinate fields are missing, unparseable, or non-finite
    /// are excluded from the pool (not zero-defaulted) and counted. A
    /// missing file, missing column, or empty pool aborts startup.
    pub fn load(
        path: impl AsRef<Path>,
        lat_column: &str,
        lng_column: &str,
    ) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(path)
            .with_context(|| format!("failed to open dataset {}", path.display()))?;
        Self::from_csv_reader(&mut reader, lat_column, lng_column)
            .with_context(|| format!("failed to load dataset {}", path.display()))
    }

    fn from_csv_reader<R: std::io::Read>(
        reader: &mut csv::Reader<R>,
        lat_column: &str,
        lng_column: &str,
    ) -> anyhow::Result<Self> {
        let headers = reader.headers()?.clone();
        let lat_idx = headers
            .iter()
            .position(|h| h == lat_column)
            .with_context(|| format!("dataset has no '{}' column", lat_column))?;
        let lng_idx = headers
            .iter()
            .position(|h| h == lng_column)
            .with_context(|| format!("dataset has no '{}' column", lng_column))?;

        let mut records = Vec::new();
        let mut skipped = 0usize;
        for row in reader.records() {
            let row = row?;
            match (
                parse_coord(row.get(lat_idx)),
                parse_coord(row.get(lng_idx)),
            ) {
                (Some(latitude), Some(longitude)) => {
                    records.push(GeoRecord {
                        latitude,
                        longitude,
                    });
                }
                _ => skipped += 1,
            }
        }

        if records.is_empty() {
            anyhow::bail!("dataset contains no valid coordinate rows");
        }

        Ok(Self { records, skipped })
    }

    /// Draw one record uniformly at random. O(1), safe for concurrent use
    /// through a shared reference since the pool never changes after load.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> GeoRecord {
        self.records[rng.gen_range(0..self.records.len())]
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of malformed rows excluded at load time.
    pub fn skipped_rows(&self) -> usize {
        self.skipped
    }
}

fn parse_coord(field: Option<&str>) -> Option<f64> {
    let value: f64 = field?.trim().parse().ok()?;
    value.is_finite().then_some(value)
}
