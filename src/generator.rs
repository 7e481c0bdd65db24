//! Weighted operation selection and request building.

use crate::config::{Weights, WriteStyle};
use crate::dataset::GeoRecord;
use chrono::{SecondsFormat, Utc};
use rand::Rng;
use serde_json::json;

/// The closed set of operation kinds issued against the backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Write,
    PointQuery,
    RangeQuery,
    KnnQuery,
}

/// One operation, created fresh per iteration and discarded after the call.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Write { user_id: String, record: GeoRecord },
    PointQuery { user_id: String },
    RangeQuery { record: GeoRecord, radius: f64 },
    KnnQuery { record: GeoRecord, k: u32 },
}

/// Discrete distribution over operation kinds, stored as a cumulative
/// weight table. Bands are half-open `[prev, cum)` starting at 0; a draw at
/// or past the final boundary resolves to the last band, so a draw of
/// exactly 1.0 is never excluded. Reweighting or adding an operation is a
/// data change, not a code change.
#[derive(Debug, Clone)]
pub struct WeightTable {
    cumulative: Vec<(OperationKind, f64)>,
}

impl WeightTable {
    /// Build the table from relative weights. Zero-weight kinds are left
    /// out entirely so they can never be drawn.
    pub fn new(weights: &Weights) -> anyhow::Result<Self> {
        let entries = [
            (OperationKind::Write, weights.write),
            (OperationKind::PointQuery, weights.point),
            (OperationKind::RangeQuery, weights.range),
            (OperationKind::KnnQuery, weights.knn),
        ];
        let total: f64 = entries.iter().map(|(_, w)| w).sum();
        if !(total > 0.0) {
            anyhow::bail!("operation weights must sum to a positive value");
        }

        let mut cumulative = Vec::new();
        let mut sum = 0.0;
        for (kind, weight) in entries {
            if weight > 0.0 {
                sum += weight / total;
                cumulative.push((kind, sum));
            }
        }
        Ok(Self { cumulative })
    }

    /// Resolve a draw in `[0, 1]` to an operation kind.
    pub fn pick(&self, draw: f64) -> OperationKind {
        for &(kind, cum) in &self.cumulative {
            if draw < cum {
                return kind;
            }
        }
        // draw == 1.0, or float accumulation left the last boundary
        // fractionally below it.
        self.cumulative
            .last()
            .map(|&(kind, _)| kind)
            .unwrap_or(OperationKind::Write)
    }

    pub fn kinds(&self) -> impl Iterator<Item = OperationKind> + '_ {
        self.cumulative.iter().map(|&(kind, _)| kind)
    }
}

/// Radius for range queries, uniform in [1.0, 5.0] rounded to one decimal.
pub fn draw_radius<R: Rng>(rng: &mut R) -> f64 {
    (rng.gen_range(1.0..=5.0) * 10.0f64).round() / 10.0
}

/// Neighbor count for knn queries, uniform integer in [10, 50].
pub fn draw_k<R: Rng>(rng: &mut R) -> u32 {
    rng.gen_range(10..=50)
}

/// A fully built request, ready for the executor.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub url: String,
    pub body: serde_json::Value,
    /// Human-readable check name the outcome is aggregated under.
    pub check: String,
}

/// Builds operations and their HTTP requests for one scenario.
pub struct OperationGenerator {
    table: WeightTable,
    write_style: WriteStyle,
    check_label: String,
    ingest_url: String,
    search_url: String,
}

impl OperationGenerator {
    pub fn new(
        weights: &Weights,
        write_style: WriteStyle,
        check_label: String,
        ingest_url: String,
        search_url: String,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            table: WeightTable::new(weights)?,
            write_style,
            check_label,
            ingest_url: ingest_url.trim_end_matches('/').to_string(),
            search_url: search_url.trim_end_matches('/').to_string(),
        })
    }

    /// Select the next operation from one weighted draw. The identity is
    /// supplied by the caller since seeding derives it from the iteration
    /// counter rather than a random draw.
    pub fn next_operation<R: Rng>(
        &self,
        rng: &mut R,
        record: GeoRecord,
        user_id: String,
    ) -> Operation {
        match self.table.pick(rng.gen::<f64>()) {
            OperationKind::Write => Operation::Write { user_id, record },
            OperationKind::PointQuery => Operation::PointQuery { user_id },
            OperationKind::RangeQuery => Operation::RangeQuery {
                record,
                radius: draw_radius(rng),
            },
            OperationKind::KnnQuery => Operation::KnnQuery {
                record,
                k: draw_k(rng),
            },
        }
    }

    /// Build the URL, JSON body, and check name for an operation.
    pub fn prepare(&self, operation: &Operation) -> PreparedRequest {
        match operation {
            Operation::Write { user_id, record } => {
                let body = match &self.write_style {
                    WriteStyle::EpochMillis => json!({
                        "userId": user_id,
                        "latitude": record.latitude,
                        "longitude": record.longitude,
                        "timestamp": Utc::now().timestamp_millis(),
                    }),
                    WriteStyle::Update { service_type } => json!({
                        "userId": user_id,
                        "latitude": record.latitude,
                        "longitude": record.longitude,
                        "speed": 0.0,
                        "accuracy": 0.0,
                        "serviceType": service_type,
                        "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
                    }),
                };
                PreparedRequest {
                    url: format!("{}/api/v1/locations", self.ingest_url),
                    body,
                    check: format!("{} Write OK", self.check_label),
                }
            }
            Operation::PointQuery { user_id } => PreparedRequest {
                url: format!("{}/api/v1/search/point", self.search_url),
                body: json!({ "userId": user_id }),
                check: format!("{} Point OK", self.check_label),
            },
            Operation::RangeQuery { record, radius } => PreparedRequest {
                url: format!("{}/api/v1/search/range?radius={:.1}", self.search_url, radius),
                body: json!({
                    "latitude": record.latitude,
                    "longitude": record.longitude,
                }),
                check: format!("{} Range OK", self.check_label),
            },
            Operation::KnnQuery { record, k } => PreparedRequest {
                url: format!("{}/api/v1/search/knn?n={}", self.search_url, k),
                body: json!({
                    "latitude": record.latitude,
                    "longitude": record.longitude,
                }),
                check: format!("{} KNN OK", self.check_label),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::prelude::*;

    fn write_heavy() -> Weights {
        // 90% write, remainder split in thirds.
        Weights {
            write: 27.0,
            point: 1.0,
            range: 1.0,
            knn: 1.0,
        }
    }

    fn read_heavy() -> Weights {
        Weights {
            write: 0.0,
            point: 1.0,
            range: 1.0,
            knn: 1.0,
        }
    }

    #[test]
    fn test_write_heavy_band_boundaries() {
        let table = WeightTable::new(&write_heavy()).unwrap();
        assert_eq!(table.pick(0.0), OperationKind::Write);
        assert_eq!(table.pick(0.05), OperationKind::Write);
        assert_eq!(table.pick(0.8999), OperationKind::Write);
        // 0.9 is the first point-query draw, not the last write draw.
        assert_eq!(table.pick(0.9), OperationKind::PointQuery);
        // The original's two-draw 0.95/0.95 flattens to 0.9 + 0.95*0.1.
        assert_eq!(table.pick(0.995), OperationKind::KnnQuery);
    }

    #[test]
    fn test_draw_of_one_falls_in_last_band() {
        let table = WeightTable::new(&write_heavy()).unwrap();
        assert_eq!(table.pick(1.0), OperationKind::KnnQuery);
        assert_eq!(table.pick(0.999_999), OperationKind::KnnQuery);
    }

    #[test]
    fn test_read_heavy_excludes_write() {
        let table = WeightTable::new(&read_heavy()).unwrap();
        assert!(table.kinds().all(|k| k != OperationKind::Write));
        assert_eq!(table.pick(0.0), OperationKind::PointQuery);
        assert_eq!(table.pick(0.34), OperationKind::RangeQuery);
        assert_eq!(table.pick(0.67), OperationKind::KnnQuery);
        assert_eq!(table.pick(1.0), OperationKind::KnnQuery);
    }

    #[test]
    fn test_bands_partition_without_gaps() {
        let table = WeightTable::new(&write_heavy()).unwrap();
        // Sweep the unit interval; every draw must resolve, and the kind
        // sequence must be monotone in band order.
        let mut last_seen = 0usize;
        let order = [
            OperationKind::Write,
            OperationKind::PointQuery,
            OperationKind::RangeQuery,
            OperationKind::KnnQuery,
        ];
        for i in 0..=10_000 {
            let draw = i as f64 / 10_000.0;
            let kind = table.pick(draw);
            let pos = order.iter().position(|&k| k == kind).unwrap();
            assert!(pos >= last_seen, "bands overlap at draw {}", draw);
            last_seen = pos;
        }
    }

    #[test]
    fn test_zero_total_weight_rejected() {
        let weights = Weights {
            write: 0.0,
            point: 0.0,
            range: 0.0,
            knn: 0.0,
        };
        assert!(WeightTable::new(&weights).is_err());
    }

    #[test]
    fn test_radius_range_and_precision() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..1000 {
            let radius = draw_radius(&mut rng);
            assert!((1.0..=5.0).contains(&radius));
            let tenths = radius * 10.0;
            assert!((tenths - tenths.round()).abs() < 1e-9);
        }
    }

    #[test]
    fn test_k_range() {
        let mut rng = StdRng::seed_from_u64(4);
        for _ in 0..1000 {
            let k = draw_k(&mut rng);
            assert!((10..=50).contains(&k));
        }
    }

    fn test_generator(weights: Weights, style: WriteStyle) -> OperationGenerator {
        OperationGenerator::new(
            &weights,
            style,
            "Streams".to_string(),
            "http://localhost:8080/".to_string(),
            "http://localhost:8081".to_string(),
        )
        .unwrap()
    }

    #[test]
    fn test_write_request_shape() {
        let generator = test_generator(write_heavy(), WriteStyle::EpochMillis);
        let operation = Operation::Write {
            user_id: "user_42".to_string(),
            record: GeoRecord {
                latitude: -6.2,
                longitude: 106.8,
            },
        };
        let request = generator.prepare(&operation);
        assert_eq!(request.url, "http://localhost:8080/api/v1/locations");
        assert_eq!(request.check, "Streams Write OK");
        assert_eq!(request.body["userId"], "user_42");
        assert_eq!(request.body["latitude"], -6.2);
        assert!(request.body["timestamp"].is_i64());
        assert!(request.body.get("serviceType").is_none());
    }

    #[test]
    fn test_update_style_passes_service_type_through() {
        let generator = test_generator(
            write_heavy(),
            WriteStyle::Update {
                service_type: "REDIS".to_string(),
            },
        );
        let operation = Operation::Write {
            user_id: "user_7".to_string(),
            record: GeoRecord {
                latitude: 1.35,
                longitude: 103.82,
            },
        };
        let request = generator.prepare(&operation);
        assert_eq!(request.body["serviceType"], "REDIS");
        assert_eq!(request.body["speed"], 0.0);
        assert_eq!(request.body["accuracy"], 0.0);
        assert!(request.body["timestamp"].is_string());
    }

    #[test]
    fn test_query_request_shapes() {
        let generator = test_generator(read_heavy(), WriteStyle::EpochMillis);
        let record = GeoRecord {
            latitude: 1.3,
            longitude: 103.8,
        };

        let request = generator.prepare(&Operation::PointQuery {
            user_id: "user_9".to_string(),
        });
        assert_eq!(request.url, "http://localhost:8081/api/v1/search/point");
        assert_eq!(request.body, json!({ "userId": "user_9" }));

        let request = generator.prepare(&Operation::RangeQuery { record, radius: 2.5 });
        assert_eq!(
            request.url,
            "http://localhost:8081/api/v1/search/range?radius=2.5"
        );
        assert_eq!(request.body["latitude"], 1.3);

        let request = generator.prepare(&Operation::KnnQuery { record, k: 25 });
        assert_eq!(request.url, "http://localhost:8081/api/v1/search/knn?n=25");
        assert_eq!(request.check, "Streams KNN OK");
    }
}
