//! Scenario configuration loading and management.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main scenario configuration loaded from YAML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioConfig {
    pub name: String,
    pub description: String,
    /// Base URL of the location ingest service.
    pub ingest_url: String,
    /// Base URL of the geo search service.
    pub search_url: String,
    pub dataset: DatasetConfig,
    pub executor: Executor,
    pub weights: Weights,
    #[serde(default)]
    pub write_style: WriteStyle,
    /// Label prefixed to check names in the report (e.g. "Streams Write OK").
    #[serde(default = "default_check_label")]
    pub check_label: String,
    /// Delay between iterations of a single virtual client, in milliseconds.
    #[serde(default = "default_pacing_ms")]
    pub pacing_ms: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub seed: Option<u64>, // Optional RNG seed for reproducible runs
}

fn default_check_label() -> String {
    "Geo".to_string()
}

fn default_pacing_ms() -> u64 {
    100
}

fn default_request_timeout_secs() -> u64 {
    30
}

/// Where the coordinate dataset lives and which columns hold the coordinates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    pub path: String,
    #[serde(default = "default_lat_column")]
    pub lat_column: String,
    #[serde(default = "default_lng_column")]
    pub lng_column: String,
}

fn default_lat_column() -> String {
    "rawlat".to_string()
}

fn default_lng_column() -> String {
    "rawlng".to_string()
}

/// How virtual clients are driven over the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Executor {
    /// Ramp the live client population through a sequence of stages.
    RampingVus { stages: Vec<Stage> },
    /// A fixed pool of clients consumes a shared iteration budget.
    /// Identities are derived from the iteration index (seeding).
    SharedIterations {
        vus: u32,
        iterations: u64,
        #[serde(default)]
        max_duration_secs: Option<u64>,
    },
}

/// One phase of a ramping schedule.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Stage {
    pub duration_secs: u64,
    pub target: u32,
}

/// Relative weights for the operation mix. Normalized at table build time,
/// so `write: 27, point: 1, range: 1, knn: 1` is the 90/3.3/3.3/3.3 mix.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Weights {
    #[serde(default)]
    pub write: f64,
    #[serde(default)]
    pub point: f64,
    #[serde(default)]
    pub range: f64,
    #[serde(default)]
    pub knn: f64,
}

/// Shape of the write payload.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WriteStyle {
    /// `timestamp` as epoch milliseconds; minimal payload.
    #[default]
    EpochMillis,
    /// ISO-8601 `timestamp` plus `speed`/`accuracy` zeros and a
    /// `serviceType` discriminator passed through unmodified.
    Update { service_type: String },
}

impl ScenarioConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ScenarioConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Validate configuration. Runs before any traffic is generated.
    pub fn validate(&self) -> anyhow::Result<()> {
        match &self.executor {
            Executor::RampingVus { stages } => {
                if stages.is_empty() {
                    anyhow::bail!("ramping_vus requires at least one stage");
                }
                if stages.iter().all(|s| s.duration_secs == 0) {
                    anyhow::bail!("ramping_vus schedule has zero total duration");
                }
            }
            Executor::SharedIterations {
                vus, iterations, ..
            } => {
                if *vus == 0 {
                    anyhow::bail!("shared_iterations requires vus > 0");
                }
                if *iterations == 0 {
                    anyhow::bail!("shared_iterations requires iterations > 0");
                }
            }
        }

        let w = &self.weights;
        let total = w.write + w.point + w.range + w.knn;
        if !(total > 0.0) {
            anyhow::bail!("operation weights must sum to a positive value");
        }
        if [w.write, w.point, w.range, w.knn]
            .iter()
            .any(|v| *v < 0.0 || !v.is_finite())
        {
            anyhow::bail!("operation weights must be finite and non-negative");
        }

        if self.request_timeout_secs == 0 {
            anyhow::bail!("request_timeout_secs must be > 0");
        }
        if self.dataset.path.is_empty() {
            anyhow::bail!("dataset.path must be set");
        }
        Ok(())
    }

    /// Highest concurrent client count the executor can reach, used to
    /// size the connection pool and reported with the results.
    pub fn peak_vus(&self) -> u32 {
        match &self.executor {
            Executor::RampingVus { stages } => {
                stages.iter().map(|s| s.target).max().unwrap_or(0)
            }
            Executor::SharedIterations { vus, .. } => *vus,
        }
    }

    /// Total wall-clock budget for the run, used to size the progress bar.
    pub fn duration_hint_secs(&self) -> u64 {
        match &self.executor {
            Executor::RampingVus { stages } => stages.iter().map(|s| s.duration_secs).sum(),
            Executor::SharedIterations {
                max_duration_secs, ..
            } => max_duration_secs.unwrap_or(300),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config(executor: Executor) -> ScenarioConfig {
        ScenarioConfig {
            name: "test".to_string(),
            description: "test".to_string(),
            ingest_url: "http://localhost:8080".to_string(),
            search_url: "http://localhost:8081".to_string(),
            dataset: DatasetConfig {
                path: "data.csv".to_string(),
                lat_column: default_lat_column(),
                lng_column: default_lng_column(),
            },
            executor,
            weights: Weights {
                write: 27.0,
                point: 1.0,
                range: 1.0,
                knn: 1.0,
            },
            write_style: WriteStyle::default(),
            check_label: default_check_label(),
            pacing_ms: 100,
            request_timeout_secs: 30,
            seed: None,
        }
    }

    #[test]
    fn test_valid_ramping_config() {
        let config = base_config(Executor::RampingVus {
            stages: vec![
                Stage {
                    duration_secs: 30,
                    target: 200,
                },
                Stage {
                    duration_secs: 120,
                    target: 200,
                },
                Stage {
                    duration_secs: 30,
                    target: 0,
                },
            ],
        });
        assert!(config.validate().is_ok());
        assert_eq!(config.duration_hint_secs(), 180);
    }

    #[test]
    fn test_empty_stages_rejected() {
        let config = base_config(Executor::RampingVus { stages: vec![] });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_duration_schedule_rejected() {
        let config = base_config(Executor::RampingVus {
            stages: vec![Stage {
                duration_secs: 0,
                target: 10,
            }],
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_iterations_rejected() {
        let config = base_config(Executor::SharedIterations {
            vus: 10,
            iterations: 0,
            max_duration_secs: None,
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_weights_rejected() {
        let mut config = base_config(Executor::SharedIterations {
            vus: 10,
            iterations: 100,
            max_duration_secs: None,
        });
        config.weights = Weights {
            write: 0.0,
            point: 0.0,
            range: 0.0,
            knn: 0.0,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_yaml_round_trip() {
        let yaml = r#"
name: seeding_100k
description: One-time bulk seed
ingest_url: http://localhost:8080
search_url: http://localhost:8081
dataset:
  path: grab_posisi_data.csv
executor:
  type: shared_iterations
  vus: 100
  iterations: 100000
  max_duration_secs: 300
weights:
  write: 1.0
"#;
        let config: ScenarioConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.name, "seeding_100k");
        assert_eq!(config.pacing_ms, 100);
        assert_eq!(config.dataset.lat_column, "rawlat");
        match config.executor {
            Executor::SharedIterations {
                vus, iterations, ..
            } => {
                assert_eq!(vus, 100);
                assert_eq!(iterations, 100_000);
            }
            _ => panic!("expected shared_iterations"),
        }
        assert!(config.validate().is_ok());
    }
}
