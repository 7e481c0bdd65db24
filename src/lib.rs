//! Load generation for the geo location-tracking and search services.
//!
//! This crate provides tools to:
//! - Replay a weighted mix of write / point / range / knn operations
//!   sampled from a shared coordinate dataset
//! - Ramp virtual client populations up and down over defined stages, or
//!   drain a fixed iteration budget for one-time seeding
//! - Record pass/fail outcomes per named check with latency percentiles
//! - Output results in multiple formats (console, JSON, CSV)

pub mod config;
pub mod dataset;
pub mod generator;
pub mod identity;
pub mod metrics;
pub mod report;
pub mod runner;
pub mod scheduler;

pub use config::{DatasetConfig, Executor, ScenarioConfig, Stage, Weights, WriteStyle};
pub use dataset::{Dataset, GeoRecord};
pub use generator::{Operation, OperationGenerator, OperationKind, WeightTable};
pub use metrics::{MetricsCollector, RunResults};
pub use report::ResultsReport;
pub use runner::{CallOutcome, LoadRunner, RequestExecutor};
pub use scheduler::{IterationCounter, RampPhase, RampSchedule};
