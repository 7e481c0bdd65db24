//! Request execution and load run orchestration.

use crate::config::{Executor, ScenarioConfig};
use crate::dataset::Dataset;
use crate::generator::{OperationGenerator, PreparedRequest};
use crate::identity;
use crate::metrics::{MetricsCollector, RunResults};
use crate::scheduler::{IterationCounter, RampPhase, RampSchedule};
use indicatif::{ProgressBar, ProgressStyle};
use rand::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::sleep;

/// Result of a single call, recorded whether it passed or not.
#[derive(Debug)]
pub struct CallOutcome {
    pub check: String,
    pub passed: bool,
    pub status: u16,
    pub latency_us: u64,
    /// Set only for transport-level failures (no HTTP response at all).
    pub error: Option<String>,
}

/// Issues one HTTP call per operation and classifies the result.
#[derive(Clone)]
pub struct RequestExecutor {
    client: reqwest::Client,
}

impl RequestExecutor {
    pub fn new(timeout: Duration, pool_size: usize) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(pool_size)
            .build()?;
        Ok(Self { client })
    }

    /// Execute one prepared request. Success is strictly HTTP 200; any
    /// other status or a transport failure is a failed outcome, never an
    /// error. No internal retries.
    pub async fn execute(&self, request: &PreparedRequest) -> CallOutcome {
        let start = Instant::now();
        let response = self
            .client
            .post(&request.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .json(&request.body)
            .send()
            .await;

        match response {
            Ok(response) => {
                let status = response.status().as_u16();
                // Drain the body so the connection can be reused.
                let _ = response.bytes().await;
                CallOutcome {
                    check: request.check.clone(),
                    passed: status == 200,
                    status,
                    latency_us: start.elapsed().as_micros() as u64,
                    error: None,
                }
            }
            Err(e) => CallOutcome {
                check: request.check.clone(),
                passed: false,
                status: 0,
                latency_us: start.elapsed().as_micros() as u64,
                error: Some(e.to_string()),
            },
        }
    }
}

/// One live virtual client: its stop flag and the task driving its loop.
struct VirtualClient {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// Drives a full scenario: dataset load, client scheduling, aggregation.
pub struct LoadRunner {
    config: ScenarioConfig,
    executor: RequestExecutor,
}

impl LoadRunner {
    pub fn new(config: ScenarioConfig) -> anyhow::Result<Self> {
        let executor = RequestExecutor::new(
            Duration::from_secs(config.request_timeout_secs),
            config.peak_vus() as usize,
        )?;
        Ok(Self { config, executor })
    }

    /// Run the scenario to completion and return aggregated results.
    pub async fn run(&self) -> anyhow::Result<RunResults> {
        let dataset = Arc::new(Dataset::load(
            &self.config.dataset.path,
            &self.config.dataset.lat_column,
            &self.config.dataset.lng_column,
        )?);
        println!(
            "Loaded dataset: {} records from {}",
            dataset.len(),
            self.config.dataset.path
        );
        if dataset.skipped_rows() > 0 {
            eprintln!(
                "Warning: excluded {} malformed dataset row(s)",
                dataset.skipped_rows()
            );
        }

        let generator = Arc::new(OperationGenerator::new(
            &self.config.weights,
            self.config.write_style.clone(),
            self.config.check_label.clone(),
            self.config.ingest_url.clone(),
            self.config.search_url.clone(),
        )?);

        let metrics = Arc::new(Mutex::new(MetricsCollector::new()));
        let pacing = Duration::from_millis(self.config.pacing_ms);

        println!("Starting scenario: {}", self.config.name);
        match &self.config.executor {
            Executor::RampingVus { stages } => {
                let schedule = RampSchedule::new(stages.clone())?;
                println!(
                    "  Executor: ramping_vus ({} stages, {}s total, peak {})",
                    stages.len(),
                    schedule.total_duration().as_secs(),
                    self.config.peak_vus()
                );
                self.run_ramping(schedule, dataset, generator, metrics.clone(), pacing)
                    .await?;
            }
            Executor::SharedIterations {
                vus,
                iterations,
                max_duration_secs,
            } => {
                println!(
                    "  Executor: shared_iterations ({} VUs, {} iterations)",
                    vus, iterations
                );
                self.run_shared_iterations(
                    *vus,
                    *iterations,
                    max_duration_secs.map(Duration::from_secs),
                    dataset,
                    generator,
                    metrics.clone(),
                    pacing,
                )
                .await?;
            }
        }

        let m = metrics.lock().await;
        Ok(m.results(self.config.name.clone(), self.config.peak_vus()))
    }

    /// Ramping executor: a control loop ticks against the schedule,
    /// spawning new clients and retiring surplus ones. Retired and drained
    /// clients finish their in-flight iteration but start no new ones.
    async fn run_ramping(
        &self,
        schedule: RampSchedule,
        dataset: Arc<Dataset>,
        generator: Arc<OperationGenerator>,
        metrics: Arc<Mutex<MetricsCollector>>,
        pacing: Duration,
    ) -> anyhow::Result<()> {
        let total_secs = schedule.total_duration().as_secs();
        let pb = progress_bar(total_secs, "{pos}/{len}s");

        let mut clients: Vec<VirtualClient> = Vec::new();
        let mut retired: Vec<JoinHandle<()>> = Vec::new();
        let mut next_client_seed = 0u64;

        let start = Instant::now();
        let mut ticker = tokio::time::interval(Duration::from_millis(250));
        loop {
            ticker.tick().await;
            let elapsed = start.elapsed();
            if elapsed >= schedule.total_duration() {
                break;
            }

            let desired = schedule.target_at(elapsed) as usize;
            while clients.len() < desired {
                clients.push(self.spawn_client(
                    dataset.clone(),
                    generator.clone(),
                    metrics.clone(),
                    pacing,
                    next_client_seed,
                ));
                next_client_seed += 1;
            }
            while clients.len() > desired {
                if let Some(client) = clients.pop() {
                    client.stop.store(true, Ordering::Relaxed);
                    retired.push(client.handle);
                }
            }

            maybe_warn_unreachable(&metrics).await;

            pb.set_position(elapsed.as_secs());
            pb.set_message(format!(
                "{} ({} clients)",
                phase_label(schedule.phase_at(elapsed)),
                clients.len()
            ));
        }

        pb.set_message("Draining in-flight iterations...");
        for client in &clients {
            client.stop.store(true, Ordering::Relaxed);
        }
        for client in clients {
            let _ = client.handle.await;
        }
        for handle in retired {
            let _ = handle.await;
        }
        pb.finish_with_message("Complete");
        println!();
        Ok(())
    }

    fn spawn_client(
        &self,
        dataset: Arc<Dataset>,
        generator: Arc<OperationGenerator>,
        metrics: Arc<Mutex<MetricsCollector>>,
        pacing: Duration,
        client_seed: u64,
    ) -> VirtualClient {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();
        let executor = self.executor.clone();
        let mut rng = client_rng(self.config.seed, client_seed);

        let handle = tokio::spawn(async move {
            while !stop_flag.load(Ordering::Relaxed) {
                let record = dataset.sample(&mut rng);
                let user_id = identity::steady_state_id(&mut rng);
                let operation = generator.next_operation(&mut rng, record, user_id);
                let request = generator.prepare(&operation);
                let outcome = executor.execute(&request).await;
                record_outcome(&metrics, outcome).await;

                if stop_flag.load(Ordering::Relaxed) {
                    break;
                }
                sleep(pacing).await;
            }
        });

        VirtualClient { stop, handle }
    }

    /// Shared-iterations executor: a fixed worker pool drains one atomic
    /// iteration budget, deriving the seeded identity from each claimed
    /// index. Stops early if the wall-clock cap elapses.
    #[allow(clippy::too_many_arguments)]
    async fn run_shared_iterations(
        &self,
        vus: u32,
        iterations: u64,
        max_duration: Option<Duration>,
        dataset: Arc<Dataset>,
        generator: Arc<OperationGenerator>,
        metrics: Arc<Mutex<MetricsCollector>>,
        pacing: Duration,
    ) -> anyhow::Result<()> {
        let counter = Arc::new(IterationCounter::new(iterations));
        let pb = progress_bar(iterations, "{pos}/{len} iterations");

        let start = Instant::now();
        let deadline = max_duration.map(|d| start + d);

        let mut handles = Vec::with_capacity(vus as usize);
        for worker in 0..vus {
            let dataset = dataset.clone();
            let generator = generator.clone();
            let metrics = metrics.clone();
            let counter = counter.clone();
            let executor = self.executor.clone();
            let mut rng = client_rng(self.config.seed, worker as u64);

            handles.push(tokio::spawn(async move {
                while let Some(iteration) = counter.claim() {
                    if deadline.is_some_and(|d| Instant::now() >= d) {
                        break;
                    }
                    let record = dataset.sample(&mut rng);
                    let user_id = identity::seeded_id(iteration);
                    let operation = generator.next_operation(&mut rng, record, user_id);
                    let request = generator.prepare(&operation);
                    let outcome = executor.execute(&request).await;
                    record_outcome(&metrics, outcome).await;

                    if !pacing.is_zero() {
                        sleep(pacing).await;
                    }
                }
            }));
        }

        loop {
            sleep(Duration::from_millis(200)).await;
            pb.set_position(counter.claimed());
            maybe_warn_unreachable(&metrics).await;
            if handles.iter().all(|h| h.is_finished()) {
                break;
            }
        }
        for handle in handles {
            let _ = handle.await;
        }

        pb.finish_with_message("Complete");
        println!();
        Ok(())
    }
}

/// Per-client RNG: derived from the scenario seed for reproducible runs,
/// otherwise from entropy.
fn client_rng(base_seed: Option<u64>, client_index: u64) -> StdRng {
    match base_seed {
        Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(client_index)),
        None => StdRng::from_entropy(),
    }
}

async fn record_outcome(metrics: &Mutex<MetricsCollector>, outcome: CallOutcome) {
    let mut m = metrics.lock().await;
    if outcome.passed {
        m.record_pass(&outcome.check, outcome.latency_us);
    } else {
        m.record_fail(&outcome.check, outcome.latency_us, outcome.error.is_some());
    }
}

async fn maybe_warn_unreachable(metrics: &Mutex<MetricsCollector>) {
    let mut m = metrics.lock().await;
    if m.take_unreachable_warning() {
        eprintln!(
            "Warning: sustained transport failures; target host may be unreachable, continuing"
        );
    }
}

fn progress_bar(len: u64, pos_template: &str) -> ProgressBar {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(&format!(
                "[{{elapsed_precise}}] {{bar:40.cyan/blue}} {} {{msg}}",
                pos_template
            ))
            .expect("Invalid progress bar template")
            .progress_chars("##-"),
    );
    pb
}

fn phase_label(phase: RampPhase) -> &'static str {
    match phase {
        RampPhase::RampingUp => "Ramping up",
        RampPhase::Holding => "Holding",
        RampPhase::RampingDown => "Ramping down",
        RampPhase::Drained => "Drained",
    }
}
