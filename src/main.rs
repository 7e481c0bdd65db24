//! Load test CLI for the geo location-tracking and search services.

use clap::{Parser, Subcommand};
use geoload::{
    config::{DatasetConfig, Executor, ScenarioConfig, Stage, Weights, WriteStyle},
    LoadRunner, ResultsReport, RunResults,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "geoload")]
#[command(about = "Load testing tool for the geo location and search services", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a load test from a scenario file
    Run {
        /// Path to scenario YAML file
        #[arg(short, long)]
        scenario: PathBuf,

        /// Override the virtual client count (stage targets or pool size)
        #[arg(short, long)]
        vus: Option<u32>,

        /// Override the wall-clock cap of a shared-iterations run
        #[arg(short, long)]
        duration_secs: Option<u64>,

        /// Output format: table (default), json, csv
        #[arg(short, long, default_value = "table")]
        output: String,
    },

    /// Run a one-time seeding pass from a shared-iterations scenario
    Seed {
        /// Path to scenario YAML file
        #[arg(short, long)]
        scenario: PathBuf,

        /// Override the total iteration budget
        #[arg(short, long)]
        iterations: Option<u64>,

        /// Override the worker pool size
        #[arg(short, long)]
        vus: Option<u32>,

        /// Output format: table (default), json, csv
        #[arg(short, long, default_value = "table")]
        output: String,
    },

    /// Run a quick smoke test against local services
    Quick {
        /// Ingest service base URL
        #[arg(long, default_value = "http://localhost:8080")]
        ingest_url: String,

        /// Search service base URL
        #[arg(long, default_value = "http://localhost:8081")]
        search_url: String,

        /// Path to the coordinate dataset CSV
        #[arg(long, default_value = "grab_posisi_data.csv")]
        dataset: String,
    },

    /// List available scenarios
    List {
        /// Scenarios directory
        #[arg(short, long, default_value = "scenarios")]
        dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            scenario,
            vus,
            duration_secs,
            output,
        } => {
            println!("Loading scenario: {}", scenario.display());
            let mut config = ScenarioConfig::from_file(&scenario)?;
            apply_vus_override(&mut config, vus);
            if let Some(d) = duration_secs {
                match &mut config.executor {
                    Executor::SharedIterations {
                        max_duration_secs, ..
                    } => *max_duration_secs = Some(d),
                    Executor::RampingVus { .. } => {
                        eprintln!("Note: --duration-secs ignored for a ramping schedule");
                    }
                }
            }
            config.validate()?;

            print_preamble(&config);
            let runner = LoadRunner::new(config)?;
            let results = runner.run().await?;
            print_results(&results, &output)?;
            Ok(())
        }
        Commands::Seed {
            scenario,
            iterations,
            vus,
            output,
        } => {
            println!("Loading seeding scenario: {}", scenario.display());
            let mut config = ScenarioConfig::from_file(&scenario)?;
            match &mut config.executor {
                Executor::SharedIterations {
                    vus: pool,
                    iterations: budget,
                    ..
                } => {
                    if let Some(n) = iterations {
                        *budget = n;
                    }
                    if let Some(v) = vus {
                        *pool = v;
                    }
                }
                Executor::RampingVus { .. } => {
                    anyhow::bail!(
                        "seed requires a shared_iterations scenario; '{}' uses ramping_vus",
                        config.name
                    );
                }
            }
            config.validate()?;

            print_preamble(&config);
            let runner = LoadRunner::new(config)?;
            let results = runner.run().await?;
            print_results(&results, &output)?;
            Ok(())
        }
        Commands::Quick {
            ingest_url,
            search_url,
            dataset,
        } => {
            println!("Running quick smoke test against {}", ingest_url);

            let config = ScenarioConfig {
                name: "quick".to_string(),
                description: "Quick smoke test".to_string(),
                ingest_url,
                search_url,
                dataset: DatasetConfig {
                    path: dataset,
                    lat_column: "rawlat".to_string(),
                    lng_column: "rawlng".to_string(),
                },
                executor: Executor::RampingVus {
                    stages: vec![Stage {
                        duration_secs: 10,
                        target: 5,
                    }],
                },
                weights: Weights {
                    write: 27.0,
                    point: 1.0,
                    range: 1.0,
                    knn: 1.0,
                },
                write_style: WriteStyle::EpochMillis,
                check_label: "Quick".to_string(),
                pacing_ms: 100,
                request_timeout_secs: 10,
                seed: None,
            };
            config.validate()?;

            let runner = LoadRunner::new(config)?;
            let results = runner.run().await?;
            println!("{}", ResultsReport::format_table(&results));
            Ok(())
        }
        Commands::List { dir } => {
            println!("Available scenarios in {}:", dir.display());
            println!();

            match std::fs::read_dir(&dir) {
                Ok(entries) => {
                    let mut scenarios = Vec::new();

                    for entry in entries.flatten() {
                        let path = entry.path();
                        if path.extension().and_then(|s| s.to_str()) == Some("yaml") {
                            if let Ok(config) = ScenarioConfig::from_file(&path) {
                                scenarios.push((
                                    path.file_name()
                                        .map(|n| n.to_string_lossy().to_string())
                                        .unwrap_or_default(),
                                    config.name,
                                    config.description,
                                ));
                            }
                        }
                    }

                    scenarios.sort_by(|a, b| a.0.cmp(&b.0));

                    if scenarios.is_empty() {
                        println!("No scenario files found");
                    } else {
                        for (filename, name, desc) in scenarios {
                            println!("  {} - {}", filename, name);
                            println!("    {}", desc);
                            println!();
                        }
                    }
                }
                Err(e) => {
                    eprintln!("Error reading directory: {}", e);
                    eprintln!("Make sure the directory exists and is readable");
                }
            }

            Ok(())
        }
    }
}

fn apply_vus_override(config: &mut ScenarioConfig, vus: Option<u32>) {
    let Some(v) = vus else { return };
    match &mut config.executor {
        Executor::RampingVus { stages } => {
            // Keep drain-to-zero stages at zero; rescale the rest.
            for stage in stages.iter_mut() {
                if stage.target > 0 {
                    stage.target = v;
                }
            }
        }
        Executor::SharedIterations { vus: pool, .. } => *pool = v,
    }
}

fn print_preamble(config: &ScenarioConfig) {
    println!("✓ Configuration loaded successfully");
    println!("  Name: {}", config.name);
    println!("  Description: {}", config.description);
    println!("  Ingest: {}", config.ingest_url);
    println!("  Search: {}", config.search_url);
    println!("  Duration budget: {}s", config.duration_hint_secs());
    println!("  Peak VUs: {}", config.peak_vus());
    println!();
}

fn print_results(results: &RunResults, output: &str) -> anyhow::Result<()> {
    match output {
        "json" => println!("{}", ResultsReport::format_json(results)?),
        "csv" => {
            println!("{}", ResultsReport::csv_header());
            println!("{}", ResultsReport::format_csv(results));
        }
        _ => println!("{}", ResultsReport::format_table(results)),
    }
    Ok(())
}
