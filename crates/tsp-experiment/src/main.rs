//! TSP Coordination Experiment CLI.
//!
//! Commands:
//! - single: Run one architecture on one scenario
//! - grid: Run full grid experiment (scenarios × architectures × trials)
//! - generate: Generate and display a scenario

use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::Local;
use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use coordination_kernel::{AllocationConfig, AllocationDetails, Architecture};
use tsp_experiment::experiment::{load_allocation_config, ExperimentRunner, ExperimentRunnerConfig};
use tsp_experiment::generator::{Preset, ScenarioConfig, ScenarioGenerator};
use tsp_experiment::results::format_duration;

/// Generate a timestamped output path from the given path.
/// e.g., "results.json" -> "results-20260108-010530.json"
fn timestamped_path(path: &Path) -> PathBuf {
    let timestamp = Local::now().format("%Y%m%d-%H%M%S");
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("results");
    let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("json");
    let parent = path.parent().unwrap_or(Path::new("."));
    parent.join(format!("{}-{}.{}", stem, timestamp, ext))
}

#[derive(Parser)]
#[command(name = "tsp-experiment")]
#[command(version)]
#[command(about = "Multi-agent TSP coordination experiments")]
struct Cli {
    /// JSON file with allocation settings; missing fields use defaults
    #[arg(long, env = "TSP_EXPERIMENT_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single experiment
    Single {
        /// Architecture to use: hierarchical, flat or auction
        #[arg(long, default_value = "hierarchical")]
        architecture: String,

        /// Scenario preset
        #[arg(long, default_value = "small_clustered")]
        scenario: String,

        /// Override the preset's city count
        #[arg(long)]
        cities: Option<usize>,

        /// Override the preset's agent count
        #[arg(long)]
        agents: Option<usize>,

        /// Override the preset's seed
        #[arg(long)]
        seed: Option<u64>,

        /// Trial number (shifts the seed)
        #[arg(long, default_value = "0")]
        trial: usize,
    },

    /// Run grid experiment
    Grid {
        /// Number of trials per configuration
        #[arg(long, default_value = "5")]
        trials: usize,

        /// Output file for results
        #[arg(long, default_value = "results.json")]
        output: PathBuf,

        /// Scenario presets to test (comma-separated). Default: all
        #[arg(long, value_delimiter = ',')]
        scenarios: Option<Vec<String>>,

        /// Architectures to test (comma-separated). Default: all
        #[arg(long, value_delimiter = ',')]
        architectures: Option<Vec<String>>,
    },

    /// Generate and display a scenario
    Generate {
        /// Scenario preset
        #[arg(long, default_value = "small_clustered")]
        scenario: String,

        /// Override the preset's city count
        #[arg(long)]
        cities: Option<usize>,

        /// Override the preset's agent count
        #[arg(long)]
        agents: Option<usize>,

        /// Override the preset's seed
        #[arg(long)]
        seed: Option<u64>,
    },
}

/// Preset config with command-line overrides applied.
fn scenario_config(
    preset: &str,
    cities: Option<usize>,
    agents: Option<usize>,
    seed: Option<u64>,
) -> Result<ScenarioConfig> {
    let mut config = preset.parse::<Preset>()?.config();
    if cities.is_some() || agents.is_some() || seed.is_some() {
        config.name = format!("{}_custom", config.name);
    }
    config.cities = cities.unwrap_or(config.cities);
    config.agents = agents.unwrap_or(config.agents);
    config.seed = seed.unwrap_or(config.seed);
    Ok(config)
}

fn parse_architecture(s: &str) -> Result<Architecture> {
    s.parse::<Architecture>().map_err(anyhow::Error::msg)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .init();

    let allocation = match &cli.config {
        Some(path) => load_allocation_config(path)?,
        None => AllocationConfig::default(),
    };

    match cli.command {
        Commands::Single {
            architecture,
            scenario,
            cities,
            agents,
            seed,
            trial,
        } => {
            let architecture = parse_architecture(&architecture)?;
            let scenario = scenario_config(&scenario, cities, agents, seed)?;

            let runner = ExperimentRunner::new(ExperimentRunnerConfig {
                allocation,
                ..Default::default()
            });
            let result = runner.run(&scenario, architecture, trial)?;
            let evaluation = &result.evaluation;

            println!("\n=== Experiment Result ===");
            println!("Architecture: {}", result.config.architecture);
            println!(
                "Scenario: {} ({} cities, {} agents, seed {})",
                result.config.scenario, result.config.cities, result.config.agents, result.config.seed
            );
            println!("Total distance: {:.2}", evaluation.total_distance);
            println!("Time: {}", format_duration(evaluation.elapsed_ms));
            println!(
                "Loads: {:?} (variance {:.2}, fairness {:.3})",
                evaluation.loads, evaluation.load_variance, evaluation.load_fairness
            );

            println!("\nRoutes:");
            for route in &evaluation.routes {
                let ids: Vec<String> = route.cities.iter().map(|c| c.0.to_string()).collect();
                println!(
                    "  {}: [{}] length {:.2} (nearest neighbour {:.2}, {} passes)",
                    route.agent,
                    ids.join(", "),
                    route.length,
                    route.nearest_neighbor_length,
                    route.twoopt_passes
                );
            }

            println!("\nMessages: {}", evaluation.total_messages);
            for (kind, count) in &evaluation.message_counts {
                println!("  {:?}: {}", kind, count);
            }

            match &evaluation.details {
                AllocationDetails::Hierarchical(summary) => {
                    println!("\nClustering:");
                    println!(
                        "  k-means iterations: {} (converged: {})",
                        summary.kmeans_iterations, summary.kmeans_converged
                    );
                    println!("  Inertia: {:.2}", summary.inertia);
                    println!("  Empty clusters: {}", summary.empty_clusters);
                }
                AllocationDetails::Flat(summary) => {
                    println!("\nNegotiation:");
                    println!("  Rounds: {}/{}", summary.rounds_used, summary.max_rounds);
                    println!("  Conflicts resolved: {}", summary.conflicts_resolved);
                    println!(
                        "  Cities assigned by fallback: {}",
                        summary.unresolved_before_fallback
                    );
                }
                AllocationDetails::Auction(summary) => {
                    println!("\nAuction ({:?}):", summary.strategy);
                    println!("  Revenue: {:.2}", summary.revenue);
                    println!("  Winning bids: {}", summary.winning_bids.len());
                    println!("  Fallback cities: {}", summary.fallback_cities.len());
                }
            }

            if !evaluation.nonconvergence.is_empty() {
                println!("\nNonconvergence:");
                for event in &evaluation.nonconvergence {
                    println!("  {:?}", event);
                }
            }
        }

        Commands::Grid {
            trials,
            output,
            scenarios,
            architectures,
        } => {
            let scenarios = match scenarios {
                Some(names) => names
                    .iter()
                    .map(|s| s.parse::<Preset>().map(Preset::config))
                    .collect::<Result<Vec<_>>>()?,
                None => Preset::all().into_iter().map(Preset::config).collect(),
            };
            let architectures = match architectures {
                Some(names) => names
                    .iter()
                    .map(|s| parse_architecture(s))
                    .collect::<Result<Vec<_>>>()?,
                None => Architecture::all(),
            };

            info!(trials = trials, output = %output.display(), "Starting grid experiment");

            let runner = ExperimentRunner::new(ExperimentRunnerConfig {
                allocation,
                scenarios,
                architectures,
                trials,
            });
            let results = runner.run_grid().await?;

            let output_path = timestamped_path(&output);
            results.save(&output_path)?;

            println!("\n=== Grid Experiment Complete ===");
            println!("Results saved to: {}", output_path.display());
            println!("\nSummary:");
            for (key, summary) in &results.summary {
                println!(
                    "  {}: distance={:.2}±{:.2}, messages={:.1}, load_variance={:.2}, time={}",
                    key,
                    summary.avg_distance,
                    summary.avg_distance_se,
                    summary.avg_messages,
                    summary.avg_load_variance,
                    format_duration(summary.avg_elapsed_ms)
                );
            }
            println!("\nBest per scenario:");
            for (scenario, analysis) in &results.analysis {
                println!(
                    "  {}: distance={} ({:.2}), fastest={}, quietest={}, most balanced={}",
                    scenario,
                    analysis.best_distance_architecture,
                    analysis.best_distance,
                    analysis.fastest_architecture,
                    analysis.lowest_communication_architecture,
                    analysis.best_load_balance_architecture
                );
            }
        }

        Commands::Generate {
            scenario,
            cities,
            agents,
            seed,
        } => {
            let config = scenario_config(&scenario, cities, agents, seed)?;
            let scenario = ScenarioGenerator::new(config).generate()?;
            println!("{}", scenario);
        }
    }

    Ok(())
}
