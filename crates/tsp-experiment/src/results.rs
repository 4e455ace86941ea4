//! Results collection and output for coordination experiments.
//!
//! Captures metrics like:
//! - Total route distance
//! - Communication overhead (events by kind)
//! - Load balance across agents
//! - Wall-clock time of allocation plus routing

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use coordination_kernel::{AllocationConfig, EvaluationResult};

/// Results from a single experiment run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentResult {
    /// Experiment configuration
    pub config: ExperimentConfig,
    /// Start time
    pub started_at: DateTime<Utc>,
    /// End time
    pub ended_at: DateTime<Utc>,
    /// Everything the evaluator measured
    pub evaluation: EvaluationResult,
}

/// Configuration for an experiment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentConfig {
    /// Unique id of this run
    pub run_id: String,
    /// Scenario name
    pub scenario: String,
    /// Architecture name
    pub architecture: String,
    pub cities: usize,
    pub agents: usize,
    /// Trial number (for repeated experiments)
    pub trial: usize,
    /// Scenario seed used for this trial
    pub seed: u64,
    pub allocation: AllocationConfig,
}

impl ExperimentConfig {
    /// Grouping key for summaries: one per (scenario, architecture).
    pub fn key(&self) -> String {
        format!("{}:{}", self.scenario, self.architecture)
    }
}

/// Aggregate results from a grid experiment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GridResults {
    /// All individual results
    pub results: Vec<ExperimentResult>,
    /// Summary statistics by (scenario, architecture)
    pub summary: BTreeMap<String, ConfigSummary>,
    /// Cross-architecture comparison by scenario
    pub analysis: BTreeMap<String, PerformanceAnalysis>,
}

/// Summary statistics for a configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSummary {
    pub config_key: String,
    pub scenario: String,
    pub architecture: String,
    pub trials: usize,
    pub avg_distance: f64,
    /// Standard error of avg_distance
    pub avg_distance_se: f64,
    /// 95% confidence interval for avg_distance: (lower, upper)
    pub distance_ci: (f64, f64),
    pub min_distance: f64,
    pub max_distance: f64,
    pub avg_elapsed_ms: f64,
    pub avg_messages: f64,
    pub avg_load_variance: f64,
    /// Runs that reported at least one nonconvergence event
    pub nonconverged_runs: usize,
}

/// Best-in-class comparison of architectures on one scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceAnalysis {
    pub best_distance: f64,
    pub best_distance_architecture: String,
    pub fastest_computation_ms: f64,
    pub fastest_architecture: String,
    pub lowest_communication: f64,
    pub lowest_communication_architecture: String,
    pub best_load_balance: f64,
    pub best_load_balance_architecture: String,
    /// Spread between the worst and best average distance
    pub distance_range: f64,
    /// Spread between the slowest and fastest average time
    pub time_range_ms: f64,
}

/// Mean and standard error (sample standard deviation over sqrt(n)).
fn mean_and_se(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let mean = values.iter().sum::<f64>() / n;
    let se = if values.len() > 1 {
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
        variance.sqrt() / n.sqrt()
    } else {
        0.0
    };
    (mean, se)
}

/// Architecture with the lowest `metric`; the first one wins ties.
fn best_by(summaries: &[&ConfigSummary], metric: fn(&ConfigSummary) -> f64) -> (String, f64) {
    let mut best: Option<&ConfigSummary> = None;
    for &summary in summaries {
        if best.map_or(true, |b| metric(summary) < metric(b)) {
            best = Some(summary);
        }
    }
    best.map_or((String::new(), 0.0), |b| (b.architecture.clone(), metric(b)))
}

/// Difference between the largest and smallest `metric`.
fn spread(summaries: &[&ConfigSummary], metric: fn(&ConfigSummary) -> f64) -> f64 {
    let values = summaries.iter().map(|&s| metric(s));
    let max = values.clone().fold(f64::NEG_INFINITY, f64::max);
    let min = values.fold(f64::INFINITY, f64::min);
    if summaries.is_empty() {
        0.0
    } else {
        max - min
    }
}

impl GridResults {
    /// Create a new empty grid results.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a result.
    pub fn add(&mut self, result: ExperimentResult) {
        self.results.push(result);
    }

    /// Compute summary statistics and the per-scenario comparison.
    pub fn compute_summary(&mut self) {
        let mut by_config: BTreeMap<String, Vec<&ExperimentResult>> = BTreeMap::new();
        for result in &self.results {
            by_config.entry(result.config.key()).or_default().push(result);
        }

        self.summary.clear();
        for (key, results) in by_config {
            let trials = results.len();
            let n = trials as f64;

            let distances: Vec<f64> = results.iter().map(|r| r.evaluation.total_distance).collect();
            let (avg_distance, avg_distance_se) = mean_and_se(&distances);

            // 95% CI: mean ± 1.96 * SE
            let z = 1.96;
            let distance_ci = (
                avg_distance - z * avg_distance_se,
                avg_distance + z * avg_distance_se,
            );

            let min_distance = distances.iter().copied().fold(f64::INFINITY, f64::min);
            let max_distance = distances.iter().copied().fold(f64::NEG_INFINITY, f64::max);

            let avg_elapsed_ms = results.iter().map(|r| r.evaluation.elapsed_ms).sum::<f64>() / n;
            let avg_messages =
                results.iter().map(|r| r.evaluation.total_messages as f64).sum::<f64>() / n;
            let avg_load_variance =
                results.iter().map(|r| r.evaluation.load_variance).sum::<f64>() / n;
            let nonconverged_runs = results
                .iter()
                .filter(|r| !r.evaluation.nonconvergence.is_empty())
                .count();

            self.summary.insert(
                key.clone(),
                ConfigSummary {
                    config_key: key,
                    scenario: results[0].config.scenario.clone(),
                    architecture: results[0].config.architecture.clone(),
                    trials,
                    avg_distance,
                    avg_distance_se,
                    distance_ci,
                    min_distance,
                    max_distance,
                    avg_elapsed_ms,
                    avg_messages,
                    avg_load_variance,
                    nonconverged_runs,
                },
            );
        }

        self.analysis = self.compare_architectures();
    }

    /// Compare the architectures' averages within each scenario.
    fn compare_architectures(&self) -> BTreeMap<String, PerformanceAnalysis> {
        let mut by_scenario: BTreeMap<&str, Vec<&ConfigSummary>> = BTreeMap::new();
        for summary in self.summary.values() {
            by_scenario.entry(&summary.scenario).or_default().push(summary);
        }

        by_scenario
            .into_iter()
            .map(|(scenario, summaries)| {
                let (distance_arch, best_distance) = best_by(&summaries, |s| s.avg_distance);
                let (fastest_arch, fastest) = best_by(&summaries, |s| s.avg_elapsed_ms);
                let (quiet_arch, lowest_communication) = best_by(&summaries, |s| s.avg_messages);
                let (balanced_arch, best_balance) =
                    best_by(&summaries, |s| s.avg_load_variance);

                (
                    scenario.to_string(),
                    PerformanceAnalysis {
                        best_distance,
                        best_distance_architecture: distance_arch,
                        fastest_computation_ms: fastest,
                        fastest_architecture: fastest_arch,
                        lowest_communication,
                        lowest_communication_architecture: quiet_arch,
                        best_load_balance: best_balance,
                        best_load_balance_architecture: balanced_arch,
                        distance_range: spread(&summaries, |s| s.avg_distance),
                        time_range_ms: spread(&summaries, |s| s.avg_elapsed_ms),
                    },
                )
            })
            .collect()
    }

    /// Save results to a JSON file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load results from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let results = serde_json::from_str(&json)?;
        Ok(results)
    }
}

/// Format a duration in milliseconds for display.
pub fn format_duration(ms: f64) -> String {
    if ms < 1.0 {
        format!("{:.0}µs", ms * 1000.0)
    } else if ms < 1000.0 {
        format!("{:.1}ms", ms)
    } else if ms < 60_000.0 {
        format!("{:.1}s", ms / 1000.0)
    } else {
        format!("{:.1}m", ms / 60_000.0)
    }
}
