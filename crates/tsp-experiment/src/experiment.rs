//! Experiment runner for multi-agent TSP coordination experiments.
//!
//! Orchestrates the experiment lifecycle:
//! 1. Generate the scenario for the trial
//! 2. Run the chosen architecture through the evaluator
//! 3. Collect metrics and results
//!
//! Grid runs fan independent runs out over tokio's blocking pool; the
//! allocators themselves are synchronous.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use futures::future::join_all;
use tokio::task;
use tracing::{debug, info};
use uuid::Uuid;

use coordination_kernel::{evaluate, AllocationConfig, Architecture};

use crate::generator::{Preset, ScenarioConfig, ScenarioGenerator};
use crate::results::{ExperimentConfig, ExperimentResult, GridResults};

/// Configuration for the experiment runner.
#[derive(Debug, Clone)]
pub struct ExperimentRunnerConfig {
    /// Allocation settings shared by every run
    pub allocation: AllocationConfig,
    /// Scenarios in the grid
    pub scenarios: Vec<ScenarioConfig>,
    /// Architectures in the grid
    pub architectures: Vec<Architecture>,
    /// Trials per (scenario, architecture)
    pub trials: usize,
}

impl Default for ExperimentRunnerConfig {
    fn default() -> Self {
        Self {
            allocation: AllocationConfig::default(),
            scenarios: Preset::all().into_iter().map(Preset::config).collect(),
            architectures: Architecture::all(),
            trials: 1,
        }
    }
}

/// Load an [`AllocationConfig`] from a JSON file. Missing fields keep their defaults.
pub fn load_allocation_config(path: impl AsRef<Path>) -> Result<AllocationConfig> {
    let path = path.as_ref();
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("reading config file {}", path.display()))?;
    let config: AllocationConfig = serde_json::from_str(&json)
        .with_context(|| format!("parsing config file {}", path.display()))?;
    config.validate()?;
    Ok(config)
}

/// The experiment runner.
#[derive(Debug, Clone)]
pub struct ExperimentRunner {
    config: ExperimentRunnerConfig,
}

impl ExperimentRunner {
    /// Create a new experiment runner.
    pub fn new(config: ExperimentRunnerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExperimentRunnerConfig {
        &self.config
    }

    /// Run a single experiment.
    pub fn run(
        &self,
        scenario: &ScenarioConfig,
        architecture: Architecture,
        trial: usize,
    ) -> Result<ExperimentResult> {
        let started_at = Utc::now();
        let scenario_config = scenario.for_trial(trial);
        let generated = ScenarioGenerator::new(scenario_config.clone()).generate()?;

        info!(
            scenario = %scenario_config.name,
            architecture = architecture.name(),
            trial = trial,
            cities = generated.cities.len(),
            agents = generated.starts.len(),
            "Starting experiment"
        );

        let evaluation = evaluate::run(
            architecture,
            &generated.cities,
            &generated.starts,
            &self.config.allocation,
        )
        .with_context(|| {
            format!(
                "{} failed on scenario {} (trial {})",
                architecture, scenario_config.name, trial
            )
        })?;

        debug!(
            total_distance = evaluation.total_distance,
            messages = evaluation.total_messages,
            load_variance = evaluation.load_variance,
            "Experiment finished"
        );

        Ok(ExperimentResult {
            config: ExperimentConfig {
                run_id: Uuid::new_v4().to_string(),
                scenario: scenario_config.name.clone(),
                architecture: architecture.name().to_string(),
                cities: scenario_config.cities,
                agents: scenario_config.agents,
                trial,
                seed: scenario_config.seed,
                allocation: self.config.allocation.clone(),
            },
            started_at,
            ended_at: Utc::now(),
            evaluation,
        })
    }

    /// Run every (scenario, architecture, trial) combination concurrently.
    ///
    /// Results come back in grid order regardless of completion order.
    pub async fn run_grid(&self) -> Result<GridResults> {
        let mut jobs = Vec::new();
        for scenario in &self.config.scenarios {
            for &architecture in &self.config.architectures {
                for trial in 0..self.config.trials {
                    jobs.push((scenario.clone(), architecture, trial));
                }
            }
        }

        let total = jobs.len();
        info!(
            scenarios = self.config.scenarios.len(),
            architectures = self.config.architectures.len(),
            trials = self.config.trials,
            runs = total,
            "Starting grid experiment"
        );

        let handles = jobs.into_iter().map(|(scenario, architecture, trial)| {
            let runner = self.clone();
            task::spawn_blocking(move || runner.run(&scenario, architecture, trial))
        });

        let mut results = GridResults::new();
        for (completed, outcome) in join_all(handles).await.into_iter().enumerate() {
            let result = outcome.context("experiment task panicked")??;
            info!(
                progress = format!("{}/{}", completed + 1, total),
                scenario = %result.config.scenario,
                architecture = %result.config.architecture,
                trial = result.config.trial,
                total_distance = result.evaluation.total_distance,
                "Completed run"
            );
            results.add(result);
        }

        results.compute_summary();
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_records_configuration() {
        let runner = ExperimentRunner::new(ExperimentRunnerConfig::default());
        let scenario = Preset::SmallClustered.config();
        let result = runner.run(&scenario, Architecture::Flat, 2).unwrap();

        assert_eq!(result.config.scenario, "small_clustered");
        assert_eq!(result.config.architecture, "flat");
        assert_eq!(result.config.trial, 2);
        assert_eq!(result.config.seed, 44);
        assert_eq!(result.evaluation.loads.iter().sum::<usize>(), 8);
        assert!(result.ended_at >= result.started_at);
    }

    #[test]
    fn test_runs_are_reproducible() {
        let runner = ExperimentRunner::new(ExperimentRunnerConfig::default());
        let scenario = Preset::MediumMixed.config();
        let a = runner.run(&scenario, Architecture::Auction, 0).unwrap();
        let b = runner.run(&scenario, Architecture::Auction, 0).unwrap();
        assert_eq!(a.evaluation.routes, b.evaluation.routes);
        assert_ne!(a.config.run_id, b.config.run_id);
    }

    #[test]
    fn test_load_allocation_config_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"agent_budget": 250.0, "auction_strategy": "batch"}"#).unwrap();

        let config = load_allocation_config(&path).unwrap();
        assert_eq!(config.agent_budget, 250.0);
        assert_eq!(config.auction_strategy, coordination_kernel::AuctionStrategy::Batch);
        assert_eq!(config.max_negotiation_rounds, 3);
    }

    #[test]
    fn test_load_allocation_config_rejects_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"claims_per_round": 0}"#).unwrap();
        assert!(load_allocation_config(&path).is_err());
    }
}
