//! Integration tests for grid runs across all architectures.
//!
//! Tests the full flow of:
//! - Scenario generation for every (scenario, architecture, trial)
//! - Concurrent evaluation on the blocking pool
//! - Summaries, the per-scenario comparison and JSON persistence

use coordination_kernel::{AllocationConfig, Architecture, AuctionStrategy};
use tsp_experiment::experiment::{ExperimentRunner, ExperimentRunnerConfig};
use tsp_experiment::generator::Preset;
use tsp_experiment::results::GridResults;

fn small_grid(trials: usize) -> ExperimentRunnerConfig {
    ExperimentRunnerConfig {
        scenarios: vec![Preset::SmallClustered.config(), Preset::MediumRandom.config()],
        trials,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_grid_covers_every_combination() {
    let results = ExperimentRunner::new(small_grid(2)).run_grid().await.unwrap();

    assert_eq!(results.results.len(), 2 * 3 * 2);
    assert_eq!(results.summary.len(), 2 * 3);
    assert_eq!(results.analysis.len(), 2);

    for result in &results.results {
        let expected = result.config.cities;
        assert_eq!(result.evaluation.loads.iter().sum::<usize>(), expected);
        assert_eq!(result.evaluation.routes.len(), result.config.agents);
    }
    for summary in results.summary.values() {
        assert_eq!(summary.trials, 2);
    }
}

#[tokio::test]
async fn test_grid_results_come_back_in_grid_order() {
    let results = ExperimentRunner::new(small_grid(1)).run_grid().await.unwrap();
    let order: Vec<(String, String)> = results
        .results
        .iter()
        .map(|r| (r.config.scenario.clone(), r.config.architecture.clone()))
        .collect();

    let mut expected = Vec::new();
    for scenario in ["small_clustered", "medium_random"] {
        for architecture in Architecture::all() {
            expected.push((scenario.to_string(), architecture.name().to_string()));
        }
    }
    assert_eq!(order, expected);
}

#[tokio::test]
async fn test_grid_is_deterministic_apart_from_timing() {
    let config = ExperimentRunnerConfig {
        allocation: AllocationConfig {
            auction_strategy: AuctionStrategy::Batch,
            ..Default::default()
        },
        ..small_grid(1)
    };
    let first = ExperimentRunner::new(config.clone()).run_grid().await.unwrap();
    let second = ExperimentRunner::new(config).run_grid().await.unwrap();

    for (a, b) in first.results.iter().zip(&second.results) {
        assert_eq!(a.evaluation.routes, b.evaluation.routes);
        assert_eq!(a.evaluation.message_counts, b.evaluation.message_counts);
        assert_eq!(a.evaluation.details, b.evaluation.details);
    }
}

#[tokio::test]
async fn test_results_survive_save_and_load() {
    let results = ExperimentRunner::new(small_grid(1)).run_grid().await.unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("results.json");
    results.save(&path).unwrap();
    let loaded = GridResults::load(&path).unwrap();

    assert_eq!(loaded.results.len(), results.results.len());
    assert_eq!(
        loaded.summary.keys().collect::<Vec<_>>(),
        results.summary.keys().collect::<Vec<_>>()
    );
    for (a, b) in loaded.results.iter().zip(&results.results) {
        assert_eq!(a.config.run_id, b.config.run_id);
        assert_eq!(a.evaluation.loads, b.evaluation.loads);
        assert_eq!(a.evaluation.message_counts, b.evaluation.message_counts);
        let cities = |r: &tsp_experiment::results::ExperimentResult| {
            r.evaluation
                .routes
                .iter()
                .map(|route| route.cities.clone())
                .collect::<Vec<_>>()
        };
        assert_eq!(cities(a), cities(b));
    }
}
