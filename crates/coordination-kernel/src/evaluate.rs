//! End-to-end evaluation of one architecture on one scenario.
//!
//! [`run`] validates the input, partitions the cities with the chosen
//! allocator, checks the partition, builds one optimized route per agent and
//! aggregates the metrics used to compare architectures.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::AllocationConfig;
use crate::error::{AllocationError, ConfigurationError};
use crate::events::{MessageKind, NonconvergenceEvent};
use crate::geometry::{AgentId, City, CityId, Point};
use crate::partition::{AllocationDetails, Architecture};
use crate::route::RouteOptimizer;

/// One agent's final route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRoute {
    pub agent: AgentId,
    pub start: Point,
    /// Cities in visiting order
    pub cities: Vec<CityId>,
    pub length: f64,
    /// Length before 2-opt
    pub nearest_neighbor_length: f64,
    pub twoopt_passes: usize,
}

/// Metrics of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub architecture: Architecture,
    /// Sum of all route lengths
    pub total_distance: f64,
    /// One route per agent, in agent order
    pub routes: Vec<AgentRoute>,
    pub message_counts: BTreeMap<MessageKind, usize>,
    pub total_messages: usize,
    /// Owned-city count per agent
    pub loads: Vec<usize>,
    /// Sample variance of `loads`
    pub load_variance: f64,
    /// Coefficient of variation of `loads`
    pub load_fairness: f64,
    /// Wall-clock time of allocation plus routing
    pub elapsed_ms: f64,
    pub nonconvergence: Vec<NonconvergenceEvent>,
    pub details: AllocationDetails,
}

impl EvaluationResult {
    pub fn messages_of(&self, kind: MessageKind) -> usize {
        self.message_counts.get(&kind).copied().unwrap_or(0)
    }

    pub fn route_of(&self, agent: AgentId) -> Option<&AgentRoute> {
        self.routes.iter().find(|r| r.agent == agent)
    }
}

/// Reject input no allocator can run on.
pub fn validate_input(
    cities: &[City],
    starts: &[Point],
    config: &AllocationConfig,
) -> Result<(), ConfigurationError> {
    if cities.is_empty() {
        return Err(ConfigurationError::NoCities);
    }
    if starts.is_empty() {
        return Err(ConfigurationError::NoAgents);
    }

    let mut seen = BTreeSet::new();
    for city in cities {
        if !city.location.is_finite() {
            return Err(ConfigurationError::NonFiniteCity(city.id));
        }
        if !seen.insert(city.id) {
            return Err(ConfigurationError::DuplicateCity(city.id));
        }
    }
    if let Some(agent) = starts.iter().position(|s| !s.is_finite()) {
        return Err(ConfigurationError::NonFiniteStart(AgentId(agent)));
    }

    config.validate()
}

/// Run `architecture` on the scenario and measure the outcome.
///
/// Inputs are never mutated; the same arguments always produce the same
/// result apart from `elapsed_ms`.
pub fn run(
    architecture: Architecture,
    cities: &[City],
    starts: &[Point],
    config: &AllocationConfig,
) -> Result<EvaluationResult, AllocationError> {
    validate_input(cities, starts, config)?;

    info!(
        architecture = %architecture,
        cities = cities.len(),
        agents = starts.len(),
        "Starting evaluation"
    );
    let started = Instant::now();

    let allocation = architecture.allocator(config).allocate(cities, starts);
    allocation.partition.verify(cities)?;

    let by_id: BTreeMap<CityId, City> = cities.iter().map(|c| (c.id, *c)).collect();
    let optimizer = RouteOptimizer::from_config(config);
    let optimized: Vec<_> = allocation
        .agents
        .par_iter()
        .map(|agent| {
            let owned: Vec<City> = agent
                .owned()
                .iter()
                .filter_map(|id| by_id.get(id).copied())
                .collect();
            (agent.id, optimizer.optimize(agent.start, &owned))
        })
        .collect();

    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

    let mut nonconvergence = allocation.nonconvergence;
    let mut routes = Vec::with_capacity(optimized.len());
    for (agent, result) in optimized {
        if !result.converged {
            warn!(
                agent = %agent,
                passes = result.passes,
                "2-opt hit its pass cap; keeping best tour found"
            );
            nonconvergence.push(NonconvergenceEvent::TwoOpt {
                agent,
                passes: result.passes,
            });
        }
        routes.push(AgentRoute {
            agent,
            start: result.route.start,
            cities: result.route.cities,
            length: result.route.length,
            nearest_neighbor_length: result.nearest_neighbor_length,
            twoopt_passes: result.passes,
        });
    }

    let total_distance: f64 = routes.iter().map(|r| r.length).sum();
    let loads = allocation.partition.loads();
    let result = EvaluationResult {
        architecture,
        total_distance,
        routes,
        message_counts: allocation.events.counts_by_kind(),
        total_messages: allocation.events.len(),
        load_variance: load_variance(&loads),
        load_fairness: load_fairness(&loads),
        loads,
        elapsed_ms,
        nonconvergence,
        details: allocation.details,
    };

    info!(
        architecture = %architecture,
        total_distance = result.total_distance,
        messages = result.total_messages,
        load_variance = result.load_variance,
        elapsed_ms = result.elapsed_ms,
        "Evaluation complete"
    );
    Ok(result)
}

/// Sum of squared deviations from the mean load.
fn squared_deviations(loads: &[usize]) -> f64 {
    let mean = loads.iter().sum::<usize>() as f64 / loads.len() as f64;
    loads
        .iter()
        .map(|&l| {
            let d = l as f64 - mean;
            d * d
        })
        .sum()
}

/// Sample variance (n - 1) of the loads; 0 for fewer than two agents.
pub fn load_variance(loads: &[usize]) -> f64 {
    if loads.len() < 2 {
        return 0.0;
    }
    squared_deviations(loads) / (loads.len() - 1) as f64
}

/// Population standard deviation over mean of the loads; 0 when the mean is 0.
pub fn load_fairness(loads: &[usize]) -> f64 {
    if loads.is_empty() {
        return 0.0;
    }
    let mean = loads.iter().sum::<usize>() as f64 / loads.len() as f64;
    if mean == 0.0 {
        return 0.0;
    }
    (squared_deviations(loads) / loads.len() as f64).sqrt() / mean
}
