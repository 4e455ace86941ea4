//! HierarchicalLeader: a single coordinator partitions by clustering.
//!
//! The leader runs one pass, with no retries and no backtracking:
//! 1. k-means over all city coordinates, one cluster per agent
//! 2. one-to-one matching of clusters to agents minimizing the total
//!    centroid-to-start distance
//! 3. one assignment broadcast per agent
//!
//! An empty cluster simply leaves its agent with nothing to visit.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cluster::KMeans;
use crate::config::AllocationConfig;
use crate::events::{EventLog, MessageKind, NonconvergenceEvent, Participant, Recipient};
use crate::geometry::{City, Point};
use crate::matching::min_cost_assignment;
use crate::partition::{Agent, Allocation, AllocationDetails, Allocator, Architecture, Partition};

/// Clustering statistics for a hierarchical run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HierarchicalSummary {
    pub kmeans_iterations: usize,
    pub kmeans_converged: bool,
    pub inertia: f64,
    /// Agents whose cluster came out empty
    pub empty_clusters: usize,
    /// Total centroid-to-start distance of the chosen matching
    pub matching_cost: f64,
}

/// Leader that clusters and assigns.
#[derive(Debug, Clone)]
pub struct HierarchicalLeader {
    seed: u64,
    max_iterations: usize,
    restarts: usize,
}

impl HierarchicalLeader {
    pub fn new(config: &AllocationConfig) -> Self {
        Self {
            seed: config.kmeans_seed,
            max_iterations: config.kmeans_max_iterations,
            restarts: config.kmeans_restarts,
        }
    }
}

impl Allocator for HierarchicalLeader {
    fn architecture(&self) -> Architecture {
        Architecture::Hierarchical
    }

    fn allocate(&self, cities: &[City], starts: &[Point]) -> Allocation {
        let mut agents = Agent::from_starts(starts);
        let k = agents.len();

        let points: Vec<Point> = cities.iter().map(|c| c.location).collect();
        let clustering = KMeans {
            k,
            seed: self.seed,
            max_iterations: self.max_iterations,
            restarts: self.restarts,
        }
        .fit(&points);

        let mut nonconvergence = Vec::new();
        if !clustering.converged {
            warn!(
                iterations = clustering.iterations,
                "k-means hit its iteration cap; using best-so-far clusters"
            );
            nonconvergence.push(NonconvergenceEvent::KMeans {
                iterations: clustering.iterations,
            });
        }

        // Rows are agents, columns clusters. A cluster without a centroid
        // costs nothing, so it never distorts the matching.
        let cost: Vec<Vec<f64>> = agents
            .iter()
            .map(|agent| {
                clustering
                    .centroids
                    .iter()
                    .map(|centroid| centroid.map_or(0.0, |c| agent.start.distance(&c)))
                    .collect()
            })
            .collect();
        let cluster_of_agent = min_cost_assignment(&cost);
        let matching_cost: f64 = cluster_of_agent
            .iter()
            .enumerate()
            .map(|(agent, &cluster)| cost[agent][cluster])
            .sum();

        let mut events = EventLog::new();
        for (agent, &cluster) in agents.iter_mut().zip(&cluster_of_agent) {
            for member in clustering.members(cluster) {
                agent.assign(cities[member].id);
            }
            debug!(
                agent = %agent.id,
                cluster = cluster,
                cities = agent.load(),
                "Leader assigned cluster"
            );
            events.record(
                Participant::Leader,
                Recipient::Agent(agent.id),
                MessageKind::AssignmentBroadcast,
                0,
                None,
            );
        }

        let empty_clusters = agents.iter().filter(|a| a.load() == 0).count();
        info!(
            agents = k,
            cities = cities.len(),
            iterations = clustering.iterations,
            inertia = clustering.inertia,
            empty_clusters = empty_clusters,
            "Hierarchical partition complete"
        );

        Allocation {
            partition: Partition::from_agents(&agents),
            details: AllocationDetails::Hierarchical(HierarchicalSummary {
                kmeans_iterations: clustering.iterations,
                kmeans_converged: clustering.converged,
                inertia: clustering.inertia,
                empty_clusters,
                matching_cost,
            }),
            agents,
            events,
            nonconvergence,
        }
    }
}
