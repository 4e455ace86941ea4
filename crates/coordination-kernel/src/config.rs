//! Configuration types for the allocators and the route optimizer.

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;

/// Top-level allocation configuration.
///
/// Every field has a serde default, so partial JSON documents load and
/// unspecified knobs fall back to the values below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocationConfig {
    /// Maximum negotiation rounds before the fallback takes over (flat only)
    pub max_negotiation_rounds: usize,

    /// Cities each agent may claim per negotiation round (flat only)
    pub claims_per_round: usize,

    /// Order in which the auctioneer computes and settles bids (auction only)
    pub auction_strategy: AuctionStrategy,

    /// Seed for k-means centroid initialization (hierarchical only)
    pub kmeans_seed: u64,

    /// Lloyd iterations per k-means restart
    pub kmeans_max_iterations: usize,

    /// Independent k-means initializations; the lowest-inertia run wins
    pub kmeans_restarts: usize,

    /// Maximum full 2-opt passes per route
    pub twoopt_max_iterations: usize,

    /// Starting budget for every bidder (auction only)
    pub agent_budget: f64,

    /// Whether routes close over the cities alone or loop through the depot
    pub tour_closure: TourClosure,
}

/// Auction processing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuctionStrategy {
    /// One city at a time, each bid computed after the previous award
    #[default]
    Sequential,
    /// Blocks of `agent count` cities, bids computed against the block-start state
    Batch,
}

/// How a route's cycle is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TourClosure {
    /// Closed cycle over the agent's cities; the start only picks the entry city
    #[default]
    CityCycle,
    /// The start coordinate is a fixed node of the cycle
    DepotLoop,
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            max_negotiation_rounds: 3,
            claims_per_round: 3,
            auction_strategy: AuctionStrategy::Sequential,
            kmeans_seed: 42,
            kmeans_max_iterations: 300,
            kmeans_restarts: 10,
            twoopt_max_iterations: 1000,
            agent_budget: 1000.0,
            tour_closure: TourClosure::CityCycle,
        }
    }
}

impl AllocationConfig {
    /// Reject settings no allocator can run with.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if !self.agent_budget.is_finite() {
            return Err(ConfigurationError::NonFiniteBudget);
        }
        if self.agent_budget < 0.0 {
            return Err(ConfigurationError::NegativeBudget(self.agent_budget));
        }
        if self.claims_per_round == 0 {
            return Err(ConfigurationError::ZeroClaimsPerRound);
        }
        if self.kmeans_restarts == 0 {
            return Err(ConfigurationError::ZeroKMeansRestarts);
        }
        Ok(())
    }
}
