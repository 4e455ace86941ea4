//! Error types.
//!
//! Only invalid input is an error. Iteration caps, exhausted negotiation
//! rounds and agents left without cities are all recorded in the result
//! instead.

use thiserror::Error;

use crate::geometry::{AgentId, CityId};

/// Input rejected before any algorithm runs.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigurationError {
    #[error("at least one city is required")]
    NoCities,

    #[error("at least one agent is required")]
    NoAgents,

    #[error("agent budget must be non-negative, got {0}")]
    NegativeBudget(f64),

    #[error("agent budget must be finite")]
    NonFiniteBudget,

    #[error("{0} has a non-finite coordinate")]
    NonFiniteCity(CityId),

    #[error("start coordinate of {0} is not finite")]
    NonFiniteStart(AgentId),

    #[error("{0} appears more than once")]
    DuplicateCity(CityId),

    #[error("claims_per_round must be at least 1")]
    ZeroClaimsPerRound,

    #[error("kmeans_restarts must be at least 1")]
    ZeroKMeansRestarts,
}

/// Failure of a full evaluation run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AllocationError {
    #[error("invalid configuration: {0}")]
    Configuration(#[from] ConfigurationError),

    /// An allocator terminated without a complete, conflict-free partition.
    #[error("allocator produced an invalid partition: {missing} unassigned, {duplicated} assigned twice")]
    InvalidPartition { missing: usize, duplicated: usize },
}
