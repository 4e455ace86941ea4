//! Agents, partitions and the allocator capability shared by all architectures.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::allocators::{
    AuctionSummary, HierarchicalLeader, HierarchicalSummary, NegotiationSummary, PeerNegotiation,
    SequentialAuction,
};
use crate::config::AllocationConfig;
use crate::error::AllocationError;
use crate::events::{EventLog, NonconvergenceEvent};
use crate::geometry::{AgentId, City, CityId, Point};

/// A (city, price) pair paid by an auction winner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub city: CityId,
    pub price: f64,
}

/// An agent for the duration of one run.
///
/// Owned cities are append-only; budget and ledger are only used by the
/// auction.
#[derive(Debug, Clone, PartialEq)]
pub struct Agent {
    pub id: AgentId,
    pub start: Point,
    owned: Vec<CityId>,
    budget: Option<f64>,
    ledger: Vec<LedgerEntry>,
}

impl Agent {
    pub fn new(id: AgentId, start: Point) -> Self {
        Self {
            id,
            start,
            owned: Vec::new(),
            budget: None,
            ledger: Vec::new(),
        }
    }

    pub fn with_budget(mut self, budget: f64) -> Self {
        self.budget = Some(budget);
        self
    }

    /// One agent per start coordinate, numbered in order.
    pub fn from_starts(starts: &[Point]) -> Vec<Agent> {
        starts
            .iter()
            .enumerate()
            .map(|(i, &start)| Agent::new(AgentId(i), start))
            .collect()
    }

    pub fn owned(&self) -> &[CityId] {
        &self.owned
    }

    pub fn load(&self) -> usize {
        self.owned.len()
    }

    pub fn assign(&mut self, city: CityId) {
        self.owned.push(city);
    }

    pub fn budget(&self) -> Option<f64> {
        self.budget
    }

    pub fn ledger(&self) -> &[LedgerEntry] {
        &self.ledger
    }

    /// Settle a won auction: take the city and pay for it.
    pub(crate) fn settle(&mut self, city: CityId, price: f64) {
        self.owned.push(city);
        if let Some(budget) = self.budget.as_mut() {
            *budget -= price;
        }
        self.ledger.push(LedgerEntry { city, price });
    }
}

/// Final mapping from agent to owned cities.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Partition {
    assignments: BTreeMap<AgentId, Vec<CityId>>,
}

impl Partition {
    pub fn from_agents(agents: &[Agent]) -> Self {
        Self {
            assignments: agents
                .iter()
                .map(|a| (a.id, a.owned.clone()))
                .collect(),
        }
    }

    pub fn cities_of(&self, agent: AgentId) -> &[CityId] {
        self.assignments
            .get(&agent)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn owner_of(&self, city: CityId) -> Option<AgentId> {
        self.assignments
            .iter()
            .find(|(_, cities)| cities.contains(&city))
            .map(|(agent, _)| *agent)
    }

    pub fn iter(&self) -> impl Iterator<Item = (AgentId, &[CityId])> {
        self.assignments.iter().map(|(a, c)| (*a, c.as_slice()))
    }

    /// Owned-city counts in agent order.
    pub fn loads(&self) -> Vec<usize> {
        self.assignments.values().map(Vec::len).collect()
    }

    pub fn agent_count(&self) -> usize {
        self.assignments.len()
    }

    /// Check that every city is owned by exactly one agent and nothing else is.
    pub fn verify(&self, cities: &[City]) -> Result<(), AllocationError> {
        let mut seen: BTreeMap<CityId, usize> = cities.iter().map(|c| (c.id, 0)).collect();
        let mut duplicated = 0;
        for owned in self.assignments.values() {
            for city in owned {
                match seen.get_mut(city) {
                    Some(count) => {
                        *count += 1;
                        if *count == 2 {
                            duplicated += 1;
                        }
                    }
                    // Owning a city that does not exist counts as a duplicate claim.
                    None => duplicated += 1,
                }
            }
        }
        let missing = seen.values().filter(|&&count| count == 0).count();
        if missing == 0 && duplicated == 0 {
            Ok(())
        } else {
            Err(AllocationError::InvalidPartition {
                missing,
                duplicated,
            })
        }
    }
}

/// Architecture-specific bookkeeping returned alongside the partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "architecture", rename_all = "snake_case")]
pub enum AllocationDetails {
    Hierarchical(HierarchicalSummary),
    Flat(NegotiationSummary),
    Auction(AuctionSummary),
}

/// Everything an allocator produces for one run.
#[derive(Debug, Clone)]
pub struct Allocation {
    pub agents: Vec<Agent>,
    pub partition: Partition,
    pub events: EventLog,
    pub nonconvergence: Vec<NonconvergenceEvent>,
    pub details: AllocationDetails,
}

/// The partitioning capability shared by all three architectures.
///
/// Implementations share no state, only the post-condition: on return every
/// city belongs to exactly one agent.
pub trait Allocator: Send + Sync {
    fn architecture(&self) -> Architecture;

    /// Partition `cities` among one agent per entry of `starts`.
    ///
    /// Callers validate input first; see [`crate::evaluate::validate_input`].
    fn allocate(&self, cities: &[City], starts: &[Point]) -> Allocation;
}

/// Coordination architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Architecture {
    /// Leader clusters cities and hands one cluster to each agent
    Hierarchical,
    /// Peers negotiate claims round by round
    Flat,
    /// Sequential single-item auction
    Auction,
}

impl Architecture {
    /// Get all architectures for grid experiments.
    pub fn all() -> Vec<Self> {
        vec![Self::Hierarchical, Self::Flat, Self::Auction]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Hierarchical => "hierarchical",
            Self::Flat => "flat",
            Self::Auction => "auction",
        }
    }

    /// Build the allocator for this architecture.
    pub fn allocator(&self, config: &AllocationConfig) -> Box<dyn Allocator> {
        match self {
            Self::Hierarchical => Box::new(HierarchicalLeader::new(config)),
            Self::Flat => Box::new(PeerNegotiation::new(config)),
            Self::Auction => Box::new(SequentialAuction::new(config)),
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Architecture {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hierarchical" | "leader" => Ok(Self::Hierarchical),
            "flat" | "negotiation" | "peer" => Ok(Self::Flat),
            "auction" | "market" => Ok(Self::Auction),
            other => Err(format!(
                "unknown architecture '{other}' (expected hierarchical, flat or auction)"
            )),
        }
    }
}
