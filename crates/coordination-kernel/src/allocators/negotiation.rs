//! PeerNegotiation: agents claim cities round by round.
//!
//! Each round every agent proposes the unassigned cities closest to what it
//! already owns, a mediator settles the proposals, and the winners' sets grow.
//! Settlement favours the claimant with the fewest cities, so the partition
//! stays balanced without anyone seeing the whole map.
//!
//! When the round cap is hit with cities still unassigned, each residual city
//! goes to its nearest agent as an explicit fallback assignment.

use std::collections::{BTreeMap, BTreeSet};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::AllocationConfig;
use crate::evaluate::load_fairness;
use crate::events::{EventLog, MessageKind, Participant, Recipient};
use crate::geometry::{AgentId, City, CityId, Point};
use crate::partition::{Agent, Allocation, AllocationDetails, Allocator, Architecture, Partition};

/// Negotiation statistics for a flat run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NegotiationSummary {
    /// Rounds in which at least one claim was made
    pub rounds_used: usize,
    pub max_rounds: usize,
    /// Cities claimed by more than one agent in the same round
    pub conflicts_resolved: usize,
    /// Cities still unassigned when the rounds ran out
    pub unresolved_before_fallback: usize,
    /// Coefficient of variation of the final loads
    pub load_fairness: f64,
}

/// One agent's claim on one city.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    pub agent: AgentId,
    pub city: CityId,
    /// Distance from the city to the claimant's nearest owned city or start
    pub proximity: f64,
}

/// Outcome of one round, before it is applied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoundResolution {
    /// Granted claims, in the order they were decided
    pub grants: Vec<Claim>,
    pub denials: Vec<Claim>,
    /// Cities with two or more claimants
    pub conflicts: usize,
}

/// Shared negotiation state: the unassigned pool and each agent's holdings.
#[derive(Debug, Clone)]
pub struct NegotiationState {
    locations: BTreeMap<CityId, Point>,
    starts: Vec<Point>,
    owned: Vec<Vec<CityId>>,
    pool: BTreeSet<CityId>,
}

impl NegotiationState {
    pub fn new(cities: &[City], starts: &[Point]) -> Self {
        Self {
            locations: cities.iter().map(|c| (c.id, c.location)).collect(),
            starts: starts.to_vec(),
            owned: vec![Vec::new(); starts.len()],
            pool: cities.iter().map(|c| c.id).collect(),
        }
    }

    pub fn agent_count(&self) -> usize {
        self.starts.len()
    }

    pub fn is_settled(&self) -> bool {
        self.pool.is_empty()
    }

    /// Unassigned cities in id order.
    pub fn unassigned(&self) -> impl Iterator<Item = CityId> + '_ {
        self.pool.iter().copied()
    }

    pub fn owned(&self, agent: AgentId) -> &[CityId] {
        &self.owned[agent.0]
    }

    pub fn loads(&self) -> Vec<usize> {
        self.owned.iter().map(Vec::len).collect()
    }

    /// Distance from `city` to the agent's nearest owned city, or to its start
    /// while it owns nothing.
    pub fn proximity(&self, agent: AgentId, city: CityId) -> f64 {
        let Some(target) = self.locations.get(&city) else {
            return f64::INFINITY;
        };
        let owned = &self.owned[agent.0];
        if owned.is_empty() {
            return self.starts[agent.0].distance(target);
        }
        owned
            .iter()
            .filter_map(|c| self.locations.get(c))
            .map(|p| p.distance(target))
            .fold(f64::INFINITY, f64::min)
    }

    /// The agent's `limit` best unassigned cities, closest first (ties by id).
    pub fn propose(&self, agent: AgentId, limit: usize) -> Vec<Claim> {
        let mut claims: Vec<Claim> = self
            .pool
            .iter()
            .map(|&city| Claim {
                agent,
                city,
                proximity: self.proximity(agent, city),
            })
            .collect();
        claims.sort_by(|a, b| {
            a.proximity
                .total_cmp(&b.proximity)
                .then(a.city.cmp(&b.city))
        });
        claims.truncate(limit);
        claims
    }

    /// Agent closest to `city` under the claim proximity rule; ties to the lowest id.
    pub fn nearest_agent(&self, city: CityId) -> Option<AgentId> {
        (0..self.agent_count())
            .map(AgentId)
            .map(|agent| (agent, self.proximity(agent, city)))
            .min_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)))
            .map(|(agent, _)| agent)
    }

    /// Move the granted cities out of the pool.
    pub fn apply(&mut self, resolution: &RoundResolution) {
        for grant in &resolution.grants {
            self.assign(grant.agent, grant.city);
        }
    }

    fn assign(&mut self, agent: AgentId, city: CityId) {
        if self.pool.remove(&city) {
            self.owned[agent.0].push(city);
        }
    }
}

/// Settle one round of claims against `state` without mutating it.
///
/// Uncontested claims are granted first, in city order. Contested cities are
/// then decided in city order against the loads as they stand after every
/// earlier grant of the round: fewest owned cities wins, then the smaller
/// proximity, then the lower agent id. Claims on cities no longer in the pool
/// are denied.
pub fn resolve_round(state: &NegotiationState, claims: &[Claim]) -> RoundResolution {
    let mut by_city: BTreeMap<CityId, Vec<Claim>> = BTreeMap::new();
    let mut resolution = RoundResolution::default();
    for claim in claims {
        if state.pool.contains(&claim.city) {
            by_city.entry(claim.city).or_default().push(*claim);
        } else {
            resolution.denials.push(*claim);
        }
    }

    let mut loads = state.loads();
    for claimants in by_city.values().filter(|c| c.len() == 1) {
        let grant = claimants[0];
        loads[grant.agent.0] += 1;
        resolution.grants.push(grant);
    }

    for claimants in by_city.values().filter(|c| c.len() > 1) {
        resolution.conflicts += 1;
        let Some(winner) = claimants
            .iter()
            .min_by(|a, b| {
                loads[a.agent.0]
                    .cmp(&loads[b.agent.0])
                    .then(a.proximity.total_cmp(&b.proximity))
                    .then(a.agent.cmp(&b.agent))
            })
            .copied()
        else {
            continue;
        };
        loads[winner.agent.0] += 1;
        resolution.grants.push(winner);
        resolution
            .denials
            .extend(claimants.iter().filter(|c| c.agent != winner.agent));
    }

    resolution
}

/// Flat peer-to-peer negotiator.
#[derive(Debug, Clone)]
pub struct PeerNegotiation {
    max_rounds: usize,
    claims_per_round: usize,
}

impl PeerNegotiation {
    pub fn new(config: &AllocationConfig) -> Self {
        Self {
            max_rounds: config.max_negotiation_rounds,
            claims_per_round: config.claims_per_round,
        }
    }
}

impl Allocator for PeerNegotiation {
    fn architecture(&self) -> Architecture {
        Architecture::Flat
    }

    fn allocate(&self, cities: &[City], starts: &[Point]) -> Allocation {
        let mut state = NegotiationState::new(cities, starts);
        let mut events = EventLog::new();
        let mut rounds_used = 0;
        let mut conflicts_resolved = 0;

        for round in 0..self.max_rounds {
            if state.is_settled() {
                break;
            }
            rounds_used += 1;

            // Proposals read the round-start state only; order is by agent.
            let claims: Vec<Claim> = (0..state.agent_count())
                .into_par_iter()
                .map(|agent| state.propose(AgentId(agent), self.claims_per_round))
                .collect::<Vec<_>>()
                .into_iter()
                .flatten()
                .collect();
            for claim in &claims {
                events.record(
                    Participant::Agent(claim.agent),
                    Recipient::Broadcast,
                    MessageKind::Claim,
                    round,
                    Some(claim.city),
                );
            }

            let resolution = resolve_round(&state, &claims);
            for grant in &resolution.grants {
                events.record(
                    Participant::Mediator,
                    Recipient::Agent(grant.agent),
                    MessageKind::Grant,
                    round,
                    Some(grant.city),
                );
            }
            for denial in &resolution.denials {
                events.record(
                    Participant::Mediator,
                    Recipient::Agent(denial.agent),
                    MessageKind::Deny,
                    round,
                    Some(denial.city),
                );
            }
            conflicts_resolved += resolution.conflicts;
            state.apply(&resolution);

            debug!(
                round = round,
                claims = claims.len(),
                granted = resolution.grants.len(),
                conflicts = resolution.conflicts,
                remaining = state.pool.len(),
                "Negotiation round complete"
            );
        }

        let residual: Vec<CityId> = state.unassigned().collect();
        if !residual.is_empty() {
            warn!(
                rounds = rounds_used,
                unresolved = residual.len(),
                "Negotiation rounds exhausted; assigning residual cities to nearest agents"
            );
        }
        for &city in &residual {
            let Some(agent) = state.nearest_agent(city) else {
                break;
            };
            state.assign(agent, city);
            events.record(
                Participant::Mediator,
                Recipient::Agent(agent),
                MessageKind::FallbackAssignment,
                rounds_used,
                Some(city),
            );
        }

        let mut agents = Agent::from_starts(starts);
        for agent in &mut agents {
            for &city in state.owned(agent.id) {
                agent.assign(city);
            }
        }
        let partition = Partition::from_agents(&agents);
        let fairness = load_fairness(&partition.loads());

        info!(
            rounds = rounds_used,
            conflicts = conflicts_resolved,
            fallback = residual.len(),
            load_fairness = fairness,
            "Flat negotiation complete"
        );

        Allocation {
            agents,
            partition,
            events,
            nonconvergence: Vec::new(),
            details: AllocationDetails::Flat(NegotiationSummary {
                rounds_used,
                max_rounds: self.max_rounds,
                conflicts_resolved,
                unresolved_before_fallback: residual.len(),
                load_fairness: fairness,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluate::load_variance;
    use crate::geometry::cities_from_coords;

    fn negotiator(rounds: usize, claims: usize) -> PeerNegotiation {
        PeerNegotiation::new(&AllocationConfig {
            max_negotiation_rounds: rounds,
            claims_per_round: claims,
            ..Default::default()
        })
    }

    #[test]
    fn test_propose_orders_by_proximity_then_id() {
        let cities = cities_from_coords(&[(5.0, 0.0), (1.0, 0.0), (0.0, 1.0), (9.0, 9.0)]);
        let state = NegotiationState::new(&cities, &[Point::new(0.0, 0.0)]);
        let claims = state.propose(AgentId(0), 3);
        let ids: Vec<CityId> = claims.iter().map(|c| c.city).collect();
        assert_eq!(ids, vec![CityId(1), CityId(2), CityId(0)]);
    }

    #[test]
    fn test_conflict_goes_to_least_loaded() {
        let cities = cities_from_coords(&[(0.0, 0.0), (1.0, 0.0), (2.0, 0.0), (3.0, 0.0)]);
        let starts = [Point::new(0.0, 0.0), Point::new(50.0, 0.0)];
        let mut state = NegotiationState::new(&cities, &starts);
        state.assign(AgentId(0), CityId(0));
        state.assign(AgentId(0), CityId(1));

        let claims = [
            Claim {
                agent: AgentId(0),
                city: CityId(2),
                proximity: 1.0,
            },
            Claim {
                agent: AgentId(1),
                city: CityId(2),
                proximity: 48.0,
            },
        ];
        let resolution = resolve_round(&state, &claims);
        assert_eq!(resolution.conflicts, 1);
        assert_eq!(resolution.grants.len(), 1);
        assert_eq!(resolution.grants[0].agent, AgentId(1));
        assert_eq!(resolution.denials[0].agent, AgentId(0));
    }

    #[test]
    fn test_equal_loads_fall_back_to_proximity_then_id() {
        let cities = cities_from_coords(&[(0.0, 0.0), (10.0, 0.0)]);
        let starts = [Point::new(0.0, 0.0), Point::new(10.0, 0.0), Point::new(5.0, 0.0)];
        let state = NegotiationState::new(&cities, &starts);

        let claim = |agent, city, proximity| Claim {
            agent: AgentId(agent),
            city: CityId(city),
            proximity,
        };
        let resolution = resolve_round(
            &state,
            &[claim(2, 0, 5.0), claim(0, 0, 0.0), claim(1, 1, 3.0), claim(2, 1, 3.0)],
        );
        let winners: Vec<(CityId, AgentId)> =
            resolution.grants.iter().map(|g| (g.city, g.agent)).collect();
        assert_eq!(
            winners,
            vec![(CityId(0), AgentId(0)), (CityId(1), AgentId(1))]
        );
    }

    #[test]
    fn test_uncontested_grants_count_toward_later_conflicts() {
        // Agent 0 gets city 0 uncontested, so agent 1 wins the contested city 1.
        let cities = cities_from_coords(&[(0.0, 0.0), (1.0, 0.0)]);
        let starts = [Point::new(0.0, 0.0), Point::new(9.0, 0.0)];
        let state = NegotiationState::new(&cities, &starts);
        let claims = [
            Claim {
                agent: AgentId(0),
                city: CityId(0),
                proximity: 0.0,
            },
            Claim {
                agent: AgentId(0),
                city: CityId(1),
                proximity: 1.0,
            },
            Claim {
                agent: AgentId(1),
                city: CityId(1),
                proximity: 8.0,
            },
        ];
        let resolution = resolve_round(&state, &claims);
        assert_eq!(resolution.grants[0].city, CityId(0));
        assert_eq!(resolution.grants[1].agent, AgentId(1));
    }

    #[test]
    fn test_conflict_choice_minimizes_variance() {
        let cities = cities_from_coords(&[(0.0, 0.0), (1.0, 0.0), (2.0, 0.0), (3.0, 0.0), (4.0, 0.0)]);
        let starts = [Point::new(0.0, 0.0), Point::new(4.0, 0.0), Point::new(2.0, 5.0)];
        let mut state = NegotiationState::new(&cities, &starts);
        state.assign(AgentId(0), CityId(0));
        state.assign(AgentId(0), CityId(1));
        state.assign(AgentId(1), CityId(4));

        let claims: Vec<Claim> = (0..3)
            .map(|a| Claim {
                agent: AgentId(a),
                city: CityId(2),
                proximity: state.proximity(AgentId(a), CityId(2)),
            })
            .collect();
        let resolution = resolve_round(&state, &claims);
        let winner = resolution.grants[0].agent;

        let variance_if = |agent: AgentId| {
            let mut loads = state.loads();
            loads[agent.0] += 1;
            load_variance(&loads)
        };
        let chosen = variance_if(winner);
        for claim in &claims {
            assert!(chosen <= variance_if(claim.agent) + 1e-12);
        }
    }

    #[test]
    fn test_negotiation_completes_partition() {
        let cities = cities_from_coords(&[
            (0.0, 0.0),
            (1.0, 1.0),
            (2.0, 0.0),
            (50.0, 50.0),
            (51.0, 52.0),
            (90.0, 10.0),
            (91.0, 11.0),
        ]);
        let starts = [Point::new(0.0, 0.0), Point::new(50.0, 50.0), Point::new(90.0, 10.0)];
        let allocation = negotiator(3, 3).allocate(&cities, &starts);
        assert!(allocation.partition.verify(&cities).is_ok());
        assert_eq!(
            allocation.events.count(MessageKind::Grant),
            cities.len() - allocation.events.count(MessageKind::FallbackAssignment)
        );
    }

    #[test]
    fn test_zero_rounds_assigns_everything_by_fallback() {
        let cities = cities_from_coords(&[(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)]);
        let starts = [Point::new(0.0, 0.0), Point::new(10.0, 10.0)];
        let allocation = negotiator(0, 3).allocate(&cities, &starts);

        assert!(allocation.partition.verify(&cities).is_ok());
        assert_eq!(allocation.events.count(MessageKind::Claim), 0);
        assert_eq!(allocation.events.count(MessageKind::FallbackAssignment), 4);
        match allocation.details {
            AllocationDetails::Flat(summary) => {
                assert_eq!(summary.rounds_used, 0);
                assert_eq!(summary.unresolved_before_fallback, 4);
            }
            other => panic!("unexpected details {other:?}"),
        }
    }
}
