//! SequentialAuction: cities are sold one at a time in id order.
//!
//! A bidder that owns nothing quotes its distance from start. Otherwise it
//! quotes the cheapest-insertion cost of the city into its current tour. A
//! bidder cannot quote more than its remaining budget. The highest bid wins
//! (lowest agent id on ties) and is paid from the winner's budget.
//!
//! A city nobody can afford goes to the bidder with the lowest quote, free of
//! charge, as an auction fallback.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{AllocationConfig, AuctionStrategy, TourClosure};
use crate::events::{EventLog, MessageKind, Participant, Recipient};
use crate::geometry::{AgentId, City, CityId, Point};
use crate::partition::{Agent, Allocation, AllocationDetails, Allocator, Architecture, Partition};
use crate::route::cheapest_insertion;

/// A submitted bid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bid {
    pub agent: AgentId,
    pub city: CityId,
    pub amount: f64,
    /// Position of the city in the auction order
    pub round: usize,
}

/// Market statistics for an auction run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuctionSummary {
    pub strategy: AuctionStrategy,
    /// Sum of winning bids
    pub revenue: f64,
    pub winning_bids: Vec<Bid>,
    /// Cities nobody could afford, assigned without payment
    pub fallback_cities: Vec<CityId>,
}

/// Single-item auctioneer.
#[derive(Debug, Clone)]
pub struct SequentialAuction {
    budget: f64,
    strategy: AuctionStrategy,
    closure: TourClosure,
}

/// A bidder's live position: its agent record plus its tour in visiting order.
struct Bidder {
    agent: Agent,
    tour: Vec<Point>,
}

impl Bidder {
    /// What taking `city` would cost this bidder right now.
    fn quote(&self, city: Point, closure: TourClosure) -> f64 {
        if self.tour.is_empty() {
            self.agent.start.distance(&city)
        } else {
            cheapest_insertion(self.agent.start, &self.tour, city, closure).cost
        }
    }

    fn remaining_budget(&self) -> f64 {
        self.agent.budget().unwrap_or(f64::INFINITY)
    }

    /// Add `city` to the owned set and splice it into the tour.
    fn take(&mut self, city: &City, price: Option<f64>, closure: TourClosure) {
        let position = cheapest_insertion(self.agent.start, &self.tour, city.location, closure)
            .position
            .min(self.tour.len());
        self.tour.insert(position, city.location);
        match price {
            Some(price) => self.agent.settle(city.id, price),
            None => self.agent.assign(city.id),
        }
    }
}

impl SequentialAuction {
    pub fn new(config: &AllocationConfig) -> Self {
        Self {
            budget: config.agent_budget,
            strategy: config.auction_strategy,
            closure: config.tour_closure,
        }
    }

    /// Quotes for one city from every bidder, in agent order.
    fn quotes(&self, bidders: &[Bidder], city: &City) -> Vec<f64> {
        bidders
            .par_iter()
            .map(|bidder| bidder.quote(city.location, self.closure))
            .collect()
    }
}

impl Allocator for SequentialAuction {
    fn architecture(&self) -> Architecture {
        Architecture::Auction
    }

    fn allocate(&self, cities: &[City], starts: &[Point]) -> Allocation {
        let mut bidders: Vec<Bidder> = Agent::from_starts(starts)
            .into_iter()
            .map(|agent| Bidder {
                agent: agent.with_budget(self.budget),
                tour: Vec::new(),
            })
            .collect();

        let mut order: Vec<&City> = cities.iter().collect();
        order.sort_by_key(|c| c.id);

        // Sequential quotes each city against the state after the previous
        // award; batch quotes a whole block against the block-start state.
        let block = match self.strategy {
            AuctionStrategy::Sequential => 1,
            AuctionStrategy::Batch => bidders.len().max(1),
        };

        let mut events = EventLog::new();
        let mut winning_bids = Vec::new();
        let mut fallback_cities = Vec::new();

        for (block_index, chunk) in order.chunks(block).enumerate() {
            let block_quotes: Vec<Vec<f64>> = chunk
                .par_iter()
                .map(|city| self.quotes(&bidders, city))
                .collect();

            for (offset, (city, quotes)) in chunk.iter().zip(block_quotes).enumerate() {
                let round = block_index * block + offset;

                let bids: Vec<Bid> = bidders
                    .iter()
                    .zip(&quotes)
                    .filter(|(bidder, &amount)| amount <= bidder.remaining_budget())
                    .map(|(bidder, &amount)| Bid {
                        agent: bidder.agent.id,
                        city: city.id,
                        amount,
                        round,
                    })
                    .collect();
                for bid in &bids {
                    events.record(
                        Participant::Agent(bid.agent),
                        Recipient::Coordinator,
                        MessageKind::Bid,
                        round,
                        Some(city.id),
                    );
                }

                let winner = bids.iter().copied().max_by(|a, b| {
                    a.amount
                        .total_cmp(&b.amount)
                        .then(b.agent.cmp(&a.agent))
                });

                match winner {
                    Some(bid) => {
                        bidders[bid.agent.0].take(city, Some(bid.amount), self.closure);
                        events.record(
                            Participant::Auctioneer,
                            Recipient::Broadcast,
                            MessageKind::Award,
                            round,
                            Some(city.id),
                        );
                        debug!(
                            city = %city.id,
                            winner = %bid.agent,
                            amount = bid.amount,
                            bids = bids.len(),
                            "Awarded city"
                        );
                        winning_bids.push(bid);
                    }
                    None => {
                        // Live quotes, so a batch fallback sees earlier awards.
                        let live = self.quotes(&bidders, city);
                        let Some((agent, cost)) = live
                            .iter()
                            .copied()
                            .enumerate()
                            .min_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)))
                        else {
                            continue;
                        };
                        warn!(
                            city = %city.id,
                            agent = %AgentId(agent),
                            cost = cost,
                            "No bidder could afford city; assigning by insertion cost"
                        );
                        bidders[agent].take(city, None, self.closure);
                        events.record(
                            Participant::Auctioneer,
                            Recipient::Agent(AgentId(agent)),
                            MessageKind::AuctionFallback,
                            round,
                            Some(city.id),
                        );
                        fallback_cities.push(city.id);
                    }
                }
            }
        }

        let revenue: f64 = winning_bids.iter().map(|b| b.amount).sum();
        let agents: Vec<Agent> = bidders.into_iter().map(|b| b.agent).collect();

        info!(
            strategy = ?self.strategy,
            cities = cities.len(),
            revenue = revenue,
            fallback = fallback_cities.len(),
            "Auction complete"
        );

        Allocation {
            partition: Partition::from_agents(&agents),
            agents,
            events,
            nonconvergence: Vec::new(),
            details: AllocationDetails::Auction(AuctionSummary {
                strategy: self.strategy,
                revenue,
                winning_bids,
                fallback_cities,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::cities_from_coords;

    fn auction(budget: f64, strategy: AuctionStrategy) -> SequentialAuction {
        SequentialAuction::new(&AllocationConfig {
            agent_budget: budget,
            auction_strategy: strategy,
            ..Default::default()
        })
    }

    fn summary(allocation: &Allocation) -> &AuctionSummary {
        match &allocation.details {
            AllocationDetails::Auction(summary) => summary,
            other => panic!("unexpected details {other:?}"),
        }
    }

    #[test]
    fn test_highest_bid_wins() {
        let cities = cities_from_coords(&[(0.0, 0.0)]);
        let starts = [Point::new(0.0, 0.0), Point::new(10.0, 0.0)];
        let allocation = auction(1000.0, AuctionStrategy::Sequential).allocate(&cities, &starts);

        assert_eq!(allocation.partition.owner_of(CityId(0)), Some(AgentId(1)));
        let summary = summary(&allocation);
        assert_eq!(summary.winning_bids[0].amount, 10.0);
        assert_eq!(summary.revenue, 10.0);
        assert_eq!(allocation.agents[1].budget(), Some(990.0));
    }

    #[test]
    fn test_tie_goes_to_lowest_agent() {
        let cities = cities_from_coords(&[(5.0, 0.0)]);
        let starts = [Point::new(0.0, 0.0), Point::new(10.0, 0.0)];
        let allocation = auction(1000.0, AuctionStrategy::Sequential).allocate(&cities, &starts);
        assert_eq!(allocation.partition.owner_of(CityId(0)), Some(AgentId(0)));
    }

    #[test]
    fn test_budget_excludes_expensive_bids() {
        let cities = cities_from_coords(&[(0.0, 0.0)]);
        let starts = [Point::new(0.0, 0.0), Point::new(10.0, 0.0)];
        let allocation = auction(5.0, AuctionStrategy::Sequential).allocate(&cities, &starts);

        assert_eq!(allocation.partition.owner_of(CityId(0)), Some(AgentId(0)));
        assert_eq!(allocation.events.count(MessageKind::Bid), 1);
        assert_eq!(summary(&allocation).revenue, 0.0);
    }

    #[test]
    fn test_unaffordable_city_falls_back_to_cheapest_insertion() {
        let cities = cities_from_coords(&[(10.0, 0.0)]);
        let starts = [Point::new(0.0, 0.0), Point::new(8.0, 0.0)];
        let allocation = auction(1.0, AuctionStrategy::Sequential).allocate(&cities, &starts);

        assert_eq!(allocation.partition.owner_of(CityId(0)), Some(AgentId(1)));
        assert_eq!(allocation.events.count(MessageKind::AuctionFallback), 1);
        assert_eq!(allocation.events.count(MessageKind::Award), 0);
        let summary = summary(&allocation);
        assert_eq!(summary.fallback_cities, vec![CityId(0)]);
        assert_eq!(summary.revenue, 0.0);
        assert_eq!(allocation.agents[1].budget(), Some(1.0));
    }

    #[test]
    fn test_revenue_matches_ledgers() {
        let cities = cities_from_coords(&[
            (3.0, 4.0),
            (10.0, 10.0),
            (20.0, 5.0),
            (7.0, 30.0),
            (40.0, 40.0),
            (12.0, 18.0),
        ]);
        let starts = [Point::new(0.0, 0.0), Point::new(40.0, 40.0)];
        for strategy in [AuctionStrategy::Sequential, AuctionStrategy::Batch] {
            let allocation = auction(1000.0, strategy).allocate(&cities, &starts);
            assert!(allocation.partition.verify(&cities).is_ok());

            let ledger_total: f64 = allocation
                .agents
                .iter()
                .flat_map(|a| a.ledger())
                .map(|entry| entry.price)
                .sum();
            let summary = summary(&allocation);
            assert!((summary.revenue - ledger_total).abs() < 1e-9);
            assert!(summary.revenue >= 0.0);
            assert_eq!(
                allocation.events.count(MessageKind::Award),
                summary.winning_bids.len()
            );
        }
    }

    #[test]
    fn test_zero_budget_never_gains_from_collinear_insertion() {
        // (1, 1) sits on the edge between (0, 0) and (4, 4).
        let cities = cities_from_coords(&[(0.0, 0.0), (4.0, 4.0), (1.0, 1.0)]);
        let starts = [Point::new(0.0, 0.0)];
        for strategy in [AuctionStrategy::Sequential, AuctionStrategy::Batch] {
            let allocation = auction(0.0, strategy).allocate(&cities, &starts);
            assert!(allocation.partition.verify(&cities).is_ok());

            let summary = summary(&allocation);
            assert!(summary.winning_bids.iter().all(|bid| bid.amount >= 0.0));
            assert_eq!(summary.fallback_cities, vec![CityId(1)]);
            assert_eq!(summary.revenue, 0.0);
            assert_eq!(allocation.agents[0].budget(), Some(0.0));
        }
    }

    #[test]
    fn test_batch_with_one_bidder_matches_sequential() {
        let cities = cities_from_coords(&[(1.0, 1.0), (5.0, 2.0), (3.0, 8.0)]);
        let starts = [Point::new(0.0, 0.0)];
        let sequential = auction(1000.0, AuctionStrategy::Sequential).allocate(&cities, &starts);
        let batch = auction(1000.0, AuctionStrategy::Batch).allocate(&cities, &starts);
        assert_eq!(sequential.partition, batch.partition);
        assert_eq!(summary(&sequential).revenue, summary(&batch).revenue);
    }
}
