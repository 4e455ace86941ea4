//! Property tests over randomly generated scenarios.
//!
//! Properties:
//! - every architecture produces a complete, conflict-free partition
//! - route optimization is deterministic and independent of input order
//! - 2-opt never lengthens the nearest-neighbour tour
//! - auction revenue equals the sum of winning bids and is non-negative

use coordination_kernel::allocators::AuctionSummary;
use coordination_kernel::{
    cities_from_coords, run, AllocationConfig, AllocationDetails, Architecture, AuctionStrategy,
    City, Point, RouteOptimizer, TourClosure,
};
use proptest::prelude::*;

fn arb_coords(max: usize) -> impl Strategy<Value = Vec<(f64, f64)>> {
    prop::collection::vec((0u32..=100, 0u32..=100), 1..=max)
        .prop_map(|v| v.into_iter().map(|(x, y)| (x as f64, y as f64)).collect())
}

fn arb_starts() -> impl Strategy<Value = Vec<Point>> {
    prop::collection::vec((0u32..=100, 0u32..=100), 1..=5).prop_map(|v| {
        v.into_iter()
            .map(|(x, y)| Point::new(x as f64, y as f64))
            .collect()
    })
}

fn arb_architecture() -> impl Strategy<Value = Architecture> {
    prop_oneof![
        Just(Architecture::Hierarchical),
        Just(Architecture::Flat),
        Just(Architecture::Auction),
    ]
}

fn arb_config() -> impl Strategy<Value = AllocationConfig> {
    (
        0usize..=4,
        1usize..=4,
        prop_oneof![Just(AuctionStrategy::Sequential), Just(AuctionStrategy::Batch)],
        prop_oneof![Just(TourClosure::CityCycle), Just(TourClosure::DepotLoop)],
        prop_oneof![Just(0.0), Just(50.0), Just(1000.0)],
    )
        .prop_map(|(rounds, claims, strategy, closure, budget)| AllocationConfig {
            max_negotiation_rounds: rounds,
            claims_per_round: claims,
            auction_strategy: strategy,
            tour_closure: closure,
            agent_budget: budget,
            kmeans_restarts: 3,
            ..Default::default()
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn partition_is_complete(
        coords in arb_coords(20),
        starts in arb_starts(),
        architecture in arb_architecture(),
        config in arb_config(),
    ) {
        let cities = cities_from_coords(&coords);
        let result = run(architecture, &cities, &starts, &config).unwrap();

        let mut routed: Vec<_> = result.routes.iter().flat_map(|r| r.cities.clone()).collect();
        routed.sort();
        let expected: Vec<_> = cities.iter().map(|c| c.id).collect();
        prop_assert_eq!(routed, expected);
        prop_assert_eq!(result.loads.iter().sum::<usize>(), cities.len());
        prop_assert_eq!(result.routes.len(), starts.len());
    }

    #[test]
    fn route_optimizer_is_deterministic(
        coords in arb_coords(12),
        closure in prop_oneof![Just(TourClosure::CityCycle), Just(TourClosure::DepotLoop)],
    ) {
        let cities = cities_from_coords(&coords);
        let mut reversed: Vec<City> = cities.clone();
        reversed.reverse();
        let optimizer = RouteOptimizer::new(1000, closure);
        let start = Point::new(50.0, 50.0);

        let first = optimizer.optimize(start, &cities);
        let second = optimizer.optimize(start, &cities);
        let shuffled = optimizer.optimize(start, &reversed);
        prop_assert_eq!(&first, &second);
        prop_assert_eq!(&first, &shuffled);
    }

    #[test]
    fn two_opt_never_lengthens_tour(
        coords in arb_coords(15),
        closure in prop_oneof![Just(TourClosure::CityCycle), Just(TourClosure::DepotLoop)],
    ) {
        let cities = cities_from_coords(&coords);
        let optimized = RouteOptimizer::new(1000, closure).optimize(Point::new(0.0, 0.0), &cities);
        prop_assert!(optimized.route.length <= optimized.nearest_neighbor_length + 1e-9);
    }

    #[test]
    fn auction_revenue_is_sum_of_winning_bids(
        coords in arb_coords(20),
        starts in arb_starts(),
        config in arb_config(),
    ) {
        let cities = cities_from_coords(&coords);
        let result = run(Architecture::Auction, &cities, &starts, &config).unwrap();
        let AllocationDetails::Auction(AuctionSummary { revenue, winning_bids, fallback_cities, .. }) =
            result.details
        else {
            panic!("auction run returned non-auction details");
        };
        let sum: f64 = winning_bids.iter().map(|b| b.amount).sum();
        prop_assert!((revenue - sum).abs() < 1e-9);
        prop_assert!(revenue >= 0.0);
        prop_assert_eq!(winning_bids.len() + fallback_cities.len(), cities.len());
    }
}
