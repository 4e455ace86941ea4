//! Route construction and improvement.
//!
//! Every architecture hands each agent's final city set to the same
//! [`RouteOptimizer`]: a nearest-neighbour tour from the agent's start,
//! improved by 2-opt until a full pass finds nothing or the pass cap is hit.
//! Tours are index arrays into one coordinate arena so the hot loops never
//! allocate.

use serde::{Deserialize, Serialize};

use crate::config::{AllocationConfig, TourClosure};
use crate::geometry::{City, CityId, Point};

/// Minimum gain for a 2-opt move to count as an improvement.
const IMPROVEMENT_EPSILON: f64 = 1e-9;

/// An agent's visiting order and its closed-tour length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub start: Point,
    pub cities: Vec<CityId>,
    pub length: f64,
}

impl Route {
    /// Zero-length route for an agent that owns nothing.
    pub fn degenerate(start: Point) -> Self {
        Self {
            start,
            cities: Vec::new(),
            length: 0.0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.cities.is_empty()
    }
}

/// Output of [`RouteOptimizer::optimize`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizedRoute {
    pub route: Route,
    /// Length of the nearest-neighbour construction before 2-opt
    pub nearest_neighbor_length: f64,
    /// Full 2-opt passes performed
    pub passes: usize,
    /// False when the pass cap stopped a still-improving search
    pub converged: bool,
}

/// Nearest-neighbour + 2-opt tour builder.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RouteOptimizer {
    max_passes: usize,
    closure: TourClosure,
}

impl RouteOptimizer {
    pub fn new(max_passes: usize, closure: TourClosure) -> Self {
        Self {
            max_passes,
            closure,
        }
    }

    pub fn from_config(config: &AllocationConfig) -> Self {
        Self::new(config.twoopt_max_iterations, config.tour_closure)
    }

    /// Build and improve a tour over `cities` entered from `start`.
    ///
    /// The result depends only on the arguments: cities are ordered by id
    /// before construction, so input order does not matter.
    pub fn optimize(&self, start: Point, cities: &[City]) -> OptimizedRoute {
        if cities.is_empty() {
            return OptimizedRoute {
                route: Route::degenerate(start),
                nearest_neighbor_length: 0.0,
                passes: 0,
                converged: true,
            };
        }

        let mut sorted: Vec<&City> = cities.iter().collect();
        sorted.sort_by_key(|c| c.id);

        let depot = self.closure == TourClosure::DepotLoop;
        let mut points = Vec::with_capacity(sorted.len() + usize::from(depot));
        if depot {
            points.push(start);
        }
        points.extend(sorted.iter().map(|c| c.location));

        let mut tour = nearest_neighbor(&points, start, depot);
        let nearest_neighbor_length = tour_length(&points, &tour);
        let (passes, converged) = two_opt(&points, &mut tour, self.max_passes);
        let length = tour_length(&points, &tour);

        let offset = usize::from(depot);
        let ids = tour
            .iter()
            .filter(|&&node| node >= offset)
            .map(|&node| sorted[node - offset].id)
            .collect();

        OptimizedRoute {
            route: Route {
                start,
                cities: ids,
                length,
            },
            nearest_neighbor_length,
            passes,
            converged,
        }
    }
}

/// Greedy construction. With a depot, node 0 is the depot and is fixed first.
/// Ties go to the lowest node index, i.e. the lowest city id.
fn nearest_neighbor(points: &[Point], start: Point, depot: bool) -> Vec<usize> {
    let n = points.len();
    let mut visited = vec![false; n];
    let mut tour = Vec::with_capacity(n);
    if depot {
        visited[0] = true;
        tour.push(0);
    }

    let mut current = start;
    while tour.len() < n {
        let mut best: Option<(usize, f64)> = None;
        for (node, point) in points.iter().enumerate() {
            if visited[node] {
                continue;
            }
            let d = current.distance(point);
            if best.map_or(true, |(_, bd)| d < bd) {
                best = Some((node, d));
            }
        }
        let Some((next, _)) = best else { break };
        visited[next] = true;
        tour.push(next);
        current = points[next];
    }
    tour
}

/// Closed-cycle length of `tour` over `points`.
pub(crate) fn tour_length(points: &[Point], tour: &[usize]) -> f64 {
    if tour.len() < 2 {
        return 0.0;
    }
    let closing = points[tour[tour.len() - 1]].distance(&points[tour[0]]);
    tour.windows(2)
        .map(|w| points[w[0]].distance(&points[w[1]]))
        .sum::<f64>()
        + closing
}

/// First-improvement 2-opt on a closed tour. `tour[0]` never moves.
///
/// Returns the passes performed and whether the last pass found no move.
pub(crate) fn two_opt(points: &[Point], tour: &mut [usize], max_passes: usize) -> (usize, bool) {
    let n = tour.len();
    // Fewer than four nodes admit no pair of non-adjacent edges.
    if n < 4 {
        return (0, true);
    }

    let dist = |a: usize, b: usize| points[a].distance(&points[b]);
    let mut passes = 0;
    loop {
        if passes >= max_passes {
            return (passes, false);
        }
        passes += 1;

        let mut improved = false;
        for i in 0..n - 2 {
            for j in i + 2..n {
                // Edges (n-1, 0) and (0, 1) share node 0.
                if i == 0 && j == n - 1 {
                    continue;
                }
                let (a, b) = (tour[i], tour[i + 1]);
                let (c, d) = (tour[j], tour[(j + 1) % n]);
                let delta = dist(a, c) + dist(b, d) - dist(a, b) - dist(c, d);
                if delta < -IMPROVEMENT_EPSILON {
                    tour[i + 1..=j].reverse();
                    improved = true;
                }
            }
        }

        if !improved {
            return (passes, true);
        }
    }
}

/// Where and at what cost a city would enter an existing tour.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Insertion {
    /// Added tour length
    pub cost: f64,
    /// Index in the owned-city tour at which to insert
    pub position: usize,
}

/// Cheapest single insertion of `candidate` into the closed tour `tour`.
///
/// O(tour length); no re-optimization. With [`TourClosure::DepotLoop`] the
/// start is part of the cycle. An empty cycle costs nothing to enter.
pub fn cheapest_insertion(
    start: Point,
    tour: &[Point],
    candidate: Point,
    closure: TourClosure,
) -> Insertion {
    let depot = closure == TourClosure::DepotLoop;
    let node = |k: usize| -> Point {
        match (depot, k) {
            (true, 0) => start,
            (true, k) => tour[k - 1],
            (false, k) => tour[k],
        }
    };
    let m = tour.len() + usize::from(depot);
    if m == 0 {
        return Insertion {
            cost: 0.0,
            position: 0,
        };
    }

    let mut best = Insertion {
        cost: f64::INFINITY,
        position: 0,
    };
    for k in 0..m {
        let (a, b) = (node(k), node((k + 1) % m));
        // Collinear points leave a rounding residue that can dip below zero.
        let cost = (a.distance(&candidate) + candidate.distance(&b) - a.distance(&b)).max(0.0);
        if cost < best.cost {
            best = Insertion {
                cost,
                position: if depot { k } else { k + 1 },
            };
        }
    }
    best
}
