//! Seeded k-means (Lloyd's algorithm) over city coordinates.

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

use crate::geometry::Point;

/// k-means parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KMeans {
    /// Number of clusters; must be at least 1
    pub k: usize,
    pub seed: u64,
    pub max_iterations: usize,
    pub restarts: usize,
}

/// Result of a k-means fit.
#[derive(Debug, Clone, PartialEq)]
pub struct Clustering {
    /// Cluster index per input point
    pub labels: Vec<usize>,
    /// Centroid per cluster; `None` for a cluster that never had a seed point
    pub centroids: Vec<Option<Point>>,
    /// Lloyd iterations of the winning restart
    pub iterations: usize,
    /// False when the winning restart hit the iteration cap
    pub converged: bool,
    /// Sum of squared point-to-centroid distances
    pub inertia: f64,
}

impl Clustering {
    pub fn members(&self, cluster: usize) -> impl Iterator<Item = usize> + '_ {
        self.labels
            .iter()
            .enumerate()
            .filter(move |(_, &label)| label == cluster)
            .map(|(i, _)| i)
    }

    pub fn sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.centroids.len()];
        for &label in &self.labels {
            sizes[label] += 1;
        }
        sizes
    }

    pub fn empty_clusters(&self) -> usize {
        self.sizes().iter().filter(|&&s| s == 0).count()
    }
}

impl KMeans {
    /// Cluster `points` into `k` groups.
    ///
    /// With no more points than clusters every point gets its own cluster and
    /// the rest stay empty. Otherwise each restart seeds `k` distinct points
    /// drawn from one ChaCha8 stream, and the restart with the lowest inertia
    /// wins (earliest on ties).
    pub fn fit(&self, points: &[Point]) -> Clustering {
        debug_assert!(self.k >= 1, "k-means needs at least one cluster");
        let n = points.len();
        let k = self.k;

        if n <= k {
            let mut centroids: Vec<Option<Point>> = points.iter().copied().map(Some).collect();
            centroids.resize(k, None);
            return Clustering {
                labels: (0..n).collect(),
                centroids,
                iterations: 0,
                converged: true,
                inertia: 0.0,
            };
        }

        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let mut best: Option<Clustering> = None;
        for _ in 0..self.restarts.max(1) {
            let seeds: Vec<Point> = rand::seq::index::sample(&mut rng, n, k)
                .iter()
                .map(|i| points[i])
                .collect();
            let run = lloyd(points, seeds, self.max_iterations);
            if best.as_ref().map_or(true, |b| run.inertia < b.inertia) {
                best = Some(run);
            }
        }
        // At least one restart always runs.
        best.unwrap_or_else(|| lloyd(points, points[..k].to_vec(), self.max_iterations))
    }
}

/// Index of the nearest centroid; ties to the lowest index.
fn nearest_centroid(centroids: &[Point], p: &Point) -> usize {
    let mut best = 0;
    let mut best_d = f64::INFINITY;
    for (c, centroid) in centroids.iter().enumerate() {
        let d = p.squared_distance(centroid);
        if d < best_d {
            best_d = d;
            best = c;
        }
    }
    best
}

fn lloyd(points: &[Point], mut centroids: Vec<Point>, max_iterations: usize) -> Clustering {
    let k = centroids.len();
    let mut labels = vec![usize::MAX; points.len()];
    let mut iterations = 0;
    let mut converged = false;

    while iterations < max_iterations {
        iterations += 1;

        let mut changed = false;
        for (label, p) in labels.iter_mut().zip(points) {
            let c = nearest_centroid(&centroids, p);
            if *label != c {
                *label = c;
                changed = true;
            }
        }
        if !changed {
            converged = true;
            break;
        }

        // Empty clusters keep their previous centroid.
        for (c, centroid) in centroids.iter_mut().enumerate() {
            let members = points
                .iter()
                .zip(&labels)
                .filter(|(_, &l)| l == c)
                .map(|(p, _)| p);
            if let Some(mean) = Point::centroid(members) {
                *centroid = mean;
            }
        }
    }

    // A zero iteration cap still needs one assignment.
    if labels.iter().any(|&l| l == usize::MAX) {
        for (label, p) in labels.iter_mut().zip(points) {
            *label = nearest_centroid(&centroids, p);
        }
    }

    let inertia = labels
        .iter()
        .zip(points)
        .map(|(&l, p)| p.squared_distance(&centroids[l]))
        .sum();

    debug_assert_eq!(centroids.len(), k);
    Clustering {
        labels,
        centroids: centroids.into_iter().map(Some).collect(),
        iterations,
        converged,
        inertia,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_blobs() -> Vec<Point> {
        vec![
            Point::new(0.0, 0.0),
            Point::new(1.0, 0.0),
            Point::new(0.0, 1.0),
            Point::new(50.0, 50.0),
            Point::new(51.0, 50.0),
            Point::new(50.0, 51.0),
        ]
    }

    fn kmeans(k: usize) -> KMeans {
        KMeans {
            k,
            seed: 42,
            max_iterations: 100,
            restarts: 10,
        }
    }

    #[test]
    fn test_separates_obvious_blobs() {
        let clustering = kmeans(2).fit(&two_blobs());
        assert!(clustering.converged);
        let l = &clustering.labels;
        assert_eq!(l[0], l[1]);
        assert_eq!(l[1], l[2]);
        assert_eq!(l[3], l[4]);
        assert_eq!(l[4], l[5]);
        assert_ne!(l[0], l[3]);
        assert_eq!(clustering.sizes(), vec![3, 3]);
    }

    #[test]
    fn test_fit_is_deterministic_for_seed() {
        let points = two_blobs();
        assert_eq!(kmeans(3).fit(&points), kmeans(3).fit(&points));
    }

    #[test]
    fn test_fewer_points_than_clusters() {
        let points = vec![Point::new(1.0, 1.0), Point::new(2.0, 2.0)];
        let clustering = kmeans(4).fit(&points);
        assert_eq!(clustering.labels, vec![0, 1]);
        assert_eq!(clustering.centroids.len(), 4);
        assert!(clustering.centroids[3].is_none());
        assert_eq!(clustering.empty_clusters(), 2);
    }

    #[test]
    fn test_duplicate_coordinates_leave_empty_cluster() {
        let points = vec![Point::new(5.0, 5.0); 4];
        let clustering = kmeans(2).fit(&points);
        assert_eq!(clustering.labels, vec![0, 0, 0, 0]);
        assert_eq!(clustering.empty_clusters(), 1);
        assert_eq!(clustering.inertia, 0.0);
    }

    #[test]
    fn test_iteration_cap_reports_nonconvergence() {
        let clustering = KMeans {
            k: 2,
            seed: 7,
            max_iterations: 1,
            restarts: 1,
        }
        .fit(&two_blobs());
        assert!(!clustering.converged);
        assert_eq!(clustering.iterations, 1);
        assert!(clustering.labels.iter().all(|&l| l < 2));
    }
}
