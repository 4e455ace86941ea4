//! Geometry types: the points, cities and identifiers every allocator works over.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a city, stable for the duration of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CityId(pub u32);

/// Unique identifier for an agent. Agents are numbered from zero in the order
/// their start coordinates were supplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AgentId(pub usize);

impl fmt::Display for CityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "city-{}", self.0)
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "agent-{}", self.0)
    }
}

/// A point in the plane.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance. This is the only metric used anywhere in the crate.
    #[inline]
    pub fn distance(&self, other: &Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    #[inline]
    pub fn squared_distance(&self, other: &Point) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    /// Arithmetic mean of the given points, or `None` when there are none.
    pub fn centroid<'a>(points: impl IntoIterator<Item = &'a Point>) -> Option<Point> {
        let (mut sx, mut sy, mut n) = (0.0, 0.0, 0usize);
        for p in points {
            sx += p.x;
            sy += p.y;
            n += 1;
        }
        (n > 0).then(|| Point::new(sx / n as f64, sy / n as f64))
    }
}

impl From<(f64, f64)> for Point {
    fn from((x, y): (f64, f64)) -> Self {
        Self { x, y }
    }
}

/// A city to be visited. Immutable once generated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct City {
    pub id: CityId,
    pub location: Point,
}

impl City {
    pub fn new(id: u32, x: f64, y: f64) -> Self {
        Self {
            id: CityId(id),
            location: Point::new(x, y),
        }
    }
}

/// Build cities from bare coordinates, numbering them in input order.
pub fn cities_from_coords(coords: &[(f64, f64)]) -> Vec<City> {
    coords
        .iter()
        .enumerate()
        .map(|(i, &(x, y))| City::new(i as u32, x, y))
        .collect()
}
