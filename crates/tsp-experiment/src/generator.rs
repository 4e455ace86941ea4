//! Scenario generator: seeded random cities and agent depots.
//!
//! Coordinates are integers in `[0, grid_size]` drawn from one ChaCha8 stream,
//! cities first and depots after, so a seed pins down the whole scenario on
//! every platform.

use std::fmt;
use std::str::FromStr;

use anyhow::{ensure, Result};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use coordination_kernel::{City, CityId, Point};

/// Parameters of one scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioConfig {
    pub name: String,
    /// Number of cities
    pub cities: usize,
    /// Number of agents (one depot each)
    pub agents: usize,
    /// Coordinates fall in `[0, grid_size]` on both axes
    pub grid_size: u32,
    pub seed: u64,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Preset::SmallClustered.config()
    }
}

impl ScenarioConfig {
    /// The same scenario with the seed shifted for a repeated trial.
    ///
    /// Trial 0 keeps the configured seed.
    pub fn for_trial(&self, trial: usize) -> Self {
        Self {
            seed: self.seed.wrapping_add(trial as u64),
            ..self.clone()
        }
    }
}

/// A generated scenario, ready to hand to an allocator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub config: ScenarioConfig,
    pub cities: Vec<City>,
    /// Agent start coordinates, in agent order
    pub starts: Vec<Point>,
}

/// Scenario generator.
pub struct ScenarioGenerator {
    config: ScenarioConfig,
}

impl ScenarioGenerator {
    pub fn new(config: ScenarioConfig) -> Self {
        Self { config }
    }

    fn random_point(&self, rng: &mut impl Rng) -> Point {
        let x = rng.random_range(0..=self.config.grid_size);
        let y = rng.random_range(0..=self.config.grid_size);
        Point::new(f64::from(x), f64::from(y))
    }

    /// Generate the scenario. Same config, same scenario.
    pub fn generate(&self) -> Result<Scenario> {
        ensure!(self.config.cities > 0, "scenario needs at least one city");
        ensure!(self.config.agents > 0, "scenario needs at least one agent");

        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);
        let cities = (0..self.config.cities)
            .map(|i| City {
                id: CityId(i as u32),
                location: self.random_point(&mut rng),
            })
            .collect();
        let starts = (0..self.config.agents)
            .map(|_| self.random_point(&mut rng))
            .collect();

        Ok(Scenario {
            config: self.config.clone(),
            cities,
            starts,
        })
    }
}

/// Named scenario presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    /// 8 cities, 3 agents, seed 42
    SmallClustered,
    /// 12 cities, 4 agents, seed 123
    MediumMixed,
    /// 15 cities, 4 agents, seed 456
    MediumRandom,
}

impl Preset {
    pub fn all() -> Vec<Self> {
        vec![Self::SmallClustered, Self::MediumMixed, Self::MediumRandom]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::SmallClustered => "small_clustered",
            Self::MediumMixed => "medium_mixed",
            Self::MediumRandom => "medium_random",
        }
    }

    /// Get the scenario config for this preset.
    pub fn config(self) -> ScenarioConfig {
        let (cities, agents, seed) = match self {
            Self::SmallClustered => (8, 3, 42),
            Self::MediumMixed => (12, 4, 123),
            Self::MediumRandom => (15, 4, 456),
        };
        ScenarioConfig {
            name: self.name().to_string(),
            cities,
            agents,
            grid_size: 100,
            seed,
        }
    }
}

impl FromStr for Preset {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "small_clustered" | "small" => Ok(Self::SmallClustered),
            "medium_mixed" | "mixed" => Ok(Self::MediumMixed),
            "medium_random" | "random" => Ok(Self::MediumRandom),
            _ => anyhow::bail!(
                "Unknown scenario: {}. Valid: small_clustered, medium_mixed, medium_random",
                s
            ),
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Scenario {} ({} cities, {} agents, grid {}, seed {})",
            self.config.name,
            self.cities.len(),
            self.starts.len(),
            self.config.grid_size,
            self.config.seed
        )?;
        writeln!(f, "Cities:")?;
        for city in &self.cities {
            writeln!(f, "  {:>3}: ({:>5.1}, {:>5.1})", city.id.0, city.location.x, city.location.y)?;
        }
        writeln!(f, "Depots:")?;
        for (agent, start) in self.starts.iter().enumerate() {
            writeln!(f, "  agent-{}: ({:>5.1}, {:>5.1})", agent, start.x, start.y)?;
        }
        Ok(())
    }
}
