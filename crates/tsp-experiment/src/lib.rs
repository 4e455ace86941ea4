//! TSP Coordination Experiment: comparing how agent teams split a tour.
//!
//! This crate drives the coordination kernel over generated scenarios:
//! - Seeded scenario presets (cities plus one depot per agent)
//! - Single runs and concurrent grids (scenarios × architectures × trials)
//! - Summaries with standard errors and a per-scenario architecture comparison

pub mod experiment;
pub mod generator;
pub mod results;
