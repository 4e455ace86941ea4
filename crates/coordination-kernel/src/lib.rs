//! Coordination Kernel: partitioning cities among agents and routing them
//!
//! Three coordination architectures split a set of cities among agents that
//! each start from their own depot:
//!
//! - **Hierarchical**: a leader clusters the cities (k-means) and hands one
//!   cluster to each agent through a minimum-cost matching
//! - **Flat**: peers claim nearby cities round by round; conflicts go to the
//!   least-loaded claimant
//! - **Auction**: cities are sold one at a time to the highest bidder, bids
//!   being marginal tour costs
//!
//! Every agent's share is then routed with nearest neighbour plus 2-opt, and
//! [`evaluate::run`] reports distance, communication and load-balance metrics.

pub mod allocators;
pub mod cluster;
pub mod config;
pub mod error;
pub mod evaluate;
pub mod events;
pub mod geometry;
pub mod matching;
pub mod partition;
pub mod route;

pub use config::{AllocationConfig, AuctionStrategy, TourClosure};
pub use error::{AllocationError, ConfigurationError};
pub use evaluate::{run, validate_input, AgentRoute, EvaluationResult};
pub use events::{CommunicationEvent, EventLog, MessageKind, NonconvergenceEvent};
pub use geometry::{cities_from_coords, AgentId, City, CityId, Point};
pub use partition::{Agent, Allocation, AllocationDetails, Allocator, Architecture, Partition};
pub use route::{OptimizedRoute, Route, RouteOptimizer};
