//! The three coordination architectures.
//!
//! Each one implements [`crate::partition::Allocator`] and is otherwise
//! independent of the others.

pub mod auction;
pub mod hierarchical;
pub mod negotiation;

pub use auction::{AuctionSummary, Bid, SequentialAuction};
pub use hierarchical::{HierarchicalLeader, HierarchicalSummary};
pub use negotiation::{
    resolve_round, Claim, NegotiationState, NegotiationSummary, PeerNegotiation, RoundResolution,
};
