//! Communication events exchanged during allocation.
//!
//! Events are bookkeeping only: the protocols pass state directly, and every
//! logical message they would have sent is recorded here so runs can be
//! compared by communication overhead.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::geometry::{AgentId, CityId};

/// Who sent a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum Participant {
    Agent(AgentId),
    /// Hierarchical leader
    Leader,
    /// Flat-negotiation conflict mediator
    Mediator,
    Auctioneer,
}

/// Who a message was addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum Recipient {
    Agent(AgentId),
    Coordinator,
    Broadcast,
}

/// Message-kind tag used for counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Leader tells an agent its final city set
    AssignmentBroadcast,
    /// Agent claims an unassigned city
    Claim,
    /// Claim granted
    Grant,
    /// Claim denied (lost a conflict)
    Deny,
    /// Residual city assigned after negotiation rounds ran out
    FallbackAssignment,
    /// Auction bid submission
    Bid,
    /// Auction award announcement
    Award,
    /// No bidder could afford the city; assigned by insertion cost
    AuctionFallback,
}

/// One logical message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommunicationEvent {
    pub sender: Participant,
    pub receiver: Recipient,
    pub kind: MessageKind,
    /// Logical round: negotiation round, auction index, or 0 for the leader
    pub round: usize,
    /// City the message concerns, when it concerns one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<CityId>,
}

/// Append-only log of the events of one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventLog {
    events: Vec<CommunicationEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(
        &mut self,
        sender: Participant,
        receiver: Recipient,
        kind: MessageKind,
        round: usize,
        city: Option<CityId>,
    ) {
        self.events.push(CommunicationEvent {
            sender,
            receiver,
            kind,
            round,
            city,
        });
    }

    pub fn events(&self) -> &[CommunicationEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Number of events of the given kind.
    pub fn count(&self, kind: MessageKind) -> usize {
        self.events.iter().filter(|e| e.kind == kind).count()
    }

    /// Event counts keyed by kind. Kinds that never occurred are absent.
    pub fn counts_by_kind(&self) -> BTreeMap<MessageKind, usize> {
        let mut counts = BTreeMap::new();
        for event in &self.events {
            *counts.entry(event.kind).or_insert(0) += 1;
        }
        counts
    }
}

/// An iterative algorithm stopped at its cap instead of converging.
///
/// Not an error: the best state reached is used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "algorithm", rename_all = "snake_case")]
pub enum NonconvergenceEvent {
    KMeans { iterations: usize },
    TwoOpt { agent: AgentId, passes: usize },
}
