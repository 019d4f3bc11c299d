//! Party and queue types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::ids::PartyId;

/// Lifecycle status of a party.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PartyStatus {
    /// In the queue without seats held for it.
    #[default]
    Waiting,
    /// Seats are held; the party may approach the desk.
    Ready,
    /// Currently being served.
    Serving,
}

impl PartyStatus {
    /// Whether the waitlist may move a party from `self` to `next`.
    ///
    /// The only forward transition the waitlist performs is
    /// `Waiting -> Ready`; `Ready -> Ready` is an idempotent no-op.
    pub fn can_become(self, next: PartyStatus) -> bool {
        matches!(
            (self, next),
            (PartyStatus::Waiting, PartyStatus::Ready) | (PartyStatus::Ready, PartyStatus::Ready)
        )
    }

    /// Stable wire name, matching the serde representation.
    pub fn as_str(self) -> &'static str {
        match self {
            PartyStatus::Waiting => "waiting",
            PartyStatus::Ready => "ready",
            PartyStatus::Serving => "serving",
        }
    }
}

/// A group of guests arriving together, treated as one admission unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Party {
    /// Process-unique identifier.
    pub id: PartyId,
    /// Display name.
    pub name: String,
    /// Number of seats the party needs.
    pub size: u32,
    /// Current lifecycle status.
    pub status: PartyStatus,
    /// Estimated time needed to serve this party once seated.
    pub estimated_service_time: Duration,
}

impl Party {
    /// Create a new party in `Waiting` status with no estimate yet.
    pub fn new(id: PartyId, name: impl Into<String>, size: u32) -> Self {
        Self {
            id,
            name: name.into(),
            size,
            status: PartyStatus::Waiting,
            estimated_service_time: Duration::ZERO,
        }
    }
}

/// A party currently in the waitlist queue, augmented with queue metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedParty {
    /// The underlying party record.
    pub party: Party,
    /// Zero-based queue position. Derived from queue order, never stored.
    pub position: usize,
    /// When the party joined the queue.
    pub joined_at: DateTime<Utc>,
    /// Cumulative estimated service time of this party and every party
    /// ahead of it, minus service time already accrued by departed heads.
    /// Equivalently: time until this party's own service should end.
    pub estimated_end_of_service: Duration,
}

impl QueuedParty {
    /// The party's id.
    pub fn id(&self) -> &PartyId {
        &self.party.id
    }

    /// The party's size in seats.
    pub fn size(&self) -> u32 {
        self.party.size
    }

    /// The party's current status.
    pub fn status(&self) -> PartyStatus {
        self.party.status
    }

    /// Time this party still expects to wait before being served.
    ///
    /// Zero at the head of the queue.
    pub fn remaining_wait(&self) -> Duration {
        if self.position == 0 {
            return Duration::ZERO;
        }
        self.estimated_end_of_service
            .saturating_sub(self.party.estimated_service_time)
    }
}

/// Aggregate snapshot of the waitlist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QueueStatus {
    /// Total parties in the queue, regardless of status.
    pub total_parties: usize,
    /// Parties still in `Waiting` status (excludes `Ready`).
    pub waiting_parties: usize,
    /// Estimated wait time for a hypothetical new arrival.
    pub current_wait_time: Duration,
}

impl QueueStatus {
    /// Whether the queue holds no parties at all.
    pub fn is_empty(&self) -> bool {
        self.total_parties == 0
    }
}
