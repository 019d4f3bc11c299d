//! Host-desk seat state types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{PartyId, Version};

/// Status of the seats held for a party at the host desk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeatStatus {
    /// Capacity held for a named party that has not yet checked in.
    Preserved,
    /// Capacity held by a party currently being served.
    Occupied,
}

/// Host-desk record of a seated or about-to-be-seated party.
///
/// At most one state exists per party id. `Preserved -> Occupied` is the
/// only forward transition; a preserved state is deleted on release and an
/// occupied state is deleted on service completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartyServiceState {
    /// Party this state belongs to.
    pub party_id: PartyId,
    /// Whether the seats are preserved or occupied.
    pub status: SeatStatus,
    /// Number of seats held.
    pub seats: u32,
    /// When the seats were first held.
    pub preserved_at: DateTime<Utc>,
    /// When the party checked in, if it has.
    pub checked_in_at: Option<DateTime<Utc>>,
}

impl PartyServiceState {
    /// State for seats held ahead of check-in.
    pub fn preserve(party_id: PartyId, seats: u32) -> Self {
        Self {
            party_id,
            status: SeatStatus::Preserved,
            seats,
            preserved_at: Utc::now(),
            checked_in_at: None,
        }
    }

    /// State for a party seated without a ready phase.
    pub fn serve_immediately(party_id: PartyId, seats: u32) -> Self {
        let now = Utc::now();
        Self {
            party_id,
            status: SeatStatus::Occupied,
            seats,
            preserved_at: now,
            checked_in_at: Some(now),
        }
    }

    /// Whether the seats are still only preserved.
    pub fn is_preserved(&self) -> bool {
        self.status == SeatStatus::Preserved
    }

    /// Whether the party occupies its seats.
    pub fn is_occupied(&self) -> bool {
        self.status == SeatStatus::Occupied
    }
}

/// Aggregate host-desk capacity counters.
///
/// Invariant: `occupied + preserved` never exceeds the desk's total
/// capacity, and every mutation of either counter bumps `version` by
/// exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HostDeskStats {
    /// Seats held by parties currently being served.
    pub occupied: u32,
    /// Seats held for parties that have not yet checked in.
    pub preserved: u32,
    /// Optimistic-lock version of the counters.
    pub version: Version,
}

impl HostDeskStats {
    /// Seats currently unavailable to new parties.
    pub fn seats_in_use(&self) -> u32 {
        self.occupied + self.preserved
    }

    /// Free seats given a total capacity.
    pub fn free(&self, total_capacity: u32) -> u32 {
        total_capacity.saturating_sub(self.seats_in_use())
    }
}
