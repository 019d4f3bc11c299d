//! In-memory host-desk store.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tracing::debug;

use maitre_core::{HostDeskStats, PartyId, PartyServiceState, SeatStatus, Version};
use maitre_traits::error::HostDeskError;
use maitre_traits::storage::HostDeskStore;

/// In-memory [`HostDeskStore`].
///
/// The `(stats, per-party states)` pair lives under one mutex; every trait
/// operation mutates both sides in a single critical section, which is what
/// keeps the capacity invariant intact across arbitrary interleavings.
pub struct MemoryHostDeskStore {
    total_capacity: u32,
    inner: Mutex<DeskInner>,
}

#[derive(Default)]
struct DeskInner {
    stats: HostDeskStats,
    states: HashMap<PartyId, PartyServiceState>,
}

impl MemoryHostDeskStore {
    /// Create a store for a desk with `total_capacity` seats.
    pub fn new(total_capacity: u32) -> Self {
        Self {
            total_capacity,
            inner: Mutex::new(DeskInner::default()),
        }
    }
}

#[async_trait]
impl HostDeskStore for MemoryHostDeskStore {
    fn total_capacity(&self) -> u32 {
        self.total_capacity
    }

    async fn stats(&self) -> Result<HostDeskStats, HostDeskError> {
        let inner = self.inner.lock();
        Ok(inner.stats)
    }

    async fn get_party_state(
        &self,
        party_id: &PartyId,
    ) -> Result<Option<PartyServiceState>, HostDeskError> {
        let inner = self.inner.lock();
        Ok(inner.states.get(party_id).cloned())
    }

    async fn create_party_state(
        &self,
        state: PartyServiceState,
        expected: Option<Version>,
    ) -> Result<(), HostDeskError> {
        let mut inner = self.inner.lock();

        if inner.states.contains_key(&state.party_id) {
            return Err(HostDeskError::AlreadyExists(state.party_id));
        }

        if let Some(expected) = expected {
            if expected != inner.stats.version {
                return Err(HostDeskError::VersionMismatch {
                    expected,
                    actual: inner.stats.version,
                });
            }
        }

        let free = inner.stats.free(self.total_capacity);
        if free < state.seats {
            return Err(HostDeskError::InsufficientCapacity {
                requested: state.seats,
                free,
            });
        }

        match state.status {
            SeatStatus::Preserved => inner.stats.preserved += state.seats,
            SeatStatus::Occupied => inner.stats.occupied += state.seats,
        }
        inner.stats.version = inner.stats.version.next();

        debug!(
            party_id = %state.party_id,
            seats = state.seats,
            status = ?state.status,
            version = %inner.stats.version,
            "party service state created"
        );
        inner.states.insert(state.party_id.clone(), state);
        Ok(())
    }

    async fn release_preserved(&self, party_id: &PartyId) -> Result<u32, HostDeskError> {
        let mut inner = self.inner.lock();

        let state = inner
            .states
            .get(party_id)
            .ok_or_else(|| HostDeskError::NotFound(party_id.clone()))?;
        if !state.is_preserved() {
            return Err(HostDeskError::NoPreservedSeats(party_id.clone()));
        }

        let seats = state.seats;
        inner.states.remove(party_id);
        inner.stats.preserved -= seats;
        inner.stats.version = inner.stats.version.next();

        debug!(party_id = %party_id, seats, "preserved seats released");
        Ok(seats)
    }

    async fn transfer_to_occupied(&self, party_id: &PartyId) -> Result<(), HostDeskError> {
        let mut inner = self.inner.lock();

        let state = inner
            .states
            .get_mut(party_id)
            .ok_or_else(|| HostDeskError::NotFound(party_id.clone()))?;
        if !state.is_preserved() {
            return Err(HostDeskError::NoPreservedSeats(party_id.clone()));
        }

        let seats = state.seats;
        state.status = SeatStatus::Occupied;
        state.checked_in_at = Some(Utc::now());
        inner.stats.preserved -= seats;
        inner.stats.occupied += seats;
        inner.stats.version = inner.stats.version.next();

        debug!(party_id = %party_id, seats, "seats transferred to occupied");
        Ok(())
    }

    async fn end_party_state(&self, party_id: &PartyId) -> Result<u32, HostDeskError> {
        let mut inner = self.inner.lock();

        let state = inner
            .states
            .remove(party_id)
            .ok_or_else(|| HostDeskError::NotFound(party_id.clone()))?;

        match state.status {
            SeatStatus::Occupied => inner.stats.occupied -= state.seats,
            SeatStatus::Preserved => inner.stats.preserved -= state.seats,
        }
        inner.stats.version = inner.stats.version.next();

        debug!(party_id = %party_id, seats = state.seats, "party service ended");
        Ok(state.seats)
    }
}
