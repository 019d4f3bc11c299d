//! Host desk service.
//!
//! A bounded-capacity seat allocator over a [`HostDeskStore`]. The store
//! owns the atomic `(stats, per-party state)` mutations; this layer owns
//! the operation contract: optimistic preserves, check-in dispatch, service
//! timers, and event publication. Events are published only after the store
//! mutation committed, never while any lock is held.

use std::sync::Arc;

use tracing::{debug, error, warn};

use maitre_core::{Party, PartyId, PartyServiceState, PartyStatus, QueuedParty, Version};
use maitre_traits::error::HostDeskError;
use maitre_traits::storage::HostDeskStore;

use crate::bus::InProcessEventBus;
use crate::events::{PartyServiced, SeatsPreserved};
use crate::timer::ServiceTimer;

/// Fixed-capacity host desk.
pub struct FixedCapacityHostDesk {
    store: Arc<dyn HostDeskStore>,
    bus: Arc<InProcessEventBus>,
    timer: Arc<ServiceTimer>,
}

impl FixedCapacityHostDesk {
    /// Create a host desk over a store, bus, and service timer.
    pub fn new(
        store: Arc<dyn HostDeskStore>,
        bus: Arc<InProcessEventBus>,
        timer: Arc<ServiceTimer>,
    ) -> Arc<Self> {
        bus.registry().register::<SeatsPreserved>();
        bus.registry().register::<PartyServiced>();
        Arc::new(Self { store, bus, timer })
    }

    /// Total seats the desk can hold.
    pub fn total_capacity(&self) -> u32 {
        self.store.total_capacity()
    }

    /// Free seats and the version to use for optimistic mutations.
    pub async fn current_capacity(&self) -> Result<(u32, Version), HostDeskError> {
        let stats = self.store.stats().await?;
        Ok((stats.free(self.store.total_capacity()), stats.version))
    }

    /// Hold seats for a party ahead of check-in.
    ///
    /// With `expected` set this is a compare-and-set against the stats
    /// version; `None` skips the check (the caller already holds the
    /// decision).
    pub async fn preserve_seats(
        &self,
        party_id: &PartyId,
        seats: u32,
        expected: Option<Version>,
    ) -> Result<(), HostDeskError> {
        let state = PartyServiceState::preserve(party_id.clone(), seats);
        self.store.create_party_state(state, expected).await
    }

    /// Give back seats held for a party that never checked in.
    ///
    /// Returns `Ok(false)` when there was nothing to release: the party is
    /// unknown to the desk or its seats are no longer just preserved. Other
    /// failures propagate.
    pub async fn release_preserved_seats(&self, party_id: &PartyId) -> Result<bool, HostDeskError> {
        match self.store.release_preserved(party_id).await {
            Ok(seats) => {
                debug!(party_id = %party_id, seats, "preserved seats released");
                Ok(true)
            }
            Err(HostDeskError::NotFound(_)) => {
                debug!(party_id = %party_id, "release: party has no state at the desk");
                Ok(false)
            }
            Err(HostDeskError::NoPreservedSeats(_)) => {
                debug!(party_id = %party_id, "release: party seats are not preserved");
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    /// Move a party's preserved seats to occupied.
    pub async fn transfer_to_occupied(&self, party_id: &PartyId) -> Result<(), HostDeskError> {
        self.store.transfer_to_occupied(party_id).await
    }

    /// Seat an arriving party without a ready phase.
    ///
    /// One atomic create-and-transfer: the state appears directly as
    /// `Occupied` and the version moves by exactly one. The admission loop
    /// passes its observed version so the mutation stays under the same
    /// optimistic check as a preserve.
    pub async fn serve_immediately(
        &self,
        party: &Party,
        expected: Option<Version>,
    ) -> Result<(), HostDeskError> {
        let state = PartyServiceState::serve_immediately(party.id.clone(), party.size);
        self.store.create_party_state(state, expected).await
    }

    /// Confirm a party's arrival at the desk and start its service clock.
    ///
    /// Dispatches on the party's status: a `Ready` party has preserved
    /// seats to transfer; a `Serving` party already occupies its seats and
    /// only needs the timer armed. Anything else is an invalid state.
    pub async fn check_in(self: &Arc<Self>, party: &Party) -> Result<(), HostDeskError> {
        match party.status {
            PartyStatus::Ready => {
                self.store.transfer_to_occupied(&party.id).await?;
            }
            PartyStatus::Serving => {
                if !self.has_party_occupied_seat(&party.id).await {
                    return Err(HostDeskError::InvalidState(party.id.clone()));
                }
            }
            PartyStatus::Waiting => {
                return Err(HostDeskError::InvalidState(party.id.clone()));
            }
        }

        self.arm_service_timer(party);
        debug!(party_id = %party.id, status = ?party.status, "party checked in");
        Ok(())
    }

    /// End a party's service: free its seats and announce the vacancy.
    pub async fn service_complete(&self, party_id: &PartyId) -> Result<(), HostDeskError> {
        let seats = self.store.end_party_state(party_id).await?;
        self.timer.cancel(party_id);

        if let Err(err) = self.bus.publish(&PartyServiced {
            party_id: party_id.clone(),
        }) {
            error!(party_id = %party_id, %err, "failed to publish service completion");
        }
        debug!(party_id = %party_id, seats, "party service complete");
        Ok(())
    }

    /// Hold seats for the next queued party and announce it.
    ///
    /// The seat manager already decided this party fits, so the preserve
    /// skips the version check; the store's own capacity guard still
    /// applies.
    pub async fn notify_party_ready(&self, party: &QueuedParty) -> Result<(), HostDeskError> {
        self.preserve_seats(party.id(), party.size(), None).await?;

        if let Err(err) = self.bus.publish(&SeatsPreserved {
            party_id: party.id().clone(),
        }) {
            error!(party_id = %party.id(), %err, "failed to publish seats preserved");
        }
        debug!(party_id = %party.id(), seats = party.size(), "seats preserved, party notified");
        Ok(())
    }

    /// Whether a party currently occupies seats at the desk.
    pub async fn has_party_occupied_seat(&self, party_id: &PartyId) -> bool {
        match self.store.get_party_state(party_id).await {
            Ok(Some(state)) => state.is_occupied(),
            Ok(None) => false,
            Err(err) => {
                warn!(party_id = %party_id, %err, "could not read party state");
                false
            }
        }
    }

    fn arm_service_timer(self: &Arc<Self>, party: &Party) {
        let desk = Arc::downgrade(self);
        self.timer.start_tracking(party, move |party_id| async move {
            let Some(desk) = desk.upgrade() else {
                return;
            };
            if let Err(err) = desk.service_complete(&party_id).await {
                error!(party_id = %party_id, %err, "service completion failed on timer fire");
            }
        });
    }
}
