//! Storage traits for the waitlist and host desk.
//!
//! Both seams demand single-step atomicity: an observer of a store sees the
//! pre-state or the post-state of any mutation, never a partial aggregate.
//! The in-memory implementations get this from one mutex per store; the redb
//! implementations from one write transaction per mutation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use maitre_core::{
    HostDeskStats, Party, PartyId, PartyServiceState, PartyStatus, QueueStatus, QueuedParty,
    Version,
};

use crate::error::{HostDeskError, WaitlistError};

/// One page of a chunked queue scan.
#[derive(Debug, Clone)]
pub struct ScanChunk {
    /// Parties in queue order, starting at the requested cursor.
    pub parties: Vec<QueuedParty>,
    /// Cursor for the next chunk, or `None` when the scan is done.
    pub next_cursor: Option<usize>,
}

/// Durable ordered queue of parties with wait-time accounting.
///
/// The store owns the wait-time algebra:
///
/// - `total_wait_prefix`: running sum of every estimated service time added
///   by [`add_party`](WaitlistStore::add_party), decremented by non-head
///   removals.
/// - per-party prefix sum: value of `total_wait_prefix` at join time.
/// - `total_service_time`: running sum of service times of parties that left
///   from position 0.
/// - `waiting_count`: parties whose status is `Waiting`.
///
/// `estimated_end_of_service` on returned parties is always
/// `prefix_sum - total_service_time`.
#[async_trait]
pub trait WaitlistStore: Send + Sync {
    /// Append a party to the queue.
    ///
    /// Atomically assigns the position (current queue length), records the
    /// prefix sum, and bumps `waiting_count` iff the party joins in
    /// `Waiting` status. Returns the enriched record.
    ///
    /// Fails with [`WaitlistError::AlreadyQueued`] if the id is present.
    async fn add_party(&self, party: QueuedParty) -> Result<QueuedParty, WaitlistError>;

    /// Remove a party from the queue.
    ///
    /// Head removals accrue the party's service time into
    /// `total_service_time`; non-head removals subtract it from the prefix
    /// sum of every party behind. When the queue empties, the aggregate
    /// counters reset. Fails with [`WaitlistError::NotFound`] if absent.
    async fn remove_party(&self, party_id: &PartyId) -> Result<(), WaitlistError>;

    /// Fetch a party with its current position and end-of-service estimate.
    async fn get_party(&self, party_id: &PartyId) -> Result<Option<QueuedParty>, WaitlistError>;

    /// Fetch just the party record, skipping the rank lookup.
    async fn get_party_details(&self, party_id: &PartyId) -> Result<Option<Party>, WaitlistError>;

    /// Whether a party is in the queue.
    async fn has_party(&self, party_id: &PartyId) -> Result<bool, WaitlistError>;

    /// Aggregate queue snapshot.
    async fn queue_status(&self) -> Result<QueueStatus, WaitlistError>;

    /// Read up to `limit` parties in queue order starting at `cursor`.
    ///
    /// Concurrent removals may cause a scan to skip or double-yield at most
    /// one record; consumers tolerate this.
    async fn scan_chunk(&self, cursor: usize, limit: usize) -> Result<ScanChunk, WaitlistError>;

    /// Move a party to a new status.
    ///
    /// `Waiting -> Ready` decrements `waiting_count`; `Ready -> Ready` is a
    /// no-op; anything else fails with
    /// [`WaitlistError::InvalidStatusTransition`].
    async fn update_party_status(
        &self,
        party_id: &PartyId,
        status: PartyStatus,
    ) -> Result<(), WaitlistError>;

    /// Remove every party that joined before `older_than`, through the same
    /// accounting as [`remove_party`](WaitlistStore::remove_party).
    ///
    /// Returns the ids that were purged.
    async fn purge_expired(
        &self,
        older_than: DateTime<Utc>,
    ) -> Result<Vec<PartyId>, WaitlistError>;
}

/// Bounded-capacity seat records under versioned optimistic concurrency.
///
/// Every mutation bumps the stats version by exactly one and enforces
/// `occupied + preserved <= total_capacity` within the same atomic step.
#[async_trait]
pub trait HostDeskStore: Send + Sync {
    /// Seats the desk can hold in total. Fixed at startup.
    fn total_capacity(&self) -> u32;

    /// Current capacity counters and version.
    async fn stats(&self) -> Result<HostDeskStats, HostDeskError>;

    /// Fetch the service state for a party, if any.
    async fn get_party_state(
        &self,
        party_id: &PartyId,
    ) -> Result<Option<PartyServiceState>, HostDeskError>;

    /// Create a service state, adding its seats to the matching counter.
    ///
    /// This is the single optimistic entry point for both `Preserved` and
    /// `Occupied` creation. With `expected` set, the mutation fails with
    /// [`HostDeskError::VersionMismatch`] unless the stats version still
    /// matches; with `None` the version check is skipped. Fails with
    /// [`HostDeskError::AlreadyExists`] when a state is present and
    /// [`HostDeskError::InsufficientCapacity`] when the seats do not fit.
    async fn create_party_state(
        &self,
        state: PartyServiceState,
        expected: Option<Version>,
    ) -> Result<(), HostDeskError>;

    /// Delete a `Preserved` state and return the seats to the free pool.
    ///
    /// Returns the number of seats released. Fails with
    /// [`HostDeskError::NotFound`] or [`HostDeskError::NoPreservedSeats`].
    async fn release_preserved(&self, party_id: &PartyId) -> Result<u32, HostDeskError>;

    /// Move a `Preserved` state to `Occupied`, stamping the check-in time.
    async fn transfer_to_occupied(&self, party_id: &PartyId) -> Result<(), HostDeskError>;

    /// Delete a state and free its seats; the end of the party's service.
    ///
    /// Returns the number of seats freed. Fails with
    /// [`HostDeskError::NotFound`] if no state exists.
    async fn end_party_state(&self, party_id: &PartyId) -> Result<u32, HostDeskError>;
}
