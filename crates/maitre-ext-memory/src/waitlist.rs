//! In-memory waitlist store.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::debug;

use maitre_core::{Party, PartyId, PartyStatus, QueueStatus, QueuedParty};
use maitre_traits::error::WaitlistError;
use maitre_traits::storage::{ScanChunk, WaitlistStore};

/// In-memory [`WaitlistStore`].
///
/// One mutex guards the queue order, the party records, the per-party prefix
/// sums, and the three aggregate counters as a unit, so concurrent readers
/// always observe a consistent snapshot.
pub struct MemoryWaitlistStore {
    inner: Mutex<QueueInner>,
}

#[derive(Default)]
struct QueueInner {
    /// Party ids in queue order; the index of an id is its position.
    order: Vec<PartyId>,
    /// Full party records keyed by id.
    parties: HashMap<PartyId, StoredParty>,
    /// Value of `total_wait_prefix` at the moment each party joined.
    prefix_sums: HashMap<PartyId, Duration>,
    /// Running sum of every estimated service time added by joins,
    /// decremented by non-head removals.
    total_wait_prefix: Duration,
    /// Running sum of service times of parties that left from the head.
    total_service_time: Duration,
    /// Parties currently in `Waiting` status.
    waiting_count: usize,
}

struct StoredParty {
    party: Party,
    joined_at: DateTime<Utc>,
}

impl QueueInner {
    fn current_wait(&self) -> Duration {
        self.total_wait_prefix
            .saturating_sub(self.total_service_time)
    }

    fn queued_at(&self, rank: usize) -> Option<QueuedParty> {
        let id = self.order.get(rank)?;
        let stored = self.parties.get(id)?;
        let prefix = self.prefix_sums.get(id).copied()?;
        Some(QueuedParty {
            party: stored.party.clone(),
            position: rank,
            joined_at: stored.joined_at,
            estimated_end_of_service: prefix.saturating_sub(self.total_service_time),
        })
    }

    /// Core removal: shared by `remove_party` and the expiry purge.
    fn remove(&mut self, party_id: &PartyId) -> Result<(), WaitlistError> {
        let rank = self
            .order
            .iter()
            .position(|id| id == party_id)
            .ok_or_else(|| WaitlistError::NotFound(party_id.clone()))?;

        let stored = self
            .parties
            .remove(party_id)
            .ok_or_else(|| WaitlistError::NotFound(party_id.clone()))?;
        let est = stored.party.estimated_service_time;

        if stored.party.status == PartyStatus::Waiting {
            self.waiting_count = self.waiting_count.saturating_sub(1);
        }

        if rank == 0 {
            // The head is conceptually being served: its time accrues into
            // the service counter that offsets every remaining prefix sum.
            self.total_service_time += est;
        } else {
            for behind in &self.order[rank + 1..] {
                if let Some(prefix) = self.prefix_sums.get_mut(behind) {
                    *prefix = prefix.saturating_sub(est);
                }
            }
            self.total_wait_prefix = self.total_wait_prefix.saturating_sub(est);
        }

        self.order.remove(rank);
        self.prefix_sums.remove(party_id);

        if self.order.is_empty() {
            self.total_wait_prefix = Duration::ZERO;
            self.total_service_time = Duration::ZERO;
        }

        Ok(())
    }
}

impl MemoryWaitlistStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(QueueInner::default()),
        }
    }
}

impl Default for MemoryWaitlistStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WaitlistStore for MemoryWaitlistStore {
    async fn add_party(&self, mut party: QueuedParty) -> Result<QueuedParty, WaitlistError> {
        let mut inner = self.inner.lock();

        if inner.parties.contains_key(party.id()) {
            return Err(WaitlistError::AlreadyQueued(party.id().clone()));
        }

        let position = inner.order.len();
        let est = party.party.estimated_service_time;

        inner.total_wait_prefix += est;
        let prefix = inner.total_wait_prefix;
        inner.prefix_sums.insert(party.id().clone(), prefix);
        inner.order.push(party.id().clone());

        if party.status() == PartyStatus::Waiting {
            inner.waiting_count += 1;
        }

        inner.parties.insert(
            party.id().clone(),
            StoredParty {
                party: party.party.clone(),
                joined_at: party.joined_at,
            },
        );

        party.position = position;
        party.estimated_end_of_service = prefix.saturating_sub(inner.total_service_time);

        debug!(
            party_id = %party.id(),
            position,
            wait = ?party.remaining_wait(),
            "party joined waitlist"
        );
        Ok(party)
    }

    async fn remove_party(&self, party_id: &PartyId) -> Result<(), WaitlistError> {
        let mut inner = self.inner.lock();
        inner.remove(party_id)?;
        debug!(party_id = %party_id, "party left waitlist");
        Ok(())
    }

    async fn get_party(&self, party_id: &PartyId) -> Result<Option<QueuedParty>, WaitlistError> {
        let inner = self.inner.lock();
        let rank = match inner.order.iter().position(|id| id == party_id) {
            Some(rank) => rank,
            None => return Ok(None),
        };
        Ok(inner.queued_at(rank))
    }

    async fn get_party_details(&self, party_id: &PartyId) -> Result<Option<Party>, WaitlistError> {
        let inner = self.inner.lock();
        Ok(inner.parties.get(party_id).map(|s| s.party.clone()))
    }

    async fn has_party(&self, party_id: &PartyId) -> Result<bool, WaitlistError> {
        let inner = self.inner.lock();
        Ok(inner.parties.contains_key(party_id))
    }

    async fn queue_status(&self) -> Result<QueueStatus, WaitlistError> {
        let inner = self.inner.lock();
        Ok(QueueStatus {
            total_parties: inner.order.len(),
            waiting_parties: inner.waiting_count,
            current_wait_time: inner.current_wait(),
        })
    }

    async fn scan_chunk(&self, cursor: usize, limit: usize) -> Result<ScanChunk, WaitlistError> {
        let inner = self.inner.lock();
        let end = cursor.saturating_add(limit).min(inner.order.len());
        let parties = (cursor..end).filter_map(|rank| inner.queued_at(rank)).collect();
        let next_cursor = (end < inner.order.len()).then_some(end);
        Ok(ScanChunk {
            parties,
            next_cursor,
        })
    }

    async fn update_party_status(
        &self,
        party_id: &PartyId,
        status: PartyStatus,
    ) -> Result<(), WaitlistError> {
        let mut inner = self.inner.lock();
        let stored = inner
            .parties
            .get_mut(party_id)
            .ok_or_else(|| WaitlistError::NotFound(party_id.clone()))?;

        let from = stored.party.status;
        if from == status {
            // Idempotent re-delivery of the same transition.
            return Ok(());
        }
        if !from.can_become(status) {
            return Err(WaitlistError::InvalidStatusTransition { from, to: status });
        }

        stored.party.status = status;
        if from == PartyStatus::Waiting {
            inner.waiting_count = inner.waiting_count.saturating_sub(1);
        }
        Ok(())
    }

    async fn purge_expired(
        &self,
        older_than: DateTime<Utc>,
    ) -> Result<Vec<PartyId>, WaitlistError> {
        let mut inner = self.inner.lock();
        let expired: Vec<PartyId> = inner
            .order
            .iter()
            .filter(|id| {
                inner
                    .parties
                    .get(*id)
                    .is_some_and(|s| s.joined_at < older_than)
            })
            .cloned()
            .collect();

        for id in &expired {
            inner.remove(id)?;
        }

        if !expired.is_empty() {
            debug!(purged = expired.len(), "expired parties purged from waitlist");
        }
        Ok(expired)
    }
}
