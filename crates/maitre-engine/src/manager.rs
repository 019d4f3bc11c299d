//! Seat manager: admission policy and vacancy watcher.
//!
//! The manager orchestrates the waitlist and the host desk through the bus.
//! It holds no lock of its own; contention on the desk's capacity is
//! resolved by a bounded optimistic retry loop, the only retry in the
//! system.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error, warn};

use maitre_core::{Party, PartyId, PartyStatus, QueueStatus, QueuedParty};

use crate::bus::{InProcessEventBus, SubscriptionId};
use crate::error::{SeatingError, SeatingResult};
use crate::events::{PartyServiced, SeatsPreserved};
use crate::hostdesk::FixedCapacityHostDesk;
use crate::strategy::{PartyProcessingStrategy, PartySelectionStrategy, SeatingContext};
use crate::waitlist::Waitlist;

/// Outcome of admitting a new party.
#[derive(Debug, Clone)]
pub enum Admission {
    /// Seated on arrival; the party never entered the queue.
    Seated(Party),
    /// Placed in the queue, waiting or ready.
    Queued(QueuedParty),
}

impl Admission {
    /// The admitted party's id.
    pub fn id(&self) -> &PartyId {
        match self {
            Admission::Seated(party) => &party.id,
            Admission::Queued(queued) => queued.id(),
        }
    }

    /// The admitted party's status.
    pub fn status(&self) -> PartyStatus {
        match self {
            Admission::Seated(party) => party.status,
            Admission::Queued(queued) => queued.status(),
        }
    }

    /// Queue position, if the party was queued.
    pub fn position(&self) -> Option<usize> {
        match self {
            Admission::Seated(_) => None,
            Admission::Queued(queued) => Some(queued.position),
        }
    }
}

/// Orchestrates admissions and promotions across waitlist and host desk.
pub struct SeatManager {
    waitlist: Arc<Waitlist>,
    hostdesk: Arc<FixedCapacityHostDesk>,
    bus: Arc<InProcessEventBus>,
    processing: Arc<dyn PartyProcessingStrategy>,
    selection: Arc<dyn PartySelectionStrategy>,
    preserve_max_retries: u32,
    subscriptions: Mutex<Vec<SubscriptionId>>,
}

impl SeatManager {
    /// Create a seat manager.
    pub fn new(
        waitlist: Arc<Waitlist>,
        hostdesk: Arc<FixedCapacityHostDesk>,
        bus: Arc<InProcessEventBus>,
        processing: Arc<dyn PartyProcessingStrategy>,
        selection: Arc<dyn PartySelectionStrategy>,
        preserve_max_retries: u32,
    ) -> Arc<Self> {
        Arc::new(Self {
            waitlist,
            hostdesk,
            bus,
            processing,
            selection,
            preserve_max_retries: preserve_max_retries.max(1),
            subscriptions: Mutex::new(Vec::new()),
        })
    }

    /// Admit a newly arrived party.
    ///
    /// Reads `(capacity, version)` and the queue status, lets the
    /// processing strategy pick the outcome, and holds seats under the
    /// observed version when asked to. A version mismatch re-runs the loop;
    /// insufficient capacity downgrades the outcome to waiting; any other
    /// failure while holding seats aborts the admission.
    pub async fn process_new_party(&self, party: Party) -> SeatingResult<Admission> {
        for attempt in 0..self.preserve_max_retries {
            let (free, version) = self.hostdesk.current_capacity().await?;
            let queue = self.waitlist.status().await?;
            let seats_available = free >= party.size;

            let (mut desired, should_preserve) = self.processing.determine(&SeatingContext {
                seats_available,
                queue,
            });

            if should_preserve {
                let held = if desired == PartyStatus::Serving {
                    self.hostdesk.serve_immediately(&party, Some(version)).await
                } else {
                    self.hostdesk
                        .preserve_seats(&party.id, party.size, Some(version))
                        .await
                };

                match held {
                    Ok(()) => {}
                    Err(err) if err.is_version_mismatch() => {
                        debug!(party_id = %party.id, attempt, "capacity version moved, retrying");
                        continue;
                    }
                    Err(err) if err.is_insufficient_capacity() => {
                        // Someone else took the seats between the read and
                        // the hold; the party waits instead.
                        desired = PartyStatus::Waiting;
                    }
                    Err(err) => return Err(SeatingError::PreserveSeats(err)),
                }
            }

            let mut party = party.clone();
            party.status = desired;

            if desired == PartyStatus::Serving {
                match self.hostdesk.check_in(&party).await {
                    Ok(()) => return Ok(Admission::Seated(party)),
                    Err(err) => {
                        warn!(party_id = %party.id, %err, "check-in on arrival failed, queueing as ready");
                        party.status = PartyStatus::Ready;
                    }
                }
            }

            return match self.waitlist.join(party.clone()).await {
                Ok(queued) => Ok(Admission::Queued(queued)),
                Err(err) => {
                    if party.status == PartyStatus::Ready {
                        match self.hostdesk.release_preserved_seats(&party.id).await {
                            Ok(released) => {
                                debug!(party_id = %party.id, released, "compensated failed join");
                            }
                            Err(release_err) => {
                                error!(party_id = %party.id, %release_err, "compensation failed; preserved seats may leak");
                            }
                        }
                    }
                    Err(SeatingError::JoinWaitlist(err))
                }
            };
        }

        warn!(party_id = %party.id, retries = self.preserve_max_retries, "admission gave up on optimistic retries");
        Err(SeatingError::TooManyOptimisticLockRetries)
    }

    /// Check in a party that came to the desk.
    ///
    /// The party leaves the waitlist before the desk check-in; a desk
    /// failure after the removal is surfaced but not compensated.
    pub async fn party_check_in(&self, party_id: &PartyId) -> SeatingResult<()> {
        let queued = self
            .waitlist
            .get(party_id)
            .await?
            .ok_or_else(|| SeatingError::Waitlist(
                maitre_traits::error::WaitlistError::NotFound(party_id.clone()),
            ))?;

        if queued.status() != PartyStatus::Serving {
            self.waitlist.leave(party_id).await?;
        }

        if let Err(err) = self.hostdesk.check_in(&queued.party).await {
            error!(party_id = %party_id, %err, "check-in failed after waitlist removal");
            return Err(err.into());
        }
        Ok(())
    }

    /// Start observing seat vacancies.
    ///
    /// Subscribes the preserved-seats handler (promotes the queued party to
    /// ready) and the service-completed handler (looks for the next party
    /// to promote).
    pub fn watch_seat_vacancy(self: &Arc<Self>) {
        let waitlist = Arc::clone(&self.waitlist);
        let preserved = self.bus.subscribe::<SeatsPreserved, _, _>(move |event| {
            let waitlist = Arc::clone(&waitlist);
            async move {
                waitlist.handle_party_ready(&event.party_id).await?;
                Ok(())
            }
        });

        let manager = Arc::downgrade(self);
        let serviced = self.bus.subscribe::<PartyServiced, _, _>(move |event| {
            let manager = manager.clone();
            async move {
                let Some(manager) = manager.upgrade() else {
                    return Ok(());
                };
                debug!(party_id = %event.party_id, "vacancy after service completion");
                manager.check_and_assign_seating().await?;
                Ok(())
            }
        });

        self.subscriptions.lock().extend([preserved, serviced]);
        debug!("seat manager watching seat vacancy");
    }

    /// Stop observing seat vacancies.
    pub fn unwatch_seat_vacancy(&self) {
        for id in self.subscriptions.lock().drain(..) {
            self.bus.unsubscribe(id);
        }
        debug!("seat manager stopped watching");
    }

    /// Promote the next fitting waiter if the desk has free seats.
    pub async fn check_and_assign_seating(&self) -> SeatingResult<()> {
        let (free, _version) = self.hostdesk.current_capacity().await?;
        if free == 0 {
            return Ok(());
        }

        let Some(next) = self.selection.evaluate_next(free).await? else {
            return Ok(());
        };

        self.hostdesk.notify_party_ready(&next).await?;
        Ok(())
    }

    /// Aggregate queue snapshot.
    pub async fn queue_status(&self) -> SeatingResult<QueueStatus> {
        Ok(self.waitlist.status().await?)
    }

    /// Fetch a queued party with its position and wait estimate.
    pub async fn get_queued_party(
        &self,
        party_id: &PartyId,
    ) -> SeatingResult<Option<QueuedParty>> {
        Ok(self.waitlist.get(party_id).await?)
    }

    /// Whether a party currently occupies seats.
    pub async fn has_party_occupied_seat(&self, party_id: &PartyId) -> bool {
        self.hostdesk.has_party_occupied_seat(party_id).await
    }
}

impl Drop for SeatManager {
    fn drop(&mut self) {
        for id in self.subscriptions.lock().drain(..) {
            self.bus.unsubscribe(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::EventRegistry;
    use crate::error::SeatingError;
    use crate::estimate::FixedRateEstimator;
    use crate::strategy::{OrderedSeatingStrategy, QueueFirstStrategy};
    use crate::timer::ServiceTimer;
    use async_trait::async_trait;
    use maitre_core::{HostDeskStats, PartyServiceState, Version};
    use maitre_ext_memory::{MemoryHostDeskStore, MemoryWaitlistStore};
    use maitre_traits::error::{HostDeskError, StoreError};
    use maitre_traits::storage::HostDeskStore;
    use std::time::Duration;

    fn manager_over(
        hostdesk_store: Arc<dyn HostDeskStore>,
    ) -> (Arc<SeatManager>, Arc<Waitlist>, Arc<FixedCapacityHostDesk>) {
        let bus = Arc::new(InProcessEventBus::new(Arc::new(EventRegistry::new())));
        let waitlist = Arc::new(Waitlist::new(
            Arc::new(MemoryWaitlistStore::new()),
            Arc::new(FixedRateEstimator::new(Duration::from_secs(60))),
            Arc::clone(&bus),
            4,
        ));
        let hostdesk = FixedCapacityHostDesk::new(
            hostdesk_store,
            Arc::clone(&bus),
            Arc::new(ServiceTimer::new(Duration::from_secs(60))),
        );
        let manager = SeatManager::new(
            Arc::clone(&waitlist),
            Arc::clone(&hostdesk),
            bus,
            Arc::new(QueueFirstStrategy),
            Arc::new(OrderedSeatingStrategy::new(Arc::clone(&waitlist))),
            3,
        );
        (manager, waitlist, hostdesk)
    }

    fn party(id: &str, size: u32) -> Party {
        Party::new(PartyId::new(id), id, size)
    }

    #[tokio::test]
    async fn join_failure_after_preserve_releases_the_seats() {
        let store = Arc::new(MemoryHostDeskStore::new(10));
        let (manager, waitlist, hostdesk) = manager_over(store);

        // Occupy the id in the waitlist so the post-preserve join collides.
        waitlist.join(party("dup", 4)).await.unwrap();
        let before = hostdesk.current_capacity().await.unwrap();

        let err = manager.process_new_party(party("dup", 4)).await.unwrap_err();
        assert!(matches!(err, SeatingError::JoinWaitlist(_)));

        // The compensating release returned the seats; the version shows
        // the preserve and the release.
        let (free, version) = hostdesk.current_capacity().await.unwrap();
        assert_eq!(free, before.0);
        assert_eq!(version, Version(before.1.value() + 2));
    }

    #[tokio::test]
    async fn check_in_gap_leaves_the_queue_even_when_the_desk_refuses() {
        let store = Arc::new(MemoryHostDeskStore::new(10));
        let (manager, waitlist, _hostdesk) = manager_over(store);

        // A party that is still waiting has no seats at the desk.
        waitlist.join(party("early", 2)).await.unwrap();

        let err = manager
            .party_check_in(&PartyId::new("early"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SeatingError::HostDesk(HostDeskError::InvalidState(_))
        ));

        // The removal is not rolled back.
        assert!(!waitlist.has_party(&PartyId::new("early")).await.unwrap());
    }

    #[tokio::test]
    async fn successful_check_in_clears_the_queue_and_occupies() {
        let store = Arc::new(MemoryHostDeskStore::new(10));
        let (manager, waitlist, hostdesk) = manager_over(store);

        let admitted = manager.process_new_party(party("a", 4)).await.unwrap();
        assert_eq!(admitted.status(), PartyStatus::Ready);

        manager.party_check_in(&PartyId::new("a")).await.unwrap();
        assert!(!waitlist.has_party(&PartyId::new("a")).await.unwrap());
        assert!(hostdesk.has_party_occupied_seat(&PartyId::new("a")).await);
    }

    /// Host desk whose optimistic create always reports a specific failure
    /// while reads pass through.
    struct HoldFailsDesk {
        inner: MemoryHostDeskStore,
        storage_fault: bool,
    }

    #[async_trait]
    impl HostDeskStore for HoldFailsDesk {
        fn total_capacity(&self) -> u32 {
            self.inner.total_capacity()
        }

        async fn stats(&self) -> Result<HostDeskStats, HostDeskError> {
            self.inner.stats().await
        }

        async fn get_party_state(
            &self,
            party_id: &PartyId,
        ) -> Result<Option<PartyServiceState>, HostDeskError> {
            self.inner.get_party_state(party_id).await
        }

        async fn create_party_state(
            &self,
            state: PartyServiceState,
            _expected: Option<Version>,
        ) -> Result<(), HostDeskError> {
            if self.storage_fault {
                Err(HostDeskError::Storage(StoreError::Database(
                    "stats hash unavailable".into(),
                )))
            } else {
                Err(HostDeskError::InsufficientCapacity {
                    requested: state.seats,
                    free: 0,
                })
            }
        }

        async fn release_preserved(&self, party_id: &PartyId) -> Result<u32, HostDeskError> {
            self.inner.release_preserved(party_id).await
        }

        async fn transfer_to_occupied(&self, party_id: &PartyId) -> Result<(), HostDeskError> {
            self.inner.transfer_to_occupied(party_id).await
        }

        async fn end_party_state(&self, party_id: &PartyId) -> Result<u32, HostDeskError> {
            self.inner.end_party_state(party_id).await
        }
    }

    #[tokio::test]
    async fn losing_the_seats_mid_hold_downgrades_to_waiting() {
        let store = Arc::new(HoldFailsDesk {
            inner: MemoryHostDeskStore::new(10),
            storage_fault: false,
        });
        let (manager, _waitlist, _hostdesk) = manager_over(store);

        let admitted = manager.process_new_party(party("a", 4)).await.unwrap();
        assert_eq!(admitted.status(), PartyStatus::Waiting);
        assert_eq!(admitted.position(), Some(0));
    }

    #[tokio::test]
    async fn storage_fault_during_hold_aborts_admission() {
        let store = Arc::new(HoldFailsDesk {
            inner: MemoryHostDeskStore::new(10),
            storage_fault: true,
        });
        let (manager, waitlist, _hostdesk) = manager_over(store);

        let err = manager.process_new_party(party("a", 4)).await.unwrap_err();
        assert!(matches!(err, SeatingError::PreserveSeats(_)));
        assert_eq!(waitlist.status().await.unwrap().total_parties, 0);
    }
}
