//! Pluggable admission and promotion policies.
//!
//! Two behaviors are polymorphic in the seat manager:
//!
//! - [`PartyProcessingStrategy`] decides the admission outcome of a new
//!   arrival from `(seats available, queue status)`.
//! - [`PartySelectionStrategy`] picks the next queued party to promote when
//!   seats free up.
//!
//! The seat manager never branches on a concrete strategy type.

use std::sync::Arc;

use async_trait::async_trait;

use maitre_core::{PartyStatus, QueueStatus, QueuedParty};
use maitre_traits::error::WaitlistError;

use crate::waitlist::Waitlist;

/// Inputs to an admission decision.
#[derive(Debug, Clone, Copy)]
pub struct SeatingContext {
    /// Whether the desk has enough free seats for the arriving party.
    pub seats_available: bool,
    /// Aggregate queue snapshot at decision time.
    pub queue: QueueStatus,
}

/// Decides the admission outcome of a newly arrived party.
pub trait PartyProcessingStrategy: Send + Sync {
    /// The status the party should take, and whether seats should be held.
    fn determine(&self, ctx: &SeatingContext) -> (PartyStatus, bool);
}

/// Serve a new arrival on the spot when nobody is waiting and it fits.
#[derive(Debug, Clone, Copy, Default)]
pub struct InstantServeStrategy;

impl PartyProcessingStrategy for InstantServeStrategy {
    fn determine(&self, ctx: &SeatingContext) -> (PartyStatus, bool) {
        if !ctx.queue.is_empty() || !ctx.seats_available {
            return (PartyStatus::Waiting, false);
        }
        (PartyStatus::Serving, true)
    }
}

/// Every admitted party passes through the queue; fitting parties enter
/// ready with their seats already held.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueueFirstStrategy;

impl PartyProcessingStrategy for QueueFirstStrategy {
    fn determine(&self, ctx: &SeatingContext) -> (PartyStatus, bool) {
        if !ctx.seats_available {
            return (PartyStatus::Waiting, false);
        }
        (PartyStatus::Ready, true)
    }
}

/// Picks the next queued party to promote for a given vacancy.
#[async_trait]
pub trait PartySelectionStrategy: Send + Sync {
    /// The next party to hold seats for, or `None` when nobody fits.
    async fn evaluate_next(&self, vacancy: u32) -> Result<Option<QueuedParty>, WaitlistError>;
}

/// FIFO first-fit: walk the queue in order and take the first waiting party
/// whose size fits the vacancy.
pub struct OrderedSeatingStrategy {
    waitlist: Arc<Waitlist>,
}

impl OrderedSeatingStrategy {
    /// Create a strategy walking the given waitlist.
    pub fn new(waitlist: Arc<Waitlist>) -> Self {
        Self { waitlist }
    }
}

#[async_trait]
impl PartySelectionStrategy for OrderedSeatingStrategy {
    async fn evaluate_next(&self, vacancy: u32) -> Result<Option<QueuedParty>, WaitlistError> {
        let mut scan = self.waitlist.scan();
        while let Some(party) = scan.next().await {
            if party.status() == PartyStatus::Waiting && party.size() <= vacancy {
                return Ok(Some(party));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{EventRegistry, InProcessEventBus};
    use crate::estimate::FixedRateEstimator;
    use maitre_core::{Party, PartyId};
    use maitre_ext_memory::MemoryWaitlistStore;
    use std::time::Duration;

    fn ctx(seats_available: bool, total: usize) -> SeatingContext {
        SeatingContext {
            seats_available,
            queue: QueueStatus {
                total_parties: total,
                waiting_parties: total,
                current_wait_time: Duration::ZERO,
            },
        }
    }

    #[test]
    fn instant_serve_requires_empty_queue_and_seats() {
        let strategy = InstantServeStrategy;
        assert_eq!(
            strategy.determine(&ctx(true, 0)),
            (PartyStatus::Serving, true)
        );
        assert_eq!(
            strategy.determine(&ctx(true, 2)),
            (PartyStatus::Waiting, false)
        );
        assert_eq!(
            strategy.determine(&ctx(false, 0)),
            (PartyStatus::Waiting, false)
        );
    }

    #[test]
    fn queue_first_ignores_queue_length() {
        let strategy = QueueFirstStrategy;
        assert_eq!(strategy.determine(&ctx(true, 5)), (PartyStatus::Ready, true));
        assert_eq!(
            strategy.determine(&ctx(false, 5)),
            (PartyStatus::Waiting, false)
        );
    }

    #[tokio::test]
    async fn ordered_selection_takes_first_fit_in_fifo_order() {
        let bus = Arc::new(InProcessEventBus::new(Arc::new(EventRegistry::new())));
        let waitlist = Arc::new(Waitlist::new(
            Arc::new(MemoryWaitlistStore::new()),
            Arc::new(FixedRateEstimator::new(Duration::from_secs(60))),
            bus,
            4,
        ));

        waitlist.join(Party::new(PartyId::new("big"), "big", 8)).await.unwrap();
        waitlist.join(Party::new(PartyId::new("mid"), "mid", 4)).await.unwrap();
        waitlist.join(Party::new(PartyId::new("small"), "small", 2)).await.unwrap();

        let strategy = OrderedSeatingStrategy::new(Arc::clone(&waitlist));

        let next = strategy.evaluate_next(4).await.unwrap().unwrap();
        assert_eq!(next.id().as_str(), "mid", "first fit, not best fit");

        let next = strategy.evaluate_next(8).await.unwrap().unwrap();
        assert_eq!(next.id().as_str(), "big");

        // A boundary fit counts.
        let next = strategy.evaluate_next(2).await.unwrap().unwrap();
        assert_eq!(next.id().as_str(), "small");

        assert!(strategy.evaluate_next(1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn ordered_selection_skips_ready_parties() {
        let bus = Arc::new(InProcessEventBus::new(Arc::new(EventRegistry::new())));
        let waitlist = Arc::new(Waitlist::new(
            Arc::new(MemoryWaitlistStore::new()),
            Arc::new(FixedRateEstimator::new(Duration::from_secs(60))),
            bus,
            4,
        ));

        let mut ready = Party::new(PartyId::new("ready"), "ready", 2);
        ready.status = PartyStatus::Ready;
        waitlist.join(ready).await.unwrap();
        waitlist.join(Party::new(PartyId::new("waiting"), "waiting", 2)).await.unwrap();

        let strategy = OrderedSeatingStrategy::new(waitlist);
        let next = strategy.evaluate_next(4).await.unwrap().unwrap();
        assert_eq!(next.id().as_str(), "waiting", "ready parties already hold seats");
    }
}
