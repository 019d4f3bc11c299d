//! Waitlist service.
//!
//! Wraps a [`WaitlistStore`] with service-time estimation and the
//! `notify.party.ready` publication. The store owns the atomic wait-time
//! algebra; this layer owns everything that is not storage: estimating,
//! stamping join time, streaming scans, and event fan-out.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use chrono::Utc;
use futures_core::Stream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use maitre_core::{Party, PartyId, PartyStatus, QueueStatus, QueuedParty};
use maitre_traits::error::WaitlistError;
use maitre_traits::estimator::ServiceTimeEstimator;
use maitre_traits::storage::WaitlistStore;

use crate::bus::InProcessEventBus;
use crate::events::PartyReadyNotification;

/// Ordered waiting queue with wait-time accounting.
pub struct Waitlist {
    store: Arc<dyn WaitlistStore>,
    estimator: Arc<dyn ServiceTimeEstimator>,
    bus: Arc<InProcessEventBus>,
    scan_chunk_size: usize,
}

impl Waitlist {
    /// Create a waitlist service.
    pub fn new(
        store: Arc<dyn WaitlistStore>,
        estimator: Arc<dyn ServiceTimeEstimator>,
        bus: Arc<InProcessEventBus>,
        scan_chunk_size: usize,
    ) -> Self {
        bus.registry().register::<PartyReadyNotification>();
        Self {
            store,
            estimator,
            bus,
            scan_chunk_size: scan_chunk_size.max(1),
        }
    }

    /// Add a party to the queue.
    ///
    /// Estimates the party's service time, stamps the join time, and
    /// delegates to the store's atomic append. The party's status is kept
    /// as given: a party joining as `Ready` does not count as waiting.
    pub async fn join(&self, mut party: Party) -> Result<QueuedParty, WaitlistError> {
        let estimate = self
            .estimator
            .estimate(&party)
            .await
            .map_err(WaitlistError::Storage)?;
        party.estimated_service_time = estimate.duration;

        let queued = QueuedParty {
            party,
            position: 0,
            joined_at: Utc::now(),
            estimated_end_of_service: Duration::ZERO,
        };
        self.store.add_party(queued).await
    }

    /// Remove a party from the queue.
    pub async fn leave(&self, party_id: &PartyId) -> Result<(), WaitlistError> {
        self.store.remove_party(party_id).await
    }

    /// Fetch a party with its position and end-of-service estimate.
    pub async fn get(&self, party_id: &PartyId) -> Result<Option<QueuedParty>, WaitlistError> {
        self.store.get_party(party_id).await
    }

    /// Fetch just the party record; hot-path lookup that skips the rank.
    pub async fn get_details(&self, party_id: &PartyId) -> Result<Option<Party>, WaitlistError> {
        self.store.get_party_details(party_id).await
    }

    /// Whether a party is queued.
    pub async fn has_party(&self, party_id: &PartyId) -> Result<bool, WaitlistError> {
        self.store.has_party(party_id).await
    }

    /// Aggregate queue snapshot.
    pub async fn status(&self) -> Result<QueueStatus, WaitlistError> {
        self.store.queue_status().await
    }

    /// Stream the queue in FIFO order.
    ///
    /// The stream is lazy and finite: chunks are fetched as the consumer
    /// drains them, and dropping the stream cancels the iteration. A
    /// concurrent removal may cause the scan to skip or double-yield at
    /// most one record.
    pub fn scan(&self) -> PartyScan {
        let (tx, rx) = mpsc::channel(self.scan_chunk_size);
        let store = Arc::clone(&self.store);
        let chunk_size = self.scan_chunk_size;

        let feeder = tokio::spawn(async move {
            let mut cursor = 0;
            loop {
                let chunk = match store.scan_chunk(cursor, chunk_size).await {
                    Ok(chunk) => chunk,
                    Err(err) => {
                        warn!(%err, "waitlist scan aborted");
                        return;
                    }
                };
                for party in chunk.parties {
                    if tx.send(party).await.is_err() {
                        // Consumer dropped the stream; stop fetching.
                        return;
                    }
                }
                match chunk.next_cursor {
                    Some(next) => cursor = next,
                    None => return,
                }
            }
        });

        PartyScan { rx, feeder }
    }

    /// Move a party to a new status.
    pub async fn update_status(
        &self,
        party_id: &PartyId,
        status: PartyStatus,
    ) -> Result<(), WaitlistError> {
        self.store.update_party_status(party_id, status).await
    }

    /// Handle the host desk's "seats preserved" signal for a queued party.
    ///
    /// Marks the party ready and publishes `notify.party.ready` for the UI
    /// push layer. Re-delivery for an already-ready party is a no-op.
    pub async fn handle_party_ready(&self, party_id: &PartyId) -> Result<(), WaitlistError> {
        let party = self
            .get_details(party_id)
            .await?
            .ok_or_else(|| WaitlistError::NotFound(party_id.clone()))?;

        match party.status {
            PartyStatus::Ready => return Ok(()),
            PartyStatus::Waiting => {}
            other => {
                debug!(party_id = %party_id, status = ?other, "cannot mark party ready");
                return Err(WaitlistError::InvalidStatusTransition {
                    from: other,
                    to: PartyStatus::Ready,
                });
            }
        }

        self.store
            .update_party_status(party_id, PartyStatus::Ready)
            .await?;

        if let Err(err) = self.bus.publish(&PartyReadyNotification {
            party_id: party_id.clone(),
        }) {
            error!(party_id = %party_id, %err, "failed to publish ready notification");
        }
        Ok(())
    }

    /// Remove every party that has sat in the queue longer than `ttl`.
    pub async fn purge_older_than(&self, ttl: Duration) -> Result<Vec<PartyId>, WaitlistError> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(ttl)
                .map_err(|e| WaitlistError::Storage(maitre_traits::error::StoreError::Internal(e.to_string())))?;
        self.store.purge_expired(cutoff).await
    }
}

/// Lazy, cancellable stream over the queue.
///
/// Dropping the scan stops the background feeder.
pub struct PartyScan {
    rx: mpsc::Receiver<QueuedParty>,
    feeder: JoinHandle<()>,
}

impl PartyScan {
    /// Next party in queue order, or `None` when the scan is exhausted.
    pub async fn next(&mut self) -> Option<QueuedParty> {
        self.rx.recv().await
    }
}

impl Stream for PartyScan {
    type Item = QueuedParty;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

impl Drop for PartyScan {
    fn drop(&mut self) {
        self.feeder.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::EventRegistry;
    use crate::estimate::FixedRateEstimator;
    use maitre_ext_memory::MemoryWaitlistStore;

    fn waitlist() -> Waitlist {
        let bus = Arc::new(InProcessEventBus::new(Arc::new(EventRegistry::new())));
        Waitlist::new(
            Arc::new(MemoryWaitlistStore::new()),
            Arc::new(FixedRateEstimator::new(Duration::from_secs(60))),
            bus,
            2,
        )
    }

    fn party(id: &str, size: u32) -> Party {
        Party::new(PartyId::new(id), id, size)
    }

    #[tokio::test]
    async fn join_estimates_before_queueing() {
        let waitlist = waitlist();

        let queued = waitlist.join(party("a", 3)).await.unwrap();
        assert_eq!(queued.position, 0);
        assert_eq!(
            queued.party.estimated_service_time,
            Duration::from_secs(180)
        );
        assert_eq!(queued.estimated_end_of_service, Duration::from_secs(180));

        let status = waitlist.status().await.unwrap();
        assert_eq!(status.total_parties, 1);
        assert_eq!(status.current_wait_time, Duration::from_secs(180));
    }

    #[tokio::test]
    async fn scan_streams_in_fifo_order() {
        let waitlist = waitlist();
        for i in 0..5 {
            waitlist.join(party(&format!("p{i}"), 1)).await.unwrap();
        }

        let mut scan = waitlist.scan();
        let mut seen = Vec::new();
        while let Some(queued) = scan.next().await {
            seen.push(queued.id().clone());
        }
        let expected: Vec<PartyId> = (0..5).map(|i| PartyId::new(format!("p{i}"))).collect();
        assert_eq!(seen, expected);
    }

    #[tokio::test]
    async fn dropping_a_scan_cancels_it() {
        let waitlist = waitlist();
        for i in 0..10 {
            waitlist.join(party(&format!("p{i}"), 1)).await.unwrap();
        }

        let mut scan = waitlist.scan();
        let first = scan.next().await.unwrap();
        assert_eq!(first.position, 0);
        drop(scan);
        // Nothing to assert beyond "no hang": the feeder observes the closed
        // channel (or the abort) and stops.
    }

    #[tokio::test]
    async fn scan_tolerates_concurrent_removal() {
        let waitlist = waitlist();
        for i in 0..6 {
            waitlist.join(party(&format!("p{i}"), 1)).await.unwrap();
        }

        let mut scan = waitlist.scan();
        let mut seen = vec![scan.next().await.unwrap().id().clone()];
        waitlist.leave(&PartyId::new("p3")).await.unwrap();
        while let Some(queued) = scan.next().await {
            seen.push(queued.id().clone());
        }

        // Every party that stayed queued for the whole scan shows up.
        for survivor in ["p0", "p1", "p2", "p5"] {
            assert!(seen.iter().any(|id| id.as_str() == survivor));
        }
    }

    #[tokio::test]
    async fn handle_party_ready_publishes_notification() {
        let bus = Arc::new(InProcessEventBus::new(Arc::new(EventRegistry::new())));
        let waitlist = Waitlist::new(
            Arc::new(MemoryWaitlistStore::new()),
            Arc::new(FixedRateEstimator::new(Duration::from_secs(60))),
            Arc::clone(&bus),
            4,
        );

        let (tx, mut rx) = mpsc::unbounded_channel();
        bus.subscribe::<PartyReadyNotification, _, _>(move |event| {
            let tx = tx.clone();
            async move {
                tx.send(event.party_id).ok();
                Ok(())
            }
        });

        waitlist.join(party("a", 2)).await.unwrap();
        waitlist.handle_party_ready(&PartyId::new("a")).await.unwrap();

        let notified = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(notified, PartyId::new("a"));

        let details = waitlist.get_details(&PartyId::new("a")).await.unwrap();
        assert_eq!(details.unwrap().status, PartyStatus::Ready);

        // Second delivery is a quiet no-op.
        waitlist.handle_party_ready(&PartyId::new("a")).await.unwrap();
    }

    #[tokio::test]
    async fn handle_party_ready_for_missing_party_fails() {
        let waitlist = waitlist();
        let err = waitlist
            .handle_party_ready(&PartyId::new("ghost"))
            .await
            .unwrap_err();
        assert!(matches!(err, WaitlistError::NotFound(_)));
    }
}
