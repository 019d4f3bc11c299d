//! UI-facing ready notifications.
//!
//! The push layer (server-sent events, websockets, whatever the front door
//! speaks) is one subscriber of the bus. This module carries its contract
//! and nothing about its transport: browsers register interest in a party
//! id and receive one signal per `notify.party.ready` event for that id.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

use maitre_core::PartyId;

use crate::bus::{InProcessEventBus, SubscriptionId};
use crate::events::{PartyQueueStatusUpdate, PartyReadyNotification, PartyServiced};
use crate::waitlist::Waitlist;

/// Capacity of one party's signal channel. A party only ever gets a
/// handful of ready signals; anything beyond this is a stuck consumer.
const CLIENT_CHANNEL_CAPACITY: usize = 8;

/// One "your table is ready" push.
#[derive(Debug, Clone)]
pub struct ReadySignal {
    /// Party the signal is for.
    pub party_id: PartyId,
    /// When the signal was dispatched.
    pub at: DateTime<Utc>,
}

/// Fan-out of `notify.party.ready` events to registered parties.
pub struct ReadyNotifier {
    bus: Arc<InProcessEventBus>,
    clients: Arc<DashMap<PartyId, mpsc::Sender<ReadySignal>>>,
    subscription: Mutex<Option<SubscriptionId>>,
}

impl ReadyNotifier {
    /// Create a notifier over the bus.
    pub fn new(bus: Arc<InProcessEventBus>) -> Arc<Self> {
        Arc::new(Self {
            bus,
            clients: Arc::new(DashMap::new()),
            subscription: Mutex::new(None),
        })
    }

    /// Start consuming ready notifications from the bus.
    pub fn attach(self: &Arc<Self>) {
        let clients = Arc::clone(&self.clients);
        let id = self
            .bus
            .subscribe::<PartyReadyNotification, _, _>(move |event| {
                let clients = Arc::clone(&clients);
                async move {
                    let Some(sender) = clients.get(&event.party_id).map(|c| c.value().clone())
                    else {
                        debug!(party_id = %event.party_id, "no registered client for ready signal");
                        return Ok(());
                    };
                    let signal = ReadySignal {
                        party_id: event.party_id.clone(),
                        at: Utc::now(),
                    };
                    if sender.send(signal).await.is_err() {
                        // Receiver gone; forget the registration.
                        clients.remove(&event.party_id);
                        debug!(party_id = %event.party_id, "dropped stale client registration");
                    }
                    Ok(())
                }
            });

        let mut slot = self.subscription.lock();
        if let Some(previous) = slot.replace(id) {
            self.bus.unsubscribe(previous);
        }
    }

    /// Stop consuming from the bus. Registered clients stay registered.
    pub fn detach(&self) {
        if let Some(id) = self.subscription.lock().take() {
            self.bus.unsubscribe(id);
        }
    }

    /// Register interest in a party's ready signal.
    ///
    /// Registration is idempotent per party: a second registration replaces
    /// the first receiver.
    pub fn register(&self, party_id: PartyId) -> mpsc::Receiver<ReadySignal> {
        let (tx, rx) = mpsc::channel(CLIENT_CHANNEL_CAPACITY);
        self.clients.insert(party_id, tx);
        rx
    }

    /// Drop a party's registration.
    pub fn deregister(&self, party_id: &PartyId) {
        self.clients.remove(party_id);
    }

    /// Number of registered parties.
    pub fn registered(&self) -> usize {
        self.clients.len()
    }
}

impl Drop for ReadyNotifier {
    fn drop(&mut self) {
        if let Some(id) = self.subscription.lock().take() {
            self.bus.unsubscribe(id);
        }
    }
}

/// Publishes per-party queue refreshes when the queue ahead moves.
///
/// Every service completion shifts positions and shortens waits for the
/// parties still queued; this broadcaster re-reads the queue and emits one
/// `notify.party.queue_update` per party, which the push layer forwards to
/// the matching browser.
pub struct QueueUpdateBroadcaster {
    bus: Arc<InProcessEventBus>,
    waitlist: Arc<Waitlist>,
    subscription: Mutex<Option<SubscriptionId>>,
}

impl QueueUpdateBroadcaster {
    /// Create a broadcaster over the bus and waitlist.
    pub fn new(bus: Arc<InProcessEventBus>, waitlist: Arc<Waitlist>) -> Arc<Self> {
        bus.registry().register::<PartyQueueStatusUpdate>();
        Arc::new(Self {
            bus,
            waitlist,
            subscription: Mutex::new(None),
        })
    }

    /// Start re-broadcasting queue positions after each service completion.
    pub fn attach(self: &Arc<Self>) {
        let bus = Arc::clone(&self.bus);
        let waitlist = Arc::clone(&self.waitlist);
        let id = self.bus.subscribe::<PartyServiced, _, _>(move |_event| {
            let bus = Arc::clone(&bus);
            let waitlist = Arc::clone(&waitlist);
            async move {
                let mut scan = waitlist.scan();
                while let Some(party) = scan.next().await {
                    if let Err(err) = bus.publish(&PartyQueueStatusUpdate { party }) {
                        debug!(%err, "queue update publish failed");
                    }
                }
                Ok(())
            }
        });

        let mut slot = self.subscription.lock();
        if let Some(previous) = slot.replace(id) {
            self.bus.unsubscribe(previous);
        }
    }

    /// Stop re-broadcasting.
    pub fn detach(&self) {
        if let Some(id) = self.subscription.lock().take() {
            self.bus.unsubscribe(id);
        }
    }
}

impl Drop for QueueUpdateBroadcaster {
    fn drop(&mut self) {
        if let Some(id) = self.subscription.lock().take() {
            self.bus.unsubscribe(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::EventRegistry;
    use std::time::Duration;

    fn setup() -> (Arc<InProcessEventBus>, Arc<ReadyNotifier>) {
        let bus = Arc::new(InProcessEventBus::new(Arc::new(EventRegistry::new())));
        let notifier = ReadyNotifier::new(Arc::clone(&bus));
        notifier.attach();
        (bus, notifier)
    }

    #[tokio::test]
    async fn registered_party_gets_its_signal() {
        let (bus, notifier) = setup();
        let mut rx = notifier.register(PartyId::new("a"));

        bus.publish(&PartyReadyNotification {
            party_id: PartyId::new("a"),
        })
        .unwrap();

        let signal = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(signal.party_id, PartyId::new("a"));
    }

    #[tokio::test]
    async fn unregistered_party_is_dropped_quietly() {
        let (bus, notifier) = setup();
        let mut rx = notifier.register(PartyId::new("a"));

        bus.publish(&PartyReadyNotification {
            party_id: PartyId::new("someone-else"),
        })
        .unwrap();
        bus.publish(&PartyReadyNotification {
            party_id: PartyId::new("a"),
        })
        .unwrap();

        let signal = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(signal.party_id, PartyId::new("a"), "only a's signal arrives");
    }

    #[tokio::test]
    async fn reregistration_replaces_the_receiver() {
        let (bus, notifier) = setup();
        let mut stale = notifier.register(PartyId::new("a"));
        let mut fresh = notifier.register(PartyId::new("a"));
        assert_eq!(notifier.registered(), 1);

        bus.publish(&PartyReadyNotification {
            party_id: PartyId::new("a"),
        })
        .unwrap();

        let signal = tokio::time::timeout(Duration::from_secs(1), fresh.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(signal.party_id, PartyId::new("a"));
        assert!(stale.try_recv().is_err());
    }

    #[tokio::test]
    async fn queue_updates_follow_a_service_completion() {
        use crate::estimate::FixedRateEstimator;
        use maitre_core::{Party, PartyStatus};
        use maitre_ext_memory::MemoryWaitlistStore;

        let bus = Arc::new(InProcessEventBus::new(Arc::new(EventRegistry::new())));
        let waitlist = Arc::new(Waitlist::new(
            Arc::new(MemoryWaitlistStore::new()),
            Arc::new(FixedRateEstimator::new(Duration::from_secs(60))),
            Arc::clone(&bus),
            4,
        ));
        let broadcaster = QueueUpdateBroadcaster::new(Arc::clone(&bus), Arc::clone(&waitlist));
        broadcaster.attach();

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        bus.subscribe::<PartyQueueStatusUpdate, _, _>(move |event| {
            let tx = tx.clone();
            async move {
                tx.send(event.party).ok();
                Ok(())
            }
        });

        waitlist.join(Party::new(PartyId::new("a"), "a", 2)).await.unwrap();
        waitlist.join(Party::new(PartyId::new("b"), "b", 3)).await.unwrap();

        // A served party frees seats; the broadcaster refreshes the queue.
        bus.registry().register::<PartyServiced>();
        bus.publish(&PartyServiced {
            party_id: PartyId::new("someone-served"),
        })
        .unwrap();

        let first = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        let second = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(first.id(), &PartyId::new("a"));
        assert_eq!(first.position, 0);
        assert_eq!(first.status(), PartyStatus::Waiting);
        assert_eq!(second.id(), &PartyId::new("b"));
        assert_eq!(second.position, 1);
        assert_eq!(second.remaining_wait(), Duration::from_secs(120));

        broadcaster.detach();
    }

    #[tokio::test]
    async fn detach_stops_delivery() {
        let (bus, notifier) = setup();
        let mut rx = notifier.register(PartyId::new("a"));
        notifier.detach();

        bus.publish(&PartyReadyNotification {
            party_id: PartyId::new("a"),
        })
        .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
    }
}
