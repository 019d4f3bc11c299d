//! One-shot service timers.
//!
//! A party that sits down is served for `duration_per_guest x size`; when
//! that window elapses the timer fires a completion callback, which the host
//! desk uses to free the seats. Timer firing never runs downstream work
//! inline: the callback is handed to the runtime as its own task.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::debug;

use maitre_core::{Party, PartyId};

struct TimerHandle {
    generation: u64,
    task: JoinHandle<()>,
}

/// Tracks one pending service-completion timer per party.
///
/// Re-arming a party replaces its pending timer; cancellation removes it.
/// All timers abandon their fire on shutdown.
pub struct ServiceTimer {
    duration_per_guest: Duration,
    timers: Arc<DashMap<PartyId, TimerHandle>>,
    generation: AtomicU64,
    shutdown_tx: broadcast::Sender<()>,
}

impl ServiceTimer {
    /// Create a timer table charging `duration_per_guest` per seat.
    pub fn new(duration_per_guest: Duration) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            duration_per_guest,
            timers: Arc::new(DashMap::new()),
            generation: AtomicU64::new(1),
            shutdown_tx,
        }
    }

    /// Service duration for a party of this size.
    pub fn service_duration(&self, size: u32) -> Duration {
        self.duration_per_guest * size
    }

    /// Arm (or replace) the completion timer for a party.
    ///
    /// After `duration_per_guest x party.size`, `on_complete` is spawned
    /// with the party id. A prior timer for the same id is aborted.
    pub fn start_tracking<F, Fut>(&self, party: &Party, on_complete: F)
    where
        F: FnOnce(PartyId) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let duration = self.service_duration(party.size);
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let timers = Arc::clone(&self.timers);
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let party_id = party.id.clone();
        let task_id = party_id.clone();

        let task = tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(duration) => {
                    timers.remove_if(&task_id, |_, handle| handle.generation == generation);
                    debug!(party_id = %task_id, ?duration, "service timer fired");
                    tokio::spawn(on_complete(task_id));
                }
                _ = shutdown_rx.recv() => {
                    debug!(party_id = %task_id, "service timer stopped by shutdown");
                }
            }
        });

        if let Some(previous) = self.timers.insert(
            party_id.clone(),
            TimerHandle { generation, task },
        ) {
            previous.task.abort();
            debug!(party_id = %party_id, "pending service timer replaced");
        }
        debug!(party_id = %party_id, ?duration, "service timer armed");
    }

    /// Cancel the pending timer for a party, if any.
    pub fn cancel(&self, party_id: &PartyId) -> bool {
        match self.timers.remove(party_id) {
            Some((_, handle)) => {
                handle.task.abort();
                debug!(party_id = %party_id, "service timer cancelled");
                true
            }
            None => false,
        }
    }

    /// Number of timers currently pending.
    pub fn pending(&self) -> usize {
        self.timers.len()
    }

    /// Stop every pending timer without firing it.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
        self.timers.retain(|_, handle| {
            handle.task.abort();
            false
        });
    }
}

impl Drop for ServiceTimer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn party(id: &str, size: u32) -> Party {
        Party::new(PartyId::new(id), id, size)
    }

    #[tokio::test]
    async fn timer_fires_after_computed_duration() {
        let timer = ServiceTimer::new(Duration::from_millis(5));
        let (tx, mut rx) = mpsc::unbounded_channel();

        timer.start_tracking(&party("a", 2), move |id| async move {
            tx.send(id).ok();
        });
        assert_eq!(timer.pending(), 1);

        let fired = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("timer did not fire")
            .unwrap();
        assert_eq!(fired, PartyId::new("a"));

        // The fired timer removed itself.
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(timer.pending(), 0);
    }

    #[tokio::test]
    async fn rearming_replaces_the_pending_timer() {
        let timer = ServiceTimer::new(Duration::from_millis(20));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let tx1 = tx.clone();
        timer.start_tracking(&party("a", 1), move |_| async move {
            tx1.send("first").ok();
        });
        timer.start_tracking(&party("a", 1), move |_| async move {
            tx.send("second").ok();
        });
        assert_eq!(timer.pending(), 1);

        let fired = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fired, "second", "replaced timer must not fire");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn cancel_prevents_firing() {
        let timer = ServiceTimer::new(Duration::from_millis(10));
        let (tx, mut rx) = mpsc::unbounded_channel::<PartyId>();

        timer.start_tracking(&party("a", 1), move |id| async move {
            tx.send(id).ok();
        });
        assert!(timer.cancel(&PartyId::new("a")));
        assert_eq!(timer.pending(), 0);

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(rx.try_recv().is_err());
        assert!(!timer.cancel(&PartyId::new("a")), "second cancel is a no-op");
    }

    #[tokio::test]
    async fn shutdown_drains_pending_timers() {
        let timer = ServiceTimer::new(Duration::from_millis(10));
        let (tx, mut rx) = mpsc::unbounded_channel::<PartyId>();

        for i in 0..4 {
            let tx = tx.clone();
            timer.start_tracking(&party(&format!("p{i}"), 1), move |id| async move {
                tx.send(id).ok();
            });
        }
        assert_eq!(timer.pending(), 4);

        timer.shutdown();
        assert_eq!(timer.pending(), 0);

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(rx.try_recv().is_err(), "no timer may fire after shutdown");
    }
}
