//! Engine wiring and lifecycle.
//!
//! [`SeatingEngine`] assembles the bus, waitlist, host desk, seat manager,
//! and notifier from an [`EngineConfig`] and a pair of stores, then owns
//! their lifecycle: `start` attaches the vacancy watcher, the notifier, and
//! the expiry sweeper; `shutdown` detaches everything and stops pending
//! timers.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use maitre_core::{Party, PartyId, QueueStatus, QueuedParty};
use maitre_traits::estimator::ServiceTimeEstimator;
use maitre_traits::storage::{HostDeskStore, WaitlistStore};

use crate::bus::{EventRegistry, InProcessEventBus};
use crate::config::EngineConfig;
use crate::error::{EngineError, SeatingError, SeatingResult};
use crate::estimate::FixedRateEstimator;
use crate::hostdesk::FixedCapacityHostDesk;
use crate::manager::{Admission, SeatManager};
use crate::notify::{QueueUpdateBroadcaster, ReadyNotifier, ReadySignal};
use crate::strategy::{
    OrderedSeatingStrategy, PartyProcessingStrategy, PartySelectionStrategy, QueueFirstStrategy,
};
use crate::timer::ServiceTimer;
use crate::waitlist::Waitlist;

/// Floor for the expiry sweep period.
const MIN_SWEEP_PERIOD: Duration = Duration::from_secs(60);

/// Builder for [`SeatingEngine`].
#[derive(Default)]
pub struct SeatingEngineBuilder {
    config: EngineConfig,
    waitlist_store: Option<Arc<dyn WaitlistStore>>,
    hostdesk_store: Option<Arc<dyn HostDeskStore>>,
    estimator: Option<Arc<dyn ServiceTimeEstimator>>,
    processing: Option<Arc<dyn PartyProcessingStrategy>>,
    selection: Option<Arc<dyn PartySelectionStrategy>>,
}

impl SeatingEngineBuilder {
    /// Use this configuration.
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Use this waitlist store. Required.
    pub fn with_waitlist_store(mut self, store: Arc<dyn WaitlistStore>) -> Self {
        self.waitlist_store = Some(store);
        self
    }

    /// Use this host-desk store. Required.
    pub fn with_hostdesk_store(mut self, store: Arc<dyn HostDeskStore>) -> Self {
        self.hostdesk_store = Some(store);
        self
    }

    /// Override the service-time estimator.
    pub fn with_estimator(mut self, estimator: Arc<dyn ServiceTimeEstimator>) -> Self {
        self.estimator = Some(estimator);
        self
    }

    /// Override the admission policy.
    pub fn with_processing_strategy(
        mut self,
        strategy: Arc<dyn PartyProcessingStrategy>,
    ) -> Self {
        self.processing = Some(strategy);
        self
    }

    /// Override the promotion policy.
    pub fn with_selection_strategy(mut self, strategy: Arc<dyn PartySelectionStrategy>) -> Self {
        self.selection = Some(strategy);
        self
    }

    /// Wire everything together.
    pub fn build(self) -> Result<SeatingEngine, EngineError> {
        self.config.validate()?;

        let waitlist_store = self
            .waitlist_store
            .ok_or(EngineError::MissingComponent("waitlist store"))?;
        let hostdesk_store = self
            .hostdesk_store
            .ok_or(EngineError::MissingComponent("host desk store"))?;

        if hostdesk_store.total_capacity() != self.config.total_capacity {
            return Err(EngineError::InvalidConfig(format!(
                "host desk store holds {} seats but the config says {}",
                hostdesk_store.total_capacity(),
                self.config.total_capacity
            )));
        }

        let bus = Arc::new(InProcessEventBus::new(Arc::new(EventRegistry::new())));
        let estimator = self
            .estimator
            .unwrap_or_else(|| Arc::new(FixedRateEstimator::new(self.config.time_per_guest())));
        let timer = Arc::new(ServiceTimer::new(self.config.duration_per_guest()));

        let waitlist = Arc::new(Waitlist::new(
            waitlist_store,
            estimator,
            Arc::clone(&bus),
            self.config.scan_chunk_size,
        ));
        let hostdesk = FixedCapacityHostDesk::new(
            hostdesk_store,
            Arc::clone(&bus),
            Arc::clone(&timer),
        );

        let processing = self
            .processing
            .unwrap_or_else(|| Arc::new(QueueFirstStrategy));
        let selection = self
            .selection
            .unwrap_or_else(|| Arc::new(OrderedSeatingStrategy::new(Arc::clone(&waitlist))));

        let manager = SeatManager::new(
            Arc::clone(&waitlist),
            Arc::clone(&hostdesk),
            Arc::clone(&bus),
            processing,
            selection,
            self.config.preserve_max_retries,
        );
        let notifier = ReadyNotifier::new(Arc::clone(&bus));
        let queue_updates = QueueUpdateBroadcaster::new(Arc::clone(&bus), Arc::clone(&waitlist));
        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(SeatingEngine {
            config: self.config,
            bus,
            waitlist,
            hostdesk,
            manager,
            notifier,
            queue_updates,
            timer,
            sweeper: Mutex::new(None),
            shutdown_tx,
        })
    }
}

/// The assembled seat coordination engine.
pub struct SeatingEngine {
    config: EngineConfig,
    bus: Arc<InProcessEventBus>,
    waitlist: Arc<Waitlist>,
    hostdesk: Arc<FixedCapacityHostDesk>,
    manager: Arc<SeatManager>,
    notifier: Arc<ReadyNotifier>,
    queue_updates: Arc<QueueUpdateBroadcaster>,
    timer: Arc<ServiceTimer>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
    shutdown_tx: broadcast::Sender<()>,
}

impl std::fmt::Debug for SeatingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeatingEngine").finish_non_exhaustive()
    }
}

impl SeatingEngine {
    /// Start building an engine.
    pub fn builder() -> SeatingEngineBuilder {
        SeatingEngineBuilder::default()
    }

    /// Attach the vacancy watcher, the notifier, and the expiry sweeper,
    /// then run one seating pass in case seats already stand free.
    pub async fn start(&self) {
        self.manager.watch_seat_vacancy();
        self.notifier.attach();
        self.queue_updates.attach();

        if let Err(err) = self.manager.check_and_assign_seating().await {
            warn!(%err, "initial seating pass failed");
        }

        let ttl = self.config.entity_ttl();
        let period = (ttl / 10).max(MIN_SWEEP_PERIOD);
        let waitlist = Arc::clone(&self.waitlist);
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await; // the first tick completes immediately
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match waitlist.purge_older_than(ttl).await {
                            Ok(purged) if !purged.is_empty() => {
                                info!(purged = purged.len(), "swept expired waitlist records");
                            }
                            Ok(_) => {}
                            Err(err) => warn!(%err, "expiry sweep failed"),
                        }
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
        });
        if let Some(previous) = self.sweeper.lock().replace(handle) {
            previous.abort();
        }

        info!(
            capacity = self.config.total_capacity,
            "seating engine started"
        );
    }

    /// Detach watchers, stop the sweeper, and abandon pending timers.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
        if let Some(handle) = self.sweeper.lock().take() {
            handle.abort();
        }
        self.manager.unwatch_seat_vacancy();
        self.notifier.detach();
        self.queue_updates.detach();
        self.timer.shutdown();
        self.bus.close();
        info!("seating engine stopped");
    }

    // -------------------------------------------------------------------------
    // Consumer-facing operations
    // -------------------------------------------------------------------------

    /// Admit a new arrival by name and size.
    pub async fn process_new_party(&self, name: &str, size: u32) -> SeatingResult<Admission> {
        if size == 0 || size > self.config.total_capacity {
            return Err(SeatingError::InvalidPartySize {
                size,
                total_capacity: self.config.total_capacity,
            });
        }

        let party = Party::new(PartyId::generate(), name, size);
        debug!(party_id = %party.id, size, "new party arrival");
        self.manager.process_new_party(party).await
    }

    /// Check in a party that came to the desk.
    pub async fn party_check_in(&self, party_id: &PartyId) -> SeatingResult<()> {
        self.manager.party_check_in(party_id).await
    }

    /// Aggregate queue snapshot.
    pub async fn queue_status(&self) -> SeatingResult<QueueStatus> {
        self.manager.queue_status().await
    }

    /// Fetch a queued party with position and wait estimate.
    pub async fn get_queued_party(
        &self,
        party_id: &PartyId,
    ) -> SeatingResult<Option<QueuedParty>> {
        self.manager.get_queued_party(party_id).await
    }

    /// Whether a party currently occupies seats.
    pub async fn has_party_occupied_seat(&self, party_id: &PartyId) -> bool {
        self.manager.has_party_occupied_seat(party_id).await
    }

    /// Register for a party's "table ready" push signal.
    pub fn register_ready_listener(
        &self,
        party_id: PartyId,
    ) -> tokio::sync::mpsc::Receiver<ReadySignal> {
        self.notifier.register(party_id)
    }

    /// Probe the stores and report component health.
    pub async fn health_check(&self) -> crate::health::HealthReport {
        use crate::health::{ComponentStatus, HealthReport};
        use tokio::time::Instant;

        let started = Instant::now();
        let waitlist = match self.waitlist.status().await {
            Ok(_) => ComponentStatus::healthy("waitlist", started),
            Err(err) => ComponentStatus::unhealthy("waitlist", started, err.to_string()),
        };

        let started = Instant::now();
        let hostdesk = match self.hostdesk.current_capacity().await {
            Ok(_) => ComponentStatus::healthy("hostdesk", started),
            Err(err) => ComponentStatus::unhealthy("hostdesk", started, err.to_string()),
        };

        HealthReport::from_components(vec![waitlist, hostdesk])
    }

    // -------------------------------------------------------------------------
    // Component accessors
    // -------------------------------------------------------------------------

    /// The engine's configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The event bus.
    pub fn bus(&self) -> &Arc<InProcessEventBus> {
        &self.bus
    }

    /// The waitlist service.
    pub fn waitlist(&self) -> &Arc<Waitlist> {
        &self.waitlist
    }

    /// The host desk service.
    pub fn hostdesk(&self) -> &Arc<FixedCapacityHostDesk> {
        &self.hostdesk
    }

    /// The seat manager.
    pub fn manager(&self) -> &Arc<SeatManager> {
        &self.manager
    }
}
