//! Topic-based event bus with asynchronous in-process delivery.
//!
//! This module provides:
//!
//! - **[`BusEvent`]**: trait tying an event type to its topic
//! - **[`EventRegistry`]**: topic -> event-shape table, so payloads can be
//!   reconstructed when the bus is backed by a network transport
//! - **[`InProcessEventBus`]**: broadcast-channel fan-out with one dispatcher
//!   task per subscription
//!
//! # Architecture
//!
//! ```text
//! Publisher
//!     │ serialize
//!     ▼
//! ┌──────────────┐  topic channel   ┌────────────┐
//! │   EventBus   │────broadcast────►│ dispatcher │──► handler A
//! │  (registry)  │────broadcast────►│ dispatcher │──► handler B
//! └──────────────┘                  └────────────┘
//! ```
//!
//! Delivery is at-least-once within the process. Order is preserved per
//! topic from a single publisher; each handler sees its topic's events in
//! that order, and distinct handlers run in parallel. A slow handler lags
//! and is warned about, but never blocks the publisher or its peers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Per-topic channel capacity before slow subscribers start lagging.
const TOPIC_CHANNEL_CAPACITY: usize = 256;

/// An event that can travel over the bus.
///
/// The topic is a property of the type: every value of an event type is
/// published to, and decoded from, the same topic string.
pub trait BusEvent: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Topic this event type is routed on.
    const TOPIC: &'static str;
}

/// Errors from bus operations.
#[derive(Debug, Error)]
pub enum BusError {
    /// Event could not be serialized for transport.
    #[error("event serialization failed: {0}")]
    Serialization(String),

    /// The topic has no registered event shape.
    #[error("topic {0} has no registered event type")]
    UnregisteredTopic(String),
}

/// Serialized event in flight.
#[derive(Debug, Clone)]
struct EventEnvelope {
    payload: Arc<serde_json::Value>,
}

// =============================================================================
// EVENT REGISTRY
// =============================================================================

/// Maps topic strings to the concrete event shape published on them.
///
/// The in-process bus uses it to refuse publishes on unknown topics; a
/// network-backed bus additionally needs it to pick the right decoder for
/// incoming payloads, which is why each entry carries a decode probe.
#[derive(Default)]
pub struct EventRegistry {
    topics: DashMap<&'static str, RegisteredTopic>,
}

struct RegisteredTopic {
    type_name: &'static str,
    decodes: fn(&serde_json::Value) -> bool,
}

impl EventRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an event type under its topic. Re-registration is a no-op.
    pub fn register<E: BusEvent>(&self) {
        self.topics.entry(E::TOPIC).or_insert_with(|| RegisteredTopic {
            type_name: std::any::type_name::<E>(),
            decodes: |value| serde_json::from_value::<E>(value.clone()).is_ok(),
        });
    }

    /// Whether a topic has a registered event shape.
    pub fn contains(&self, topic: &str) -> bool {
        self.topics.contains_key(topic)
    }

    /// Type name registered for a topic, if any.
    pub fn type_name(&self, topic: &str) -> Option<&'static str> {
        self.topics.get(topic).map(|t| t.type_name)
    }

    /// Whether a raw payload decodes as the topic's registered shape.
    pub fn payload_matches(&self, topic: &str, payload: &serde_json::Value) -> bool {
        self.topics
            .get(topic)
            .map(|t| (t.decodes)(payload))
            .unwrap_or(false)
    }
}

// =============================================================================
// IN-PROCESS EVENT BUS
// =============================================================================

/// Handle for one subscription; pass to
/// [`unsubscribe`](InProcessEventBus::unsubscribe) to remove it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscription {
    topic: &'static str,
    task: JoinHandle<()>,
}

/// Topic-based publish/subscribe over tokio broadcast channels.
pub struct InProcessEventBus {
    registry: Arc<EventRegistry>,
    channels: DashMap<String, broadcast::Sender<EventEnvelope>>,
    subscriptions: DashMap<SubscriptionId, Subscription>,
    next_subscription: AtomicU64,
}

impl InProcessEventBus {
    /// Create a bus over the given registry.
    pub fn new(registry: Arc<EventRegistry>) -> Self {
        Self {
            registry,
            channels: DashMap::new(),
            subscriptions: DashMap::new(),
            next_subscription: AtomicU64::new(1),
        }
    }

    /// The registry this bus routes with.
    pub fn registry(&self) -> &EventRegistry {
        &self.registry
    }

    /// Publish an event to every subscriber of its topic.
    ///
    /// Returns once the event is enqueued; handlers run asynchronously, and
    /// a failing handler affects neither the publisher nor other handlers.
    pub fn publish<E: BusEvent>(&self, event: &E) -> Result<(), BusError> {
        if !self.registry.contains(E::TOPIC) {
            return Err(BusError::UnregisteredTopic(E::TOPIC.to_string()));
        }

        let payload =
            serde_json::to_value(event).map_err(|e| BusError::Serialization(e.to_string()))?;
        let envelope = EventEnvelope {
            payload: Arc::new(payload),
        };

        let sender = self.sender(E::TOPIC);
        // An Err here only means nobody is listening right now.
        let delivered = sender.send(envelope).unwrap_or(0);
        debug!(topic = E::TOPIC, delivered, "event published");
        Ok(())
    }

    /// Register a handler for an event type.
    ///
    /// The event type is registered as the topic's shape as a side effect.
    /// The same handler may be subscribed more than once; each registration
    /// counts once and gets its own dispatcher.
    pub fn subscribe<E, H, Fut>(&self, handler: H) -> SubscriptionId
    where
        E: BusEvent,
        H: Fn(E) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.registry.register::<E>();

        let mut receiver = self.sender(E::TOPIC).subscribe();
        let task = tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(envelope) => {
                        let event = match serde_json::from_value::<E>((*envelope.payload).clone()) {
                            Ok(event) => event,
                            Err(err) => {
                                warn!(topic = E::TOPIC, %err, "dropping malformed event payload");
                                continue;
                            }
                        };
                        if let Err(err) = handler(event).await {
                            warn!(topic = E::TOPIC, %err, "event handler failed");
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(topic = E::TOPIC, skipped, "subscriber lagged behind");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.subscriptions.insert(
            id,
            Subscription {
                topic: E::TOPIC,
                task,
            },
        );
        debug!(topic = E::TOPIC, ?id, "subscribed");
        id
    }

    /// Remove a subscription.
    ///
    /// When the last subscriber of a topic leaves, the topic's channel is
    /// closed and dropped.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        let Some((_, subscription)) = self.subscriptions.remove(&id) else {
            return;
        };
        subscription.task.abort();

        let topic_in_use = self
            .subscriptions
            .iter()
            .any(|entry| entry.value().topic == subscription.topic);
        if !topic_in_use {
            self.channels.remove(subscription.topic);
        }
        debug!(topic = subscription.topic, ?id, "unsubscribed");
    }

    /// Tear down every subscription and channel.
    pub fn close(&self) {
        let ids: Vec<SubscriptionId> = self.subscriptions.iter().map(|e| *e.key()).collect();
        for id in ids {
            self.unsubscribe(id);
        }
        self.channels.clear();
    }

    fn sender(&self, topic: &str) -> broadcast::Sender<EventEnvelope> {
        if let Some(sender) = self.channels.get(topic) {
            return sender.value().clone();
        }
        self.channels
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(TOPIC_CHANNEL_CAPACITY).0)
            .value()
            .clone()
    }
}

impl Drop for InProcessEventBus {
    fn drop(&mut self) {
        for entry in self.subscriptions.iter() {
            entry.value().task.abort();
        }
    }
}
