//! Domain events carried on the bus.

use serde::{Deserialize, Serialize};

use maitre_core::{PartyId, QueuedParty};

use crate::bus::BusEvent;

/// Topic: seats have been held for a named party.
pub const TOPIC_PARTY_PRESERVED: &str = "hd.party.preserved";
/// Topic: a party's service has ended and its seats are free again.
pub const TOPIC_PARTY_SERVICED: &str = "hd.party.serviced";
/// Topic: UI-facing notification that a party may approach the desk.
pub const TOPIC_NOTIFY_PARTY_READY: &str = "notify.party.ready";

/// Published by the host desk after seats were successfully preserved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeatsPreserved {
    /// Party the seats are held for.
    pub party_id: PartyId,
}

impl BusEvent for SeatsPreserved {
    const TOPIC: &'static str = TOPIC_PARTY_PRESERVED;
}

/// Published by the host desk when a party's service completes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartyServiced {
    /// Party whose seats were freed.
    pub party_id: PartyId,
}

impl BusEvent for PartyServiced {
    const TOPIC: &'static str = TOPIC_PARTY_SERVICED;
}

/// Published by the waitlist once a party has been marked ready.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartyReadyNotification {
    /// Party that may now come to the desk.
    pub party_id: PartyId,
}

impl BusEvent for PartyReadyNotification {
    const TOPIC: &'static str = TOPIC_NOTIFY_PARTY_READY;
}

/// Topic: a waiting party's position or wait estimate changed.
pub const TOPIC_NOTIFY_QUEUE_UPDATE: &str = "notify.party.queue_update";

/// Published for each queued party when the queue ahead of it moves.
///
/// The UI push layer subscribes to refresh the position and wait time a
/// waiting browser shows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartyQueueStatusUpdate {
    /// The refreshed queue snapshot for one party.
    pub party: QueuedParty,
}

impl BusEvent for PartyQueueStatusUpdate {
    const TOPIC: &'static str = TOPIC_NOTIFY_QUEUE_UPDATE;
}
