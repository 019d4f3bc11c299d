//! # Maitre Engine
//!
//! Stateful seat coordination engine for restaurant waiting queues.
//!
//! This crate provides the **stateful orchestration layer** over the plain
//! domain types (`maitre-core`) and the storage seams (`maitre-traits`).
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                         SEATING ENGINE                              │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │                                                                     │
//! │   arrival ──► Seat Manager ──────────┐                              │
//! │               │  admission loop      │                              │
//! │               ▼                      ▼                              │
//! │        ┌────────────┐         ┌────────────┐      ┌─────────────┐   │
//! │        │  Waitlist  │         │ Host Desk  │─────►│ ServiceTimer│   │
//! │        │ prefix sums│         │ CAS + stats│◄─────│  one-shot   │   │
//! │        └─────┬──────┘         └─────┬──────┘      └─────────────┘   │
//! │              │                      │                               │
//! │              ▼                      ▼                               │
//! │        ┌─────────────────────────────────────┐                      │
//! │        │              EVENT BUS              │                      │
//! │        │ hd.party.preserved / hd.party.serviced / notify.party.ready│
//! │        └───────────────────┬─────────────────┘                      │
//! │                            ▼                                        │
//! │                      Ready Notifier ──► UI push layer               │
//! │                                                                     │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Key Components
//!
//! - **[`InProcessEventBus`]**: topic pub/sub with per-subscription dispatchers
//! - **[`Waitlist`]**: FIFO queue service with online wait-time estimates
//! - **[`FixedCapacityHostDesk`]**: bounded seat allocator under versioned CAS
//! - **[`SeatManager`]**: admission policy and vacancy watcher
//! - **[`ServiceTimer`]**: one-shot service completion timers
//! - **[`SeatingEngine`]**: builder-wired assembly with start/shutdown
//!
//! ## Example
//!
//! ```rust,ignore
//! use maitre_engine::prelude::*;
//!
//! let engine = SeatingEngine::builder()
//!     .with_config(EngineConfig::from_env()?)
//!     .with_waitlist_store(waitlist_store)
//!     .with_hostdesk_store(hostdesk_store)
//!     .build()?;
//! engine.start().await;
//!
//! let admission = engine.process_new_party("Chen", 4).await?;
//! println!("{:?} at position {:?}", admission.status(), admission.position());
//! ```
//!
//! ## Separation of Concerns
//!
//! **This crate is STATEFUL.** It manages subscriptions, timers, retries,
//! and event fan-out. The atomic queue and capacity mutations live behind
//! the `maitre-traits` store seams; implementations are extension crates.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod bus;
pub mod config;
pub mod engine;
pub mod error;
pub mod estimate;
pub mod events;
pub mod health;
pub mod hostdesk;
pub mod logging;
pub mod manager;
pub mod notify;
pub mod strategy;
pub mod timer;
pub mod waitlist;

// Re-export core types
pub use bus::{BusEvent, EventRegistry, InProcessEventBus, SubscriptionId};
pub use config::EngineConfig;
pub use engine::{SeatingEngine, SeatingEngineBuilder};
pub use error::{EngineError, SeatingError, SeatingResult};
pub use hostdesk::FixedCapacityHostDesk;
pub use manager::{Admission, SeatManager};
pub use timer::ServiceTimer;
pub use waitlist::{PartyScan, Waitlist};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::bus::{BusEvent, EventRegistry, InProcessEventBus, SubscriptionId};
    pub use crate::config::EngineConfig;
    pub use crate::engine::{SeatingEngine, SeatingEngineBuilder};
    pub use crate::error::{EngineError, SeatingError, SeatingResult};
    pub use crate::estimate::FixedRateEstimator;
    pub use crate::events::{
        PartyQueueStatusUpdate, PartyReadyNotification, PartyServiced, SeatsPreserved,
    };
    pub use crate::health::{ComponentStatus, HealthReport, HealthStatus};
    pub use crate::hostdesk::FixedCapacityHostDesk;
    pub use crate::manager::{Admission, SeatManager};
    pub use crate::notify::{QueueUpdateBroadcaster, ReadyNotifier, ReadySignal};
    pub use crate::strategy::{
        InstantServeStrategy, OrderedSeatingStrategy, PartyProcessingStrategy,
        PartySelectionStrategy, QueueFirstStrategy, SeatingContext,
    };
    pub use crate::timer::ServiceTimer;
    pub use crate::waitlist::{PartyScan, Waitlist};

    pub use maitre_core::prelude::*;
    pub use maitre_traits::prelude::*;
}
