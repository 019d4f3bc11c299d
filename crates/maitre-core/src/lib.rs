//! # Maitre Core
//!
//! Core domain types for the Maitre seat coordination library.
//!
//! This crate provides the foundational building blocks used throughout Maitre:
//!
//! - **Identifiers**: [`PartyId`] (time-ordered, lexicographically sortable) and
//!   the optimistic-lock [`Version`] counter
//! - **Parties**: [`Party`], [`PartyStatus`], and the queue-augmented
//!   [`QueuedParty`] with its wait-time accounting
//! - **Host desk state**: [`PartyServiceState`], [`SeatStatus`], and the
//!   versioned [`HostDeskStats`] aggregate
//!
//! ## Design Philosophy
//!
//! - **Type Safety**: Newtypes prevent mixing party ids, versions, and raw strings
//! - **Plain Data**: These types carry no behavior beyond derived accounting;
//!   the stateful coordination lives in `maitre-engine`
//!
//! ## Example
//!
//! ```rust
//! use maitre_core::{Party, PartyId, PartyStatus};
//! use std::time::Duration;
//!
//! let mut party = Party::new(PartyId::generate(), "Chen", 4);
//! assert_eq!(party.status, PartyStatus::Waiting);
//! party.estimated_service_time = Duration::from_secs(4 * 60);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod desk;
pub mod ids;
pub mod party;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::desk::{HostDeskStats, PartyServiceState, SeatStatus};
    pub use crate::ids::{PartyId, Version};
    pub use crate::party::{Party, PartyStatus, QueueStatus, QueuedParty};
}

// Re-export commonly used types at crate root
pub use desk::{HostDeskStats, PartyServiceState, SeatStatus};
pub use ids::{PartyId, Version};
pub use party::{Party, PartyStatus, QueueStatus, QueuedParty};
