//! # Maitre Ext Memory
//!
//! In-memory storage implementations for the Maitre seat coordination
//! library.
//!
//! Both stores guard their whole state with a single mutex, so every trait
//! operation is one critical section: the atomicity the seams demand falls
//! out of the lock rather than a transactional backend. This is the default
//! backend for tests and single-process deployments; `maitre-ext-redb`
//! provides the durable variant.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

mod hostdesk;
mod waitlist;

pub use hostdesk::MemoryHostDeskStore;
pub use waitlist::MemoryWaitlistStore;
