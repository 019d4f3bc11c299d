//! # Maitre Ext Redb
//!
//! Embedded durable storage for the Maitre seat coordination library.
//!
//! This crate implements the `maitre-traits` store seams on top of redb:
//!
//! - [`RedbWaitlistStore`]: queue order, party records, prefix sums, and
//!   aggregate counters across four tables
//! - [`RedbHostDeskStore`]: per-party seat states plus the versioned
//!   capacity counters
//!
//! Every mutation runs inside one redb write transaction, which plays the
//! role the original deployment gave to single-keyspace atomic scripts: an
//! observer sees the pre-state or the post-state, never a torn aggregate.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

use std::path::Path;
use std::sync::Arc;

use redb::Database;

use maitre_traits::error::StoreError;

mod hostdesk;
mod waitlist;

pub use hostdesk::RedbHostDeskStore;
pub use waitlist::RedbWaitlistStore;

/// Open (or create) a database file shared by both stores.
pub fn open_database(path: impl AsRef<Path>) -> Result<Arc<Database>, StoreError> {
    let db = Database::create(path).map_err(|e| StoreError::Database(e.to_string()))?;
    Ok(Arc::new(db))
}

pub(crate) fn db_err(e: impl std::fmt::Display) -> StoreError {
    StoreError::Database(e.to_string())
}
