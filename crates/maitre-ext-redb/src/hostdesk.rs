//! Redb-backed host-desk store.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use redb::{Database, ReadableTable, TableDefinition};
use tracing::debug;

use maitre_core::{HostDeskStats, PartyId, PartyServiceState, SeatStatus, Version};
use maitre_traits::error::{HostDeskError, StoreError};
use maitre_traits::storage::HostDeskStore;

use crate::db_err;

// Table definitions
const DESK_STATES: TableDefinition<&str, &[u8]> = TableDefinition::new("hd_states");
const DESK_STATS: TableDefinition<&str, u64> = TableDefinition::new("hd_stats");

const KEY_OCCUPIED: &str = "occupied";
const KEY_PRESERVED: &str = "preserved";
const KEY_VERSION: &str = "version";

/// Durable [`HostDeskStore`] over redb.
///
/// The stats counters and the per-party state move inside one write
/// transaction per operation; the version check, the capacity check, and
/// the mutation commit or abort together.
pub struct RedbHostDeskStore {
    db: Arc<Database>,
    total_capacity: u32,
}

impl RedbHostDeskStore {
    /// Create the store for a desk with `total_capacity` seats.
    pub fn new(db: Arc<Database>, total_capacity: u32) -> Result<Self, StoreError> {
        let txn = db.begin_write().map_err(db_err)?;
        {
            txn.open_table(DESK_STATES).map_err(db_err)?;
            let mut stats = txn.open_table(DESK_STATS).map_err(db_err)?;
            for key in [KEY_OCCUPIED, KEY_PRESERVED, KEY_VERSION] {
                if stats.get(key).map_err(db_err)?.is_none() {
                    stats.insert(key, 0).map_err(db_err)?;
                }
            }
        }
        txn.commit().map_err(db_err)?;
        Ok(Self { db, total_capacity })
    }
}

fn read_stat(
    table: &impl ReadableTable<&'static str, u64>,
    key: &'static str,
) -> Result<u64, HostDeskError> {
    Ok(table
        .get(key)
        .map_err(db_err)?
        .map(|g| g.value())
        .unwrap_or(0))
}

fn read_state(
    table: &impl ReadableTable<&'static str, &'static [u8]>,
    party_id: &PartyId,
) -> Result<Option<PartyServiceState>, HostDeskError> {
    let Some(raw) = table.get(party_id.as_str()).map_err(db_err)? else {
        return Ok(None);
    };
    let state = serde_json::from_slice(raw.value()).map_err(StoreError::from)?;
    Ok(Some(state))
}

#[async_trait]
impl HostDeskStore for RedbHostDeskStore {
    fn total_capacity(&self) -> u32 {
        self.total_capacity
    }

    async fn stats(&self) -> Result<HostDeskStats, HostDeskError> {
        let txn = self.db.begin_read().map_err(db_err)?;
        let stats = txn.open_table(DESK_STATS).map_err(db_err)?;
        Ok(HostDeskStats {
            occupied: read_stat(&stats, KEY_OCCUPIED)? as u32,
            preserved: read_stat(&stats, KEY_PRESERVED)? as u32,
            version: Version(read_stat(&stats, KEY_VERSION)?),
        })
    }

    async fn get_party_state(
        &self,
        party_id: &PartyId,
    ) -> Result<Option<PartyServiceState>, HostDeskError> {
        let txn = self.db.begin_read().map_err(db_err)?;
        let states = txn.open_table(DESK_STATES).map_err(db_err)?;
        read_state(&states, party_id)
    }

    async fn create_party_state(
        &self,
        state: PartyServiceState,
        expected: Option<Version>,
    ) -> Result<(), HostDeskError> {
        let txn = self.db.begin_write().map_err(db_err)?;
        {
            let mut states = txn.open_table(DESK_STATES).map_err(db_err)?;
            let mut stats = txn.open_table(DESK_STATS).map_err(db_err)?;

            if states
                .get(state.party_id.as_str())
                .map_err(db_err)?
                .is_some()
            {
                return Err(HostDeskError::AlreadyExists(state.party_id));
            }

            let version = Version(read_stat(&stats, KEY_VERSION)?);
            if let Some(expected) = expected {
                if expected != version {
                    return Err(HostDeskError::VersionMismatch {
                        expected,
                        actual: version,
                    });
                }
            }

            let occupied = read_stat(&stats, KEY_OCCUPIED)?;
            let preserved = read_stat(&stats, KEY_PRESERVED)?;
            let free = u64::from(self.total_capacity).saturating_sub(occupied + preserved);
            if free < u64::from(state.seats) {
                return Err(HostDeskError::InsufficientCapacity {
                    requested: state.seats,
                    free: free as u32,
                });
            }

            let (key, current) = match state.status {
                SeatStatus::Preserved => (KEY_PRESERVED, preserved),
                SeatStatus::Occupied => (KEY_OCCUPIED, occupied),
            };
            stats
                .insert(key, current + u64::from(state.seats))
                .map_err(db_err)?;
            stats
                .insert(KEY_VERSION, version.next().value())
                .map_err(db_err)?;

            let raw = serde_json::to_vec(&state).map_err(StoreError::from)?;
            states
                .insert(state.party_id.as_str(), raw.as_slice())
                .map_err(db_err)?;

            debug!(
                party_id = %state.party_id,
                seats = state.seats,
                status = ?state.status,
                "party service state created"
            );
        }
        txn.commit().map_err(db_err)?;
        Ok(())
    }

    async fn release_preserved(&self, party_id: &PartyId) -> Result<u32, HostDeskError> {
        let txn = self.db.begin_write().map_err(db_err)?;
        let seats = {
            let mut states = txn.open_table(DESK_STATES).map_err(db_err)?;
            let mut stats = txn.open_table(DESK_STATS).map_err(db_err)?;

            let state = read_state(&states, party_id)?
                .ok_or_else(|| HostDeskError::NotFound(party_id.clone()))?;
            if !state.is_preserved() {
                return Err(HostDeskError::NoPreservedSeats(party_id.clone()));
            }

            states.remove(party_id.as_str()).map_err(db_err)?;
            let preserved = read_stat(&stats, KEY_PRESERVED)?;
            stats
                .insert(
                    KEY_PRESERVED,
                    preserved.saturating_sub(u64::from(state.seats)),
                )
                .map_err(db_err)?;
            let version = read_stat(&stats, KEY_VERSION)?;
            stats.insert(KEY_VERSION, version + 1).map_err(db_err)?;
            state.seats
        };
        txn.commit().map_err(db_err)?;
        debug!(party_id = %party_id, seats, "preserved seats released");
        Ok(seats)
    }

    async fn transfer_to_occupied(&self, party_id: &PartyId) -> Result<(), HostDeskError> {
        let txn = self.db.begin_write().map_err(db_err)?;
        {
            let mut states = txn.open_table(DESK_STATES).map_err(db_err)?;
            let mut stats = txn.open_table(DESK_STATS).map_err(db_err)?;

            let mut state = read_state(&states, party_id)?
                .ok_or_else(|| HostDeskError::NotFound(party_id.clone()))?;
            if !state.is_preserved() {
                return Err(HostDeskError::NoPreservedSeats(party_id.clone()));
            }

            state.status = SeatStatus::Occupied;
            state.checked_in_at = Some(Utc::now());
            let raw = serde_json::to_vec(&state).map_err(StoreError::from)?;
            states
                .insert(party_id.as_str(), raw.as_slice())
                .map_err(db_err)?;

            let seats = u64::from(state.seats);
            let preserved = read_stat(&stats, KEY_PRESERVED)?;
            let occupied = read_stat(&stats, KEY_OCCUPIED)?;
            stats
                .insert(KEY_PRESERVED, preserved.saturating_sub(seats))
                .map_err(db_err)?;
            stats.insert(KEY_OCCUPIED, occupied + seats).map_err(db_err)?;
            let version = read_stat(&stats, KEY_VERSION)?;
            stats.insert(KEY_VERSION, version + 1).map_err(db_err)?;
        }
        txn.commit().map_err(db_err)?;
        debug!(party_id = %party_id, "seats transferred to occupied");
        Ok(())
    }

    async fn end_party_state(&self, party_id: &PartyId) -> Result<u32, HostDeskError> {
        let txn = self.db.begin_write().map_err(db_err)?;
        let seats = {
            let mut states = txn.open_table(DESK_STATES).map_err(db_err)?;
            let mut stats = txn.open_table(DESK_STATS).map_err(db_err)?;

            let state = read_state(&states, party_id)?
                .ok_or_else(|| HostDeskError::NotFound(party_id.clone()))?;
            states.remove(party_id.as_str()).map_err(db_err)?;

            let seats = u64::from(state.seats);
            let (key, current) = match state.status {
                SeatStatus::Occupied => (KEY_OCCUPIED, read_stat(&stats, KEY_OCCUPIED)?),
                SeatStatus::Preserved => (KEY_PRESERVED, read_stat(&stats, KEY_PRESERVED)?),
            };
            stats
                .insert(key, current.saturating_sub(seats))
                .map_err(db_err)?;
            let version = read_stat(&stats, KEY_VERSION)?;
            stats.insert(KEY_VERSION, version + 1).map_err(db_err)?;
            state.seats
        };
        txn.commit().map_err(db_err)?;
        debug!(party_id = %party_id, seats, "party service ended");
        Ok(seats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::open_database;

    fn store(capacity: u32) -> (RedbHostDeskStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = open_database(dir.path().join("desk.redb")).unwrap();
        (RedbHostDeskStore::new(db, capacity).unwrap(), dir)
    }

    #[tokio::test]
    async fn full_lifecycle_bumps_version_once_per_mutation() {
        let (store, _dir) = store(10);
        let id = PartyId::new("a");

        store
            .create_party_state(
                PartyServiceState::preserve(id.clone(), 4),
                Some(Version::ZERO),
            )
            .await
            .unwrap();
        assert_eq!(store.stats().await.unwrap().version, Version(1));

        store.transfer_to_occupied(&id).await.unwrap();
        let stats = store.stats().await.unwrap();
        assert_eq!((stats.preserved, stats.occupied), (0, 4));
        assert_eq!(stats.version, Version(2));

        assert_eq!(store.end_party_state(&id).await.unwrap(), 4);
        let stats = store.stats().await.unwrap();
        assert_eq!(stats.seats_in_use(), 0);
        assert_eq!(stats.version, Version(3));
    }

    #[tokio::test]
    async fn version_and_capacity_guards_abort_cleanly() {
        let (store, _dir) = store(10);

        store
            .create_party_state(PartyServiceState::preserve(PartyId::new("a"), 8), None)
            .await
            .unwrap();

        let err = store
            .create_party_state(
                PartyServiceState::preserve(PartyId::new("b"), 2),
                Some(Version::ZERO),
            )
            .await
            .unwrap_err();
        assert!(err.is_version_mismatch());

        let err = store
            .create_party_state(PartyServiceState::preserve(PartyId::new("c"), 4), None)
            .await
            .unwrap_err();
        assert!(err.is_insufficient_capacity());

        // Aborted transactions leave no trace.
        let stats = store.stats().await.unwrap();
        assert_eq!(stats.preserved, 8);
        assert_eq!(stats.version, Version(1));
        assert!(store
            .get_party_state(&PartyId::new("b"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn desk_state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("desk.redb");

        {
            let store = RedbHostDeskStore::new(open_database(&path).unwrap(), 10).unwrap();
            store
                .create_party_state(
                    PartyServiceState::serve_immediately(PartyId::new("a"), 6),
                    None,
                )
                .await
                .unwrap();
        }

        let store = RedbHostDeskStore::new(open_database(&path).unwrap(), 10).unwrap();
        let stats = store.stats().await.unwrap();
        assert_eq!(stats.occupied, 6);
        assert_eq!(stats.version, Version(1));

        let state = store
            .get_party_state(&PartyId::new("a"))
            .await
            .unwrap()
            .unwrap();
        assert!(state.is_occupied());
    }

    #[tokio::test]
    async fn release_distinguishes_missing_from_not_preserved() {
        let (store, _dir) = store(10);

        let err = store.release_preserved(&PartyId::new("ghost")).await.unwrap_err();
        assert!(matches!(err, HostDeskError::NotFound(_)));

        store
            .create_party_state(
                PartyServiceState::serve_immediately(PartyId::new("a"), 2),
                None,
            )
            .await
            .unwrap();
        let err = store.release_preserved(&PartyId::new("a")).await.unwrap_err();
        assert!(matches!(err, HostDeskError::NoPreservedSeats(_)));
    }
}
