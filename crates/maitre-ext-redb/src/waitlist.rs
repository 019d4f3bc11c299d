//! Redb-backed waitlist store.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redb::{Database, ReadableTable, ReadableTableMetadata, TableDefinition};
use serde::{Deserialize, Serialize};
use tracing::debug;

use maitre_core::{Party, PartyId, PartyStatus, QueueStatus, QueuedParty};
use maitre_traits::error::{StoreError, WaitlistError};
use maitre_traits::storage::{ScanChunk, WaitlistStore};

use crate::db_err;

// Table definitions
//
// The queue table is the ordered set: keys are (join score, party id), so
// iteration order is join order with the sortable id as tie-breaker.
const QUEUE: TableDefinition<(i64, &str), ()> = TableDefinition::new("wl_queue");
const PARTIES: TableDefinition<&str, &[u8]> = TableDefinition::new("wl_parties");
const PREFIX_SUMS: TableDefinition<&str, u64> = TableDefinition::new("wl_prefix_sums");
const COUNTERS: TableDefinition<&str, u64> = TableDefinition::new("wl_counters");

const KEY_TOTAL_WAIT_PREFIX: &str = "total_wait_prefix_nanos";
const KEY_TOTAL_SERVICE_TIME: &str = "total_service_time_nanos";
const KEY_WAITING_COUNT: &str = "waiting_count";

/// Stored party record.
#[derive(Debug, Serialize, Deserialize)]
struct PartyRecord {
    party: Party,
    joined_at: DateTime<Utc>,
}

fn nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

fn duration(nanos: u64) -> Duration {
    Duration::from_nanos(nanos)
}

/// Durable [`WaitlistStore`] over redb.
pub struct RedbWaitlistStore {
    db: Arc<Database>,
}

impl RedbWaitlistStore {
    /// Create the store, materializing its tables.
    pub fn new(db: Arc<Database>) -> Result<Self, StoreError> {
        let txn = db.begin_write().map_err(db_err)?;
        {
            txn.open_table(QUEUE).map_err(db_err)?;
            txn.open_table(PARTIES).map_err(db_err)?;
            txn.open_table(PREFIX_SUMS).map_err(db_err)?;
            txn.open_table(COUNTERS).map_err(db_err)?;
        }
        txn.commit().map_err(db_err)?;
        Ok(Self { db })
    }

    /// One write transaction that removes a party and reconciles every
    /// counter, mirroring the store's leave contract.
    fn remove_inner(&self, party_id: &PartyId) -> Result<(), WaitlistError> {
        let txn = self.db.begin_write().map_err(db_err)?;
        {
            let mut queue = txn.open_table(QUEUE).map_err(db_err)?;
            let mut parties = txn.open_table(PARTIES).map_err(db_err)?;
            let mut prefix_sums = txn.open_table(PREFIX_SUMS).map_err(db_err)?;
            let mut counters = txn.open_table(COUNTERS).map_err(db_err)?;

            // Locate the victim and everything behind it in one pass.
            let mut victim_key: Option<(i64, String)> = None;
            let mut rank = 0usize;
            let mut trailing: Vec<String> = Vec::new();
            for (index, entry) in queue.iter().map_err(db_err)?.enumerate() {
                let (key, _) = entry.map_err(db_err)?;
                let (score, id) = key.value();
                if id == party_id.as_str() {
                    victim_key = Some((score, id.to_string()));
                    rank = index;
                } else if victim_key.is_some() {
                    trailing.push(id.to_string());
                }
            }
            let (score, _) = victim_key
                .ok_or_else(|| WaitlistError::NotFound(party_id.clone()))?;

            let record: PartyRecord = {
                let raw = parties
                    .get(party_id.as_str())
                    .map_err(db_err)?
                    .ok_or_else(|| {
                        WaitlistError::Storage(StoreError::Inconsistent(format!(
                            "queued id {party_id} has no record"
                        )))
                    })?;
                serde_json::from_slice(raw.value()).map_err(StoreError::from)?
            };
            let est = nanos(record.party.estimated_service_time);

            if record.party.status == PartyStatus::Waiting {
                let waiting = read_counter(&counters, KEY_WAITING_COUNT)?;
                counters
                    .insert(KEY_WAITING_COUNT, waiting.saturating_sub(1))
                    .map_err(db_err)?;
            }

            if rank == 0 {
                let served = read_counter(&counters, KEY_TOTAL_SERVICE_TIME)?;
                counters
                    .insert(KEY_TOTAL_SERVICE_TIME, served.saturating_add(est))
                    .map_err(db_err)?;
            } else {
                for behind in &trailing {
                    let current = prefix_sums
                        .get(behind.as_str())
                        .map_err(db_err)?
                        .map(|g| g.value())
                        .unwrap_or(0);
                    prefix_sums
                        .insert(behind.as_str(), current.saturating_sub(est))
                        .map_err(db_err)?;
                }
                let total = read_counter(&counters, KEY_TOTAL_WAIT_PREFIX)?;
                counters
                    .insert(KEY_TOTAL_WAIT_PREFIX, total.saturating_sub(est))
                    .map_err(db_err)?;
            }

            queue.remove(&(score, party_id.as_str())).map_err(db_err)?;
            parties.remove(party_id.as_str()).map_err(db_err)?;
            prefix_sums.remove(party_id.as_str()).map_err(db_err)?;

            if queue.is_empty().map_err(db_err)? {
                counters.insert(KEY_TOTAL_WAIT_PREFIX, 0).map_err(db_err)?;
                counters.insert(KEY_TOTAL_SERVICE_TIME, 0).map_err(db_err)?;
            }
        }
        txn.commit().map_err(db_err)?;
        debug!(party_id = %party_id, "party removed from durable waitlist");
        Ok(())
    }
}

fn read_counter(
    table: &impl ReadableTable<&'static str, u64>,
    key: &'static str,
) -> Result<u64, WaitlistError> {
    Ok(table
        .get(key)
        .map_err(db_err)?
        .map(|g| g.value())
        .unwrap_or(0))
}

#[async_trait]
impl WaitlistStore for RedbWaitlistStore {
    async fn add_party(&self, mut party: QueuedParty) -> Result<QueuedParty, WaitlistError> {
        let txn = self.db.begin_write().map_err(db_err)?;
        let (position, end_of_service) = {
            let mut queue = txn.open_table(QUEUE).map_err(db_err)?;
            let mut parties = txn.open_table(PARTIES).map_err(db_err)?;
            let mut prefix_sums = txn.open_table(PREFIX_SUMS).map_err(db_err)?;
            let mut counters = txn.open_table(COUNTERS).map_err(db_err)?;

            if parties
                .get(party.id().as_str())
                .map_err(db_err)?
                .is_some()
            {
                return Err(WaitlistError::AlreadyQueued(party.id().clone()));
            }

            let position = queue.len().map_err(db_err)? as usize;
            let score = party.joined_at.timestamp_micros();
            queue
                .insert((score, party.id().as_str()), ())
                .map_err(db_err)?;

            let est = nanos(party.party.estimated_service_time);
            let total = read_counter(&counters, KEY_TOTAL_WAIT_PREFIX)?.saturating_add(est);
            counters.insert(KEY_TOTAL_WAIT_PREFIX, total).map_err(db_err)?;
            prefix_sums
                .insert(party.id().as_str(), total)
                .map_err(db_err)?;

            if party.status() == PartyStatus::Waiting {
                let waiting = read_counter(&counters, KEY_WAITING_COUNT)?;
                counters
                    .insert(KEY_WAITING_COUNT, waiting + 1)
                    .map_err(db_err)?;
            }

            let record = PartyRecord {
                party: party.party.clone(),
                joined_at: party.joined_at,
            };
            let raw = serde_json::to_vec(&record).map_err(StoreError::from)?;
            parties
                .insert(party.id().as_str(), raw.as_slice())
                .map_err(db_err)?;

            let served = read_counter(&counters, KEY_TOTAL_SERVICE_TIME)?;
            (position, duration(total.saturating_sub(served)))
        };
        txn.commit().map_err(db_err)?;

        party.position = position;
        party.estimated_end_of_service = end_of_service;
        debug!(party_id = %party.id(), position, "party joined durable waitlist");
        Ok(party)
    }

    async fn remove_party(&self, party_id: &PartyId) -> Result<(), WaitlistError> {
        self.remove_inner(party_id)
    }

    async fn get_party(&self, party_id: &PartyId) -> Result<Option<QueuedParty>, WaitlistError> {
        let txn = self.db.begin_read().map_err(db_err)?;
        let queue = txn.open_table(QUEUE).map_err(db_err)?;
        let parties = txn.open_table(PARTIES).map_err(db_err)?;
        let prefix_sums = txn.open_table(PREFIX_SUMS).map_err(db_err)?;
        let counters = txn.open_table(COUNTERS).map_err(db_err)?;

        let mut position = None;
        for (index, entry) in queue.iter().map_err(db_err)?.enumerate() {
            let (key, _) = entry.map_err(db_err)?;
            if key.value().1 == party_id.as_str() {
                position = Some(index);
                break;
            }
        }
        let Some(position) = position else {
            return Ok(None);
        };

        let Some(raw) = parties.get(party_id.as_str()).map_err(db_err)? else {
            return Ok(None);
        };
        let record: PartyRecord =
            serde_json::from_slice(raw.value()).map_err(StoreError::from)?;

        let prefix = prefix_sums
            .get(party_id.as_str())
            .map_err(db_err)?
            .map(|g| g.value())
            .unwrap_or(0);
        let served = read_counter(&counters, KEY_TOTAL_SERVICE_TIME)?;

        Ok(Some(QueuedParty {
            party: record.party,
            position,
            joined_at: record.joined_at,
            estimated_end_of_service: duration(prefix.saturating_sub(served)),
        }))
    }

    async fn get_party_details(&self, party_id: &PartyId) -> Result<Option<Party>, WaitlistError> {
        let txn = self.db.begin_read().map_err(db_err)?;
        let parties = txn.open_table(PARTIES).map_err(db_err)?;
        let Some(raw) = parties.get(party_id.as_str()).map_err(db_err)? else {
            return Ok(None);
        };
        let record: PartyRecord =
            serde_json::from_slice(raw.value()).map_err(StoreError::from)?;
        Ok(Some(record.party))
    }

    async fn has_party(&self, party_id: &PartyId) -> Result<bool, WaitlistError> {
        let txn = self.db.begin_read().map_err(db_err)?;
        let parties = txn.open_table(PARTIES).map_err(db_err)?;
        Ok(parties.get(party_id.as_str()).map_err(db_err)?.is_some())
    }

    async fn queue_status(&self) -> Result<QueueStatus, WaitlistError> {
        let txn = self.db.begin_read().map_err(db_err)?;
        let queue = txn.open_table(QUEUE).map_err(db_err)?;
        let counters = txn.open_table(COUNTERS).map_err(db_err)?;

        let total = read_counter(&counters, KEY_TOTAL_WAIT_PREFIX)?;
        let served = read_counter(&counters, KEY_TOTAL_SERVICE_TIME)?;

        Ok(QueueStatus {
            total_parties: queue.len().map_err(db_err)? as usize,
            waiting_parties: read_counter(&counters, KEY_WAITING_COUNT)? as usize,
            current_wait_time: duration(total.saturating_sub(served)),
        })
    }

    async fn scan_chunk(&self, cursor: usize, limit: usize) -> Result<ScanChunk, WaitlistError> {
        let txn = self.db.begin_read().map_err(db_err)?;
        let queue = txn.open_table(QUEUE).map_err(db_err)?;
        let parties = txn.open_table(PARTIES).map_err(db_err)?;
        let prefix_sums = txn.open_table(PREFIX_SUMS).map_err(db_err)?;
        let counters = txn.open_table(COUNTERS).map_err(db_err)?;

        let total = queue.len().map_err(db_err)? as usize;
        let served = read_counter(&counters, KEY_TOTAL_SERVICE_TIME)?;

        let mut out = Vec::new();
        for (index, entry) in queue
            .iter()
            .map_err(db_err)?
            .enumerate()
            .skip(cursor)
            .take(limit)
        {
            let (key, _) = entry.map_err(db_err)?;
            let id = key.value().1.to_string();

            let Some(raw) = parties.get(id.as_str()).map_err(db_err)? else {
                continue;
            };
            let record: PartyRecord =
                serde_json::from_slice(raw.value()).map_err(StoreError::from)?;
            let prefix = prefix_sums
                .get(id.as_str())
                .map_err(db_err)?
                .map(|g| g.value())
                .unwrap_or(0);

            out.push(QueuedParty {
                party: record.party,
                position: index,
                joined_at: record.joined_at,
                estimated_end_of_service: duration(prefix.saturating_sub(served)),
            });
        }

        let end = cursor.saturating_add(limit);
        Ok(ScanChunk {
            parties: out,
            next_cursor: (end < total).then_some(end),
        })
    }

    async fn update_party_status(
        &self,
        party_id: &PartyId,
        status: PartyStatus,
    ) -> Result<(), WaitlistError> {
        let txn = self.db.begin_write().map_err(db_err)?;
        {
            let mut parties = txn.open_table(PARTIES).map_err(db_err)?;
            let mut counters = txn.open_table(COUNTERS).map_err(db_err)?;

            let mut record: PartyRecord = {
                let raw = parties
                    .get(party_id.as_str())
                    .map_err(db_err)?
                    .ok_or_else(|| WaitlistError::NotFound(party_id.clone()))?;
                serde_json::from_slice(raw.value()).map_err(StoreError::from)?
            };

            let from = record.party.status;
            if from != status {
                if !from.can_become(status) {
                    return Err(WaitlistError::InvalidStatusTransition { from, to: status });
                }
                record.party.status = status;
                let raw = serde_json::to_vec(&record).map_err(StoreError::from)?;
                parties
                    .insert(party_id.as_str(), raw.as_slice())
                    .map_err(db_err)?;

                if from == PartyStatus::Waiting {
                    let waiting = read_counter(&counters, KEY_WAITING_COUNT)?;
                    counters
                        .insert(KEY_WAITING_COUNT, waiting.saturating_sub(1))
                        .map_err(db_err)?;
                }
            }
        }
        txn.commit().map_err(db_err)?;
        Ok(())
    }

    async fn purge_expired(
        &self,
        older_than: DateTime<Utc>,
    ) -> Result<Vec<PartyId>, WaitlistError> {
        let expired = {
            let txn = self.db.begin_read().map_err(db_err)?;
            let queue = txn.open_table(QUEUE).map_err(db_err)?;
            let parties = txn.open_table(PARTIES).map_err(db_err)?;

            let mut expired = Vec::new();
            for entry in queue.iter().map_err(db_err)? {
                let (key, _) = entry.map_err(db_err)?;
                let id = key.value().1.to_string();
                let Some(raw) = parties.get(id.as_str()).map_err(db_err)? else {
                    continue;
                };
                let record: PartyRecord =
                    serde_json::from_slice(raw.value()).map_err(StoreError::from)?;
                if record.joined_at < older_than {
                    expired.push(PartyId::new(id));
                }
            }
            expired
        };

        for id in &expired {
            self.remove_inner(id)?;
        }

        if !expired.is_empty() {
            debug!(purged = expired.len(), "expired parties purged from durable waitlist");
        }
        Ok(expired)
    }
}
