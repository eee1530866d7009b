//! Last-access bookkeeping per swarm.
//!
//! Backed by a sharded map so request handlers touching different swarms
//! and the eviction sweep never wait on each other.

use dashmap::DashMap;
use tokio::time::Instant;

use crate::swarm::InfoHash;

/// Records when each swarm was last added or streamed.
#[derive(Debug, Default)]
pub struct AccessTracker {
    records: DashMap<InfoHash, Instant>,
}

impl AccessTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stamps `info_hash` with the current time and returns the stored value.
    ///
    /// A record never moves backwards: if a concurrent caller already stored
    /// a later instant, that instant is kept.
    pub fn touch(&self, info_hash: InfoHash) -> Instant {
        let now = Instant::now();
        let mut entry = self.records.entry(info_hash).or_insert(now);
        if *entry < now {
            *entry = now;
        }
        *entry
    }

    /// Returns the existing record or stamps a missing one with now.
    pub fn touch_if_absent(&self, info_hash: InfoHash) -> Instant {
        *self.records.entry(info_hash).or_insert_with(Instant::now)
    }

    /// Removes the record for a dropped swarm.
    pub fn forget(&self, info_hash: &InfoHash) -> Option<Instant> {
        self.records.remove(info_hash).map(|(_, last)| last)
    }

    /// Keeps only records whose hash satisfies `keep`. Returns how many were removed.
    pub fn retain(&self, mut keep: impl FnMut(&InfoHash) -> bool) -> usize {
        let before = self.records.len();
        self.records.retain(|info_hash, _| keep(info_hash));
        before.saturating_sub(self.records.len())
    }

    pub fn last_access(&self, info_hash: &InfoHash) -> Option<Instant> {
        self.records.get(info_hash).map(|entry| *entry)
    }

    /// Point-in-time copy of every record.
    pub fn snapshot(&self) -> Vec<(InfoHash, Instant)> {
        self.records
            .iter()
            .map(|entry| (*entry.key(), *entry.value()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
