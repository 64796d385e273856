//! Persisted lifetime counters.
//!
//! `PersistedCounterStore` keeps the in-memory `LifetimeStats` of one instance
//! and mirrors every change to its `CounterStorage` right away. Local
//! completions and completions announced by peers go through the same
//! read-modify-write path, so instances that observe the same completion
//! events end up with the same totals.

use std::sync::Arc;

use log::{info, warn};

use crate::beverage::BeverageKind;
use crate::storage::storage_trait::CounterStorage;
use crate::storage::types::{CounterRecord, LifetimeStats};

/// Online count shown before the first presence pass: this instance alone.
const INITIAL_ONLINE_COUNT: usize = 1;

pub struct PersistedCounterStore {
    storage: Arc<dyn CounterStorage>,
    stats: LifetimeStats,
}

impl PersistedCounterStore {
    /// Loads the counters, falling back to zeros when the record is absent,
    /// unreadable or malformed.
    pub fn load(storage: Arc<dyn CounterStorage>) -> Self {
        let counts = match storage.read_record() {
            Ok(Some(record)) => {
                info!("Loaded lifetime counters: {:?}", record.counts);
                record
            }
            Ok(None) => {
                info!("No lifetime counters stored yet, starting from zero");
                CounterRecord::zeroed()
            }
            Err(e) => {
                warn!("Failed to load lifetime counters, starting from zero: {}", e);
                CounterRecord::zeroed()
            }
        };

        Self {
            storage,
            stats: LifetimeStats {
                counts,
                online_count: INITIAL_ONLINE_COUNT,
            },
        }
    }

    /// Counts one cup finished by this instance. Returns the new count.
    pub fn increment(&mut self, kind: BeverageKind) -> u64 {
        self.bump(kind)
    }

    /// Counts one cup a peer announced on the bus. Returns the new count.
    ///
    /// Deliveries are not deduplicated: the same announcement received twice
    /// counts twice.
    pub fn apply_remote_increment(&mut self, kind: BeverageKind) -> u64 {
        self.bump(kind)
    }

    fn bump(&mut self, kind: BeverageKind) -> u64 {
        let count = self.stats.counts.counts.entry(kind).or_insert(0);
        *count += 1;
        let new_count = *count;
        self.persist();
        new_count
    }

    fn persist(&self) {
        // `CounterRecord` has no online-count field, so only the counts reach storage.
        if let Err(e) = self.storage.write_record(&self.stats.counts) {
            warn!("Failed to persist lifetime counters: {}", e);
        }
    }

    pub fn set_online_count(&mut self, online_count: usize) {
        self.stats.online_count = online_count;
    }

    pub fn stats(&self) -> &LifetimeStats {
        &self.stats
    }

    pub fn count(&self, kind: BeverageKind) -> u64 {
        self.stats.count(kind)
    }
}
