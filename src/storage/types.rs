use crate::beverage::BeverageKind;
use crate::error_handling::types::StorageError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Durable form of the lifetime counters: `{ "ICED_COFFEE": 3, ... }`.
///
/// The online count is never part of this record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CounterRecord {
    pub counts: BTreeMap<BeverageKind, u64>,
}

impl CounterRecord {
    pub fn zeroed() -> Self {
        Self {
            counts: BeverageKind::ALL.into_iter().map(|k| (k, 0)).collect(),
        }
    }

    pub fn get(&self, kind: BeverageKind) -> u64 {
        self.counts.get(&kind).copied().unwrap_or(0)
    }

    pub fn to_json(&self) -> Result<String, StorageError> {
        serde_json::to_string(self).map_err(|e| StorageError::Malformed(e.to_string()))
    }

    /// Parses a stored record.
    ///
    /// Accepts the current kind-keyed form as well as the legacy
    /// `{ iced, double, cappuccino, totalUsers }` form. Keys that name no
    /// beverage (including `totalUsers`) are skipped. A missing kind reads as 0,
    /// but a present kind with a non-integer or negative value makes the whole
    /// record malformed.
    pub fn from_json(raw: &str) -> Result<Self, StorageError> {
        let value: serde_json::Value =
            serde_json::from_str(raw).map_err(|e| StorageError::Malformed(e.to_string()))?;
        let object = value
            .as_object()
            .ok_or_else(|| StorageError::Malformed(String::from("record is not a JSON object")))?;

        let mut record = CounterRecord::zeroed();
        for kind in BeverageKind::ALL {
            let entry = object
                .get(kind.as_str())
                .or_else(|| object.get(kind.legacy_stat_key()));
            if let Some(entry) = entry {
                let count = entry.as_u64().ok_or_else(|| {
                    StorageError::Malformed(format!("{} is not a non-negative integer", kind))
                })?;
                record.counts.insert(kind, count);
            }
        }
        Ok(record)
    }
}

/// Lifetime consumption counts plus the instance-local online count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LifetimeStats {
    pub counts: CounterRecord,
    /// Derived from presence; stripped before anything is persisted.
    pub online_count: usize,
}

impl LifetimeStats {
    pub fn count(&self, kind: BeverageKind) -> u64 {
        self.counts.get(kind)
    }

    pub fn total_cups(&self) -> u64 {
        self.counts.counts.values().sum()
    }
}
