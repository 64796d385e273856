//! Storage subsystem
//!
//! This module provides the durable lifetime counters of one instance.
//!
//! Components:
//! - `storage_trait`: the CounterStorage trait defining a uniform API.
//! - `types`: the counter record and the lifetime stats snapshot.
//! - `file_storage`: JSON file implementation used by the binary.
//! - `memory_storage`: in-memory implementation for embedding and tests.
//! - `counter_store`: the read-modify-write store fed by local and remote completions.

pub mod counter_store;
pub mod file_storage;
pub mod memory_storage;
pub mod storage_trait;
pub mod types;

pub use counter_store::PersistedCounterStore;
pub use storage_trait::CounterStorage;
pub use types::{CounterRecord, LifetimeStats};
