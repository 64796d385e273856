//! Storage Trait
//!
//! This module defines the `CounterStorage` trait, the interface between the
//! counter store and whatever durable medium backs it.
//!
//! Implementors are responsible for:
//! - Reading the single counter record, if one exists
//! - Replacing it with a new record
//!
//! All methods return a `Result` to handle potential storage errors.

use crate::error_handling::types::StorageError;
use crate::storage::types::CounterRecord;

/// Durable home of one instance's lifetime counters.
pub trait CounterStorage: Send + Sync {
    /// Reads the stored record. `Ok(None)` means nothing has been stored yet.
    fn read_record(&self) -> Result<Option<CounterRecord>, StorageError>;

    /// Replaces the stored record.
    fn write_record(&self, record: &CounterRecord) -> Result<(), StorageError>;
}
