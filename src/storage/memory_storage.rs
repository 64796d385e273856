use std::sync::Mutex;

use crate::error_handling::types::StorageError;
use crate::storage::storage_trait::CounterStorage;
use crate::storage::types::CounterRecord;

/// In-memory counter storage holding the raw JSON text.
///
/// Keeps the text rather than a parsed record so corrupt content can be
/// injected, and so it can stand in for a store that refuses writes.
#[derive(Default)]
pub struct MemoryStorage {
    raw: Mutex<Option<String>>,
    read_only: bool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_raw<S: Into<String>>(raw: S) -> Self {
        Self {
            raw: Mutex::new(Some(raw.into())),
            read_only: false,
        }
    }

    /// A storage whose writes always fail.
    pub fn read_only() -> Self {
        Self {
            raw: Mutex::new(None),
            read_only: true,
        }
    }

    pub fn raw(&self) -> Option<String> {
        self.raw.lock().ok().and_then(|guard| guard.clone())
    }
}

impl CounterStorage for MemoryStorage {
    fn read_record(&self) -> Result<Option<CounterRecord>, StorageError> {
        let guard = self.raw.lock().map_err(|_| StorageError::ReadFailed)?;
        guard.as_deref().map(CounterRecord::from_json).transpose()
    }

    fn write_record(&self, record: &CounterRecord) -> Result<(), StorageError> {
        if self.read_only {
            return Err(StorageError::WriteFailed);
        }
        let json = record.to_json()?;
        let mut guard = self.raw.lock().map_err(|_| StorageError::WriteFailed)?;
        *guard = Some(json);
        Ok(())
    }
}
