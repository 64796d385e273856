use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::{debug, error, info};
use uuid::Uuid;

use crate::error_handling::types::StorageError;
use crate::storage::storage_trait::CounterStorage;
use crate::storage::types::CounterRecord;

/// Fixed namespaced key of the counter record.
pub const RECORD_KEY: &str = "coffee_break_stats_v1";

/// JSON file backed counter storage rooted at a directory.
pub struct FileStorage {
    record_path: PathBuf,
}

impl FileStorage {
    pub fn new<P: AsRef<Path>>(base_path: P) -> Result<Self, StorageError> {
        let base_path = base_path.as_ref().to_path_buf();
        fs::create_dir_all(&base_path).map_err(|e| {
            error!("Failed to create storage dir {}: {}", base_path.display(), e);
            StorageError::WriteFailed
        })?;
        let record_path = base_path.join(format!("{}.json", RECORD_KEY));
        info!("FileStorage initialized at {}", record_path.display());
        Ok(Self { record_path })
    }

    pub fn record_path(&self) -> &Path {
        &self.record_path
    }

    /// Staging file for one write. Every call gets its own name, so writers
    /// sharing the directory never interleave bytes in the same file.
    fn temp_path(&self) -> PathBuf {
        self.record_path
            .with_extension(format!("{}.json.tmp", Uuid::new_v4().simple()))
    }
}

impl CounterStorage for FileStorage {
    fn read_record(&self) -> Result<Option<CounterRecord>, StorageError> {
        let raw = match fs::read_to_string(&self.record_path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No counter record at {}", self.record_path.display());
                return Ok(None);
            }
            Err(e) => {
                error!("Failed to read {}: {}", self.record_path.display(), e);
                return Err(StorageError::ReadFailed);
            }
        };
        CounterRecord::from_json(&raw).map(Some)
    }

    fn write_record(&self, record: &CounterRecord) -> Result<(), StorageError> {
        let json = record.to_json()?;
        let tmp = self.temp_path();
        fs::write(&tmp, json.as_bytes()).map_err(|e| {
            error!("Failed to write {}: {}", tmp.display(), e);
            StorageError::WriteFailed
        })?;
        if let Err(e) = fs::rename(&tmp, &self.record_path) {
            error!("Failed to move {} into place: {}", tmp.display(), e);
            let _ = fs::remove_file(&tmp);
            return Err(StorageError::WriteFailed);
        }
        debug!("Saved counter record to {}", self.record_path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::beverage::BeverageKind;
    use std::sync::Arc;
    use std::thread;
    use tempfile::TempDir;

    fn leftover_temp_files(dir: &Path) -> usize {
        fs::read_dir(dir)
            .unwrap()
            .filter(|entry| entry.as_ref().unwrap().path().to_string_lossy().ends_with(".tmp"))
            .count()
    }

    #[test]
    fn test_absent_record_reads_none() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::new(dir.path()).unwrap();
        assert!(storage.read_record().unwrap().is_none());
    }

    #[test]
    fn test_write_then_read() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::new(dir.path()).unwrap();
        let mut record = CounterRecord::zeroed();
        record.counts.insert(BeverageKind::Cappuccino, 3);
        storage.write_record(&record).unwrap();

        let got = storage.read_record().unwrap().unwrap();
        assert_eq!(got, record);
        assert_eq!(leftover_temp_files(dir.path()), 0);
        assert_eq!(
            storage.record_path().file_name().unwrap(),
            "coffee_break_stats_v1.json"
        );
    }

    #[test]
    fn test_each_write_stages_in_its_own_file() {
        let dir = TempDir::new().unwrap();
        let a = FileStorage::new(dir.path()).unwrap();
        let b = FileStorage::new(dir.path()).unwrap();
        assert_ne!(a.temp_path(), b.temp_path());
        assert_ne!(a.temp_path(), a.temp_path());

        let mut last = CounterRecord::zeroed();
        for i in 0..10u64 {
            let mut record = CounterRecord::zeroed();
            record.counts.insert(BeverageKind::IcedCoffee, i);
            record.counts.insert(BeverageKind::DoubleDouble, i * 2);
            let writer = if i % 2 == 0 { &a } else { &b };
            writer.write_record(&record).unwrap();
            last = record;
        }

        assert_eq!(b.read_record().unwrap().unwrap(), last);
        assert_eq!(leftover_temp_files(dir.path()), 0);
    }

    #[test]
    fn test_concurrent_writers_leave_a_valid_record() {
        let dir = TempDir::new().unwrap();
        let base = Arc::new(dir.path().to_path_buf());

        let writers: Vec<_> = (0..4u64)
            .map(|n| {
                let base = Arc::clone(&base);
                thread::spawn(move || {
                    let storage = FileStorage::new(base.as_path()).unwrap();
                    for i in 0..50u64 {
                        let mut record = CounterRecord::zeroed();
                        record.counts.insert(BeverageKind::Cappuccino, n * 1000 + i);
                        storage.write_record(&record).unwrap();
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        let storage = FileStorage::new(dir.path()).unwrap();
        let got = storage.read_record().unwrap().unwrap();
        // Whichever writer renamed last, its final record is the one on disk.
        assert_eq!(got.get(BeverageKind::Cappuccino) % 1000, 49);
        assert_eq!(leftover_temp_files(dir.path()), 0);
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::new(dir.path()).unwrap();
        fs::write(storage.record_path(), "{ broken").unwrap();
        assert!(matches!(storage.read_record(), Err(StorageError::Malformed(_))));
    }

    #[test]
    fn test_creates_nested_base_dir() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a").join("b");
        FileStorage::new(&nested).unwrap();
        assert!(nested.is_dir());
    }
}
