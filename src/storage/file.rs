use crate::core::diagnostics::{Diagnostics, HealthStatus};
use crate::error::StorageError;
use crate::storage::format::{PlayerRecord, RECORD_MAGIC, RECORD_SIZE, RECORD_VERSION};
use crate::storage::{unix_now, PlayerData, ResponseStore};
use memmap2::Mmap;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Store backed by a single fixed-size binary record file.
///
/// A missing file is a fresh player, not an error. Writes go to a sibling
/// temporary file that is renamed over the record.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    data: PlayerData,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            data: PlayerData::default(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads and validates a record without constructing a store.
    pub fn read_record(path: &Path) -> Result<PlayerRecord, StorageError> {
        let file = File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };

        if mmap.len() < RECORD_SIZE {
            return Err(StorageError::FileTooSmall);
        }

        let record: PlayerRecord = bytemuck::pod_read_unaligned(&mmap[..RECORD_SIZE]);

        if record.magic != RECORD_MAGIC {
            return Err(StorageError::InvalidMagic);
        }
        if record.version != RECORD_VERSION {
            return Err(StorageError::UnsupportedVersion(record.version));
        }
        if record.checksum != record.compute_checksum() {
            return Err(StorageError::ChecksumMismatch);
        }

        Ok(record)
    }
}

impl ResponseStore for FileStore {
    fn load(&mut self) -> Result<(), StorageError> {
        if !self.path.exists() {
            debug!("No record at {}, starting fresh", self.path.display());
            self.data = PlayerData::default();
            return Ok(());
        }

        let record = Self::read_record(&self.path)?;
        match Diagnostics::check_record(&record) {
            HealthStatus::Healthy => {}
            HealthStatus::Suspicious(reason) => {
                warn!("Player record {} is suspicious: {}", self.path.display(), reason);
            }
            HealthStatus::Corrupted(reason) => return Err(StorageError::Corrupted(reason)),
        }

        self.data = record.to_data();
        debug!(
            "Loaded player record {} ({} answered)",
            self.path.display(),
            self.data.progress()
        );
        Ok(())
    }

    fn save(&mut self) -> Result<(), StorageError> {
        self.data.last_active = unix_now();
        let record = PlayerRecord::from_data(&self.data);

        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, bytemuck::bytes_of(&record))?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn data(&self) -> &PlayerData {
        &self.data
    }

    fn data_mut(&mut self) -> &mut PlayerData {
        &mut self.data
    }
}
