//! Pid record persistence.
//!
//! The supervisor remembers the backend it spawned as a single-line pid
//! file. The in-memory record carries more (start time, log path) but only
//! the pid survives a supervisor restart; everything else is re-derived.

use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use ops_common::{Error, Result};

/// A backend process this supervisor spawned.
#[derive(Debug, Clone)]
pub struct ManagedProcessRecord {
    pub pid: u32,
    pub started_at: DateTime<Utc>,
    pub log_path: PathBuf,
}

/// Persistence seam for the pid record.
pub trait RecordStore {
    fn save(&self, record: &ManagedProcessRecord) -> Result<()>;

    /// Recorded pid, if any. `Ok(None)` when no record exists.
    fn load(&self) -> Result<Option<u32>>;

    /// Remove the record. Removing a missing record is fine.
    fn clear(&self) -> Result<()>;
}

/// File-backed store: one line, the pid in decimal.
#[derive(Debug)]
pub struct FileRecordStore {
    path: PathBuf,
}

impl FileRecordStore {
    pub fn new(path: PathBuf) -> Self {
        FileRecordStore { path }
    }
}

impl RecordStore for FileRecordStore {
    fn save(&self, record: &ManagedProcessRecord) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, format!("{}\n", record.pid))?;
        Ok(())
    }

    fn load(&self) -> Result<Option<u32>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        trimmed
            .parse::<u32>()
            .map(Some)
            .map_err(|_| Error::InvalidPidRecord(format!("{}: {:?}", self.path.display(), trimmed)))
    }

    fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

/// In-memory store for tests.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    pid: Mutex<Option<u32>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        MemoryRecordStore::default()
    }

    pub fn with_pid(pid: u32) -> Self {
        let store = MemoryRecordStore::default();
        *store.pid.lock().unwrap() = Some(pid);
        store
    }
}

impl RecordStore for MemoryRecordStore {
    fn save(&self, record: &ManagedProcessRecord) -> Result<()> {
        *self.pid.lock().unwrap() = Some(record.pid);
        Ok(())
    }

    fn load(&self) -> Result<Option<u32>> {
        Ok(*self.pid.lock().unwrap())
    }

    fn clear(&self) -> Result<()> {
        *self.pid.lock().unwrap() = None;
        Ok(())
    }
}
