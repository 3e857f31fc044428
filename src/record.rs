//! Persistent log of completed backups.
//!
//! Records live in a JSON array, `backup_records.json` by default. Recovery
//! takes a record as input: it names the backup root, the artifact file and
//! which stages were applied.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use serde::{Deserialize, Serialize};

use crate::fs::ensure_dir;
use crate::{Error, Result};

/// Default record file name.
pub const RECORD_FILE_NAME: &str = "backup_records.json";

/// Timestamp layout of [`BackupRecord::backup_time`].
///
/// Fixed width, so string order equals time order.
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One completed backup.
///
/// Two records are equal when their `file_name` and `backup_time` agree.
/// Two backups of same-named sources in the same second are therefore
/// indistinguishable to [`RecordStore::delete_record`] and
/// [`RecordStore::modify_record`]; the index-based variants are exact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupRecord {
    /// File name of the backed-up source.
    pub file_name: String,
    /// Absolute path of the backed-up source.
    pub source_full_path: PathBuf,
    /// Directory the artifact was written to.
    pub destination_directory: PathBuf,
    /// File name of the final artifact inside `destination_directory`.
    pub backup_file_name: String,
    /// Local time of the backup, formatted with [`TIME_FORMAT`].
    pub backup_time: String,
    /// The artifact went through the encryption stage.
    #[serde(default)]
    pub is_encrypted: bool,
    /// The artifact is (or wraps) a container.
    #[serde(default)]
    pub is_packed: bool,
    /// The artifact went through the compression stage.
    #[serde(default)]
    pub is_compressed: bool,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
}

impl PartialEq for BackupRecord {
    fn eq(&self, other: &Self) -> bool {
        self.file_name == other.file_name && self.backup_time == other.backup_time
    }
}

impl Eq for BackupRecord {}

impl BackupRecord {
    /// Returns the current local time in record format.
    pub fn timestamp_now() -> String {
        Local::now().format(TIME_FORMAT).to_string()
    }

    /// Returns the full path of the backup artifact.
    pub fn artifact_path(&self) -> PathBuf {
        self.destination_directory.join(&self.backup_file_name)
    }
}

/// A JSON-file-backed list of [`BackupRecord`]s.
#[derive(Debug)]
pub struct RecordStore {
    path: PathBuf,
    records: Vec<BackupRecord>,
    auto_save: bool,
}

impl RecordStore {
    /// Opens the store at `path`, loading existing records.
    ///
    /// A missing file gives an empty store. A directory means
    /// `<dir>/backup_records.json`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let path = if path.is_dir() {
            path.join(RECORD_FILE_NAME)
        } else {
            path.to_path_buf()
        };
        let mut store = Self {
            path,
            records: Vec::new(),
            auto_save: false,
        };
        store.load()?;
        Ok(store)
    }

    /// Saves after every mutation when enabled.
    pub fn with_auto_save(mut self, enabled: bool) -> Self {
        self.auto_save = enabled;
        self
    }

    /// Returns the backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replaces the in-memory records with the file's content.
    pub fn load(&mut self) -> Result<()> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.records.clear();
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        self.records = if text.trim().is_empty() {
            Vec::new()
        } else {
            serde_json::from_str(&text)?
        };
        log::debug!("loaded {} records from {}", self.records.len(), self.path.display());
        Ok(())
    }

    /// Writes all records to the backing file.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            ensure_dir(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.records)?;
        fs::write(&self.path, json)?;
        Ok(())
    }

    fn changed(&self) -> Result<()> {
        if self.auto_save { self.save() } else { Ok(()) }
    }

    /// Appends a record.
    pub fn add(&mut self, record: BackupRecord) -> Result<()> {
        self.records.push(record);
        self.changed()
    }

    /// Returns every record in insertion order.
    pub fn list(&self) -> &[BackupRecord] {
        &self.records
    }

    /// Returns the number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Returns the record at `index`.
    pub fn get(&self, index: usize) -> Result<&BackupRecord> {
        self.records.get(index).ok_or_else(|| out_of_range(index))
    }

    /// Returns records whose `file_name` equals `name`.
    pub fn find_by_name(&self, name: &str) -> Vec<&BackupRecord> {
        self.records.iter().filter(|r| r.file_name == name).collect()
    }

    /// Returns records with `start <= backup_time <= end`.
    pub fn find_by_time_range(&self, start: &str, end: &str) -> Vec<&BackupRecord> {
        self.records
            .iter()
            .filter(|r| r.backup_time.as_str() >= start && r.backup_time.as_str() <= end)
            .collect()
    }

    /// Returns the index of the record equal to `(file_name, backup_time)`.
    pub fn find(&self, file_name: &str, backup_time: &str) -> Option<usize> {
        self.records
            .iter()
            .position(|r| r.file_name == file_name && r.backup_time == backup_time)
    }

    /// Removes and returns the record at `index`.
    pub fn delete(&mut self, index: usize) -> Result<BackupRecord> {
        if index >= self.records.len() {
            return Err(out_of_range(index));
        }
        let removed = self.records.remove(index);
        self.changed()?;
        Ok(removed)
    }

    /// Removes the first record equal to `record`.
    pub fn delete_record(&mut self, record: &BackupRecord) -> Result<BackupRecord> {
        let index = self.index_of(record)?;
        self.delete(index)
    }

    /// Replaces the record at `index`.
    pub fn modify(&mut self, index: usize, record: BackupRecord) -> Result<()> {
        let slot = self.records.get_mut(index).ok_or_else(|| out_of_range(index))?;
        *slot = record;
        self.changed()
    }

    /// Replaces the first record equal to `old`.
    pub fn modify_record(&mut self, old: &BackupRecord, new: BackupRecord) -> Result<()> {
        let index = self.index_of(old)?;
        self.modify(index, new)
    }

    fn index_of(&self, record: &BackupRecord) -> Result<usize> {
        self.records.iter().position(|r| r == record).ok_or_else(|| {
            Error::RecordNotFound(format!("{} at {}", record.file_name, record.backup_time))
        })
    }
}

fn out_of_range(index: usize) -> Error {
    Error::RecordNotFound(format!("no record at index {}", index))
}
