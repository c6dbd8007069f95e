//! Append-only per-monitor result history, one JSON record per line.

use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeDelta, Utc};
use tracing::warn;

use super::types::CheckResult;
use super::validation::sanitize_file_stem;
use crate::error::PersistenceError;

const HISTORY_EXTENSION: &str = "jsonl";

/// History files under one directory, keyed by monitor name
#[derive(Debug, Clone)]
pub struct HistoryStore {
    directory: PathBuf,
}

impl HistoryStore {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self { directory: directory.into() }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn path_for(&self, monitor_name: &str) -> PathBuf {
        self.directory
            .join(format!("{}.{HISTORY_EXTENSION}", sanitize_file_stem(monitor_name)))
    }

    /// Append one result.
    ///
    /// The record goes out in a single write, so an interrupted append leaves
    /// at most one truncated trailing line, which readers skip.
    pub fn append(&self, monitor_name: &str, result: &CheckResult) -> Result<(), PersistenceError> {
        fs::create_dir_all(&self.directory).map_err(PersistenceError::io(&self.directory))?;

        let path = self.path_for(monitor_name);
        let mut record = result.to_record()?;
        record.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(PersistenceError::io(&path))?;
        file.write_all(record.as_bytes()).map_err(PersistenceError::io(&path))
    }

    /// Every readable entry, oldest first
    pub fn read_all(&self, monitor_name: &str) -> Result<Vec<CheckResult>, PersistenceError> {
        let path = self.path_for(monitor_name);
        let file = match fs::File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(PersistenceError::Io { path, source: e }),
        };

        let mut entries = Vec::new();
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(PersistenceError::io(&path))?;
            if line.trim().is_empty() {
                continue;
            }
            match CheckResult::from_record(&line) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!(
                    monitor = monitor_name,
                    line = index + 1,
                    error = %e,
                    "Skipping malformed history entry"
                ),
            }
        }
        Ok(entries)
    }

    /// The last `count` entries, oldest first
    pub fn read_last(
        &self,
        monitor_name: &str,
        count: usize,
    ) -> Result<Vec<CheckResult>, PersistenceError> {
        let mut entries = self.read_all(monitor_name)?;
        let skip = entries.len().saturating_sub(count);
        Ok(entries.split_off(skip))
    }

    /// Entries that ended within the last `days` days, oldest first
    pub fn read_within(
        &self,
        monitor_name: &str,
        days: i64,
    ) -> Result<Vec<CheckResult>, PersistenceError> {
        let window = TimeDelta::try_days(days).unwrap_or(TimeDelta::MAX);
        let cutoff = Utc::now().checked_sub_signed(window).unwrap_or(DateTime::<Utc>::MIN_UTC);
        self.read_since(monitor_name, cutoff)
    }

    /// Entries that ended at or after `cutoff`, oldest first
    pub fn read_since(
        &self,
        monitor_name: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<CheckResult>, PersistenceError> {
        let mut entries = self.read_all(monitor_name)?;
        entries.retain(|entry| entry.end_time >= cutoff);
        Ok(entries)
    }

    /// Remove a monitor's history; a missing file is not an error
    pub fn delete(&self, monitor_name: &str) -> Result<(), PersistenceError> {
        let path = self.path_for(monitor_name);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PersistenceError::Io { path, source: e }),
        }
    }

    /// Move a monitor's history to a new name, replacing anything there
    pub fn rename(&self, old_name: &str, new_name: &str) -> Result<(), PersistenceError> {
        let from = self.path_for(old_name);
        let to = self.path_for(new_name);
        if from == to {
            return Ok(());
        }
        match fs::rename(&from, &to) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PersistenceError::Io { path: from, source: e }),
        }
    }
}
