//! Persisted cleaned-bytes counter.
//!
//! A single monotonically non-decreasing `u64`, stored as JSON in the
//! per-user data directory. Loaded once at startup — an absent or
//! unreadable file defaults to zero — and written back after every
//! cleanup step. Only the manager's owner thread mutates it, so no
//! internal locking is needed.

use crate::CoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing::{debug, warn};

#[derive(Debug, Serialize, Deserialize)]
struct StatsFile {
    total_cleaned_bytes: u64,
    updated_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct StatsStore {
    path: PathBuf,
    total_cleaned_bytes: u64,
}

impl StatsStore {
    /// Default on-disk location: `<user data dir>/undock/stats.json`.
    pub fn default_path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("undock")
            .join("stats.json")
    }

    /// Load the counter from `path`, defaulting to zero when the file is
    /// absent or unparsable.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let total_cleaned_bytes = match fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<StatsFile>(&raw) {
                Ok(file) => file.total_cleaned_bytes,
                Err(err) => {
                    warn!(
                        "stats file {} is unreadable, starting from zero: {err}",
                        path.display()
                    );
                    0
                }
            },
            Err(_) => 0,
        };
        debug!("loaded stats counter: {total_cleaned_bytes} bytes cleaned to date");
        Self {
            path,
            total_cleaned_bytes,
        }
    }

    pub fn total_cleaned_bytes(&self) -> u64 {
        self.total_cleaned_bytes
    }

    /// Add freed bytes and persist immediately. There is no decrement.
    /// A failed write keeps the in-memory value and is logged, never
    /// propagated — losing a counter update must not stall an eject.
    pub fn add(&mut self, bytes: u64) {
        self.total_cleaned_bytes = self.total_cleaned_bytes.saturating_add(bytes);
        if let Err(err) = self.persist() {
            warn!("stats counter not persisted: {err}");
        }
    }

    fn persist(&self) -> Result<(), CoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| CoreError::StatsWrite {
                path: self.path.clone(),
                source,
            })?;
        }
        let file = StatsFile {
            total_cleaned_bytes: self.total_cleaned_bytes,
            updated_at: Utc::now(),
        };
        let encoded = serde_json::to_string_pretty(&file)?;
        fs::write(&self.path, encoded).map_err(|source| CoreError::StatsWrite {
            path: self.path.clone(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn absent_file_defaults_to_zero() {
        let tmp = TempDir::new().unwrap();
        let store = StatsStore::load(tmp.path().join("stats.json"));
        assert_eq!(store.total_cleaned_bytes(), 0);
    }

    #[test]
    fn corrupt_file_defaults_to_zero() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("stats.json");
        fs::write(&path, "not json at all").unwrap();
        let store = StatsStore::load(&path);
        assert_eq!(store.total_cleaned_bytes(), 0);
    }

    #[test]
    fn add_is_monotonic_and_survives_reload() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("stats.json");

        let mut store = StatsStore::load(&path);
        store.add(4096);
        store.add(0);
        store.add(1024);
        assert_eq!(store.total_cleaned_bytes(), 5120);

        // A simulated restart reads the same value back.
        let reloaded = StatsStore::load(&path);
        assert_eq!(reloaded.total_cleaned_bytes(), 5120);
    }
}
