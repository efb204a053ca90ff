//! Volumes under management.
//!
//! A [`Volume`] is created on first observed mount, has its capacity and
//! name refreshed in place while it stays mounted, and is destroyed when
//! the mount path disappears. Its pipeline state (`status`,
//! `blocking_processes`) and scan results (`top_files`) are only ever
//! touched by explicit transitions — never by a metadata refresh.

use compact_str::CompactString;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// Opaque identity of a volume, stable for the volume's mounted lifetime.
///
/// Allocated from a registry-owned counter at first observation and never
/// reused within a process lifetime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct VolumeId(pub u64);

/// Lifecycle status of a volume.
///
/// `Busy` and `Error` are rest states: the pipeline parks there after a
/// failed unmount and only `retry` / `force_eject` leave them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum VolumeStatus {
    /// Mounted, nothing in flight. The only state `eject` accepts.
    Idle,
    /// Junk cleanup is running.
    Cleaning,
    /// The unmount command is running.
    Ejecting,
    /// Unmount was blocked by identified holder processes.
    Busy,
    /// Unmount failed with no identifiable holder.
    Error(String),
    /// Unmount succeeded; the volume drops from the list on the next
    /// refresh that no longer observes it mounted.
    Ejected,
}

impl fmt::Display for VolumeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VolumeStatus::Idle => write!(f, "idle"),
            VolumeStatus::Cleaning => write!(f, "cleaning"),
            VolumeStatus::Ejecting => write!(f, "ejecting"),
            VolumeStatus::Busy => write!(f, "busy"),
            VolumeStatus::Error(message) => write!(f, "error: {message}"),
            VolumeStatus::Ejected => write!(f, "ejected"),
        }
    }
}

/// A single file reported by the deep scan. Immutable once produced.
#[derive(Clone, Debug, Serialize)]
pub struct FileInfo {
    /// Full path of the file.
    pub path: PathBuf,
    /// File name only.
    pub name: CompactString,
    /// Size in bytes.
    pub size_bytes: u64,
    /// Human-readable size, produced at admission time.
    pub size_display: String,
}

/// A mounted external volume under management.
#[derive(Clone, Debug, Serialize)]
pub struct Volume {
    pub id: VolumeId,
    /// Filesystem path at which the volume is attached. Volumes are keyed
    /// by this path across refreshes.
    pub mount_path: PathBuf,
    /// Display name.
    pub name: CompactString,
    /// Total capacity in bytes.
    pub capacity_bytes: u64,
    /// Free space in bytes.
    pub free_bytes: u64,
    pub status: VolumeStatus,
    /// True while a deep scan task is running for this volume.
    pub is_analyzing: bool,
    /// Base names of the processes that blocked the last unmount attempt.
    /// Sorted and deduplicated; replaced wholesale on each failure.
    pub blocking_processes: Vec<String>,
    /// Largest files found by the deep scan, descending by size, at most
    /// [`crate::scanner::TOP_FILES`] entries.
    pub top_files: Vec<FileInfo>,
}

impl Volume {
    /// Create a freshly-discovered volume in the `Idle` state.
    pub fn new(
        id: VolumeId,
        mount_path: PathBuf,
        name: CompactString,
        capacity_bytes: u64,
        free_bytes: u64,
    ) -> Self {
        Self {
            id,
            mount_path,
            name,
            capacity_bytes,
            free_bytes,
            status: VolumeStatus::Idle,
            is_analyzing: false,
            blocking_processes: Vec::new(),
            top_files: Vec::new(),
        }
    }

    pub fn used_bytes(&self) -> u64 {
        self.capacity_bytes.saturating_sub(self.free_bytes)
    }
}
