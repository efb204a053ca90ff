//! Traversal and bounded top-N selection for the deep scan.
//!
//! Uses `jwalk`'s rayon-backed parallel traversal, with reserved
//! subtrees pruned at read-dir time so their descendants are never
//! visited. The consumer loop checks the cancel flag and the wall-clock
//! budget every [`CHECKPOINT_INTERVAL`] entries.

use crate::model::{size, FileInfo};
use crate::scanner::{ScanOutcome, TOP_FILES};
use compact_str::CompactString;
use std::ffi::OsStr;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

/// Wall-clock budget for one scan. Expiry is a normal completion with
/// partial results, never an error.
pub const SCAN_BUDGET: Duration = Duration::from_secs(20);

/// Files below this size are never candidates.
pub const MIN_FILE_SIZE: u64 = 1024 * 1024;

/// Subtrees pruned entirely — descendants are never visited.
pub const RESERVED_SUBTREES: [&str; 7] = [
    ".Trashes",
    ".Spotlight-V100",
    ".fseventsd",
    ".DocumentRevisions-V100",
    ".TemporaryItems",
    "System Volume Information",
    "lost+found",
];

/// Cancellation and budget checks happen every this many entries.
const CHECKPOINT_INTERVAL: u64 = 64;

/// Bounded keep-the-largest list.
///
/// A candidate is admitted when fewer than [`TOP_FILES`] entries are kept
/// or it strictly exceeds the smallest kept entry; after each admission
/// the list is re-sorted descending and truncated. Admission requires
/// strictly exceeding the smallest entry and the sort is stable, so the
/// first-seen file wins ties.
#[derive(Default)]
pub(crate) struct TopList {
    entries: Vec<FileInfo>,
}

impl TopList {
    pub fn offer(&mut self, candidate: FileInfo) {
        let admit = self.entries.len() < TOP_FILES
            || self
                .entries
                .last()
                .is_some_and(|smallest| candidate.size_bytes > smallest.size_bytes);
        if !admit {
            return;
        }
        self.entries.push(candidate);
        self.entries.sort_by(|a, b| b.size_bytes.cmp(&a.size_bytes));
        self.entries.truncate(TOP_FILES);
    }

    pub fn into_vec(self) -> Vec<FileInfo> {
        self.entries
    }
}

/// Walk the tree rooted at `root`, returning the kept files.
pub(crate) fn scan(root: &Path, cancel: &AtomicBool) -> ScanOutcome {
    let start = Instant::now();
    let mut top = TopList::default();
    let mut entries_seen: u64 = 0;

    let walker = jwalk::WalkDir::new(root)
        .skip_hidden(false)
        .follow_links(false)
        .parallelism(jwalk::Parallelism::RayonNewPool(num_cpus::get()))
        .process_read_dir(|_depth, _path, _state, children| {
            children.retain(|entry| match entry {
                Ok(entry) => !is_reserved(&entry.file_name),
                Err(_) => true,
            });
        });

    for entry in walker {
        entries_seen += 1;
        if entries_seen.is_multiple_of(CHECKPOINT_INTERVAL) {
            if cancel.load(Ordering::Relaxed) {
                debug!(
                    "scan of {} cancelled after {entries_seen} entries",
                    root.display()
                );
                return ScanOutcome::Cancelled;
            }
            if start.elapsed() >= SCAN_BUDGET {
                debug!(
                    "scan budget expired for {} after {entries_seen} entries",
                    root.display()
                );
                break;
            }
        }

        // Unreadable entries are skipped; the scan is best-effort.
        let Ok(entry) = entry else { continue };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let len = match std::fs::symlink_metadata(&path) {
            Ok(meta) => meta.len(),
            Err(_) => continue,
        };
        if len < MIN_FILE_SIZE {
            continue;
        }

        let name = entry.file_name().to_string_lossy();
        top.offer(FileInfo {
            name: CompactString::new(name.as_ref()),
            path,
            size_bytes: len,
            size_display: size::format_size(len),
        });
    }

    ScanOutcome::Finished(top.into_vec())
}

fn is_reserved(name: &OsStr) -> bool {
    name.to_str()
        .is_some_and(|name| RESERVED_SUBTREES.contains(&name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn file(name: &str, size_bytes: u64) -> FileInfo {
        FileInfo {
            path: PathBuf::from(format!("/Volumes/T/{name}")),
            name: CompactString::new(name),
            size_bytes,
            size_display: size::format_size(size_bytes),
        }
    }

    fn sizes(list: &TopList) -> Vec<u64> {
        list.entries.iter().map(|f| f.size_bytes).collect()
    }

    #[test]
    fn fills_up_then_evicts_the_smallest() {
        let mut top = TopList::default();
        for s in [3, 1, 5, 2, 4] {
            top.offer(file("f", s));
        }
        assert_eq!(sizes(&top), vec![5, 4, 3, 2, 1]);

        top.offer(file("big", 10));
        assert_eq!(sizes(&top), vec![10, 5, 4, 3, 2]);

        top.offer(file("tiny", 1));
        assert_eq!(sizes(&top), vec![10, 5, 4, 3, 2]);
    }

    #[test]
    fn equal_to_smallest_is_rejected_when_full() {
        let mut top = TopList::default();
        for s in [9, 8, 7, 6, 5] {
            top.offer(file("f", s));
        }
        top.offer(file("late", 5));
        assert_eq!(sizes(&top), vec![9, 8, 7, 6, 5]);
    }

    #[test]
    fn ties_keep_first_seen_order_while_filling() {
        let mut top = TopList::default();
        top.offer(file("first", 7));
        top.offer(file("second", 7));
        top.offer(file("third", 9));
        let names: Vec<&str> = top.entries.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["third", "first", "second"]);
    }

    #[test]
    fn reserved_names_match_exactly() {
        assert!(is_reserved(OsStr::new(".Trashes")));
        assert!(!is_reserved(OsStr::new("Trashes")));
        assert!(!is_reserved(OsStr::new(".TrashesBackup")));
    }
}
