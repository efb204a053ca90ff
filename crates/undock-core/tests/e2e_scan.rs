//! End-to-end deep-scan tests.
//!
//! These exercise the real `start_scan` code path against a real
//! temporary filesystem: thread spawning, jwalk traversal, reserved
//! subtree pruning, size filtering, and the bounded top-N selection.
//!
//! **Why a `tests/` integration test (not unit test)?**
//!
//! The scanner creates real OS threads and walks actual directory
//! entries. Testing it in isolation would require mocking the entire
//! filesystem interface; a `tempfile` tree exercises every code path
//! with zero mocking.

use std::fs;
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;
use undock_core::model::FileInfo;
use undock_core::scanner::{start_scan, ScanHandle, ScanOutcome, MIN_FILE_SIZE, TOP_FILES};

fn write_bytes(path: &Path, n: u64) {
    let mut f = fs::File::create(path).unwrap();
    f.write_all(&vec![0u8; n as usize]).unwrap();
}

/// Wait for a scan to finish, panicking on cancellation or timeout.
fn finish(handle: ScanHandle) -> Vec<FileInfo> {
    match handle.outcome_rx.recv_timeout(Duration::from_secs(30)) {
        Ok(ScanOutcome::Finished(files)) => files,
        Ok(ScanOutcome::Cancelled) => panic!("scan was unexpectedly cancelled"),
        Err(_) => panic!("scan did not complete within 30 s"),
    }
}

/// Six qualifying files of strictly decreasing size: exactly the five
/// largest are reported, in descending order, small files and
/// directories excluded.
#[test]
fn keeps_only_the_five_largest_qualifying_files() {
    let tmp = TempDir::new().unwrap();
    let media = tmp.path().join("media");
    fs::create_dir_all(&media).unwrap();

    for i in 0..6u64 {
        write_bytes(
            &media.join(format!("clip{i}.mov")),
            MIN_FILE_SIZE + (6 - i) * 1024,
        );
    }
    write_bytes(&tmp.path().join("small.txt"), 4096);
    write_bytes(&tmp.path().join(".DS_Store"), 4096);

    let files = finish(start_scan(tmp.path().to_path_buf()));

    assert_eq!(files.len(), TOP_FILES);
    assert!(files.windows(2).all(|w| w[0].size_bytes > w[1].size_bytes));
    assert!(files.iter().all(|f| f.size_bytes >= MIN_FILE_SIZE));

    let names: Vec<&str> = files.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "clip0.mov",
            "clip1.mov",
            "clip2.mov",
            "clip3.mov",
            "clip4.mov"
        ]
    );
}

/// A huge file inside a reserved subtree must never surface — the
/// subtree is pruned, not merely filtered.
#[test]
fn reserved_subtrees_are_never_visited() {
    let tmp = TempDir::new().unwrap();
    let trash = tmp.path().join(".Trashes").join("501");
    fs::create_dir_all(&trash).unwrap();
    write_bytes(&trash.join("deleted.iso"), MIN_FILE_SIZE * 4);
    write_bytes(&tmp.path().join("keep.bin"), MIN_FILE_SIZE * 2);

    let files = finish(start_scan(tmp.path().to_path_buf()));

    assert_eq!(files.len(), 1);
    assert_eq!(files[0].name, "keep.bin");
}

/// Directories and sub-threshold files yield an empty result, which is a
/// normal outcome, not an error.
#[test]
fn small_files_and_directories_yield_empty_result() {
    let tmp = TempDir::new().unwrap();
    fs::create_dir_all(tmp.path().join("docs").join("archive")).unwrap();
    write_bytes(&tmp.path().join("docs").join("notes.md"), 2048);
    write_bytes(&tmp.path().join("readme.txt"), 100);

    let files = finish(start_scan(tmp.path().to_path_buf()));
    assert!(files.is_empty());
}

/// Cancellation must terminate the scan gracefully. The scanner may
/// already be done by the time the flag is read, so either terminal
/// outcome is accepted.
#[test]
fn cancellation_terminates_gracefully() {
    let tmp = TempDir::new().unwrap();
    for i in 0..200 {
        write_bytes(&tmp.path().join(format!("file{i:03}.bin")), 1024);
    }

    let handle = start_scan(tmp.path().to_path_buf());
    handle.cancel();

    match handle.outcome_rx.recv_timeout(Duration::from_secs(30)) {
        Ok(ScanOutcome::Cancelled) | Ok(ScanOutcome::Finished(_)) => {}
        Err(_) => panic!("scan must terminate within 30 s of cancellation"),
    }
}
