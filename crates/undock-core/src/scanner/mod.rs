//! Deep scanner — locates the largest files on a volume.
//!
//! Each volume gets at most one scan task at a time, owned by the
//! [`AnalysisScheduler`]. The scan is deliberately bounded: a fixed
//! wall-clock budget, a fixed result size, and cooperative cancellation
//! polled at traversal checkpoints. It never fails — budget expiry
//! simply ends the traversal with whatever has been kept so far.

mod walk;

pub use walk::{MIN_FILE_SIZE, RESERVED_SUBTREES, SCAN_BUDGET};

use crate::model::{FileInfo, VolumeId};
use crossbeam_channel::{bounded, Receiver, TryRecvError};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::info;

/// How many files one scan reports.
pub const TOP_FILES: usize = 5;

/// Terminal message of one scan task.
#[derive(Debug)]
pub enum ScanOutcome {
    /// Traversal finished or the budget expired; a partial result is
    /// reported the same way as a complete one.
    Finished(Vec<FileInfo>),
    /// The task observed its cancel flag; nothing is reported.
    Cancelled,
}

/// Handle to a running scan task. Dropping the handle detaches the
/// thread; the scan then runs to its next checkpoint and exits.
pub struct ScanHandle {
    pub outcome_rx: Receiver<ScanOutcome>,
    cancel_flag: Arc<AtomicBool>,
    _thread: Option<thread::JoinHandle<()>>,
}

impl ScanHandle {
    /// Request the scan to stop at its next traversal checkpoint.
    pub fn cancel(&self) {
        self.cancel_flag.store(true, Ordering::Relaxed);
    }
}

/// Start scanning `root` on a background thread.
pub fn start_scan(root: PathBuf) -> ScanHandle {
    let (outcome_tx, outcome_rx) = bounded::<ScanOutcome>(1);
    let cancel_flag = Arc::new(AtomicBool::new(false));
    let cancel_clone = cancel_flag.clone();

    let thread = thread::Builder::new()
        .name("undock-scan".into())
        .spawn(move || {
            info!("starting deep scan of {}", root.display());
            let outcome = walk::scan(&root, &cancel_clone);
            let _ = outcome_tx.send(outcome);
        })
        .expect("failed to spawn scanner thread");

    ScanHandle {
        outcome_rx,
        cancel_flag,
        _thread: Some(thread),
    }
}

/// Owns at most one running scan task per volume.
///
/// Holds only the id→handle association — never volume data. The manager
/// merges finished results into the volume list.
#[derive(Default)]
pub struct AnalysisScheduler {
    tasks: HashMap<VolumeId, ScanHandle>,
}

impl AnalysisScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a scan of `root` for `id` unless one is already running.
    /// Returns whether a new task was started.
    pub fn schedule(&mut self, id: VolumeId, root: PathBuf) -> bool {
        if self.tasks.contains_key(&id) {
            return false;
        }
        self.tasks.insert(id, start_scan(root));
        true
    }

    /// Cancel and drop the task for `id`, if any. The cancelled task
    /// produces no further result for that id.
    pub fn cancel(&mut self, id: VolumeId) {
        if let Some(task) = self.tasks.remove(&id) {
            task.cancel();
        }
    }

    pub fn cancel_all(&mut self) {
        for (_, task) in self.tasks.drain() {
            task.cancel();
        }
    }

    /// Collect the outcomes of finished tasks, dropping their handles.
    pub fn poll_finished(&mut self) -> Vec<(VolumeId, ScanOutcome)> {
        let mut finished = Vec::new();
        self.tasks.retain(|id, task| match task.outcome_rx.try_recv() {
            Ok(outcome) => {
                finished.push((*id, outcome));
                false
            }
            Err(TryRecvError::Empty) => true,
            // The scan thread died without reporting; drop the handle.
            Err(TryRecvError::Disconnected) => false,
        });
        finished
    }
}
