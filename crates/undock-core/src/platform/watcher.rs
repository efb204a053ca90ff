//! Mount-change watcher.
//!
//! There is no portable mount-event API in this stack, so the watcher
//! polls the mount table's path set and synthesises change
//! notifications: on any difference it asks the manager for an immediate
//! refresh plus the debounced follow-up that captures settled capacity
//! figures.

use crate::manager::{Command, ManagerHandle};
use crate::registry::MountTable;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::debug;

/// Poll cadence for the mount table.
pub const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// The cancel flag is re-checked this often while waiting out the poll
/// interval, bounding stop latency.
const CANCEL_POLL: Duration = Duration::from_millis(200);

/// Handle to a running mount watcher.
///
/// Call [`WatcherHandle::stop`] to shut down the background thread; it
/// exits within ~200 ms of the signal.
pub struct WatcherHandle {
    cancel: Arc<AtomicBool>,
    _thread: Option<thread::JoinHandle<()>>,
}

impl WatcherHandle {
    /// Signal the background thread to stop. Non-blocking.
    pub fn stop(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }
}

/// Start watching; `table` is polled on the watcher thread.
pub fn start_watcher(mut table: Box<dyn MountTable>, manager: ManagerHandle) -> WatcherHandle {
    let cancel = Arc::new(AtomicBool::new(false));
    let cancel_clone = cancel.clone();

    let thread = thread::Builder::new()
        .name("undock-watch".into())
        .spawn(move || {
            let mut known = current_paths(table.as_mut());
            loop {
                if wait_out_interval(&cancel_clone) {
                    break;
                }
                let paths = current_paths(table.as_mut());
                if paths != known {
                    debug!(
                        "mount table changed ({} -> {} entries)",
                        known.len(),
                        paths.len()
                    );
                    known = paths;
                    manager.send(Command::RefreshDebounced);
                }
            }
            debug!("mount watcher stopped");
        })
        .expect("failed to spawn watcher thread");

    WatcherHandle {
        cancel,
        _thread: Some(thread),
    }
}

/// Sleep for [`POLL_INTERVAL`], waking early on cancellation. Returns
/// whether cancellation was observed.
fn wait_out_interval(cancel: &AtomicBool) -> bool {
    let mut waited = Duration::ZERO;
    while waited < POLL_INTERVAL {
        if cancel.load(Ordering::Relaxed) {
            return true;
        }
        thread::sleep(CANCEL_POLL);
        waited += CANCEL_POLL;
    }
    cancel.load(Ordering::Relaxed)
}

fn current_paths(table: &mut dyn MountTable) -> BTreeSet<PathBuf> {
    table
        .mounted_volumes()
        .into_iter()
        .map(|row| row.mount_path)
        .collect()
}
