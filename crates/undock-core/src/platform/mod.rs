//! Platform integration — the real mount table, the polling mount
//! watcher, and command-backed feedback sinks.

pub mod feedback;
pub mod mount_table;
pub mod watcher;

pub use mount_table::SysinfoMountTable;
pub use watcher::{start_watcher, WatcherHandle};

/// Program used to open paths in the platform file browser.
pub fn open_command() -> &'static str {
    if cfg!(target_os = "macos") {
        "open"
    } else {
        "xdg-open"
    }
}
