//! Eject pipeline worker.
//!
//! One thread per eject request runs the staged sequence — junk cleanup,
//! unmount, and on failure a holder probe — and reports each stage back
//! to the owner loop, which performs the actual status transitions. The
//! worker never touches shared volume state.

use crate::cleaner;
use crate::model::VolumeId;
use crate::probe::ProcessProbe;
use crate::runner::CommandRunner;
use crossbeam_channel::Sender;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use tracing::{debug, info, warn};

/// Stage reports sent from an eject worker to the owner loop. Reports
/// for one volume arrive in pipeline order.
#[derive(Debug)]
pub enum PipelineReport {
    /// Junk cleanup finished; `freed` bytes were deleted.
    Cleaned { id: VolumeId, freed: u64 },
    /// The unmount command succeeded.
    Unmounted { id: VolumeId },
    /// The unmount command failed. `holders` lists the blocking process
    /// names, possibly empty when none could be identified.
    Blocked { id: VolumeId, holders: Vec<String> },
}

/// Unmount argv for `mount_path`. Success is judged solely by exit
/// status; no structured error code is retained.
#[cfg(target_os = "macos")]
pub fn unmount_command(mount_path: &Path, force: bool) -> (&'static str, Vec<String>) {
    let mut args = vec!["unmount".to_string()];
    if force {
        args.push("force".to_string());
    }
    args.push(mount_path.to_string_lossy().into_owned());
    ("diskutil", args)
}

/// On non-mac unix the forced path is a lazy detach.
#[cfg(not(target_os = "macos"))]
pub fn unmount_command(mount_path: &Path, force: bool) -> (&'static str, Vec<String>) {
    let mut args = Vec::new();
    if force {
        args.push("-l".to_string());
    }
    args.push(mount_path.to_string_lossy().into_owned());
    ("umount", args)
}

/// Run the clean→unmount→probe sequence for one volume on a new worker
/// thread. Reports flow through `report_tx`; a closed channel (manager
/// shut down) silently ends the worker.
pub fn spawn(
    id: VolumeId,
    mount_path: PathBuf,
    force: bool,
    runner: Arc<dyn CommandRunner>,
    report_tx: Sender<PipelineReport>,
) {
    thread::Builder::new()
        .name("undock-eject".into())
        .spawn(move || {
            let freed = cleaner::clean(&mount_path);
            info!("cleaned {freed} bytes from {}", mount_path.display());
            if report_tx.send(PipelineReport::Cleaned { id, freed }).is_err() {
                return;
            }

            let (program, args) = unmount_command(&mount_path, force);
            let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
            let unmounted = match runner.run(program, &arg_refs) {
                Ok(output) => {
                    if !output.success {
                        debug!("{program} failed: {}", output.stderr.trim());
                    }
                    output.success
                }
                Err(err) => {
                    warn!("could not invoke {program}: {err}");
                    false
                }
            };

            if unmounted {
                let _ = report_tx.send(PipelineReport::Unmounted { id });
            } else {
                let holders = ProcessProbe::new(runner).busy_processes(&mount_path);
                let _ = report_tx.send(PipelineReport::Blocked { id, holders });
            }
        })
        .expect("failed to spawn eject thread");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(target_os = "macos")]
    #[test]
    fn unmount_argv_uses_diskutil() {
        let (program, args) = unmount_command(Path::new("/Volumes/BACKUP"), false);
        assert_eq!(program, "diskutil");
        assert_eq!(args, vec!["unmount", "/Volumes/BACKUP"]);

        let (_, forced) = unmount_command(Path::new("/Volumes/BACKUP"), true);
        assert_eq!(forced, vec!["unmount", "force", "/Volumes/BACKUP"]);
    }

    #[cfg(not(target_os = "macos"))]
    #[test]
    fn unmount_argv_uses_umount() {
        let (program, args) = unmount_command(Path::new("/media/user/BACKUP"), false);
        assert_eq!(program, "umount");
        assert_eq!(args, vec!["/media/user/BACKUP"]);

        let (_, forced) = unmount_command(Path::new("/media/user/BACKUP"), true);
        assert_eq!(forced, vec!["-l", "/media/user/BACKUP"]);
    }
}
