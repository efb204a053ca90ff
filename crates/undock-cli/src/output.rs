//! Table rendering for manager snapshots.

use undock_core::manager::Snapshot;
use undock_core::model::{size, Volume, VolumeStatus};

pub fn print_volumes(snapshot: &Snapshot) {
    if snapshot.volumes.is_empty() {
        println!("No external volumes mounted.");
    } else {
        for volume in &snapshot.volumes {
            print_volume(volume);
        }
    }
    println!(
        "Total cleaned to date: {}",
        size::format_size(snapshot.total_cleaned_bytes)
    );
}

fn print_volume(volume: &Volume) {
    println!(
        "{:<12} {}  ({})  {} used of {}, {} free{}",
        format!("[{}]", status_label(&volume.status)),
        volume.name,
        volume.mount_path.display(),
        size::format_size(volume.used_bytes()),
        size::format_size(volume.capacity_bytes),
        size::format_size(volume.free_bytes),
        if volume.is_analyzing { "  [scanning]" } else { "" },
    );
    if !volume.blocking_processes.is_empty() {
        println!("    in use by: {}", volume.blocking_processes.join(", "));
    }
    for file in &volume.top_files {
        println!("    {:>10}  {}", file.size_display, file.path.display());
    }
}

fn status_label(status: &VolumeStatus) -> &'static str {
    match status {
        VolumeStatus::Idle => "idle",
        VolumeStatus::Cleaning => "cleaning",
        VolumeStatus::Ejecting => "ejecting",
        VolumeStatus::Busy => "busy",
        VolumeStatus::Error(_) => "error",
        VolumeStatus::Ejected => "ejected",
    }
}
