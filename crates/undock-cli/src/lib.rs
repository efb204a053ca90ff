//! Command-line frontend for undock.
//!
//! Reads manager snapshots and drives the public mutation entry points;
//! contains no volume logic of its own.

mod output;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use undock_core::manager::{ManagerConfig, ManagerHandle, Snapshot, VolumeManager};
use undock_core::model::{size, VolumeId, VolumeStatus};
use undock_core::platform::{start_watcher, SysinfoMountTable};
use undock_core::scanner::SCAN_BUDGET;

#[derive(Parser)]
#[command(
    name = "undock",
    version,
    about = "Clean, eject, and diagnose externally-mounted volumes"
)]
struct Cli {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// List managed external volumes and their largest files.
    List {
        /// Emit the snapshot as JSON.
        #[arg(long)]
        json: bool,
        /// Wait for the background deep scans before printing.
        #[arg(long)]
        wait_scans: bool,
    },
    /// Clean junk from a volume and unmount it.
    Eject {
        /// Mount path of the volume.
        path: Option<PathBuf>,
        /// Use the forced unmount command.
        #[arg(long)]
        force: bool,
        /// Eject every idle volume.
        #[arg(long, conflicts_with = "path")]
        all: bool,
    },
    /// Open a volume in the platform file browser.
    Open {
        /// Mount path of the volume.
        path: PathBuf,
    },
    /// Show the cumulative cleaned-bytes counter.
    Stats,
    /// Watch mount events and print volume state until interrupted.
    Watch,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        CliCommand::List { json, wait_scans } => list(json, wait_scans),
        CliCommand::Eject { path, force, all } => eject(path, force, all),
        CliCommand::Open { path } => open(path),
        CliCommand::Stats => stats(),
        CliCommand::Watch => watch(),
    }
}

/// Poll the snapshot until `done` holds or `timeout` elapses.
fn wait_for(
    handle: &ManagerHandle,
    timeout: Duration,
    mut done: impl FnMut(&Snapshot) -> bool,
) -> Result<Snapshot> {
    let deadline = Instant::now() + timeout;
    loop {
        let snapshot = handle.snapshot();
        if done(&snapshot) {
            return Ok(snapshot);
        }
        if Instant::now() >= deadline {
            bail!("timed out waiting for the volume manager");
        }
        std::thread::sleep(Duration::from_millis(50));
    }
}

/// Wait for the startup refresh — generation zero is the pre-refresh
/// placeholder snapshot.
fn wait_for_startup(handle: &ManagerHandle) -> Result<Snapshot> {
    wait_for(handle, Duration::from_secs(10), |s| s.generation > 0)
}

fn list(json: bool, wait_scans: bool) -> Result<()> {
    let manager = VolumeManager::start(ManagerConfig::system());
    let handle = manager.handle();

    let mut snapshot = wait_for_startup(&handle)?;
    if wait_scans {
        // Scans are time-boxed, so this wait is bounded too.
        snapshot = wait_for(&handle, SCAN_BUDGET + Duration::from_secs(5), |s| {
            s.volumes.iter().all(|v| !v.is_analyzing)
        })?;
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        output::print_volumes(&snapshot);
    }

    manager.stop();
    Ok(())
}

fn eject(path: Option<PathBuf>, force: bool, all: bool) -> Result<()> {
    let manager = VolumeManager::start(ManagerConfig::system());
    let handle = manager.handle();
    let snapshot = wait_for_startup(&handle)?;

    let result = if all {
        eject_every_idle(&handle, &snapshot)
    } else {
        let path = path.context("provide a mount path, or --all for every idle volume")?;
        eject_one(&handle, &snapshot, &path, force)
    };

    manager.stop();
    result
}

fn eject_one(
    handle: &ManagerHandle,
    snapshot: &Snapshot,
    path: &PathBuf,
    force: bool,
) -> Result<()> {
    let volume = snapshot
        .volumes
        .iter()
        .find(|v| v.mount_path == *path)
        .with_context(|| format!("{} is not a managed external volume", path.display()))?;
    let id = volume.id;
    let name = volume.name.clone();

    // A volume parked in busy/error re-enters the pipeline through the
    // retry entry points; anything else starts it fresh.
    match volume.status {
        VolumeStatus::Busy | VolumeStatus::Error(_) if force => handle.force_eject(id),
        VolumeStatus::Busy | VolumeStatus::Error(_) => handle.retry(id),
        _ => handle.eject(id, force),
    }
    let done = wait_for(handle, Duration::from_secs(120), |s| at_rest(s, id))?;

    match done.volumes.iter().find(|v| v.id == id) {
        // Gone from the list means the settle refresh already dropped it.
        None => println!("{name} ejected — safe to disconnect."),
        Some(v) => match &v.status {
            VolumeStatus::Ejected => println!("{name} ejected — safe to disconnect."),
            VolumeStatus::Busy => bail!(
                "{name} is in use by {}; close them and retry, or pass --force",
                v.blocking_processes.join(", ")
            ),
            VolumeStatus::Error(message) => bail!("{name}: {message}"),
            other => bail!("{name} ended in unexpected state: {other}"),
        },
    }
    Ok(())
}

fn eject_every_idle(handle: &ManagerHandle, snapshot: &Snapshot) -> Result<()> {
    let idle: Vec<(VolumeId, String)> = snapshot
        .volumes
        .iter()
        .filter(|v| v.status == VolumeStatus::Idle)
        .map(|v| (v.id, v.name.to_string()))
        .collect();
    if idle.is_empty() {
        println!("No idle volumes to eject.");
        return Ok(());
    }

    handle.eject_all();
    let done = wait_for(handle, Duration::from_secs(120), |s| {
        idle.iter().all(|(id, _)| at_rest(s, *id))
    })?;

    let mut failures = 0;
    for (id, name) in &idle {
        match done.volumes.iter().find(|v| v.id == *id) {
            None | Some(undock_core::model::Volume {
                status: VolumeStatus::Ejected,
                ..
            }) => println!("{name}: ejected"),
            Some(v) => {
                failures += 1;
                println!("{name}: {}", v.status);
            }
        }
    }
    if failures > 0 {
        bail!("{failures} volume(s) could not be ejected");
    }
    Ok(())
}

/// Whether the volume reached a rest state (or left the list entirely).
fn at_rest(snapshot: &Snapshot, id: VolumeId) -> bool {
    match snapshot.volumes.iter().find(|v| v.id == id) {
        None => true,
        Some(v) => matches!(
            v.status,
            VolumeStatus::Ejected | VolumeStatus::Busy | VolumeStatus::Error(_)
        ),
    }
}

fn open(path: PathBuf) -> Result<()> {
    let manager = VolumeManager::start(ManagerConfig::system());
    let handle = manager.handle();
    let snapshot = wait_for_startup(&handle)?;
    let volume = snapshot
        .volumes
        .iter()
        .find(|v| v.mount_path == path)
        .with_context(|| format!("{} is not a managed external volume", path.display()))?;
    handle.open(volume.id);
    // The opener is fire-and-forget; give the owner loop a beat to
    // dispatch it before shutting down.
    std::thread::sleep(Duration::from_millis(200));
    manager.stop();
    Ok(())
}

fn stats() -> Result<()> {
    let manager = VolumeManager::start(ManagerConfig::system());
    let handle = manager.handle();
    let snapshot = wait_for_startup(&handle)?;
    println!(
        "Total cleaned to date: {}",
        size::format_size(snapshot.total_cleaned_bytes)
    );
    manager.stop();
    Ok(())
}

fn watch() -> Result<()> {
    let manager = VolumeManager::start(ManagerConfig::system());
    let handle = manager.handle();
    let watcher = start_watcher(Box::new(SysinfoMountTable::new()), handle.clone());

    let running = Arc::new(AtomicBool::new(true));
    let flag = running.clone();
    ctrlc::set_handler(move || flag.store(false, Ordering::SeqCst))
        .context("failed to install the interrupt handler")?;

    println!("Watching external volumes — press Ctrl-C to stop.");
    let mut last_generation = 0;
    while running.load(Ordering::SeqCst) {
        let snapshot = handle.snapshot();
        if snapshot.generation != last_generation {
            last_generation = snapshot.generation;
            output::print_volumes(&snapshot);
        }
        std::thread::sleep(Duration::from_millis(200));
    }

    watcher.stop();
    manager.stop();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn eject_all_conflicts_with_path() {
        let result = Cli::try_parse_from(["undock", "eject", "/Volumes/X", "--all"]);
        assert!(result.is_err());
    }
}
