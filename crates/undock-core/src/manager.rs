//! The single-owner event loop.
//!
//! All volume state has exactly one writer: the manager thread. External
//! callers hold a [`ManagerHandle`] — a command sender plus a read-only
//! snapshot view — and never mutate state directly. Background workers
//! (deep scans, eject pipelines) hand their results back here for
//! merging, so every transition is serialised through one thread and
//! readers always observe a consistent snapshot.

use crate::eject::{self, PipelineReport};
use crate::model::{Volume, VolumeId, VolumeStatus};
use crate::platform::feedback::{Chime, CommandChime, CommandNotifier, Notifier};
use crate::registry::{self, MountTable, VolumeRegistry};
use crate::runner::{CommandRunner, SystemRunner};
use crate::scanner::{AnalysisScheduler, ScanOutcome};
use crate::stats::StatsStore;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::RwLock;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Pause between a successful unmount and the refresh that drops the
/// detached volume from the list.
pub const SETTLE_DELAY: Duration = Duration::from_millis(1_200);

/// Delay of the second, debounced refresh that follows a mount-table
/// change notification, capturing settled capacity figures.
pub const DEBOUNCE_DELAY: Duration = Duration::from_millis(1_500);

/// Owner loop tick — the upper bound on worker-report merge latency.
const TICK: Duration = Duration::from_millis(50);

/// Commands queue up while the owner is busy; 64 is far beyond anything
/// a frontend produces between two ticks.
const COMMAND_CHANNEL_CAPACITY: usize = 64;
const REPORT_CHANNEL_CAPACITY: usize = 64;

/// Commands accepted by the manager — the only mutation entry points
/// into the core.
#[derive(Debug)]
pub enum Command {
    /// Re-read the mount table and reconcile the volume list.
    Refresh,
    /// Refresh now and once more after [`DEBOUNCE_DELAY`]. Sent by the
    /// mount watcher on OS mount/unmount events.
    RefreshDebounced,
    /// Start the eject pipeline for a volume currently `Idle`.
    Eject { id: VolumeId, force: bool },
    /// Leave `Busy`/`Error`, clear the holder list, re-attempt gracefully.
    Retry { id: VolumeId },
    /// Leave `Busy`/`Error`, clear the holder list, re-attempt forcefully.
    ForceEject { id: VolumeId },
    /// Eject every volume currently `Idle`.
    EjectAll,
    /// Open the volume root in the platform file browser.
    Open { id: VolumeId },
    /// Reveal a path in the platform file browser.
    Reveal { path: PathBuf },
    /// Stop the loop, cancelling all background scans.
    Shutdown,
}

/// Immutable read view of the managed state.
#[derive(Clone, Debug, Default, serde::Serialize)]
pub struct Snapshot {
    pub volumes: Vec<Volume>,
    pub total_cleaned_bytes: u64,
    /// Incremented on every publish; lets readers detect change without
    /// diffing volume lists.
    pub generation: u64,
}

/// Everything the manager needs injected. [`ManagerConfig::system`]
/// wires the real platform parts; tests substitute fakes.
pub struct ManagerConfig {
    pub mount_table: Box<dyn MountTable>,
    pub mount_roots: Vec<PathBuf>,
    pub runner: Arc<dyn CommandRunner>,
    pub notifier: Arc<dyn Notifier>,
    pub chime: Arc<dyn Chime>,
    pub stats_path: PathBuf,
}

impl ManagerConfig {
    pub fn system() -> Self {
        let runner: Arc<dyn CommandRunner> = Arc::new(SystemRunner);
        Self {
            mount_table: Box::new(crate::platform::SysinfoMountTable::new()),
            mount_roots: registry::default_external_roots(),
            runner: runner.clone(),
            notifier: Arc::new(CommandNotifier::new(runner.clone())),
            chime: Arc::new(CommandChime::new(runner)),
            stats_path: StatsStore::default_path(),
        }
    }
}

/// Cloneable handle for presentation layers: submit commands, read
/// snapshots. Sends to a stopped manager are silently dropped.
#[derive(Clone)]
pub struct ManagerHandle {
    commands: Sender<Command>,
    snapshot: Arc<RwLock<Snapshot>>,
}

impl ManagerHandle {
    pub fn send(&self, command: Command) {
        let _ = self.commands.send(command);
    }

    pub fn snapshot(&self) -> Snapshot {
        self.snapshot.read().clone()
    }

    pub fn refresh(&self) {
        self.send(Command::Refresh);
    }

    pub fn eject(&self, id: VolumeId, force: bool) {
        self.send(Command::Eject { id, force });
    }

    pub fn retry(&self, id: VolumeId) {
        self.send(Command::Retry { id });
    }

    pub fn force_eject(&self, id: VolumeId) {
        self.send(Command::ForceEject { id });
    }

    pub fn eject_all(&self) {
        self.send(Command::EjectAll);
    }

    pub fn open(&self, id: VolumeId) {
        self.send(Command::Open { id });
    }

    pub fn reveal(&self, path: PathBuf) {
        self.send(Command::Reveal { path });
    }
}

/// Owns the manager thread. Dropping it requests shutdown; [`stop`]
/// additionally joins the loop.
///
/// [`stop`]: VolumeManager::stop
pub struct VolumeManager {
    handle: ManagerHandle,
    thread: Option<thread::JoinHandle<()>>,
}

impl VolumeManager {
    /// Start the owner loop. The first refresh runs before any command
    /// is consumed, so the startup state is published promptly.
    pub fn start(config: ManagerConfig) -> Self {
        let (command_tx, command_rx) = bounded(COMMAND_CHANNEL_CAPACITY);
        let snapshot = Arc::new(RwLock::new(Snapshot::default()));
        let handle = ManagerHandle {
            commands: command_tx,
            snapshot: snapshot.clone(),
        };

        let thread = thread::Builder::new()
            .name("undock-manager".into())
            .spawn(move || Owner::new(config, command_rx, snapshot).run())
            .expect("failed to spawn manager thread");

        Self {
            handle,
            thread: Some(thread),
        }
    }

    pub fn handle(&self) -> ManagerHandle {
        self.handle.clone()
    }

    /// Request shutdown and wait for the loop to exit.
    pub fn stop(mut self) {
        self.handle.send(Command::Shutdown);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for VolumeManager {
    fn drop(&mut self) {
        let _ = self.handle.commands.send(Command::Shutdown);
    }
}

struct Owner {
    registry: VolumeRegistry,
    scheduler: AnalysisScheduler,
    stats: StatsStore,
    mount_table: Box<dyn MountTable>,
    runner: Arc<dyn CommandRunner>,
    notifier: Arc<dyn Notifier>,
    chime: Arc<dyn Chime>,
    commands: Receiver<Command>,
    reports_tx: Sender<PipelineReport>,
    reports_rx: Receiver<PipelineReport>,
    snapshot: Arc<RwLock<Snapshot>>,
    /// Deadlines of scheduled follow-up refreshes (settle + debounce).
    pending_refreshes: Vec<Instant>,
    generation: u64,
    shutdown: bool,
}

impl Owner {
    fn new(config: ManagerConfig, commands: Receiver<Command>, snapshot: Arc<RwLock<Snapshot>>) -> Self {
        let (reports_tx, reports_rx) = bounded(REPORT_CHANNEL_CAPACITY);
        Self {
            registry: VolumeRegistry::with_roots(config.mount_roots),
            scheduler: AnalysisScheduler::new(),
            stats: StatsStore::load(config.stats_path),
            mount_table: config.mount_table,
            runner: config.runner,
            notifier: config.notifier,
            chime: config.chime,
            commands,
            reports_tx,
            reports_rx,
            snapshot,
            pending_refreshes: Vec::new(),
            generation: 0,
            shutdown: false,
        }
    }

    fn run(mut self) {
        info!("volume manager started");
        self.refresh();

        while !self.shutdown {
            match self.commands.recv_timeout(TICK) {
                Ok(command) => self.handle_command(command),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
            // Drain whatever else queued up without blocking.
            while !self.shutdown {
                match self.commands.try_recv() {
                    Ok(command) => self.handle_command(command),
                    Err(_) => break,
                }
            }
            if self.shutdown {
                break;
            }
            self.drain_reports();
            self.merge_finished_scans();
            self.fire_due_refreshes();
        }

        self.scheduler.cancel_all();
        info!("volume manager stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Refresh => self.refresh(),
            Command::RefreshDebounced => {
                self.refresh();
                self.pending_refreshes.push(Instant::now() + DEBOUNCE_DELAY);
            }
            Command::Eject { id, force } => self.eject(id, force),
            Command::Retry { id } => self.reenter(id, false),
            Command::ForceEject { id } => self.reenter(id, true),
            Command::EjectAll => self.eject_all(),
            Command::Open { id } => self.open(id),
            Command::Reveal { path } => self.browse(path, true),
            Command::Shutdown => self.shutdown = true,
        }
    }

    /// Reconcile the volume list and (de)schedule analysis tasks.
    fn refresh(&mut self) {
        let rows = self.mount_table.mounted_volumes();
        let outcome = self.registry.refresh(rows);
        for id in outcome.removed {
            self.scheduler.cancel(id);
        }
        for id in outcome.added {
            self.schedule_scan(id);
        }
        self.publish();
    }

    fn schedule_scan(&mut self, id: VolumeId) {
        let Some(volume) = self.registry.volume_mut(id) else {
            return;
        };
        let root = volume.mount_path.clone();
        if self.scheduler.schedule(id, root) {
            volume.is_analyzing = true;
        }
    }

    /// Merge finished scan results. A cancelled task mutates nothing —
    /// its volume is normally already gone.
    fn merge_finished_scans(&mut self) {
        let finished = self.scheduler.poll_finished();
        if finished.is_empty() {
            return;
        }
        for (id, outcome) in finished {
            match outcome {
                ScanOutcome::Finished(top_files) => {
                    if let Some(volume) = self.registry.volume_mut(id) {
                        debug!(
                            "scan finished for {}: {} file(s) kept",
                            volume.name,
                            top_files.len()
                        );
                        volume.top_files = top_files;
                        volume.is_analyzing = false;
                    }
                }
                ScanOutcome::Cancelled => {}
            }
        }
        self.publish();
    }

    /// Begin the pipeline from `Idle`. A volume already mid-pipeline (or
    /// ejected) rejects the call; `retry`/`force_eject` are the
    /// sanctioned re-entry points because they reset status first.
    fn eject(&mut self, id: VolumeId, force: bool) {
        let Some(volume) = self.registry.volume_mut(id) else {
            return;
        };
        if volume.status != VolumeStatus::Idle {
            debug!(
                "eject of {} rejected while {}",
                volume.name, volume.status
            );
            return;
        }
        info!(
            "ejecting {}{}",
            volume.name,
            if force { " (forced)" } else { "" }
        );
        volume.status = VolumeStatus::Cleaning;
        let mount_path = volume.mount_path.clone();
        eject::spawn(id, mount_path, force, self.runner.clone(), self.reports_tx.clone());
        self.publish();
    }

    /// Leave a rest state: back to `Idle`, holder list cleared, pipeline
    /// re-entered.
    fn reenter(&mut self, id: VolumeId, force: bool) {
        let Some(volume) = self.registry.volume_mut(id) else {
            return;
        };
        if !matches!(volume.status, VolumeStatus::Busy | VolumeStatus::Error(_)) {
            debug!("retry of {} rejected while {}", volume.name, volume.status);
            return;
        }
        volume.status = VolumeStatus::Idle;
        volume.blocking_processes.clear();
        self.eject(id, force);
    }

    /// Eject every idle volume independently. Distinct mount paths never
    /// contend, so no ordering is imposed.
    fn eject_all(&mut self) {
        let idle: Vec<VolumeId> = self
            .registry
            .volumes()
            .iter()
            .filter(|volume| volume.status == VolumeStatus::Idle)
            .map(|volume| volume.id)
            .collect();
        info!("eject all: {} idle volume(s)", idle.len());
        for id in idle {
            self.eject(id, false);
        }
    }

    /// Merge staged pipeline reports. Reports for one volume arrive in
    /// pipeline order on this channel.
    fn drain_reports(&mut self) {
        let mut merged_any = false;
        while let Ok(report) = self.reports_rx.try_recv() {
            merged_any = true;
            match report {
                PipelineReport::Cleaned { id, freed } => {
                    // The counter write happens even if the unmount
                    // later fails.
                    self.stats.add(freed);
                    if let Some(volume) = self.registry.volume_mut(id) {
                        volume.status = VolumeStatus::Ejecting;
                    }
                }
                PipelineReport::Unmounted { id } => self.finish_ejected(id),
                PipelineReport::Blocked { id, holders } => self.finish_blocked(id, holders),
            }
        }
        if merged_any {
            self.publish();
        }
    }

    fn finish_ejected(&mut self, id: VolumeId) {
        let Some(volume) = self.registry.volume_mut(id) else {
            return;
        };
        volume.status = VolumeStatus::Ejected;
        info!("{} ejected", volume.name);
        self.notifier.notify(
            "Volume ejected",
            &format!("{} is safe to disconnect.", volume.name),
        );
        self.chime.play("eject");
        // Let the mount table settle, then drop the detached volume.
        self.pending_refreshes.push(Instant::now() + SETTLE_DELAY);
    }

    fn finish_blocked(&mut self, id: VolumeId, holders: Vec<String>) {
        let Some(volume) = self.registry.volume_mut(id) else {
            return;
        };
        if holders.is_empty() {
            warn!("unmount of {} failed with no identifiable holder", volume.name);
            volume.status = VolumeStatus::Error("The volume could not be unmounted.".into());
            self.notifier.notify(
                "Eject failed",
                &format!("{} could not be unmounted.", volume.name),
            );
        } else {
            warn!(
                "unmount of {} blocked by {}",
                volume.name,
                holders.join(", ")
            );
            volume.status = VolumeStatus::Busy;
            // Replaces, never appends to, any previous holder list.
            volume.blocking_processes = holders.clone();
            self.notifier.notify(
                "Volume is busy",
                &format!("{} is in use by {}.", volume.name, holders.join(", ")),
            );
        }
    }

    fn open(&mut self, id: VolumeId) {
        let Some(volume) = self.registry.volume(id) else {
            return;
        };
        self.browse(volume.mount_path.clone(), false);
    }

    /// Fire-and-forget open in the platform file browser; `reveal`
    /// selects the item instead of entering it.
    fn browse(&self, path: PathBuf, reveal: bool) {
        let runner = self.runner.clone();
        let spawned = thread::Builder::new()
            .name("undock-open".into())
            .spawn(move || {
                let program = crate::platform::open_command();
                let target = path.to_string_lossy().into_owned();
                let result = if cfg!(target_os = "macos") {
                    if reveal {
                        runner.run(program, &["-R", &target])
                    } else {
                        runner.run(program, &[&target])
                    }
                } else {
                    // xdg-open has no reveal mode; open the parent.
                    let shown = if reveal {
                        path.parent()
                            .map(|parent| parent.to_string_lossy().into_owned())
                            .unwrap_or(target)
                    } else {
                        target
                    };
                    runner.run(program, &[&shown])
                };
                if let Err(err) = result {
                    warn!("could not open {}: {err}", path.display());
                }
            });
        if let Err(err) = spawned {
            warn!("could not spawn opener thread: {err}");
        }
    }

    /// Fire any due scheduled refreshes (settle / debounce deadlines).
    fn fire_due_refreshes(&mut self) {
        let now = Instant::now();
        if self.pending_refreshes.iter().any(|deadline| *deadline <= now) {
            self.pending_refreshes.retain(|deadline| *deadline > now);
            self.refresh();
        }
    }

    /// Publish a fresh immutable snapshot for readers.
    fn publish(&mut self) {
        self.generation += 1;
        let snapshot = Snapshot {
            volumes: self.registry.volumes().to_vec(),
            total_cleaned_bytes: self.stats.total_cleaned_bytes(),
            generation: self.generation,
        };
        *self.snapshot.write() = snapshot;
    }
}
