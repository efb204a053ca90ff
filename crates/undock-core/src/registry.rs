//! Volume discovery and reconciliation.
//!
//! The registry owns the canonical volume list. `refresh` filters the
//! current mount table down to managed external volumes and reconciles
//! it against the previous snapshot by mount path: metadata is updated
//! in place, new mounts become `Idle` volumes, vanished mounts are
//! dropped. It never touches the status, scan results, or
//! blocking-process list of a surviving volume — only explicit pipeline
//! transitions do.

use crate::model::{Volume, VolumeId};
use compact_str::CompactString;
use std::path::{Path, PathBuf};
use tracing::info;

/// One row of the external mount-table query.
#[derive(Clone, Debug)]
pub struct MountedVolume {
    pub mount_path: PathBuf,
    pub name: String,
    pub capacity_bytes: u64,
    pub free_bytes: u64,
    pub is_internal: bool,
    pub is_removable: bool,
    pub is_ejectable: bool,
}

/// Source of mount-table rows. The production implementation wraps
/// `sysinfo`; tests supply fixture rows.
pub trait MountTable: Send {
    fn mounted_volumes(&mut self) -> Vec<MountedVolume>;
}

/// Mount-path namespaces that hold externally-mounted volumes.
#[cfg(target_os = "macos")]
pub const EXTERNAL_MOUNT_ROOTS: [&str; 1] = ["/Volumes"];
#[cfg(not(target_os = "macos"))]
pub const EXTERNAL_MOUNT_ROOTS: [&str; 3] = ["/media", "/run/media", "/mnt"];

/// Name prefixes of system-managed volumes that are never surfaced.
pub const RESERVED_NAME_PREFIXES: [&str; 2] = ["com.apple.", ".timemachine"];

pub fn default_external_roots() -> Vec<PathBuf> {
    EXTERNAL_MOUNT_ROOTS.iter().map(PathBuf::from).collect()
}

/// Volumes created and removed by one refresh pass, so the caller can
/// schedule and cancel analysis tasks.
#[derive(Debug, Default)]
pub struct RefreshOutcome {
    pub added: Vec<VolumeId>,
    pub removed: Vec<VolumeId>,
}

pub struct VolumeRegistry {
    external_roots: Vec<PathBuf>,
    volumes: Vec<Volume>,
    next_id: u64,
}

impl Default for VolumeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl VolumeRegistry {
    pub fn new() -> Self {
        Self::with_roots(default_external_roots())
    }

    /// Registry recognising `roots` as the external-mount namespace.
    pub fn with_roots(roots: Vec<PathBuf>) -> Self {
        Self {
            external_roots: roots,
            volumes: Vec::new(),
            next_id: 0,
        }
    }

    pub fn volumes(&self) -> &[Volume] {
        &self.volumes
    }

    pub fn volume(&self, id: VolumeId) -> Option<&Volume> {
        self.volumes.iter().find(|v| v.id == id)
    }

    pub fn volume_mut(&mut self, id: VolumeId) -> Option<&mut Volume> {
        self.volumes.iter_mut().find(|v| v.id == id)
    }

    /// Reconcile the volume list against the current mount table.
    pub fn refresh(&mut self, rows: Vec<MountedVolume>) -> RefreshOutcome {
        let rows: Vec<MountedVolume> = rows
            .into_iter()
            .filter(|row| self.is_managed(row))
            .collect();

        let mut outcome = RefreshOutcome::default();

        // Drop volumes whose mount path is gone.
        self.volumes.retain(|volume| {
            let still_mounted = rows.iter().any(|row| row.mount_path == volume.mount_path);
            if !still_mounted {
                info!("volume {} left {}", volume.name, volume.mount_path.display());
                outcome.removed.push(volume.id);
            }
            still_mounted
        });

        for row in rows {
            match self
                .volumes
                .iter_mut()
                .find(|volume| volume.mount_path == row.mount_path)
            {
                Some(existing) => {
                    // Metadata-only refresh; identity and pipeline state
                    // survive.
                    existing.name = display_name(&row);
                    existing.capacity_bytes = row.capacity_bytes;
                    existing.free_bytes = row.free_bytes;
                }
                None => {
                    let id = VolumeId(self.next_id);
                    self.next_id += 1;
                    info!(
                        "volume {} mounted at {}",
                        row.name,
                        row.mount_path.display()
                    );
                    self.volumes.push(Volume::new(
                        id,
                        row.mount_path.clone(),
                        display_name(&row),
                        row.capacity_bytes,
                        row.free_bytes,
                    ));
                    outcome.added.push(id);
                }
            }
        }

        outcome
    }

    /// Filter rules for one mount-table row: exclude the filesystem root,
    /// require the external-mount namespace, exclude internal volumes
    /// unless removable or ejectable, and exclude reserved system names.
    fn is_managed(&self, row: &MountedVolume) -> bool {
        let path = row.mount_path.as_path();
        if path == Path::new("/") {
            return false;
        }
        if !self.external_roots.iter().any(|root| path.starts_with(root)) {
            return false;
        }
        if row.is_internal && !(row.is_removable || row.is_ejectable) {
            return false;
        }
        let leaf = path
            .file_name()
            .map(|name| name.to_string_lossy())
            .unwrap_or_default();
        if RESERVED_NAME_PREFIXES
            .iter()
            .any(|prefix| row.name.starts_with(prefix) || leaf.starts_with(prefix))
        {
            return false;
        }
        true
    }
}

/// Display name for a row, falling back to the mount-path leaf when the
/// mount table reports none (common for device-node names on Linux).
fn display_name(row: &MountedVolume) -> CompactString {
    if row.name.is_empty() {
        let leaf = row
            .mount_path
            .file_name()
            .map(|name| name.to_string_lossy())
            .unwrap_or_default();
        CompactString::new(leaf.as_ref())
    } else {
        CompactString::new(&row.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::VolumeStatus;

    fn registry() -> VolumeRegistry {
        VolumeRegistry::with_roots(vec![PathBuf::from("/Volumes")])
    }

    fn row(path: &str, name: &str) -> MountedVolume {
        MountedVolume {
            mount_path: PathBuf::from(path),
            name: name.to_string(),
            capacity_bytes: 1_000_000_000,
            free_bytes: 200_000_000,
            is_internal: false,
            is_removable: true,
            is_ejectable: true,
        }
    }

    #[test]
    fn filters_root_namespace_internal_and_reserved() {
        let mut reg = registry();

        let mut internal_fixed = row("/Volumes/Macintosh HD", "Macintosh HD");
        internal_fixed.is_internal = true;
        internal_fixed.is_removable = false;
        internal_fixed.is_ejectable = false;

        let mut internal_removable = row("/Volumes/SDCARD", "SDCARD");
        internal_removable.is_internal = true;

        let rows = vec![
            row("/", "Root"),
            row("/private/var/vm", "VM"),
            internal_fixed,
            internal_removable,
            row("/Volumes/com.apple.TimeMachine.localsnapshots", "backups"),
            row("/Volumes/.timemachine", ".timemachine"),
            row("/Volumes/BACKUP", "BACKUP"),
        ];

        let outcome = reg.refresh(rows);
        let names: Vec<&str> = reg.volumes().iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["SDCARD", "BACKUP"]);
        assert_eq!(outcome.added.len(), 2);
        assert!(outcome.removed.is_empty());
    }

    #[test]
    fn refresh_updates_metadata_in_place_and_preserves_state() {
        let mut reg = registry();
        reg.refresh(vec![row("/Volumes/BACKUP", "BACKUP")]);
        let id = reg.volumes()[0].id;

        // Simulate pipeline and scan mutations.
        {
            let volume = reg.volume_mut(id).unwrap();
            volume.status = VolumeStatus::Busy;
            volume.blocking_processes = vec!["mds".into()];
            volume.top_files = Vec::new();
        }

        let mut updated = row("/Volumes/BACKUP", "BACKUP 2");
        updated.capacity_bytes = 2_000_000_000;
        updated.free_bytes = 100;
        let outcome = reg.refresh(vec![updated]);

        assert!(outcome.added.is_empty());
        assert!(outcome.removed.is_empty());
        let volume = reg.volume(id).unwrap();
        assert_eq!(volume.id, id);
        assert_eq!(volume.name, "BACKUP 2");
        assert_eq!(volume.capacity_bytes, 2_000_000_000);
        assert_eq!(volume.free_bytes, 100);
        assert_eq!(volume.status, VolumeStatus::Busy);
        assert_eq!(volume.blocking_processes, vec!["mds".to_string()]);
    }

    #[test]
    fn vanished_mounts_are_removed_and_reported() {
        let mut reg = registry();
        reg.refresh(vec![row("/Volumes/A", "A"), row("/Volumes/B", "B")]);
        let id_a = reg.volumes()[0].id;

        let outcome = reg.refresh(vec![row("/Volumes/B", "B")]);
        assert_eq!(outcome.removed, vec![id_a]);
        assert_eq!(reg.volumes().len(), 1);
        assert_eq!(reg.volumes()[0].name, "B");
    }

    #[test]
    fn ids_are_never_reused() {
        let mut reg = registry();
        reg.refresh(vec![row("/Volumes/A", "A")]);
        let first = reg.volumes()[0].id;
        reg.refresh(Vec::new());
        reg.refresh(vec![row("/Volumes/A", "A")]);
        let second = reg.volumes()[0].id;
        assert_ne!(first, second);
    }

    #[test]
    fn empty_name_falls_back_to_mount_leaf() {
        let mut reg = registry();
        reg.refresh(vec![row("/Volumes/USB-STICK", "")]);
        assert_eq!(reg.volumes()[0].name, "USB-STICK");
    }
}
