//! Real mount-table query backed by `sysinfo`.

use crate::registry::{MountTable, MountedVolume};
use sysinfo::Disks;

pub struct SysinfoMountTable {
    disks: Disks,
}

impl SysinfoMountTable {
    pub fn new() -> Self {
        Self {
            disks: Disks::new_with_refreshed_list(),
        }
    }
}

impl Default for SysinfoMountTable {
    fn default() -> Self {
        Self::new()
    }
}

impl MountTable for SysinfoMountTable {
    fn mounted_volumes(&mut self) -> Vec<MountedVolume> {
        self.disks.refresh(true);
        self.disks
            .iter()
            .map(|disk| {
                let removable = disk.is_removable();
                MountedVolume {
                    mount_path: disk.mount_point().to_path_buf(),
                    name: disk.name().to_string_lossy().into_owned(),
                    capacity_bytes: disk.total_space(),
                    free_bytes: disk.available_space(),
                    // sysinfo exposes no internal/ejectable flags; a
                    // non-removable disk is treated as internal and a
                    // removable one as ejectable, keeping the registry
                    // rule intact.
                    is_internal: !removable,
                    is_removable: removable,
                    is_ejectable: removable,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Querying the host mount table must not panic, whatever is mounted.
    #[test]
    fn query_does_not_panic() {
        let mut table = SysinfoMountTable::new();
        let _rows = table.mounted_volumes();
    }
}
